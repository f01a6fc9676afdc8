use crate::window::DEFAULT_SIGMA;
use crate::{Constants, Element, Error, Result};
use ndarray::Array4;

/// How a similarity map is turned into a score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Reduction {
    /// Mean over every element, batch included
    #[default]
    Mean,
    /// Mean over channels and pixels, one score per batch element
    PerSample,
}

impl Reduction {
    pub fn reduce<F: Element>(self, map: &Array4<F>) -> Score<F> {
        match self {
            Reduction::Mean => Score::Mean(map.mean().unwrap_or_else(F::nan)),
            Reduction::PerSample => Score::PerSample(
                map.outer_iter()
                    .map(|sample| sample.mean().unwrap_or_else(F::nan))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Score<F> {
    Mean(F),
    PerSample(Vec<F>),
}

impl<F: Element> Score<F> {
    /// Single value for the whole batch. Per sample scores are averaged, which gives the same value
    /// as [Reduction::Mean] since every sample has the same size.
    pub fn value(&self) -> F {
        match self {
            Score::Mean(v) => *v,
            Score::PerSample(scores) if scores.is_empty() => F::nan(),
            Score::PerSample(scores) => {
                scores.iter().fold(F::zero(), |acc, &s| acc + s) / F::cast(scores.len() as f64)
            }
        }
    }

    pub fn as_mean(&self) -> Option<F> {
        match self {
            Score::Mean(v) => Some(*v),
            Score::PerSample(_) => None,
        }
    }

    pub fn per_sample(&self) -> Option<&[F]> {
        match self {
            Score::Mean(_) => None,
            Score::PerSample(scores) => Some(scores),
        }
    }

    pub fn to_f64(&self) -> Score<f64> {
        match self {
            Score::Mean(v) => Score::Mean(v.widen()),
            Score::PerSample(scores) => Score::PerSample(scores.iter().map(|s| s.widen()).collect()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Strategy {
    #[default]
    SingleScale,
    /// Contrast-structure is accumulated over `scales - 1` resolutions, luminance only enters at
    /// the coarsest one.
    MultiScale { scales: usize },
}

impl Strategy {
    pub const DEFAULT_SCALES: usize = 5;
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Side of the Gaussian window. Odd sizes keep the maps aligned with the input.
    pub window_size: usize,
    /// Standard deviation of the Gaussian window
    pub sigma: f64,
    pub reduction: Reduction,
    pub strategy: Strategy,
    pub constants: Constants,
}

impl EngineConfig {
    pub const DEFAULT_WINDOW_SIZE: usize = 11;

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidWindowSize(self.window_size));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::InvalidSigma(self.sigma));
        }
        if let Strategy::MultiScale { scales } = self.strategy {
            if scales < 2 {
                return Err(Error::InvalidScales(scales));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: Self::DEFAULT_WINDOW_SIZE,
            sigma: DEFAULT_SIGMA,
            reduction: Reduction::default(),
            strategy: Strategy::default(),
            constants: Constants::default(),
        }
    }
}
