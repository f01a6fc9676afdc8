use crate::{Element, LocalStatistics};
use ndarray::{Array4, Zip};

/// Stabilizing constants of the SSIM formula.
///
/// The defaults `C1 = 0.01²` and `C2 = 0.03²` assume samples in a `[0, 1]` range.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constants {
    /// Luminance term constant
    pub c1: f64,
    /// Contrast-structure term constant
    pub c2: f64,
}

impl Constants {
    pub const K1: f64 = 0.01;
    pub const K2: f64 = 0.03;

    /// Constants for samples spanning `data_range`, e.g. 255 for 8 bit values.
    pub fn for_range(data_range: f64) -> Self {
        Self {
            c1: (Self::K1 * data_range).powi(2),
            c2: (Self::K2 * data_range).powi(2),
        }
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self::for_range(1.0)
    }
}

/// Per pixel similarity terms. `luminance` is only computed when asked for.
#[derive(Debug, Clone)]
pub struct Components<F> {
    pub luminance: Option<Array4<F>>,
    pub contrast_structure: Array4<F>,
}

/// `(2 mu1 mu2 + C1) / (mu1² + mu2² + C1)`
pub fn luminance<F: Element>(stats: &LocalStatistics<F>, constants: &Constants) -> Array4<F> {
    let c1 = F::cast(constants.c1);
    let two = F::cast(2.0);
    Zip::from(&stats.mu1)
        .and(&stats.mu2)
        .map_collect(|&m1, &m2| (two * m1 * m2 + c1) / (m1 * m1 + m2 * m2 + c1))
}

/// `(2 sigma12 + C2) / (sigma1² + sigma2² + C2)`
pub fn contrast_structure<F: Element>(
    stats: &LocalStatistics<F>,
    constants: &Constants,
) -> Array4<F> {
    let c2 = F::cast(constants.c2);
    let two = F::cast(2.0);
    Zip::from(&stats.sigma1_sq)
        .and(&stats.sigma2_sq)
        .and(&stats.sigma12)
        .map_collect(|&s11, &s22, &s12| (two * s12 + c2) / (s11 + s22 + c2))
}

pub fn similarity_components<F: Element>(
    stats: &LocalStatistics<F>,
    constants: &Constants,
    with_luminance: bool,
) -> Components<F> {
    Components {
        luminance: with_luminance.then(|| luminance(stats, constants)),
        contrast_structure: contrast_structure(stats, constants),
    }
}
