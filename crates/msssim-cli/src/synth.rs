use clap::ValueEnum;
use msssim::{Backend, Cpu};
use ndarray::Array4;
use rand::Rng;
use std::f64::consts::TAU;

/// Shape of the generated batches, `(batch, channels, height, width)`.
pub(crate) type Shape = (usize, usize, usize, usize);

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Distortion {
    /// Leave the reference untouched. Every score should be 1.
    Identity,
    /// Uniform noise with the level as amplitude
    Noise,
    /// Box blur with the level (rounded) as radius
    Blur,
    /// Add the level to every sample
    Offset,
}

impl Distortion {
    /// Strength of the last level when none is given.
    pub(crate) fn default_max_level(self) -> f64 {
        match self {
            Distortion::Identity | Distortion::Noise | Distortion::Offset => 0.2,
            // In pixels, a level below 0.5 would round to no blur at all.
            Distortion::Blur => 5.0,
        }
    }
}

/// Batch of smooth periodic patterns in `[0, 1]` with a little grain, different for every sample
/// and channel.
pub(crate) fn reference(rng: &mut impl Rng, shape: Shape) -> Array4<f64> {
    let (batch, channels, height, width) = shape;
    let params: Vec<[f64; 4]> = (0..batch * channels)
        .map(|_| {
            [
                rng.gen_range(1.0..4.0) / width as f64,
                rng.gen_range(1.0..4.0) / height as f64,
                rng.gen_range(0.0..TAU),
                rng.gen_range(0.0..TAU),
            ]
        })
        .collect();
    let mut img = Array4::from_shape_fn(shape, |(n, c, y, x)| {
        let [fx, fy, px, py] = params[n * channels + c];
        0.5 + 0.3 * (TAU * fx * x as f64 + px).sin() * (TAU * fy * y as f64 + py).cos()
    });
    img.mapv_inplace(|v| (v + rng.gen_range(-0.05..0.05)).clamp(0.0, 1.0));
    img
}

/// Distorted copy of `img`, samples are kept in `[0, 1]`.
pub(crate) fn distort(
    img: &Array4<f64>,
    distortion: Distortion,
    level: f64,
    rng: &mut impl Rng,
) -> msssim::Result<Array4<f64>> {
    Ok(match distortion {
        Distortion::Identity => img.clone(),
        Distortion::Noise => {
            let amplitude = level.abs();
            img.mapv(|v| (v + rng.gen_range(-amplitude..=amplitude)).clamp(0.0, 1.0))
        }
        Distortion::Offset => img.mapv(|v| (v + level).clamp(0.0, 1.0)),
        Distortion::Blur => box_blur(img, level.max(0.0).round() as usize)?,
    })
}

fn box_blur(img: &Array4<f64>, radius: usize) -> msssim::Result<Array4<f64>> {
    if radius == 0 {
        return Ok(img.clone());
    }
    let side = 2 * radius + 1;
    let kernel = Array4::from_elem(
        (img.dim().1, 1, side, side),
        1.0 / (side * side) as f64,
    );
    Cpu.conv2d_depthwise(img.view(), kernel.view(), radius)
}
