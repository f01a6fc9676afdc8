//! Structural similarity (SSIM) and multi-scale structural similarity (MS-SSIM) between batches of
//! multi-channel images laid out `(batch, channel, height, width)`.
//!
//! Use [ssim] and [ms_ssim] for one-off comparisons. [Ssim] keeps the Gaussian window between calls
//! and only rebuilds it when the channel count, element type or device changes.

use ndarray::ArrayView4;
use tracing::debug;

pub use backend::{Backend, Cpu, CpuDevice};
pub use components::{Components, Constants};
pub use config::{EngineConfig, Reduction, Score, Strategy};
pub use element::{DType, Element, WindowStorage};
pub use error::{Error, Result};
pub use msssim::{ms_ssim_map, pyramid_shapes};
pub use ssim::ssim_map;
pub use stats::LocalStatistics;
pub use window::{create_window, gaussian, DEFAULT_SIGMA};

pub mod backend;
pub mod components;
pub mod config;
mod element;
mod error;
pub mod msssim;
pub mod ssim;
mod stats;
pub mod window;

/// Score a pair with an already placed window.
pub(crate) fn evaluate<F: Element, B: Backend>(
    backend: &B,
    config: &EngineConfig,
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    window: ArrayView4<F>,
) -> Result<Score<F>> {
    let map = match config.strategy {
        Strategy::SingleScale => ssim_map(
            backend,
            img1,
            img2,
            window,
            config.window_size,
            &config.constants,
        )?,
        Strategy::MultiScale { scales } => ms_ssim_map(
            backend,
            img1,
            img2,
            window,
            config.window_size,
            &config.constants,
            scales,
        )?,
    };
    Ok(config.reduction.reduce(&map))
}

fn evaluate_once<F: Element>(
    config: EngineConfig,
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
) -> Result<Score<F>> {
    config.validate()?;
    let [_, channel, _, _] = ssim::check_pair(&img1, &img2)?;
    let window = Cpu.place(create_window::<F>(
        config.window_size,
        channel,
        config.sigma,
    ));
    evaluate(&Cpu, &config, img1, img2, window.view())
}

/// Single-scale SSIM, building a fresh window for this call.
///
/// The usual parameters are `window_size = 11` and [Reduction::Mean].
pub fn ssim<F: Element>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    window_size: usize,
    reduction: Reduction,
) -> Result<Score<F>> {
    evaluate_once(
        EngineConfig {
            window_size,
            reduction,
            ..Default::default()
        },
        img1,
        img2,
    )
}

/// Multi-scale SSIM, building a fresh window for this call.
pub fn ms_ssim<F: Element>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    scales: usize,
    window_size: usize,
    reduction: Reduction,
) -> Result<Score<F>> {
    evaluate_once(
        EngineConfig {
            window_size,
            reduction,
            strategy: Strategy::MultiScale { scales },
            ..Default::default()
        },
        img1,
        img2,
    )
}

/// What a cached window was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowKey<D> {
    pub channel: usize,
    pub dtype: DType,
    pub device: D,
}

#[derive(Debug, Clone)]
struct CachedWindow<D> {
    key: WindowKey<D>,
    kernel: WindowStorage,
}

/// Reusable SSIM or MS-SSIM engine.
///
/// The window is built on first use and kept until an input with another channel count or element
/// type comes in, or the backend moves to another device.
#[derive(Debug)]
pub struct Ssim<B: Backend = Cpu> {
    config: EngineConfig,
    backend: B,
    window: Option<CachedWindow<B::Device>>,
    rebuilds: usize,
}

impl Ssim<Cpu> {
    /// Single-scale engine.
    pub fn new(window_size: usize, reduction: Reduction) -> Result<Self> {
        Self::from_config(EngineConfig {
            window_size,
            reduction,
            ..Default::default()
        })
    }

    /// Multi-scale engine. The usual number of scales is [Strategy::DEFAULT_SCALES].
    pub fn multi_scale(scales: usize, window_size: usize, reduction: Reduction) -> Result<Self> {
        Self::from_config(EngineConfig {
            window_size,
            reduction,
            strategy: Strategy::MultiScale { scales },
            ..Default::default()
        })
    }

    pub fn from_config(config: EngineConfig) -> Result<Self> {
        Self::with_backend(config, Cpu)
    }
}

impl Default for Ssim<Cpu> {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            backend: Cpu,
            window: None,
            rebuilds: 0,
        }
    }
}

impl<B: Backend> Ssim<B> {
    pub fn with_backend(config: EngineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        debug!(?config, device = ?backend.device(), "New engine");
        Ok(Self {
            config,
            backend,
            window: None,
            rebuilds: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Key of the currently cached window, if any.
    pub fn window_key(&self) -> Option<&WindowKey<B::Device>> {
        self.window.as_ref().map(|w| &w.key)
    }

    /// Currently cached kernel, laid out `(channel, 1, window_size, window_size)`.
    pub fn window(&self) -> Option<&WindowStorage> {
        self.window.as_ref().map(|w| &w.kernel)
    }

    /// Number of times the window had to be built.
    pub fn window_rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn compute<F: Element>(
        &mut self,
        img1: ArrayView4<F>,
        img2: ArrayView4<F>,
    ) -> Result<Score<F>> {
        let [_, channel, _, _] = ssim::check_pair(&img1, &img2)?;
        let key = WindowKey {
            channel,
            dtype: F::DTYPE,
            device: self.backend.device(),
        };

        let cached = self
            .window
            .as_ref()
            .filter(|w| w.key == key)
            .and_then(|w| F::select(&w.kernel));
        if let Some(kernel) = cached {
            return evaluate(&self.backend, &self.config, img1, img2, kernel.view());
        }

        if let Some(old) = &self.window {
            debug!(
                dtype = ?old.kernel.dtype(),
                shape = ?old.kernel.shape(),
                device = ?old.key.device,
                "Dropping cached window"
            );
        }
        debug!(
            channel,
            dtype = ?key.dtype,
            device = ?key.device,
            window_size = self.config.window_size,
            "Building window"
        );
        let kernel = self.backend.place(create_window::<F>(
            self.config.window_size,
            channel,
            self.config.sigma,
        ));
        let score = evaluate(&self.backend, &self.config, img1, img2, kernel.view());
        self.window = Some(CachedWindow {
            key,
            kernel: F::store(kernel),
        });
        self.rebuilds += 1;
        score
    }
}
