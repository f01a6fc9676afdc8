use std::fmt::{Debug, Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The two images do not have the same `(batch, channel, height, width)` shape
    ShapeMismatch { left: [usize; 4], right: [usize; 4] },
    /// The window is not laid out as `(channels, 1, k, k)` for the images channel count
    WindowMismatch { channels: usize, window: [usize; 4] },
    /// The kernel does not fit in the zero padded input
    KernelTooLarge { kernel: [usize; 2], padded: [usize; 2] },
    /// One of the image dimensions is zero
    EmptyImage { shape: [usize; 4] },
    /// Window size must be at least 1
    InvalidWindowSize(usize),
    /// Multi-scale needs at least 2 scales
    InvalidScales(usize),
    /// Gaussian standard deviation must be finite and positive
    InvalidSigma(f64),
    /// Pooling shrinks the image to nothing before all scales are processed
    DegenerateResolution {
        scale: usize,
        height: usize,
        width: usize,
    },
    /// The accumulated contrast-structure map and the one computed at the current
    /// scale disagree, happens with even window sizes
    ScaleShapeMismatch {
        scale: usize,
        accumulated: [usize; 4],
        current: [usize; 4],
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
