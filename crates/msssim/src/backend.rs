//! Numeric primitives the metrics are built on.
//!
//! The metrics only need two operations from the host: a depthwise 2D convolution with symmetric
//! zero padding, and a 2x2 average pooling. [Cpu] implements both on top of `ndarray`.

use crate::{Element, Error, Result};
use ndarray::{Array4, ArrayView2, ArrayView3, ArrayView4, ArrayViewMut2, ArrayViewMut3};
use std::fmt::Debug;

pub trait Backend {
    /// Identity of the memory the tensors live in. Kernels built for one device are not reused on
    /// another.
    type Device: Clone + PartialEq + Debug;

    fn device(&self) -> Self::Device;

    /// Cross-correlate each channel of `input` `(N, C, H, W)` with the matching slice of `kernel`
    /// `(C, 1, kh, kw)`, with stride 1 and `padding` zeros on every side.
    ///
    /// Output is `(N, C, H + 2 * padding - kh + 1, W + 2 * padding - kw + 1)`.
    fn conv2d_depthwise<F: Element>(
        &self,
        input: ArrayView4<F>,
        kernel: ArrayView4<F>,
        padding: usize,
    ) -> Result<Array4<F>>;

    /// Average of non-overlapping 2x2 patches. Odd trailing rows and columns are dropped.
    fn avg_pool2d<F: Element>(&self, input: ArrayView4<F>) -> Array4<F>;

    /// Move a freshly built kernel to this backend's device.
    fn place<F: Element>(&self, kernel: Array4<F>) -> Array4<F> {
        kernel
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct CpuDevice;

/// Reference backend, computes everything on the host with `ndarray`.
///
/// With the `rayon` feature, channel planes are convolved in parallel.
#[derive(Debug, Copy, Clone, Default)]
pub struct Cpu;

impl Backend for Cpu {
    type Device = CpuDevice;

    fn device(&self) -> Self::Device {
        CpuDevice
    }

    fn conv2d_depthwise<F: Element>(
        &self,
        input: ArrayView4<F>,
        kernel: ArrayView4<F>,
        padding: usize,
    ) -> Result<Array4<F>> {
        let (batch, channels, height, width) = input.dim();
        let (k_channels, k_in, kh, kw) = kernel.dim();
        if k_channels != channels || k_in != 1 {
            return Err(Error::WindowMismatch {
                channels,
                window: [k_channels, k_in, kh, kw],
            });
        }

        let padded = [height + 2 * padding, width + 2 * padding];
        let (Some(out_h), Some(out_w)) = (
            (padded[0] + 1).checked_sub(kh),
            (padded[1] + 1).checked_sub(kw),
        ) else {
            return Err(Error::KernelTooLarge {
                kernel: [kh, kw],
                padded,
            });
        };

        let mut out = Array4::<F>::zeros((batch, channels, out_h, out_w));
        for (out_sample, in_sample) in out.outer_iter_mut().zip(input.outer_iter()) {
            correlate_sample(in_sample, kernel, padding, out_sample);
        }
        Ok(out)
    }

    fn avg_pool2d<F: Element>(&self, input: ArrayView4<F>) -> Array4<F> {
        const SCALE: usize = 2;
        let (batch, channels, height, width) = input.dim();
        let normalize = F::cast(1.0 / (SCALE * SCALE) as f64);

        Array4::from_shape_fn(
            (batch, channels, height / SCALE, width / SCALE),
            |(n, c, oy, ox)| {
                let mut sum = F::zero();
                for iy in 0..SCALE {
                    for ix in 0..SCALE {
                        sum = sum + input[[n, c, oy * SCALE + iy, ox * SCALE + ix]];
                    }
                }
                sum * normalize
            },
        )
    }
}

#[cfg(not(feature = "rayon"))]
fn correlate_sample<F: Element>(
    input: ArrayView3<F>,
    kernel: ArrayView4<F>,
    padding: usize,
    mut out: ArrayViewMut3<F>,
) {
    for ((out_plane, in_plane), k) in out
        .outer_iter_mut()
        .zip(input.outer_iter())
        .zip(kernel.outer_iter())
    {
        correlate_plane(in_plane, k.index_axis_move(ndarray::Axis(0), 0), padding, out_plane);
    }
}

#[cfg(feature = "rayon")]
fn correlate_sample<F: Element>(
    input: ArrayView3<F>,
    kernel: ArrayView4<F>,
    padding: usize,
    mut out: ArrayViewMut3<F>,
) {
    use ndarray::parallel::prelude::*;
    use ndarray::Axis;

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(input.axis_iter(Axis(0)).into_par_iter())
        .zip(kernel.axis_iter(Axis(0)).into_par_iter())
        .for_each(|((out_plane, in_plane), k)| {
            correlate_plane(in_plane, k.index_axis_move(Axis(0), 0), padding, out_plane);
        });
}

fn correlate_plane<F: Element>(
    input: ArrayView2<F>,
    kernel: ArrayView2<F>,
    padding: usize,
    mut out: ArrayViewMut2<F>,
) {
    let (height, width) = input.dim();
    let (kh, kw) = kernel.dim();

    for ((oy, ox), o) in out.indexed_iter_mut() {
        // Only the part of the window that overlaps the image contributes, the rest reads zeros.
        let y0 = padding.saturating_sub(oy);
        let y1 = (height + padding).saturating_sub(oy).min(kh);
        let x0 = padding.saturating_sub(ox);
        let x1 = (width + padding).saturating_sub(ox).min(kw);

        let mut acc = F::zero();
        for ky in y0..y1 {
            let row = input.row(oy + ky - padding);
            let krow = kernel.row(ky);
            for kx in x0..x1 {
                acc = acc + krow[kx] * row[ox + kx - padding];
            }
        }
        *o = acc;
    }
}
