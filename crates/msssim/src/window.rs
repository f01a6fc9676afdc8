use crate::Element;
use ndarray::{Array1, Array4, Axis};

/// Standard deviation of the Gaussian window used by the metrics.
pub const DEFAULT_SIGMA: f64 = 1.5;

/// Sampled 1D Gaussian of length `window_size`, centered on `window_size / 2` and normalized to
/// sum to 1.
///
/// With an even size the center is the right one of the two middle taps.
pub fn gaussian(window_size: usize, sigma: f64) -> Array1<f64> {
    let center = (window_size / 2) as f64;
    let denom = 2.0 * sigma * sigma;
    let gauss = Array1::from_shape_fn(window_size, |x| {
        let d = x as f64 - center;
        (-(d * d) / denom).exp()
    });
    let sum = gauss.sum();
    gauss / sum
}

/// Build the `(channel, 1, window_size, window_size)` depthwise kernel, the outer product of
/// [gaussian] with itself repeated for every channel.
pub fn create_window<F: Element>(window_size: usize, channel: usize, sigma: f64) -> Array4<F> {
    debug_assert!(window_size > 0 && channel > 0);
    let g = gaussian(window_size, sigma);
    let g2 = g
        .view()
        .insert_axis(Axis(1))
        .dot(&g.view().insert_axis(Axis(0)));
    Array4::from_shape_fn(
        (channel, 1, window_size, window_size),
        |(_, _, y, x)| F::cast(g2[[y, x]]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn gaussian_is_normalized_and_centered() {
        let g = gaussian(11, DEFAULT_SIGMA);
        assert!((g.sum() - 1.0).abs() < 1e-12);
        let peak = g
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(5));
        for i in 0..5 {
            assert!((g[i] - g[10 - i]).abs() < 1e-15);
        }
    }

    #[test]
    fn known_values() {
        // exp(-1 / 4.5) relative to the center tap
        let g = gaussian(3, DEFAULT_SIGMA);
        let side = (-1.0f64 / 4.5).exp();
        let sum = 1.0 + 2.0 * side;
        assert!((g[1] - 1.0 / sum).abs() < 1e-12);
        assert!((g[0] - side / sum).abs() < 1e-12);
    }

    #[test]
    fn every_channel_sums_to_one() {
        for size in 1..=12 {
            let w = create_window::<f32>(size, 3, DEFAULT_SIGMA);
            assert_eq!(w.dim(), (3, 1, size, size));
            for c in 0..3 {
                let sum: f32 = w.slice(s![c, 0, .., ..]).sum();
                assert!((sum - 1.0).abs() < 1e-5, "size {size} channel {c}: {sum}");
            }
        }
    }

    #[test]
    fn separable_and_identical_channels() {
        let g = gaussian(7, DEFAULT_SIGMA);
        let w = create_window::<f64>(7, 2, DEFAULT_SIGMA);
        for y in 0..7 {
            for x in 0..7 {
                assert!((w[[0, 0, y, x]] - g[y] * g[x]).abs() < 1e-15);
                assert_eq!(w[[0, 0, y, x]], w[[1, 0, y, x]]);
            }
        }
    }

    #[test]
    fn single_tap_window() {
        let w = create_window::<f64>(1, 1, DEFAULT_SIGMA);
        assert_eq!(w[[0, 0, 0, 0]], 1.0);
    }
}
