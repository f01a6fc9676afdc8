use crate::{Backend, Element, Result};
use ndarray::{Array4, ArrayView4, Zip};

/// Windowed first and second order moments of an image pair.
///
/// All maps have the shape of the padded convolution output, which is the input shape for odd
/// window sizes.
#[derive(Debug, Clone)]
pub struct LocalStatistics<F> {
    pub mu1: Array4<F>,
    pub mu2: Array4<F>,
    /// Local variance of the first image, `E[x²] - E[x]²`
    pub sigma1_sq: Array4<F>,
    /// Local variance of the second image, `E[y²] - E[y]²`
    pub sigma2_sq: Array4<F>,
    /// Local covariance, `E[xy] - E[x]E[y]`
    pub sigma12: Array4<F>,
}

impl<F: Element> LocalStatistics<F> {
    /// `window` must be laid out `(channels, 1, window_size, window_size)`. Zero padding of
    /// `window_size / 2` is applied on every side.
    pub fn compute<B: Backend>(
        backend: &B,
        img1: ArrayView4<F>,
        img2: ArrayView4<F>,
        window: ArrayView4<F>,
        window_size: usize,
    ) -> Result<Self> {
        let padding = window_size / 2;
        let conv = |input: ArrayView4<F>| backend.conv2d_depthwise(input, window, padding);

        let mu1 = conv(img1)?;
        let mu2 = conv(img2)?;

        let mut sigma1_sq = conv((&img1 * &img1).view())?;
        let mut sigma2_sq = conv((&img2 * &img2).view())?;
        let mut sigma12 = conv((&img1 * &img2).view())?;

        Zip::from(&mut sigma1_sq)
            .and(&mut sigma2_sq)
            .and(&mut sigma12)
            .and(&mu1)
            .and(&mu2)
            .for_each(|s11, s22, s12, &m1, &m2| {
                *s11 = *s11 - m1 * m1;
                *s22 = *s22 - m2 * m2;
                *s12 = *s12 - m1 * m2;
            });

        Ok(Self {
            mu1,
            mu2,
            sigma1_sq,
            sigma2_sq,
            sigma12,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        let (n, c, h, w) = self.mu1.dim();
        [n, c, h, w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{create_window, DEFAULT_SIGMA};
    use crate::Cpu;

    #[test]
    fn constant_images() -> Result<()> {
        let img1 = Array4::from_elem((1, 1, 9, 9), 0.25f64);
        let img2 = Array4::from_elem((1, 1, 9, 9), 0.75f64);
        let window = create_window::<f64>(3, 1, DEFAULT_SIGMA);
        let stats = LocalStatistics::compute(&Cpu, img1.view(), img2.view(), window.view(), 3)?;
        assert_eq!(stats.shape(), [1, 1, 9, 9]);
        // Away from the zero padded border, a constant image has no variance.
        assert!((stats.mu1[[0, 0, 4, 4]] - 0.25).abs() < 1e-12);
        assert!((stats.mu2[[0, 0, 4, 4]] - 0.75).abs() < 1e-12);
        assert!(stats.sigma1_sq[[0, 0, 4, 4]].abs() < 1e-12);
        assert!(stats.sigma2_sq[[0, 0, 4, 4]].abs() < 1e-12);
        assert!(stats.sigma12[[0, 0, 4, 4]].abs() < 1e-12);
        // At the corner the padding pulls the mean down and creates spurious variance.
        assert!(stats.mu1[[0, 0, 0, 0]] < 0.25);
        assert!(stats.sigma1_sq[[0, 0, 0, 0]] > 0.0);
        Ok(())
    }

    #[test]
    fn identical_images_share_moments() -> Result<()> {
        let img = Array4::from_shape_fn((2, 2, 6, 6), |(n, c, y, x)| {
            ((n + 2 * c + 3 * y + 5 * x) % 7) as f64 / 7.0
        });
        let window = create_window::<f64>(5, 2, DEFAULT_SIGMA);
        let stats = LocalStatistics::compute(&Cpu, img.view(), img.view(), window.view(), 5)?;
        assert_eq!(stats.mu1, stats.mu2);
        Zip::from(&stats.sigma1_sq)
            .and(&stats.sigma2_sq)
            .and(&stats.sigma12)
            .for_each(|&a, &b, &c| {
                assert_eq!(a, b);
                assert!((a - c).abs() < 1e-12);
                // Second moment minus squared mean is never meaningfully negative.
                assert!(a > -1e-12);
            });
        Ok(())
    }

    #[test]
    fn anti_correlated_images() -> Result<()> {
        let img1 = Array4::from_shape_fn((1, 1, 8, 8), |(_, _, y, x)| ((x + y) % 2) as f64);
        let img2 = img1.mapv(|v| 1.0 - v);
        let window = create_window::<f64>(3, 1, DEFAULT_SIGMA);
        let stats = LocalStatistics::compute(&Cpu, img1.view(), img2.view(), window.view(), 3)?;
        assert!(stats.sigma12[[0, 0, 4, 4]] < 0.0);
        Ok(())
    }
}
