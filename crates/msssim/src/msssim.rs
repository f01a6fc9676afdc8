use crate::components::{contrast_structure, luminance, similarity_components};
use crate::ssim::check_pair;
use crate::{Backend, Constants, Element, Error, LocalStatistics, Result};
use ndarray::{Array4, ArrayView4, Zip};
use tracing::{trace, warn};

/// Image shape at every resolution the multi-scale metric visits: the full resolution followed by
/// `scales - 2` halvings.
pub fn pyramid_shapes(shape: [usize; 4], scales: usize) -> Vec<[usize; 4]> {
    let [n, c, mut h, mut w] = shape;
    let levels = scales.saturating_sub(1).max(1);
    let mut shapes = Vec::with_capacity(levels);
    for _ in 0..levels {
        shapes.push([n, c, h, w]);
        h /= 2;
        w /= 2;
    }
    shapes
}

/// Fail if pooling empties the images, warn when a level is smaller than the window.
///
/// Levels smaller than the window are still computed: the zero padding then dominates the local
/// statistics and the score degrades, but stays finite.
pub fn check_pyramid(shape: [usize; 4], scales: usize, window_size: usize) -> Result<()> {
    for (scale, [_, _, height, width]) in pyramid_shapes(shape, scales).into_iter().enumerate() {
        if height == 0 || width == 0 {
            return Err(Error::DegenerateResolution {
                scale,
                height,
                width,
            });
        }
        if height < window_size || width < window_size {
            warn!(
                scale,
                height, width, window_size, "Resolution is smaller than the window"
            );
        }
    }
    Ok(())
}

fn dims<F>(a: &Array4<F>) -> [usize; 4] {
    let (n, c, h, w) = a.dim();
    [n, c, h, w]
}

/// Multiply `current` into `acc` in place, refusing to broadcast.
fn accumulate<F: Element>(acc: &mut Array4<F>, current: &Array4<F>, scale: usize) -> Result<()> {
    if acc.dim() != current.dim() {
        return Err(Error::ScaleShapeMismatch {
            scale,
            accumulated: dims(acc),
            current: dims(current),
        });
    }
    Zip::from(acc).and(current).for_each(|a, &c| *a = *a * c);
    Ok(())
}

/// Multi-scale similarity map at the coarsest resolution.
///
/// The contrast-structure map of the full resolution is pooled along with the images, and the
/// contrast-structure of every following level is multiplied into it, so each level carries the
/// product of all finer ones. The last level adds its own contrast-structure and luminance.
pub fn ms_ssim_map<F: Element, B: Backend>(
    backend: &B,
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    window: ArrayView4<F>,
    window_size: usize,
    constants: &Constants,
    scales: usize,
) -> Result<Array4<F>> {
    let shape = check_pair(&img1, &img2)?;
    if scales < 2 {
        return Err(Error::InvalidScales(scales));
    }
    check_pyramid(shape, scales, window_size)?;

    let stats = LocalStatistics::compute(backend, img1, img2, window, window_size)?;
    let mut cs_acc = similarity_components(&stats, constants, false).contrast_structure;
    trace!(scale = 0, ?shape, "contrast-structure");

    let mut pooled: Option<(Array4<F>, Array4<F>)> = None;
    for scale in 1..scales - 1 {
        let (src1, src2) = match &pooled {
            Some((p1, p2)) => (p1.view(), p2.view()),
            None => (img1.view(), img2.view()),
        };
        let p1 = backend.avg_pool2d(src1);
        let p2 = backend.avg_pool2d(src2);
        cs_acc = backend.avg_pool2d(cs_acc.view());

        let stats = LocalStatistics::compute(backend, p1.view(), p2.view(), window, window_size)?;
        let cs = similarity_components(&stats, constants, false).contrast_structure;
        accumulate(&mut cs_acc, &cs, scale)?;
        trace!(scale, shape = ?p1.dim(), "contrast-structure");

        pooled = Some((p1, p2));
    }

    let (last1, last2) = match &pooled {
        Some((p1, p2)) => (p1.view(), p2.view()),
        None => (img1.view(), img2.view()),
    };
    let stats = LocalStatistics::compute(backend, last1, last2, window, window_size)?;
    let l = luminance(&stats, constants);
    let mut cs_new = contrast_structure(&stats, constants);
    Zip::from(&mut cs_new).and(&l).for_each(|cs, &l| *cs = *cs * l);
    accumulate(&mut cs_acc, &cs_new, scales - 1)?;
    trace!(scale = scales - 1, shape = ?last1.dim(), "luminance");

    Ok(cs_acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{create_window, DEFAULT_SIGMA};
    use crate::Cpu;

    fn pattern(shape: (usize, usize, usize, usize)) -> Array4<f64> {
        Array4::from_shape_fn(shape, |(n, c, y, x)| {
            (((n + 1) * (c + 2) * (3 * y + x * x)) % 17) as f64 / 16.0
        })
    }

    #[test]
    fn pyramid() {
        assert_eq!(
            pyramid_shapes([1, 3, 32, 32], 3),
            vec![[1, 3, 32, 32], [1, 3, 16, 16]]
        );
        assert_eq!(
            pyramid_shapes([2, 1, 100, 75], 5),
            vec![[2, 1, 100, 75], [2, 1, 50, 37], [2, 1, 25, 18], [2, 1, 12, 9]]
        );
        assert_eq!(pyramid_shapes([1, 1, 8, 8], 2), vec![[1, 1, 8, 8]]);
    }

    #[test]
    fn pooling_to_nothing_fails() {
        assert_eq!(
            check_pyramid([1, 1, 8, 8], 6, 3),
            Err(Error::DegenerateResolution {
                scale: 4,
                height: 0,
                width: 0
            })
        );
        // Below the window is tolerated.
        assert_eq!(check_pyramid([1, 1, 8, 8], 5, 11), Ok(()));
    }

    #[test]
    fn two_scales_is_single_resolution() -> Result<()> {
        // With two scales nothing is pooled: S = cs * cs * l at full resolution.
        let img1 = pattern((1, 2, 12, 12));
        let img2 = img1.mapv(|v| v * 0.9);
        let window = create_window::<f64>(5, 2, DEFAULT_SIGMA);
        let c = Constants::default();
        let map = ms_ssim_map(&Cpu, img1.view(), img2.view(), window.view(), 5, &c, 2)?;
        let stats = LocalStatistics::compute(&Cpu, img1.view(), img2.view(), window.view(), 5)?;
        let l = luminance(&stats, &c);
        let cs = contrast_structure(&stats, &c);
        let expected = &cs * &cs * &l;
        assert_eq!(map.dim(), (1, 2, 12, 12));
        Zip::from(&map)
            .and(&expected)
            .for_each(|&a, &b| assert!((a - b).abs() < 1e-12));
        Ok(())
    }

    #[test]
    fn accumulated_map_is_pooled() -> Result<()> {
        // Three scales: S = pool(cs0) * cs1 * cs1 * l1
        let img1 = pattern((1, 1, 16, 16));
        let img2 = img1.mapv(|v| 1.0 - v * 0.5);
        let window = create_window::<f64>(3, 1, DEFAULT_SIGMA);
        let c = Constants::default();
        let map = ms_ssim_map(&Cpu, img1.view(), img2.view(), window.view(), 3, &c, 3)?;

        let s0 = LocalStatistics::compute(&Cpu, img1.view(), img2.view(), window.view(), 3)?;
        let cs0 = Cpu.avg_pool2d(contrast_structure(&s0, &c).view());
        let p1 = Cpu.avg_pool2d(img1.view());
        let p2 = Cpu.avg_pool2d(img2.view());
        let s1 = LocalStatistics::compute(&Cpu, p1.view(), p2.view(), window.view(), 3)?;
        let cs1 = contrast_structure(&s1, &c);
        let l1 = luminance(&s1, &c);
        let expected = &cs0 * &cs1 * &cs1 * &l1;

        assert_eq!(map.dim(), (1, 1, 8, 8));
        Zip::from(&map)
            .and(&expected)
            .for_each(|&a, &b| assert!((a - b).abs() < 1e-12));
        Ok(())
    }

    #[test]
    fn pools_from_previous_level() -> Result<()> {
        // Four scales pool twice, the second time from the already pooled images.
        let img = pattern((1, 2, 32, 32));
        let window = create_window::<f64>(3, 2, DEFAULT_SIGMA);
        let c = Constants::default();
        let map = ms_ssim_map(&Cpu, img.view(), img.view(), window.view(), 3, &c, 4)?;
        assert_eq!(map.dim(), (1, 2, 8, 8));
        assert!(map.iter().all(|&v| (v - 1.0).abs() < 1e-12));

        let other = img.mapv(|v| v * 0.5 + 0.25);
        let three = ms_ssim_map(&Cpu, img.view(), other.view(), window.view(), 3, &c, 3)?;
        let four = ms_ssim_map(&Cpu, img.view(), other.view(), window.view(), 3, &c, 4)?;
        assert_eq!(three.dim(), (1, 2, 16, 16));
        assert_eq!(four.dim(), (1, 2, 8, 8));
        Ok(())
    }

    #[test]
    fn even_window_cannot_accumulate() {
        let img = pattern((1, 1, 32, 32));
        let window = create_window::<f64>(4, 1, DEFAULT_SIGMA);
        let res = ms_ssim_map(
            &Cpu,
            img.view(),
            img.view(),
            window.view(),
            4,
            &Constants::default(),
            3,
        );
        assert_eq!(
            res,
            Err(Error::ScaleShapeMismatch {
                scale: 1,
                accumulated: [1, 1, 16, 16],
                current: [1, 1, 17, 17]
            })
        );
    }

    #[test]
    fn rejects_single_scale() {
        let img = pattern((1, 1, 8, 8));
        let window = create_window::<f64>(3, 1, DEFAULT_SIGMA);
        let res = ms_ssim_map(
            &Cpu,
            img.view(),
            img.view(),
            window.view(),
            3,
            &Constants::default(),
            1,
        );
        assert_eq!(res, Err(Error::InvalidScales(1)));
    }
}
