use crate::components::{contrast_structure, luminance};
use crate::{Backend, Constants, Element, Error, LocalStatistics, Result};
use ndarray::{Array4, ArrayView4, Zip};

pub(crate) fn dims<F>(a: &ArrayView4<F>) -> [usize; 4] {
    let (n, c, h, w) = a.dim();
    [n, c, h, w]
}

/// Both images must have the exact same, non-empty shape. No broadcasting.
pub fn check_pair<F>(img1: &ArrayView4<F>, img2: &ArrayView4<F>) -> Result<[usize; 4]> {
    let (left, right) = (dims(img1), dims(img2));
    if left != right {
        return Err(Error::ShapeMismatch { left, right });
    }
    if left.contains(&0) {
        return Err(Error::EmptyImage { shape: left });
    }
    Ok(left)
}

/// Per pixel `l * cs` at a single scale.
pub fn ssim_map<F: Element, B: Backend>(
    backend: &B,
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    window: ArrayView4<F>,
    window_size: usize,
    constants: &Constants,
) -> Result<Array4<F>> {
    check_pair(&img1, &img2)?;
    let stats = LocalStatistics::compute(backend, img1, img2, window, window_size)?;
    let l = luminance(&stats, constants);
    let cs = contrast_structure(&stats, constants);
    Ok(Zip::from(&l).and(&cs).map_collect(|&l, &cs| l * cs))
}
