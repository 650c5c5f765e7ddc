//! Affine estimation from point pairs and bilinear warping.

use image::{Rgb, RgbImage};

use crate::stabilizer::AffineTransform;

/// Least-squares affine fit of `src → dst`.
///
/// Coordinates are centred before solving, which keeps the normal
/// equations well conditioned and makes a perfect fit exact.
fn fit(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<AffineTransform> {
    let n = src.len();
    if n < 3 || n != dst.len() {
        return None;
    }
    let inv_n = 1.0 / n as f64;
    let (mut sx, mut sy, mut su, mut sv) = (0.0, 0.0, 0.0, 0.0);
    for (&(x, y), &(u, v)) in src.iter().zip(dst) {
        sx += x;
        sy += y;
        su += u;
        sv += v;
    }
    let (mx, my, mu, mv) = (sx * inv_n, sy * inv_n, su * inv_n, sv * inv_n);

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    let (mut sxu, mut syu, mut sxv, mut syv) = (0.0, 0.0, 0.0, 0.0);
    for (&(x, y), &(u, v)) in src.iter().zip(dst) {
        let (x, y, u, v) = (x - mx, y - my, u - mu, v - mv);
        sxx += x * x;
        sxy += x * y;
        syy += y * y;
        sxu += x * u;
        syu += y * u;
        sxv += x * v;
        syv += y * v;
    }

    let det = sxx * syy - sxy * sxy;
    if det.abs() <= 1e-9 * (sxx * syy).abs().max(1e-12) {
        return None;
    }
    let a = (sxu * syy - sxy * syu) / det;
    let b = (sxx * syu - sxy * sxu) / det;
    let d = (sxv * syy - sxy * syv) / det;
    let e = (sxx * syv - sxy * sxv) / det;
    let c = mu - a * mx - b * my;
    let f = mv - d * mx - e * my;

    let transform = AffineTransform::from_rows(a, b, c, d, e, f);
    transform.is_finite().then_some(transform)
}

/// Affine fit with inlier refits.
///
/// After each fit, pairs whose residual exceeds `inlier_threshold` pixels
/// are dropped and the model is refit, up to `refit_passes` times.
pub fn estimate_affine(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    inlier_threshold: f64,
    refit_passes: usize,
) -> Option<AffineTransform> {
    let mut model = fit(src, dst)?;
    let mut pairs: Vec<((f64, f64), (f64, f64))> = src.iter().copied().zip(dst.iter().copied()).collect();

    for _ in 0..refit_passes {
        let threshold_sq = inlier_threshold * inlier_threshold;
        let inliers: Vec<_> = pairs
            .iter()
            .copied()
            .filter(|&((x, y), (u, v))| {
                let (px, py) = model.apply(x, y);
                (px - u).powi(2) + (py - v).powi(2) <= threshold_sq
            })
            .collect();
        if inliers.len() == pairs.len() || inliers.len() < 3 {
            break;
        }
        let (s, d): (Vec<_>, Vec<_>) = inliers.iter().copied().unzip();
        match fit(&s, &d) {
            Some(refit) => {
                model = refit;
                pairs = inliers;
            }
            None => break,
        }
    }
    Some(model)
}

/// Warp like `cv2.warpAffine`: `dst(M · p) = src(p)`, bilinear, black border.
pub fn warp_affine(image: &RgbImage, transform: &AffineTransform) -> RgbImage {
    let Some(back) = transform.inverse() else {
        return image.clone();
    };
    let (w, h) = image.dimensions();
    RgbImage::from_fn(w, h, |x, y| sample_bilinear(image, back.apply(x as f64, y as f64)))
}

fn sample_bilinear(image: &RgbImage, (sx, sy): (f64, f64)) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    // Snap values within rounding noise of an integer.
    let snap = |v: f64| if (v - v.round()).abs() < 1e-9 { v.round() } else { v };
    let (sx, sy) = (snap(sx), snap(sy));
    let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
    let (fx, fy) = (sx - x0 as f64, sy - y0 as f64);

    let fetch = |x: i64, y: i64| -> [f64; 3] {
        if x < 0 || y < 0 || x >= w || y >= h {
            return [0.0; 3];
        }
        let p = image.get_pixel(x as u32, y as u32);
        [p[0] as f64, p[1] as f64, p[2] as f64]
    };

    let mut out = [0u8; 3];
    let (p00, p10, p01, p11) = (fetch(x0, y0), fetch(x0 + 1, y0), fetch(x0, y0 + 1), fetch(x0 + 1, y0 + 1));
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<(f64, f64)> {
        (0..5).flat_map(|i| (0..4).map(move |j| (i as f64 * 17.0, j as f64 * 11.0 + i as f64))).collect()
    }

    #[test]
    fn test_fit_recovers_identity_exactly() {
        let pts = grid_points();
        let model = estimate_affine(&pts, &pts, 3.0, 2).unwrap();
        assert!(model.approx_eq(&AffineTransform::identity(), 1e-9));
    }

    #[test]
    fn test_fit_recovers_known_transform() {
        let truth = AffineTransform::from_rows(0.98, -0.05, 4.0, 0.04, 1.02, -3.0);
        let src = grid_points();
        let dst: Vec<_> = src.iter().map(|&(x, y)| truth.apply(x, y)).collect();
        let model = estimate_affine(&src, &dst, 3.0, 2).unwrap();
        assert!(model.approx_eq(&truth, 1e-6));
    }

    #[test]
    fn test_refit_ignores_outlier() {
        let truth = AffineTransform::translation(2.0, -1.0);
        let src = grid_points();
        let mut dst: Vec<_> = src.iter().map(|&(x, y)| truth.apply(x, y)).collect();
        dst[7].0 += 40.0;
        let model = estimate_affine(&src, &dst, 3.0, 3).unwrap();
        assert!(model.approx_eq(&truth, 1e-6));
    }

    #[test]
    fn test_degenerate_input_fails() {
        let collinear = vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert!(estimate_affine(&collinear, &collinear, 3.0, 2).is_none());
        let two = vec![(0.0, 0.0), (5.0, 1.0)];
        assert!(estimate_affine(&two, &two, 3.0, 2).is_none());
    }

    #[test]
    fn test_warp_translation() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 0]));
        let shifted = warp_affine(&image, &AffineTransform::translation(2.0, 0.0));
        assert_eq!(*shifted.get_pixel(5, 3), *image.get_pixel(3, 3));
        assert_eq!(*shifted.get_pixel(0, 3), Rgb([0, 0, 0]));
        assert_eq!(warp_affine(&image, &AffineTransform::identity()), image);
    }
}
