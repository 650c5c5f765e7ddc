//! Pure-Rust motion estimation, used when OpenCV is not compiled in.

mod affine;
mod features;
mod flow;

use image::{GrayImage, RgbImage};

use affine::{estimate_affine, warp_affine};
use features::good_features_to_track;
use flow::track_points;

use super::AffineTransform;
use crate::config::StabilizerConfig;
use crate::error::MediaResult;

/// Motion `prev → curr` and the number of points tracked into `curr`.
pub(super) fn estimate_motion(
    prev: &GrayImage,
    curr: &GrayImage,
    config: &StabilizerConfig,
) -> MediaResult<(Option<AffineTransform>, usize)> {
    let corners = good_features_to_track(prev, &config.corners);
    let points: Vec<(f32, f32)> = corners.iter().map(|c| (c.x, c.y)).collect();
    let tracked = track_points(prev, curr, &points, &config.flow);

    let (src, dst): (Vec<(f64, f64)>, Vec<(f64, f64)>) = points
        .iter()
        .zip(&tracked)
        .filter_map(|(&(x, y), t)| t.map(|(u, v)| ((x as f64, y as f64), (u as f64, v as f64))))
        .unzip();
    let count = src.len();
    let model = estimate_affine(&src, &dst, config.inlier_threshold, config.refit_passes);
    Ok((model, count))
}

/// `dst(M · p) = src(p)`, bilinear, black border.
pub(super) fn warp(image: &RgbImage, transform: &AffineTransform) -> MediaResult<RgbImage> {
    Ok(warp_affine(image, transform))
}
