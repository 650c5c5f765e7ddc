//! OpenCV motion estimation: `goodFeaturesToTrack`, pyramidal
//! `calcOpticalFlowPyrLK`, RANSAC `estimateAffine2D` and `warpAffine`.

use image::{GrayImage, RgbImage};
use opencv::calib3d;
use opencv::core::{self, Mat, Point2f, Scalar, Size, TermCriteria, TermCriteria_Type, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::video;

use super::AffineTransform;
use crate::config::StabilizerConfig;
use crate::error::{MediaError, MediaResult};

/// An affine model needs three correspondences.
const MIN_CORRESPONDENCES: usize = 3;
const RANSAC_MAX_ITERS: usize = 2000;
const RANSAC_CONFIDENCE: f64 = 0.99;
/// Harris `k`; unused by the Shi–Tomasi score but required by the call.
const HARRIS_K: f64 = 0.04;

/// Copy an interleaved 8-bit buffer into a new `Mat` of type `typ`.
fn mat_from_bytes(width: u32, height: u32, typ: i32, data: &[u8]) -> MediaResult<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    let bytes = mat.data_bytes_mut()?;
    if bytes.len() != data.len() {
        return Err(MediaError::invalid_dimensions(format!(
            "{width}x{height} buffer of {} bytes, Mat holds {}",
            data.len(),
            bytes.len()
        )));
    }
    bytes.copy_from_slice(data);
    Ok(mat)
}

/// Motion `prev → curr` and the number of points tracked into `curr`.
pub(super) fn estimate_motion(
    prev: &GrayImage,
    curr: &GrayImage,
    config: &StabilizerConfig,
) -> MediaResult<(Option<AffineTransform>, usize)> {
    let prev_mat = mat_from_bytes(prev.width(), prev.height(), core::CV_8UC1, prev.as_raw())?;
    let curr_mat = mat_from_bytes(curr.width(), curr.height(), core::CV_8UC1, curr.as_raw())?;

    let corners_config = &config.corners;
    let mut corners = Vector::<Point2f>::new();
    imgproc::good_features_to_track(
        &prev_mat,
        &mut corners,
        corners_config.max_corners as i32,
        corners_config.quality_level as f64,
        corners_config.min_distance as f64,
        &core::no_array(),
        corners_config.block_size as i32,
        false,
        HARRIS_K,
    )?;
    if corners.len() < MIN_CORRESPONDENCES {
        return Ok((None, 0));
    }

    let flow = &config.flow;
    let criteria = TermCriteria::new(
        TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
        flow.max_iterations as i32,
        flow.epsilon as f64,
    )?;
    let window = flow.window_size as i32;
    let mut next = Vector::<Point2f>::new();
    let mut status = Vector::<u8>::new();
    let mut errors = Vector::<f32>::new();
    video::calc_optical_flow_pyr_lk(
        &prev_mat,
        &curr_mat,
        &corners,
        &mut next,
        &mut status,
        &mut errors,
        Size::new(window, window),
        flow.max_level as i32,
        criteria,
        0,
        flow.min_eigen_threshold as f64,
    )?;

    let pairs: Vec<(Point2f, Point2f)> = corners
        .iter()
        .zip(next.iter())
        .zip(status.iter())
        .filter(|(_, ok)| *ok == 1)
        .map(|(pair, _)| pair)
        .collect();
    let tracked = pairs.len();
    if tracked < MIN_CORRESPONDENCES {
        return Ok((None, tracked));
    }

    let src: Vector<Point2f> = pairs.iter().map(|(p, _)| *p).collect();
    let dst: Vector<Point2f> = pairs.iter().map(|(_, q)| *q).collect();
    let mut inliers = Mat::default();
    let model = calib3d::estimate_affine_2d(
        &src,
        &dst,
        &mut inliers,
        calib3d::RANSAC,
        config.inlier_threshold,
        RANSAC_MAX_ITERS,
        RANSAC_CONFIDENCE,
        config.refit_passes,
    )?;
    if model.empty() {
        return Ok((None, tracked));
    }

    let transform = AffineTransform::from_rows(
        *model.at_2d::<f64>(0, 0)?,
        *model.at_2d::<f64>(0, 1)?,
        *model.at_2d::<f64>(0, 2)?,
        *model.at_2d::<f64>(1, 0)?,
        *model.at_2d::<f64>(1, 1)?,
        *model.at_2d::<f64>(1, 2)?,
    );
    Ok((transform.is_finite().then_some(transform), tracked))
}

/// `dst(M · p) = src(p)`, bilinear, black border.
pub(super) fn warp(image: &RgbImage, transform: &AffineTransform) -> MediaResult<RgbImage> {
    let (width, height) = image.dimensions();
    let src = mat_from_bytes(width, height, core::CV_8UC3, image.as_raw())?;

    let mut matrix = Mat::new_rows_cols_with_default(2, 3, core::CV_64F, Scalar::all(0.0))?;
    for (r, row) in transform.0.iter().take(2).enumerate() {
        for (c, value) in row.iter().enumerate() {
            *matrix.at_2d_mut::<f64>(r as i32, c as i32)? = *value;
        }
    }

    let mut dst = Mat::default();
    imgproc::warp_affine(
        &src,
        &mut dst,
        &matrix,
        Size::new(width as i32, height as i32),
        imgproc::INTER_LINEAR,
        core::BORDER_CONSTANT,
        Scalar::default(),
    )?;
    RgbImage::from_raw(width, height, dst.data_bytes()?.to_vec())
        .ok_or_else(|| MediaError::internal("warped frame has unexpected size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn checker(width: u32, height: u32, dx: i64, dy: i64) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as i64 - dx, y as i64 - dy);
            let on = (x.div_euclid(24) + y.div_euclid(24)) % 2 == 0;
            Luma([if on { 220 } else { 30 }])
        })
    }

    #[test]
    fn test_translation_is_recovered() {
        let prev = checker(160, 128, 0, 0);
        let curr = checker(160, 128, 3, 2);
        let (model, tracked) = estimate_motion(&prev, &curr, &StabilizerConfig::default()).unwrap();
        let model = model.unwrap();

        assert!(tracked >= MIN_CORRESPONDENCES);
        let [[a, b, c], [d, e, f], _] = model.0;
        assert!((a - 1.0).abs() < 0.02 && b.abs() < 0.02, "{model:?}");
        assert!(d.abs() < 0.02 && (e - 1.0).abs() < 0.02, "{model:?}");
        assert!((c - 3.0).abs() < 0.25 && (f - 2.0).abs() < 0.25, "{model:?}");
    }

    #[test]
    fn test_flat_frames_have_no_model() {
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        let (model, tracked) = estimate_motion(&flat, &flat, &StabilizerConfig::default()).unwrap();
        assert!(model.is_none());
        assert_eq!(tracked, 0);
    }

    #[test]
    fn test_warp_translation() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 0]));
        let shifted = warp(&image, &AffineTransform::translation(2.0, 0.0)).unwrap();
        assert_eq!(*shifted.get_pixel(5, 3), *image.get_pixel(3, 3));
        assert_eq!(*shifted.get_pixel(0, 3), Rgb([0, 0, 0]));
    }
}
