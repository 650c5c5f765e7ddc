//! Gnomonic (pinhole) views into equirectangular frames.

use image::RgbImage;
use pano_models::SphericalCoordinate;

use crate::collaborators::PerspectiveProjector;
use crate::error::{MediaError, MediaResult};
use crate::projection::{lat_lon_to_pixel_f64, sphere_to_lat_lon};
use crate::rotation::RotationMatrix;

/// Built-in [`PerspectiveProjector`] backed by the projection engine.
///
/// Sampling is nearest-neighbour and wraps horizontally across the seam.
#[derive(Debug, Default, Clone, Copy)]
pub struct EquirectangularView;

impl EquirectangularView {
    pub fn new() -> Self {
        Self
    }

    /// Camera-to-world rotation for a view centred on `(theta, phi)` degrees.
    fn view_rotation(theta: f64, phi: f64) -> RotationMatrix {
        let yaw = RotationMatrix::from_axis_angle([0.0, 0.0, 1.0], theta.to_radians());
        let tilt_axis = yaw.apply([0.0, 1.0, 0.0]);
        let tilt = RotationMatrix::from_axis_angle(tilt_axis, -phi.to_radians());
        tilt.mul(&yaw)
    }
}

/// `n` evenly spaced values from `-extent` to `extent`.
fn linspace_at(i: u32, n: u32, extent: f64) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    -extent + 2.0 * extent * i as f64 / (n - 1) as f64
}

impl PerspectiveProjector for EquirectangularView {
    fn pixel_to_spherical(&self, frame: &RgbImage, x: f64, y: f64) -> (f64, f64) {
        let (w, h) = frame.dimensions();
        let theta = (x / w as f64 - 0.5) * 360.0;
        let phi = (0.5 - y / h as f64) * 180.0;
        (theta, phi)
    }

    fn crop(
        &self,
        frame: &RgbImage,
        fov: f64,
        theta: f64,
        phi: f64,
        height: u32,
        width: u32,
    ) -> MediaResult<RgbImage> {
        let (src_w, src_h) = frame.dimensions();
        if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
            return Err(MediaError::invalid_dimensions(format!(
                "cannot crop {width}x{height} from {src_w}x{src_h}"
            )));
        }
        if !(fov > 0.0 && fov < 180.0) {
            return Err(MediaError::invalid_dimensions(format!(
                "field of view must be in (0, 180), got {fov}"
            )));
        }

        let w_len = (fov / 2.0).to_radians().tan();
        let h_fov = height as f64 / width as f64 * fov;
        let h_len = (h_fov / 2.0).to_radians().tan();
        let rotation = Self::view_rotation(theta, phi);
        let (rows, cols) = (src_h as usize, src_w as usize);

        Ok(RgbImage::from_fn(width, height, |u, v| {
            let ray = [1.0, linspace_at(u, width, w_len), -linspace_at(v, height, h_len)];
            let dir = sphere_to_lat_lon(rotation.apply(ray));
            let (row, col) = lat_lon_to_pixel_f64(SphericalCoordinate::new(dir.lat, dir.lon), rows, cols);
            let row = (row.round() as i64).clamp(0, rows as i64 - 1) as u32;
            let col = (col.round() as i64).rem_euclid(cols as i64) as u32;
            *frame.get_pixel(col, row)
        }))
    }
}
