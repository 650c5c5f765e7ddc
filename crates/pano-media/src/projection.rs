//! Spherical projection engine.
//!
//! Closed-form conversions between equirectangular pixels, latitude and
//! longitude, and unit vectors on the sphere.
//!
//! Conventions: row 0 is the north pole (`lat = π/2`), the centre column is
//! `lon = 0`, longitude grows to the right and `z` points up.
//!
//! # Usage
//!
//! ```
//! use pano_media::projection::{lat_lon_to_pixel, pixel_to_lat_lon};
//!
//! let coord = pixel_to_lat_lon(17, 300, 256, 512);
//! assert_eq!(lat_lon_to_pixel(coord, 256, 512), (17, 300));
//! ```

use pano_models::SphericalCoordinate;
use std::f64::consts::{FRAC_PI_2, PI};

/// Added before truncation so values that are integral up to rounding noise
/// land on the intended pixel.
const PIXEL_EPSILON: f64 = 1e-6;

/// Centre of the sphere direction for pixel `(row, col)`.
pub fn pixel_to_lat_lon(row: usize, col: usize, height: usize, width: usize) -> SphericalCoordinate {
    let lat = (0.5 - row as f64 / height as f64) * PI;
    let lon = (col as f64 / width as f64 - 0.5) * 2.0 * PI;
    SphericalCoordinate::new(lat, lon)
}

/// Unit vector for a latitude/longitude pair.
pub fn lat_lon_to_sphere(coord: SphericalCoordinate) -> [f64; 3] {
    let (sin_lat, cos_lat) = coord.lat.sin_cos();
    let (sin_lon, cos_lon) = coord.lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

/// Latitude/longitude of a (not necessarily normalised) direction.
pub fn sphere_to_lat_lon(xyz: [f64; 3]) -> SphericalCoordinate {
    let norm = (xyz[0] * xyz[0] + xyz[1] * xyz[1] + xyz[2] * xyz[2]).sqrt();
    let z = if norm > 0.0 { xyz[2] / norm } else { 0.0 };
    let lat = FRAC_PI_2 - z.clamp(-1.0, 1.0).acos();
    let lon = xyz[1].atan2(xyz[0]);
    SphericalCoordinate::new(lat, lon)
}

/// Fractional `(row, col)` of a direction, wrapped into `[0, h) x [0, w)`.
pub fn lat_lon_to_pixel_f64(coord: SphericalCoordinate, height: usize, width: usize) -> (f64, f64) {
    let row = height as f64 * (0.5 - coord.lat / PI);
    let col = width as f64 * (0.5 + coord.lon / (2.0 * PI));
    (row.rem_euclid(height as f64), col.rem_euclid(width as f64))
}

/// Integer `(row, col)` of a direction, truncated and wrapped.
pub fn lat_lon_to_pixel(coord: SphericalCoordinate, height: usize, width: usize) -> (usize, usize) {
    let row = height as f64 * (0.5 - coord.lat / PI);
    let col = width as f64 * (0.5 + coord.lon / (2.0 * PI));
    (wrap_index(row, height), wrap_index(col, width))
}

fn wrap_index(value: f64, size: usize) -> usize {
    let truncated = (value + PIXEL_EPSILON).floor() as i64;
    truncated.rem_euclid(size as i64) as usize
}
