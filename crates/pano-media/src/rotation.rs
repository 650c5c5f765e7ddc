//! Rotation engine for equirectangular frames.
//!
//! A rotation is baked into a dense backward-mapping table once per
//! `(height, width, RotationSpec)`; every later [`EquirectRotator::rotate`]
//! is a nearest-neighbour gather through that table.
//!
//! # Usage
//!
//! ```no_run
//! use image::RgbImage;
//! use pano_media::rotation::EquirectRotator;
//! use pano_models::RotationSpec;
//!
//! let mut rotator = EquirectRotator::new(960, 1920, RotationSpec::yaw(90.0))?;
//! let frame = RgbImage::new(1920, 960);
//! let rotated = rotator.rotate(&frame)?;
//! rotator.set_inverse(true)?;
//! let restored = rotator.rotate(&rotated)?;
//! # Ok::<(), pano_media::MediaError>(())
//! ```

use image::{ImageBuffer, Pixel};
use ndarray::Array2;
use pano_models::RotationSpec;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::projection::{
    lat_lon_to_pixel, lat_lon_to_pixel_f64, lat_lon_to_sphere, pixel_to_lat_lon, sphere_to_lat_lon,
};

/// A 3×3 rotation matrix acting on column vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMatrix(pub [[f64; 3]; 3]);

impl RotationMatrix {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// `Rz(yaw) · Ry(pitch) · Rx(roll)`.
    pub fn from_spec(spec: &RotationSpec) -> Self {
        let (yaw, pitch, roll) = spec.to_radians();
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let (sr, cr) = roll.sin_cos();

        let rz = Self([[cy, -sy, 0.0], [sy, cy, 0.0], [0.0, 0.0, 1.0]]);
        let ry = Self([[cp, 0.0, sp], [0.0, 1.0, 0.0], [-sp, 0.0, cp]]);
        let rx = Self([[1.0, 0.0, 0.0], [0.0, cr, -sr], [0.0, sr, cr]]);
        rz.mul(&ry).mul(&rx)
    }

    /// Rotation by `angle` radians about the unit `axis` (Rodrigues).
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let [x, y, z] = axis;
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        Self([
            [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
            [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
            [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
        ])
    }

    pub fn mul(&self, other: &RotationMatrix) -> RotationMatrix {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        RotationMatrix(out)
    }

    pub fn transpose(&self) -> RotationMatrix {
        let m = &self.0;
        RotationMatrix([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// `M · v`.
    pub fn apply(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }
}

/// Dense destination → source table for one rotation.
#[derive(Debug, Clone)]
pub struct ProjectionMapping {
    height: usize,
    width: usize,
    /// Flat source index `row * width + col` for every destination pixel.
    table: Array2<u32>,
}

impl ProjectionMapping {
    /// Build the table for `rotation`, one destination row per rayon task.
    pub fn build(height: usize, width: usize, rotation: &RotationMatrix) -> MediaResult<Self> {
        let rows: Vec<Vec<u32>> = (0..height)
            .into_par_iter()
            .map(|row| {
                (0..width)
                    .map(|col| {
                        let dst = lat_lon_to_sphere(pixel_to_lat_lon(row, col, height, width));
                        let src = sphere_to_lat_lon(rotation.apply(dst));
                        let (src_row, src_col) = lat_lon_to_pixel(src, height, width);
                        (src_row * width + src_col) as u32
                    })
                    .collect()
            })
            .collect();

        let flat: Vec<u32> = rows.into_iter().flatten().collect();
        let table = Array2::from_shape_vec((height, width), flat)
            .map_err(|e| MediaError::internal(format!("mapping table shape: {e}")))?;
        Ok(Self {
            height,
            width,
            table,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Source `(row, col)` for destination `(row, col)`.
    pub fn source_of(&self, row: usize, col: usize) -> (usize, usize) {
        let flat = self.table[[row, col]] as usize;
        (flat / self.width, flat % self.width)
    }

    /// True when every destination pixel samples itself.
    pub fn is_identity(&self) -> bool {
        self.table
            .indexed_iter()
            .all(|((row, col), &flat)| flat as usize == row * self.width + col)
    }
}

/// Rotates equirectangular images of a fixed size.
#[derive(Debug, Clone)]
pub struct EquirectRotator {
    spec: RotationSpec,
    rotation: RotationMatrix,
    mapping: ProjectionMapping,
    inverted: bool,
}

impl EquirectRotator {
    /// Build the rotator and its table. Requires `width == 2 * height`.
    pub fn new(height: usize, width: usize, spec: RotationSpec) -> MediaResult<Self> {
        validate_equirect(height, width)?;
        let rotation = RotationMatrix::from_spec(&spec);
        let mapping = ProjectionMapping::build(height, width, &rotation)?;
        debug!(height, width, rotation = %spec, "Built rotation mapping");
        Ok(Self {
            spec,
            rotation,
            mapping,
            inverted: false,
        })
    }

    pub fn spec(&self) -> &RotationSpec {
        &self.spec
    }

    pub fn mapping(&self) -> &ProjectionMapping {
        &self.mapping
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Switch to the inverse rotation and rebuild the table.
    ///
    /// Only `true` has an effect; passing `false` leaves the rotator as is.
    pub fn set_inverse(&mut self, inverse: bool) -> MediaResult<()> {
        if !inverse {
            return Ok(());
        }
        self.rotation = self.rotation.transpose();
        self.mapping =
            ProjectionMapping::build(self.mapping.height, self.mapping.width, &self.rotation)?;
        self.inverted = !self.inverted;
        debug!(inverted = self.inverted, "Rebuilt rotation mapping");
        Ok(())
    }

    /// Gather `image` through the cached table.
    pub fn rotate<P>(&self, image: &ImageBuffer<P, Vec<P::Subpixel>>) -> MediaResult<ImageBuffer<P, Vec<P::Subpixel>>>
    where
        P: Pixel + 'static,
    {
        let (w, h) = image.dimensions();
        if w as usize != self.mapping.width || h as usize != self.mapping.height {
            return Err(MediaError::invalid_dimensions(format!(
                "image is {w}x{h}, mapping expects {}x{}",
                self.mapping.width, self.mapping.height
            )));
        }
        Ok(ImageBuffer::from_fn(w, h, |x, y| {
            let (src_row, src_col) = self.mapping.source_of(y as usize, x as usize);
            *image.get_pixel(src_col as u32, src_row as u32)
        }))
    }
}

/// Where source pixel `(row, col)` lands after rotating by `spec`.
///
/// This is the forward direction of the table lookup, used to follow a
/// single point (such as a marker) without building a table.
pub fn rotate_point(
    height: usize,
    width: usize,
    row: usize,
    col: usize,
    spec: &RotationSpec,
) -> MediaResult<(f64, f64)> {
    validate_equirect(height, width)?;
    let rotation = RotationMatrix::from_spec(spec);
    let src = lat_lon_to_sphere(pixel_to_lat_lon(row, col, height, width));
    let dst = sphere_to_lat_lon(rotation.transpose().apply(src));
    Ok(lat_lon_to_pixel_f64(dst, height, width))
}

fn validate_equirect(height: usize, width: usize) -> MediaResult<()> {
    if height == 0 || width != 2 * height {
        return Err(MediaError::invalid_dimensions(format!(
            "equirectangular frames need width == 2 * height, got {width}x{height}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage, Rgb};

    fn patterned(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 251) as u8, (y * 13 % 251) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let rotator = EquirectRotator::new(32, 64, RotationSpec::identity()).unwrap();
        assert!(rotator.mapping().is_identity());

        let image = patterned(64, 32);
        assert_eq!(rotator.rotate(&image).unwrap(), image);
    }

    #[test]
    fn test_yaw_quarter_turn_sources() {
        let rotator = EquirectRotator::new(256, 512, RotationSpec::yaw(90.0)).unwrap();
        assert_eq!(rotator.mapping().source_of(128, 0), (128, 128));
    }

    #[test]
    fn test_rotate_then_inverse_restores_image() {
        let mut rotator = EquirectRotator::new(16, 32, RotationSpec::yaw(90.0)).unwrap();
        let image = patterned(32, 16);

        let rotated = rotator.rotate(&image).unwrap();
        assert_ne!(rotated, image);

        rotator.set_inverse(true).unwrap();
        assert!(rotator.is_inverted());
        assert_eq!(rotator.rotate(&rotated).unwrap(), image);
    }

    #[test]
    fn test_set_inverse_false_is_noop() {
        let mut rotator = EquirectRotator::new(16, 32, RotationSpec::yaw(90.0)).unwrap();
        let before = rotator.mapping().source_of(8, 0);
        rotator.set_inverse(false).unwrap();
        assert!(!rotator.is_inverted());
        assert_eq!(rotator.mapping().source_of(8, 0), before);
    }

    #[test]
    fn test_rotate_point_is_forward_of_table() {
        let (row, col) = rotate_point(256, 512, 128, 128, &RotationSpec::yaw(90.0)).unwrap();
        assert!((row - 128.0).abs() < 1e-6);
        assert!(col.abs() < 1e-6 || (col - 512.0).abs() < 1e-6);
    }

    #[test]
    fn test_grayscale_rotation() {
        let rotator = EquirectRotator::new(8, 16, RotationSpec::yaw(180.0)).unwrap();
        let image = GrayImage::from_fn(16, 8, |x, _| Luma([x as u8]));
        let rotated = rotator.rotate(&image).unwrap();
        assert_eq!(rotated.get_pixel(0, 4)[0], 8);
    }

    #[test]
    fn test_rejects_non_equirect_dimensions() {
        assert!(EquirectRotator::new(10, 10, RotationSpec::identity()).is_err());
        let rotator = EquirectRotator::new(8, 16, RotationSpec::identity()).unwrap();
        assert!(rotator.rotate(&patterned(20, 10)).is_err());
    }

    #[test]
    fn test_matrix_transpose_inverts() {
        let r = RotationMatrix::from_spec(&RotationSpec::new(30.0, 20.0, 10.0));
        let product = r.mul(&r.transpose());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product.0[i][j] - expected).abs() < 1e-12);
            }
        }
    }
}
