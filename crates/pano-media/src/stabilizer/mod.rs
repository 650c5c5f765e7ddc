//! Optical-flow video stabilization of the viewport.
//!
//! Per frame: Shi–Tomasi corners in the previous grayscale frame, pyramidal
//! Lucas–Kanade into the current one, a RANSAC affine fit `A_t` of the
//! correspondences, and the cumulative motion `T_t = A_t · T_{t−1}`. The
//! current frame is warped by `T_t⁻¹`, which maps it back onto the first
//! frame's geometry.
//!
//! With the `opencv` feature (default) the estimation and warp run on
//! OpenCV; without it a pure-Rust backend on `image` and `ndarray` is used.
//!
//! # Usage
//!
//! ```no_run
//! use pano_media::stabilizer::Stabilizer;
//! use pano_media::config::StabilizerConfig;
//! # let frames: Vec<image::RgbImage> = Vec::new();
//!
//! let mut stabilizer = Stabilizer::new(StabilizerConfig::default());
//! for frame in &frames {
//!     let stabilized = stabilizer.stabilize(frame)?;
//!     println!("{:?}", stabilized.outcome);
//! }
//! # Ok::<(), pano_media::MediaError>(())
//! ```

#[cfg(feature = "opencv")]
mod cv;
#[cfg(not(feature = "opencv"))]
mod native;
mod transform;

#[cfg(feature = "opencv")]
use cv as backend;
#[cfg(not(feature = "opencv"))]
use native as backend;

pub use transform::AffineTransform;

use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::config::StabilizerConfig;
use crate::error::MediaResult;
use crate::frame::to_gray;
use crate::metrics;

/// How the transform for a frame was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationOutcome {
    /// First frame: returned as is, seeds the previous buffer.
    Seeded,
    /// A fresh affine estimate was composed onto the cumulative transform.
    Estimated { tracked: usize },
    /// Estimation failed; the previous cumulative transform was reused.
    Reused { tracked: usize },
}

#[derive(Debug, Clone)]
pub struct StabilizedFrame {
    pub image: RgbImage,
    /// Cumulative transform `T_t` after this frame.
    pub transform: AffineTransform,
    pub outcome: StabilizationOutcome,
}

pub struct Stabilizer {
    config: StabilizerConfig,
    prev_gray: Option<GrayImage>,
    cumulative: AffineTransform,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            prev_gray: None,
            cumulative: AffineTransform::identity(),
        }
    }

    pub fn cumulative(&self) -> AffineTransform {
        self.cumulative
    }

    /// Forget the previous frame and the accumulated motion.
    pub fn reset(&mut self) {
        self.prev_gray = None;
        self.cumulative = AffineTransform::identity();
    }

    /// Frame-to-frame motion `prev → curr`, with the number of tracked points.
    fn estimate(&self, prev: &GrayImage, curr: &GrayImage) -> (Option<AffineTransform>, usize) {
        if prev.dimensions() != curr.dimensions() {
            return (None, 0);
        }
        match backend::estimate_motion(prev, curr, &self.config) {
            Ok(estimate) => estimate,
            Err(e) => {
                debug!(error = %e, "Motion estimation failed");
                (None, 0)
            }
        }
    }

    /// Stabilize `frame`. A failed estimate keeps the previous transform;
    /// only a failing warp is an error.
    pub fn stabilize(&mut self, frame: &RgbImage) -> MediaResult<StabilizedFrame> {
        let gray = to_gray(frame);
        let Some(prev) = self.prev_gray.take() else {
            self.prev_gray = Some(gray);
            return Ok(StabilizedFrame {
                image: frame.clone(),
                transform: self.cumulative,
                outcome: StabilizationOutcome::Seeded,
            });
        };

        let (model, tracked) = self.estimate(&prev, &gray);
        self.prev_gray = Some(gray);
        let outcome = match model {
            Some(step) => {
                self.cumulative = step.compose(&self.cumulative);
                StabilizationOutcome::Estimated { tracked }
            }
            None => {
                debug!(tracked, "Affine estimation failed, reusing previous transform");
                metrics::record_stabilization_reused();
                StabilizationOutcome::Reused { tracked }
            }
        };

        let image = match self.cumulative.inverse() {
            Some(inverse) if !inverse.approx_eq(&AffineTransform::identity(), 1e-9) => {
                backend::warp(frame, &inverse)?
            }
            _ => frame.clone(),
        };
        Ok(StabilizedFrame {
            image,
            transform: self.cumulative,
            outcome,
        })
    }
}
