//! Contracts for the external models and devices the pipeline drives.
//!
//! Implementations are called from blocking threads, so every trait is
//! synchronous and `Send + Sync`.

use image::{GrayImage, RgbImage};
use std::fmt;

use crate::detection::RawDetection;
use crate::error::MediaResult;

/// Start-up state reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CollaboratorHealth {
    #[default]
    Ready,
    /// Running, but not as intended (for example partially loaded weights).
    Degraded(String),
}

impl fmt::Display for CollaboratorHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorHealth::Ready => f.write_str("ready"),
            CollaboratorHealth::Degraded(reason) => write!(f, "degraded: {reason}"),
        }
    }
}

/// Instance segmentation over one viewport frame.
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Masks are the size of `image`; confidence is a percentage.
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<RawDetection>>;

    fn health(&self) -> CollaboratorHealth {
        CollaboratorHealth::Ready
    }
}

/// Temporal saliency over a window of equally sized frames.
pub trait SaliencyModel: Send + Sync {
    fn name(&self) -> &str;

    /// Raw single-channel heatmap; any size, any range.
    fn score(&self, window: &[RgbImage]) -> MediaResult<GrayImage>;

    fn health(&self) -> CollaboratorHealth {
        CollaboratorHealth::Ready
    }
}

/// Fiducial marker finder on the full equirectangular frame.
pub trait MarkerLocator: Send + Sync {
    /// Marker centre `(x, y)` in pixels, or `None` when not visible.
    fn locate(&self, frame: &RgbImage) -> MediaResult<Option<(f64, f64)>>;
}

/// Perspective views into an equirectangular frame.
///
/// Angles are degrees: `theta` horizontal (longitude), `phi` vertical
/// (latitude, up positive).
pub trait PerspectiveProjector: Send + Sync {
    /// Viewing direction of an equirectangular pixel.
    fn pixel_to_spherical(&self, frame: &RgbImage, x: f64, y: f64) -> (f64, f64);

    /// Pinhole view of `fov` horizontal degrees centred on `(theta, phi)`.
    fn crop(
        &self,
        frame: &RgbImage,
        fov: f64,
        theta: f64,
        phi: f64,
        height: u32,
        width: u32,
    ) -> MediaResult<RgbImage>;
}

/// A pull-based supply of equirectangular frames.
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// File stem used to name the session output, if the source has one.
    fn stem(&self) -> Option<String> {
        None
    }
}

/// Stand-ins used when no real model is wired in.
pub mod fallback {
    use super::*;

    /// Reports nothing.
    #[derive(Debug, Default, Clone)]
    pub struct NoopDetector;

    impl ObjectDetector for NoopDetector {
        fn name(&self) -> &str {
            "noop"
        }

        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<RawDetection>> {
            Ok(Vec::new())
        }

        fn health(&self) -> CollaboratorHealth {
            CollaboratorHealth::Degraded("no detection model configured".to_string())
        }
    }

    /// Everything equally salient.
    #[derive(Debug, Clone)]
    pub struct FlatSaliency {
        pub level: u8,
    }

    impl Default for FlatSaliency {
        fn default() -> Self {
            Self { level: 255 }
        }
    }

    impl SaliencyModel for FlatSaliency {
        fn name(&self) -> &str {
            "flat"
        }

        fn score(&self, window: &[RgbImage]) -> MediaResult<GrayImage> {
            let (w, h) = window.first().map(|f| f.dimensions()).unwrap_or((1, 1));
            Ok(GrayImage::from_pixel(w, h, image::Luma([self.level])))
        }

        fn health(&self) -> CollaboratorHealth {
            CollaboratorHealth::Degraded("no saliency model configured".to_string())
        }
    }

    /// Marker pinned to a fixed pixel.
    #[derive(Debug, Clone, Copy)]
    pub struct StaticMarker {
        pub x: f64,
        pub y: f64,
    }

    impl MarkerLocator for StaticMarker {
        fn locate(&self, _frame: &RgbImage) -> MediaResult<Option<(f64, f64)>> {
            Ok(Some((self.x, self.y)))
        }
    }
}
