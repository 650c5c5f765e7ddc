//! Spherical geometry and temporal motion imaging for 360° video.
//!
//! This crate provides:
//! - Equirectangular pixel ↔ sphere conversions and cached rotation tables
//! - A gnomonic perspective view and the marker-relative ROI locator
//! - Corner tracking, pyramidal optical flow and affine stabilization
//! - Detection suppression rules and the per-frame detection store
//! - Motion-history, trajectory and replay state per label
//! - The replay compositor and the persisted output layout
//!
//! Models (detection, saliency, marker finding) are reached through the
//! traits in [`collaborators`].

pub mod canvas;
pub mod collaborators;
pub mod compositor;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod motion;
pub mod output;
pub mod perspective;
pub mod projection;
pub mod roi;
pub mod rotation;
pub mod source;
pub mod stabilizer;

pub use collaborators::{
    CollaboratorHealth, FrameSource, MarkerLocator, ObjectDetector, PerspectiveProjector,
    SaliencyModel,
};
pub use compositor::{CompositeFrame, Compositor, Placement};
pub use config::{
    CompositorConfig, MotionConfig, PipelineConfig, SaliencyConfig, StabilizerConfig,
    SuppressionConfig, ViewportConfig,
};
pub use detection::{DetectedObject, DetectionStore, RawDetection, SuppressionReport};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use motion::{MotionEngine, MotionFrameReport, MotionSnapshot, MotionStore};
pub use output::{encode_png, OutputKind, OutputLayout};
pub use perspective::EquirectangularView;
pub use roi::{RoiLocator, RoiOutcome};
pub use rotation::{rotate_point, EquirectRotator, ProjectionMapping, RotationMatrix};
pub use source::ImageSequenceSource;
#[cfg(feature = "opencv")]
pub use source::VideoCaptureSource;
pub use stabilizer::{AffineTransform, StabilizationOutcome, StabilizedFrame, Stabilizer};
