//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during panoramic media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Viewport not calibrated")]
    NotCalibrated,

    #[error("Object detection failed: {0}")]
    DetectionFailed(String),

    #[error("Saliency computation failed: {0}")]
    SaliencyFailed(String),

    #[error("Marker location failed: {0}")]
    MarkerFailed(String),

    #[error("Frame source error: {0}")]
    SourceFailed(String),

    #[error("Missing source imagery for frame {frame}: {reason}")]
    MissingMotionSource { frame: u64, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a dimension validation error.
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a saliency failure error.
    pub fn saliency_failed(message: impl Into<String>) -> Self {
        Self::SaliencyFailed(message.into())
    }

    /// Create a frame source error.
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::SourceFailed(message.into())
    }

    /// Create a missing-imagery error for the motion engine.
    pub fn missing_motion_source(frame: u64, reason: impl Into<String>) -> Self {
        Self::MissingMotionSource {
            frame,
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
