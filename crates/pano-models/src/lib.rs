//! Shared data models for the panoramic tracking pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Spherical coordinates, rotations and angular offsets
//! - Pixel bounding boxes
//! - Session identity, run modes and session state
//! - Control commands and their length-prefixed wire framing

pub mod bbox;
pub mod command;
pub mod geometry;
pub mod session;

// Re-export common types
pub use bbox::BoundingBox;
pub use command::{decode_frame, encode_frame, Command, FrameError, MAX_FRAME_LEN};
pub use geometry::{AngularOffset, RotationSpec, SphericalCoordinate};
pub use session::{RunMode, SessionId, SessionState};

/// Zero-based index of an accepted viewport frame.
///
/// Indices are contiguous: a frame whose marker was lost never consumes one.
pub type FrameIndex = u64;
