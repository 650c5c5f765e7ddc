//! Session runtime for marker-tracked 360° viewport processing.
//!
//! This crate provides:
//! - The capture task and the marker-relative viewport ingest
//! - The detection orchestrator, motion worker and single-flight saliency worker
//! - Worker supervision with failure propagation
//! - The command-driven tracking session and replay composition
//! - Environment configuration and structured session logging

pub mod capture;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod motion_task;
pub mod orchestrator;
pub mod queue;
pub mod replay;
pub mod runner;
pub mod saliency;
pub mod session;
pub mod supervisor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, SessionLogger};
pub use runner::{send_command, Collaborators, CommandRequest, SessionRunner, SessionSummary};
pub use session::TrackingSession;
