//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker '{name}' failed: {reason}")]
    WorkerFailed { name: String, reason: String },

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Replay failed: {0}")]
    ReplayFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] pano_media::MediaError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn worker_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WorkerFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn channel_closed(what: impl Into<String>) -> Self {
        Self::ChannelClosed(what.into())
    }

    pub fn replay_failed(msg: impl Into<String>) -> Self {
        Self::ReplayFailed(msg.into())
    }
}
