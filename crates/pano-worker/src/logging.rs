//! Tracing setup and structured session logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pano_models::{RunMode, SessionId};

/// Install the global subscriber: ANSI for dev, JSON when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["pano_worker=info", "pano_media=info"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Session lifecycle logger.
///
/// Every event carries the same `session_id` and `mode` fields.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    mode: RunMode,
}

impl SessionLogger {
    pub fn new(session_id: &SessionId, mode: RunMode) -> Self {
        Self {
            session_id: session_id.to_string(),
            mode,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            mode = %self.mode,
            "Session started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            mode = %self.mode,
            "Session progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            mode = %self.mode,
            "Session warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            mode = %self.mode,
            "Session error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            mode = %self.mode,
            "Session completed: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Span wrapping everything a session does.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            mode = %self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_logger_fields() {
        let id = SessionId::from_string("run-42");
        let logger = SessionLogger::new(&id, RunMode::VideoInput);

        assert_eq!(logger.session_id(), "run-42");
        assert_eq!(logger.mode(), RunMode::VideoInput);
        logger.log_progress("no subscriber installed");
    }
}
