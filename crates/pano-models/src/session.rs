//! Session identity and lifecycle state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Live camera; tracking is driven by control commands.
    #[default]
    LiveStreaming,
    /// Recorded input; calibrates on the first frame and runs to the end.
    VideoInput,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::LiveStreaming => "live_streaming",
            RunMode::VideoInput => "video_input",
        }
    }

    /// Name of the per-session output directory.
    ///
    /// Live sessions are named after the wall clock; recorded ones after
    /// the input's file stem.
    pub fn output_name(&self, source_stem: Option<&str>) -> String {
        match (self, source_stem) {
            (RunMode::VideoInput, Some(stem)) if !stem.is_empty() => stem.to_string(),
            _ => format!("live_{}", Utc::now().timestamp()),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "live_streaming" | "livestreaming" => Ok(RunMode::LiveStreaming),
            "video" | "video_input" | "videoinput" => Ok(RunMode::VideoInput),
            other => Err(format!("unknown run mode: {other}")),
        }
    }
}

/// Lifecycle of a session as driven by control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No viewport calibration yet
    #[default]
    Idle,
    /// Viewport offset calibrated, not tracking
    Marked,
    /// Frames are being ingested, detected and accumulated
    Tracking,
    /// Composited frames are being handed out
    Replaying,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Marked => "marked",
            SessionState::Tracking => "tracking",
            SessionState::Replaying => "replaying",
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, SessionState::Tracking)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("live".parse::<RunMode>().unwrap(), RunMode::LiveStreaming);
        assert_eq!("VIDEO_INPUT".parse::<RunMode>().unwrap(), RunMode::VideoInput);
        assert!("satellite".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(RunMode::VideoInput.output_name(Some("kitchen")), "kitchen");
        assert!(RunMode::LiveStreaming
            .output_name(Some("kitchen"))
            .starts_with("live_"));
        assert!(RunMode::VideoInput.output_name(None).starts_with("live_"));
    }

    #[test]
    fn test_session_state_serde() {
        let json = serde_json::to_string(&SessionState::Replaying).unwrap();
        assert_eq!(json, "\"replaying\"");
        assert!(SessionState::Tracking.is_tracking());
    }
}
