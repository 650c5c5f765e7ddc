//! Worker configuration.

use std::path::PathBuf;

use pano_media::PipelineConfig;
use pano_models::{RotationSpec, RunMode};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Live capture gated by commands, or a recorded input processed end to end
    pub mode: RunMode,
    /// Frame source: an image-sequence directory, a video file or a camera index
    pub source: String,
    /// Parent of the per-session output directory
    pub output_dir: PathBuf,
    /// Processing constants, optionally loaded from a JSON file
    pub pipeline: PipelineConfig,
    /// Fixed marker pixel used when no marker detector is wired in
    pub marker: Option<(f64, f64)>,
    /// Rotation applied to every equirectangular frame before locating the marker
    pub rotation: Option<RotationSpec>,
    /// Image used for the final placement pass instead of the last viewport
    pub replay_frame: Option<PathBuf>,
    /// Pending control commands before senders wait
    pub command_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::LiveStreaming,
            source: "0".to_string(),
            output_dir: PathBuf::from("./output"),
            pipeline: PipelineConfig::default(),
            marker: None,
            rotation: None,
            replay_frame: None,
            command_buffer: 16,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let defaults = Self::default();

        let mode = match lookup("PANO_MODE") {
            Some(value) => value.parse::<RunMode>().map_err(WorkerError::config_error)?,
            None => defaults.mode,
        };

        let pipeline = match lookup("PANO_PIPELINE_CONFIG") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| WorkerError::config_error(format!("{path}: {e}")))?;
                PipelineConfig::from_json(&text)
                    .map_err(|e| WorkerError::config_error(format!("{path}: {e}")))?
            }
            None => defaults.pipeline,
        };

        let marker = match (lookup("PANO_MARKER_X"), lookup("PANO_MARKER_Y")) {
            (Some(x), Some(y)) => Some((parse_f64("PANO_MARKER_X", &x)?, parse_f64("PANO_MARKER_Y", &y)?)),
            (None, None) => None,
            _ => {
                return Err(WorkerError::config_error(
                    "PANO_MARKER_X and PANO_MARKER_Y must be set together",
                ))
            }
        };

        let rotation = lookup("PANO_ROTATION")
            .map(|value| parse_rotation(&value))
            .transpose()?;

        Ok(Self {
            mode,
            source: lookup("PANO_SOURCE").unwrap_or(defaults.source),
            output_dir: lookup("PANO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            pipeline,
            marker,
            rotation,
            replay_frame: lookup("PANO_REPLAY_FRAME").map(PathBuf::from),
            command_buffer: lookup("PANO_COMMAND_BUFFER")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.command_buffer),
        })
    }
}

fn parse_f64(key: &str, value: &str) -> WorkerResult<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| WorkerError::config_error(format!("{key}: not a number: {value}")))
}

/// `"yaw,pitch,roll"` in degrees.
fn parse_rotation(value: &str) -> WorkerResult<RotationSpec> {
    let parts: Vec<&str> = value.split(',').collect();
    let [yaw, pitch, roll] = parts.as_slice() else {
        return Err(WorkerError::config_error(format!(
            "PANO_ROTATION: expected yaw,pitch,roll, got {value}"
        )));
    };
    Ok(RotationSpec::new(
        parse_f64("PANO_ROTATION", yaw)?,
        parse_f64("PANO_ROTATION", pitch)?,
        parse_f64("PANO_ROTATION", roll)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.mode, RunMode::LiveStreaming);
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert!(config.marker.is_none());
        assert!(config.rotation.is_none());
        assert_eq!(config.pipeline.saliency.window_len, 32);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("PANO_MODE", "video"),
            ("PANO_SOURCE", "/data/clip"),
            ("PANO_MARKER_X", "512.5"),
            ("PANO_MARKER_Y", "256"),
            ("PANO_ROTATION", "90, 0, -10"),
            ("PANO_REPLAY_FRAME", "/data/frame.png"),
        ]))
        .unwrap();
        assert_eq!(config.mode, RunMode::VideoInput);
        assert_eq!(config.source, "/data/clip");
        assert_eq!(config.marker, Some((512.5, 256.0)));
        assert_eq!(config.rotation, Some(RotationSpec::new(90.0, 0.0, -10.0)));
        assert_eq!(config.replay_frame, Some(PathBuf::from("/data/frame.png")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(WorkerConfig::from_lookup(lookup(&[("PANO_MODE", "batch")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("PANO_MARKER_X", "1")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("PANO_ROTATION", "1,2")])).is_err());
    }

    #[test]
    fn test_pipeline_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"saliency": {"window_len": 8}}"#).unwrap();
        let config = WorkerConfig::from_lookup(lookup(&[(
            "PANO_PIPELINE_CONFIG",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.pipeline.saliency.window_len, 8);
        assert_eq!(config.pipeline.motion.mhi_duration, 10);
    }
}
