//! Configuration for the panoramic tracking pipeline.
//!
//! Every struct deserialises with `#[serde(default)]`, so a partial JSON
//! document only overrides the fields it names.

use pano_models::AngularOffset;
use serde::{Deserialize, Serialize};

/// Labels that never move and are always suppressed.
pub const DEFAULT_STATIC_LABELS: &[&str] = &[
    "desk",
    "sofa",
    "dining_table",
    "kitchen_table",
    "coffee_table",
    "crossbar",
];

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub viewport: ViewportConfig,
    pub stabilizer: StabilizerConfig,
    pub suppression: SuppressionConfig,
    pub saliency: SaliencyConfig,
    pub motion: MotionConfig,
    pub compositor: CompositorConfig,
}

impl PipelineConfig {
    /// Parse a (possibly partial) JSON document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Viewport extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Horizontal field of view of the perspective crop in degrees (default: 60)
    pub fov: f64,

    /// Viewport height is the equirectangular height divided by this (default: 2)
    pub height_divisor: u32,

    /// Viewport width is the equirectangular width divided by this (default: 4)
    pub width_divisor: u32,

    /// Added to the viewport centre angle during calibration (default: zero)
    pub calibration_bias: AngularOffset,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            fov: 60.0,
            height_divisor: 2,
            width_divisor: 4,
            calibration_bias: AngularOffset::default(),
        }
    }
}

impl ViewportConfig {
    /// `(width, height)` of the viewport for an equirectangular frame.
    pub fn view_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        (
            (frame_width / self.width_divisor.max(1)).max(1),
            (frame_height / self.height_divisor.max(1)).max(1),
        )
    }
}

/// Shi–Tomasi corner detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    /// Maximum corners kept (default: 200)
    pub max_corners: usize,

    /// Minimum accepted response relative to the strongest corner (default: 0.01)
    pub quality_level: f32,

    /// Minimum euclidean distance between kept corners in pixels (default: 30)
    pub min_distance: f32,

    /// Side of the structure-tensor window (default: 3)
    pub block_size: usize,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 30.0,
            block_size: 3,
        }
    }
}

/// Pyramidal Lucas–Kanade parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Side of the tracking window (default: 21)
    pub window_size: usize,

    /// Number of pyramid levels above the base image (default: 3)
    pub max_level: usize,

    /// Iteration cap per level (default: 30)
    pub max_iterations: usize,

    /// Stop once the update is shorter than this, in pixels (default: 0.01)
    pub epsilon: f32,

    /// Minimum eigenvalue of the normalised gradient matrix (default: 1e-4)
    pub min_eigen_threshold: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window_size: 21,
            max_level: 3,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-4,
        }
    }
}

/// Video stabilization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub corners: CornerConfig,
    pub flow: FlowConfig,

    /// Correspondences further than this from the fitted model are dropped
    /// before the refit, in pixels (default: 3.0)
    pub inlier_threshold: f64,

    /// Number of inlier refits after the initial fit (default: 2)
    pub refit_passes: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            corners: CornerConfig::default(),
            flow: FlowConfig::default(),
            inlier_threshold: 3.0,
            refit_passes: 2,
        }
    }
}

impl StabilizerConfig {
    /// Fewer corners and a shallower pyramid for small viewports.
    pub fn fast() -> Self {
        Self {
            corners: CornerConfig {
                max_corners: 80,
                ..Default::default()
            },
            flow: FlowConfig {
                max_level: 2,
                max_iterations: 15,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Detection suppression rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Labels that are always dropped
    pub static_labels: Vec<String>,

    /// Saliency values strictly above this count as salient (default: 30)
    pub saliency_threshold: u8,

    /// A mask needs strictly more salient pixels than this to survive (default: 10)
    pub min_salient_overlap: usize,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            static_labels: DEFAULT_STATIC_LABELS.iter().map(|s| s.to_string()).collect(),
            saliency_threshold: 30,
            min_salient_overlap: 10,
        }
    }
}

impl SuppressionConfig {
    pub fn is_static(&self, label: &str) -> bool {
        self.static_labels.iter().any(|s| s == label)
    }
}

/// Temporal saliency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaliencyConfig {
    /// Frames per saliency window (default: 32)
    pub window_len: usize,

    /// Model input width (default: 384)
    pub input_width: u32,

    /// Model input height (default: 224)
    pub input_height: u32,

    /// Gaussian blur applied to the raw heatmap (default: 7.0)
    pub blur_sigma: f32,
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            window_len: 32,
            input_width: 384,
            input_height: 224,
            blur_sigma: 7.0,
        }
    }
}

/// Motion history, trajectory and replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Frames a motion-history pixel takes to decay to zero (default: 10)
    pub mhi_duration: u32,

    /// Absolute grayscale difference that counts as motion (default: 32)
    pub moving_threshold: u8,

    /// Bounding boxes unioned for the history crop (default: 10)
    pub history_window: usize,

    /// Motion-history entries retained per label (default: 10)
    pub history_retention: usize,

    /// Render recent motion dark and old motion bright instead of the reverse
    pub invert_history: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            mhi_duration: 10,
            moving_threshold: 32,
            history_window: 10,
            history_retention: 10,
            invert_history: false,
        }
    }
}

/// Replay compositing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Trajectory stroke width in pixels (default: 2)
    pub line_thickness: u32,

    /// Radius of the dot drawn at each trajectory point (default: 3)
    pub point_radius: u32,

    /// Half side of the square marking the latest trajectory point (default: 6)
    pub head_half_size: u32,

    /// Opacity of the grayscale replay layer (default: 0.5)
    pub gray_replay_opacity: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            point_radius: 3,
            head_half_size: 6,
            gray_replay_opacity: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_pipeline_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.viewport.fov, 60.0);
        assert_eq!(config.motion.mhi_duration, 10);
        assert_eq!(config.motion.moving_threshold, 32);
        assert_eq!(config.saliency.window_len, 32);
        assert_eq!(config.suppression.saliency_threshold, 30);
        assert!(config.suppression.is_static("coffee_table"));
        assert!(!config.suppression.is_static("cup"));
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = PipelineConfig::from_json(
            r#"{"motion": {"mhi_duration": 20}, "suppression": {"min_salient_overlap": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.motion.mhi_duration, 20);
        assert_eq!(config.motion.history_window, 10);
        assert_eq!(config.suppression.min_salient_overlap, 0);
        assert_eq!(config.suppression.static_labels.len(), 6);
    }

    #[test]
    fn test_view_size() {
        let viewport = ViewportConfig::default();
        assert_eq!(viewport.view_size(1920, 960), (480, 480));
    }
}
