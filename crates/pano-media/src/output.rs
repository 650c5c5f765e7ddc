//! On-disk layout of a run's persisted images.
//!
//! Every kind of image goes to its own directory under the output root and
//! is named after the frame index, `{index:04}.png`.

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use pano_models::FrameIndex;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Directory an image is persisted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputKind {
    OriginalEr,
    PrimaryRegion,
    ObjectMask,
    MotionHistory,
    MotionLine,
    MotionLineTrail,
    Replay,
    GrayReplay,
    SaliencyMap,
    Visualization,
    /// Per-label composite.
    LabelVisualization(String),
}

impl OutputKind {
    /// Kinds with a fixed directory, created up front.
    pub const FIXED: [OutputKind; 10] = [
        OutputKind::OriginalEr,
        OutputKind::PrimaryRegion,
        OutputKind::ObjectMask,
        OutputKind::MotionHistory,
        OutputKind::MotionLine,
        OutputKind::MotionLineTrail,
        OutputKind::Replay,
        OutputKind::GrayReplay,
        OutputKind::SaliencyMap,
        OutputKind::Visualization,
    ];

    pub fn dir_name(&self) -> String {
        match self {
            OutputKind::OriginalEr => "original_er".to_string(),
            OutputKind::PrimaryRegion => "primary_region".to_string(),
            OutputKind::ObjectMask => "obj_mask".to_string(),
            OutputKind::MotionHistory => "motion_history".to_string(),
            OutputKind::MotionLine => "motion_line".to_string(),
            OutputKind::MotionLineTrail => "motion_line_trail".to_string(),
            OutputKind::Replay => "replay".to_string(),
            OutputKind::GrayReplay => "gray_replay".to_string(),
            OutputKind::SaliencyMap => "saliency_map".to_string(),
            OutputKind::Visualization => "visualization".to_string(),
            OutputKind::LabelVisualization(label) => {
                format!("visualization_{}", sanitize_label(label))
            }
        }
    }
}

/// Keep labels usable as directory names.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and every fixed directory.
    pub fn create_all(&self) -> MediaResult<()> {
        for kind in OutputKind::FIXED.iter() {
            fs::create_dir_all(self.dir(kind))?;
        }
        debug!(root = %self.root.display(), "Created output layout");
        Ok(())
    }

    pub fn dir(&self, kind: &OutputKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn path(&self, kind: &OutputKind, index: FrameIndex) -> PathBuf {
        self.dir(kind).join(format!("{index:04}.png"))
    }

    /// Write `image` as PNG, creating the directory if needed.
    pub fn write(&self, kind: &OutputKind, index: FrameIndex, image: impl Into<DynamicImage>) -> MediaResult<PathBuf> {
        let path = self.path(kind, index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        image.into().save(&path)?;
        Ok(path)
    }

    /// Indices already written for `kind`, ascending.
    pub fn written_indices(&self, kind: &OutputKind) -> MediaResult<Vec<FrameIndex>> {
        let dir = self.dir(kind);
        if !dir.exists() {
            return Err(MediaError::FileNotFound(dir));
        }
        let mut indices: Vec<FrameIndex> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("png") {
                    return None;
                }
                path.file_stem()?.to_str()?.parse().ok()
            })
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> MediaResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut bytes, ImageOutputFormat::Png)?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba};
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_zero_padded() {
        let layout = OutputLayout::new("/tmp/run");
        assert_eq!(
            layout.path(&OutputKind::PrimaryRegion, 7),
            PathBuf::from("/tmp/run/primary_region/0007.png")
        );
        assert_eq!(
            layout.path(&OutputKind::ObjectMask, 12345),
            PathBuf::from("/tmp/run/obj_mask/12345.png")
        );
    }

    #[test]
    fn test_label_directories_are_sanitized() {
        assert_eq!(
            OutputKind::LabelVisualization("orange_(fruit)".to_string()).dir_name(),
            "visualization_orange__fruit_"
        );
        assert_eq!(
            OutputKind::LabelVisualization("../cup".to_string()).dir_name(),
            "visualization____cup"
        );
    }

    #[test]
    fn test_create_and_write() {
        let tmp = TempDir::new().unwrap();
        let layout = OutputLayout::new(tmp.path().join("live_1"));
        layout.create_all().unwrap();
        for kind in OutputKind::FIXED.iter() {
            assert!(layout.dir(kind).is_dir());
        }

        let mask = GrayImage::from_pixel(4, 4, Luma([255]));
        layout.write(&OutputKind::SaliencyMap, 3, mask.clone()).unwrap();
        layout.write(&OutputKind::SaliencyMap, 1, mask).unwrap();
        let label = OutputKind::LabelVisualization("cup".to_string());
        let path = layout
            .write(&label, 0, RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])))
            .unwrap();
        assert!(path.ends_with("visualization_cup/0000.png"));

        assert_eq!(layout.written_indices(&OutputKind::SaliencyMap).unwrap(), vec![1, 3]);
        assert!(layout.written_indices(&OutputKind::Replay).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_is_reported() {
        let tmp = TempDir::new().unwrap();
        let layout = OutputLayout::new(tmp.path());
        assert!(matches!(
            layout.written_indices(&OutputKind::Replay),
            Err(MediaError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_png_bytes_decode_back() {
        let image = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 40]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }
}
