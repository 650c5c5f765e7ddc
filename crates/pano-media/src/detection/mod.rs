//! Detection results and the rules that thin them out.
//!
//! - [`RawDetection`]: what the detector collaborator returns
//! - [`DetectedObject`]: a surviving detection bound to its frame
//! - [`suppression`]: duplicate, static-label and saliency rules
//! - [`DetectionStore`]: survivors keyed by frame index

mod store;
pub mod suppression;

pub use store::DetectionStore;
pub use suppression::{suppress, suppress_duplicates, SuppressionReport};

use image::{GrayImage, RgbImage, Rgba, RgbaImage};
use pano_models::{BoundingBox, FrameIndex};

/// One instance segmentation as emitted by the detector.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Binary mask the size of the input image; non-zero is object.
    pub mask: GrayImage,
    pub label: String,
    /// Percentage score, 0–100.
    pub confidence: f32,
    /// Pixel box `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
}

/// A detection that survived suppression.
#[derive(Debug, Clone)]
pub struct DetectedObject {
    pub mask: GrayImage,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub frame_index: FrameIndex,
}

impl DetectedObject {
    pub fn from_raw(raw: RawDetection, frame_index: FrameIndex) -> Self {
        Self {
            bbox: BoundingBox::from_xyxy(raw.bbox),
            mask: raw.mask,
            label: raw.label,
            confidence: raw.confidence,
            frame_index,
        }
    }

    /// Mask centroid `(x, y)` from image moments, or `None` for an empty mask.
    pub fn centroid(&self) -> Option<(i32, i32)> {
        let mut count = 0u64;
        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        for (x, y, p) in self.mask.enumerate_pixels() {
            if p[0] > 0 {
                count += 1;
                sum_x += x as u64;
                sum_y += y as u64;
            }
        }
        if count == 0 {
            return None;
        }
        Some(((sum_x / count) as i32, (sum_y / count) as i32))
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y)[0] > 0
    }

    /// Pixels of `frame` inside both the mask and the box, everything else
    /// transparent. `None` when the clipped box is empty.
    pub fn masked_patch(&self, frame: &RgbImage) -> Option<RgbaImage> {
        let bbox = self.bbox.clamp_to(frame.width(), frame.height());
        if bbox.is_empty() {
            return None;
        }
        let (x0, y0) = (bbox.x1 as u32, bbox.y1 as u32);
        Some(RgbaImage::from_fn(
            bbox.width() as u32,
            bbox.height() as u32,
            |dx, dy| {
                let (x, y) = (x0 + dx, y0 + dy);
                if self.contains(x, y) {
                    let p = frame.get_pixel(x, y);
                    Rgba([p[0], p[1], p[2], 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            },
        ))
    }
}

/// Union of all masks, sized `width x height`.
pub fn union_mask(objects: &[DetectedObject], width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let hit = objects.iter().any(|o| o.contains(x, y));
        image::Luma([if hit { 255 } else { 0 }])
    })
}
