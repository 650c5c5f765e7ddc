//! Temporal motion state engine.
//!
//! For every frame handed over by the detection orchestrator the engine:
//! - updates the motion history image from the difference to the previous
//!   viewport and crops it around each label's recent boxes,
//! - appends each label's mask centroid to its trajectory,
//! - stores masked raw and grayscale patches for replay.
//!
//! Results go to a [`MotionStore`]; the engine is its only writer.

mod mhi;
mod palette;
mod store;

pub use mhi::{foreground_mask, MotionHistory};
pub use palette::{LabelPalette, TRAIL_COLOUR};
pub use store::{
    LabelTrack, LabelUpdate, MotionHistoryEntry, MotionSnapshot, MotionStore, ReplayEntry,
    TrajectoryPoint,
};

use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use pano_models::{BoundingBox, FrameIndex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::MotionConfig;
use crate::detection::{union_mask, DetectedObject};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::metrics;

const TRAIL_HEAD_RADIUS: i32 = 2;

/// Per-frame output of [`MotionEngine::process`].
#[derive(Debug, Clone)]
pub struct MotionFrameReport {
    pub frame: FrameIndex,
    pub labels: Vec<String>,
    /// Motion history was not updated for this frame.
    pub skipped: bool,
    /// Viewport pixels under any object mask, black elsewhere.
    pub object_mask: RgbImage,
    /// Viewport with every trajectory so far drawn in light gray.
    pub trail: RgbImage,
    /// Masked motion history of the whole viewport, when computed.
    pub history: Option<RgbaImage>,
}

pub struct MotionEngine {
    config: MotionConfig,
    palette: LabelPalette,
    store: Arc<MotionStore>,
    mhi: Option<MotionHistory>,
    previous: Option<(FrameIndex, GrayImage)>,
    box_windows: HashMap<String, VecDeque<BoundingBox>>,
}

impl MotionEngine {
    pub fn new(config: MotionConfig, store: Arc<MotionStore>) -> Self {
        Self {
            config,
            palette: LabelPalette::default(),
            store,
            mhi: None,
            previous: None,
            box_windows: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<MotionStore> {
        &self.store
    }

    /// Process frame `frame` and its surviving detections.
    pub fn process(&mut self, frame: &Frame, objects: &[DetectedObject]) -> MediaResult<MotionFrameReport> {
        let gray = frame.to_gray();
        let (width, height) = gray.dimensions();
        let t = frame.index as f32;

        let previous = self.previous.take();
        let seeding = previous.is_none();
        let diff_source = match previous {
            Some((idx, prev)) if idx + 1 == frame.index && prev.dimensions() == gray.dimensions() => Some(prev),
            Some((idx, _)) => {
                let err = MediaError::missing_motion_source(
                    frame.index,
                    format!("previous processed viewport is frame {idx}"),
                );
                warn!(error = %err, "Skipping motion history for frame");
                None
            }
            None => None,
        };

        let mut updates: Vec<LabelUpdate> = Vec::with_capacity(objects.len());
        for object in objects {
            let window = self.box_windows.entry(object.label.clone()).or_default();
            window.push_back(object.bbox);
            while window.len() > self.config.history_window.max(1) {
                window.pop_front();
            }

            let centroid = object.centroid();
            let colour = self.store.colour_of(&object.label).unwrap_or_else(|| {
                let sample = centroid
                    .filter(|&(x, y)| x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height)
                    .map(|(x, y)| *frame.image.get_pixel(x as u32, y as u32))
                    .unwrap_or(Rgb([255, 255, 255]));
                self.palette.resolve(&object.label, sample)
            });

            let replay = object.masked_patch(&frame.image).map(|raw| ReplayEntry {
                frame: frame.index,
                gray: Arc::new(grayscale_patch(&raw)),
                raw: Arc::new(raw),
                anchor: object.bbox,
            });

            updates.push(LabelUpdate {
                label: object.label.clone(),
                colour,
                history: None,
                trajectory: centroid.map(|centroid| TrajectoryPoint {
                    frame: frame.index,
                    centroid,
                    anchor: object.bbox,
                }),
                replay,
            });
        }

        let mut history_image = None;
        match (&diff_source, seeding) {
            (Some(prev), _) => {
                let mhi = self
                    .mhi
                    .get_or_insert_with(|| MotionHistory::new(width, height, self.config.mhi_duration));
                if mhi.dimensions() != (width, height) {
                    *mhi = MotionHistory::new(width, height, self.config.mhi_duration);
                }
                let fg = foreground_mask(prev, &gray, self.config.moving_threshold);
                mhi.update(&fg, t);
                let rendered = mhi.render(t);
                let mask = union_mask(objects, width, height);
                let history = self.colourise(&rendered, &mask);

                for (update, object) in updates.iter_mut().zip(objects) {
                    let crop = self.box_windows[&object.label]
                        .iter()
                        .fold(object.bbox, |acc, b| acc.union(b))
                        .clamp_to(width, height);
                    if crop.is_empty() {
                        continue;
                    }
                    let patch = image::imageops::crop_imm(
                        &history,
                        crop.x1 as u32,
                        crop.y1 as u32,
                        crop.width() as u32,
                        crop.height() as u32,
                    )
                    .to_image();
                    update.history = Some(MotionHistoryEntry {
                        frame: frame.index,
                        patch: Arc::new(patch),
                        origin: crop.top_left(),
                        anchor: object.bbox,
                    });
                }
                history_image = Some(history);
            }
            (None, true) => {
                self.mhi = Some(MotionHistory::new(width, height, self.config.mhi_duration));
            }
            (None, false) => {}
        }

        let skipped = diff_source.is_none() && !seeding;
        let labels = updates.iter().map(|u| u.label.clone()).collect();
        self.store.commit(updates);
        self.previous = Some((frame.index, gray));
        metrics::record_motion_frame(skipped);
        debug!(frame = frame.index, objects = objects.len(), skipped, "Motion state updated");

        Ok(MotionFrameReport {
            frame: frame.index,
            labels,
            skipped,
            object_mask: masked_frame(&frame.image, objects),
            trail: self.trail(&frame.image),
            history: history_image,
        })
    }

    /// MHI intensities inside `mask` as RGBA, transparent where nothing moved.
    fn colourise(&self, rendered: &GrayImage, mask: &GrayImage) -> RgbaImage {
        RgbaImage::from_fn(rendered.width(), rendered.height(), |x, y| {
            let i = rendered.get_pixel(x, y)[0];
            if mask.get_pixel(x, y)[0] == 0 || i == 0 {
                return Rgba([0, 0, 0, 0]);
            }
            if self.config.invert_history {
                let v = 255 - i;
                Rgba([v, v, v, 255])
            } else {
                Rgba([i, i, i, i])
            }
        })
    }

    fn trail(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        let colour = Rgb([TRAIL_COLOUR[0], TRAIL_COLOUR[1], TRAIL_COLOUR[2]]);
        self.store.for_each_trajectory(|_, points| {
            for pair in points.windows(2) {
                let (x0, y0) = pair[0].centroid;
                let (x1, y1) = pair[1].centroid;
                draw_line_segment_mut(&mut out, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32), colour);
            }
            if let Some(last) = points.last() {
                draw_filled_circle_mut(&mut out, last.centroid, TRAIL_HEAD_RADIUS, colour);
            }
        });
        out
    }
}

/// Luma of each pixel, alpha kept.
fn grayscale_patch(raw: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(raw.width(), raw.height(), |x, y| {
        let p = raw.get_pixel(x, y);
        let luma = (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8;
        Rgba([luma, luma, luma, p[3]])
    })
}

fn masked_frame(image: &RgbImage, objects: &[DetectedObject]) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        if objects.iter().any(|o| o.contains(x, y)) {
            *image.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}
