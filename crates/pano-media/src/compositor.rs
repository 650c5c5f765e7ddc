//! Replay compositor.
//!
//! Re-projects the recorded motion layers of each label onto a new
//! viewport in which the same objects sit at different boxes. Every stored
//! patch carries the box its label had when it was captured (its anchor);
//! a patch is scaled by `current / anchor` and placed so its offset from
//! the anchor's top-left is preserved at that scale.
//!
//! Layers are blended onto a transparent canvas in the order
//! history → trajectory → replay.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, BresenhamLineIter,
};
use imageproc::rect::Rect;
use pano_models::{BoundingBox, FrameIndex};
use std::collections::BTreeMap;
use tracing::debug;

use crate::canvas;
use crate::config::CompositorConfig;
use crate::motion::{LabelTrack, MotionSnapshot};

/// Where a label sits in the output viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub label: String,
    pub bbox: BoundingBox,
}

impl Placement {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }
}

/// All images produced for one recorded frame.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub index: FrameIndex,
    pub combined: RgbaImage,
    pub per_label: BTreeMap<String, RgbaImage>,
    pub history: RgbaImage,
    pub trajectory: RgbaImage,
    pub replay: RgbaImage,
    pub gray_replay: RgbaImage,
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: CompositorConfig,
}

/// Layers of one label at one frame, each drawn on a full canvas.
struct LabelLayers {
    history: RgbaImage,
    trajectory: RgbaImage,
    replay: RgbaImage,
    gray_replay: RgbaImage,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    /// Compose every recorded frame, in index order.
    pub fn compose(
        &self,
        snapshot: &MotionSnapshot,
        placements: &[Placement],
        canvas_size: (u32, u32),
    ) -> Vec<CompositeFrame> {
        let Some((first, last)) = snapshot.frame_range() else {
            return Vec::new();
        };
        let frames: Vec<CompositeFrame> = (first..=last)
            .map(|index| self.compose_frame(snapshot, placements, canvas_size, index))
            .collect();
        debug!(frames = frames.len(), placements = placements.len(), "Composed replay");
        frames
    }

    pub fn compose_frame(
        &self,
        snapshot: &MotionSnapshot,
        placements: &[Placement],
        (width, height): (u32, u32),
        index: FrameIndex,
    ) -> CompositeFrame {
        let blank = || RgbaImage::new(width, height);
        let mut frame = CompositeFrame {
            index,
            combined: blank(),
            per_label: BTreeMap::new(),
            history: blank(),
            trajectory: blank(),
            replay: blank(),
            gray_replay: blank(),
        };

        for placement in placements {
            let Some(track) = snapshot.track(&placement.label) else {
                continue;
            };
            let layers = self.label_layers(track, &placement.bbox, (width, height), index);

            let mut label_image = blank();
            for layer in [&layers.history, &layers.trajectory, &layers.replay] {
                canvas::blend_over(&mut label_image, layer, 0, 0, 1.0);
                canvas::blend_over(&mut frame.combined, layer, 0, 0, 1.0);
            }
            canvas::blend_over(&mut frame.history, &layers.history, 0, 0, 1.0);
            canvas::blend_over(&mut frame.trajectory, &layers.trajectory, 0, 0, 1.0);
            canvas::blend_over(&mut frame.replay, &layers.replay, 0, 0, 1.0);
            canvas::blend_over(&mut frame.gray_replay, &layers.gray_replay, 0, 0, 1.0);
            frame.per_label.insert(placement.label.clone(), label_image);
        }
        frame
    }

    fn label_layers(
        &self,
        track: &LabelTrack,
        target: &BoundingBox,
        (width, height): (u32, u32),
        index: FrameIndex,
    ) -> LabelLayers {
        let mut layers = LabelLayers {
            history: RgbaImage::new(width, height),
            trajectory: RgbaImage::new(width, height),
            replay: RgbaImage::new(width, height),
            gray_replay: RgbaImage::new(width, height),
        };

        if let Some(entry) = track.history_at(index) {
            place_patch(&mut layers.history, &entry.patch, entry.origin, &entry.anchor, target, 1.0);
        }
        if let Some(entry) = track.replay_at(index) {
            let origin = entry.anchor.top_left();
            place_patch(&mut layers.replay, &entry.raw, origin, &entry.anchor, target, 1.0);
            place_patch(
                &mut layers.gray_replay,
                &entry.gray,
                origin,
                &entry.anchor,
                target,
                self.config.gray_replay_opacity,
            );
        }
        self.draw_trajectory(&mut layers.trajectory, track, target, index);
        layers
    }

    /// Trajectory up to `index`, mapped through the latest point's anchor.
    fn draw_trajectory(&self, layer: &mut RgbaImage, track: &LabelTrack, target: &BoundingBox, index: FrameIndex) {
        let points = track.trajectory_until(index);
        let Some(reference) = points.last() else {
            return;
        };
        let Some((sx, sy)) = target.scale_from(&reference.anchor) else {
            return;
        };
        let map = |(x, y): (i32, i32)| -> (i32, i32) {
            (
                (target.x1 as f64 + (x - reference.anchor.x1) as f64 * sx).round() as i32,
                (target.y1 as f64 + (y - reference.anchor.y1) as f64 * sy).round() as i32,
            )
        };

        let colour = track.colour;
        let radius = stroke_radius(self.config.line_thickness);
        let mapped: Vec<(i32, i32)> = points.iter().map(|p| map(p.centroid)).collect();
        for pair in mapped.windows(2) {
            stroke(layer, pair[0], pair[1], colour, radius);
        }
        for &point in &mapped[..mapped.len() - 1] {
            draw_filled_circle_mut(layer, point, self.config.point_radius as i32, colour);
        }
        if let Some(&(x, y)) = mapped.last() {
            let half = self.config.head_half_size as i32;
            for inset in 0..=radius.min(half) {
                let side = (2 * (half - inset) + 1) as u32;
                let rect = Rect::at(x - half + inset, y - half + inset).of_size(side, side);
                draw_hollow_rect_mut(layer, rect, colour);
            }
        }
    }
}

/// Pixels each side of a stroke's centre line.
fn stroke_radius(thickness: u32) -> i32 {
    (thickness.saturating_sub(1) / 2) as i32
}

/// One-pixel segment, or discs of `radius` stamped along it.
fn stroke(layer: &mut RgbaImage, from: (i32, i32), to: (i32, i32), colour: Rgba<u8>, radius: i32) {
    let start = (from.0 as f32, from.1 as f32);
    let end = (to.0 as f32, to.1 as f32);
    if radius == 0 {
        draw_line_segment_mut(layer, start, end, colour);
    } else {
        for point in BresenhamLineIter::new(start, end) {
            draw_filled_circle_mut(layer, point, radius, colour);
        }
    }
}

/// Scale `patch` by `target / anchor` and blend it at the mapped origin.
fn place_patch(
    layer: &mut RgbaImage,
    patch: &RgbaImage,
    origin: (i32, i32),
    anchor: &BoundingBox,
    target: &BoundingBox,
    opacity: f32,
) {
    let Some((sx, sy)) = target.scale_from(anchor) else {
        return;
    };
    let new_w = (patch.width() as f64 * sx).round() as u32;
    let new_h = (patch.height() as f64 * sy).round() as u32;
    if new_w == 0 || new_h == 0 {
        return;
    }
    let x = (target.x1 as f64 - (anchor.x1 - origin.0) as f64 * sx).round() as i64;
    let y = (target.y1 as f64 - (anchor.y1 - origin.1) as f64 * sy).round() as i64;

    if (new_w, new_h) == patch.dimensions() {
        canvas::blend_over(layer, patch, x, y, opacity);
    } else {
        let scaled = imageops::resize(patch, new_w, new_h, FilterType::Triangle);
        canvas::blend_over(layer, &scaled, x, y, opacity);
    }
}

/// Opaque pixel count, handy for checking what a layer covers.
pub fn coverage(image: &RgbaImage) -> usize {
    image.pixels().filter(|p: &&Rgba<u8>| p[3] > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{LabelUpdate, MotionHistoryEntry, MotionStore, ReplayEntry, TrajectoryPoint};
    use std::sync::Arc;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn record(store: &MotionStore, frame: FrameIndex, anchor: BoundingBox) {
        let patch = Arc::new(RgbaImage::from_pixel(
            anchor.width() as u32,
            anchor.height() as u32,
            GREEN,
        ));
        store.commit(vec![LabelUpdate {
            label: "cup".to_string(),
            colour: Rgba([255, 0, 0, 255]),
            history: Some(MotionHistoryEntry {
                frame,
                patch: Arc::new(RgbaImage::from_pixel(
                    anchor.width() as u32 + 4,
                    anchor.height() as u32,
                    Rgba([90, 90, 90, 255]),
                )),
                origin: (anchor.x1 - 4, anchor.y1),
                anchor,
            }),
            trajectory: Some(TrajectoryPoint {
                frame,
                centroid: (anchor.x1 + anchor.width() / 2, anchor.y1 + anchor.height() / 2),
                anchor,
            }),
            replay: Some(ReplayEntry {
                frame,
                raw: Arc::clone(&patch),
                gray: patch,
                anchor,
            }),
        }]);
    }

    #[test]
    fn test_replay_patch_scaled_onto_target_box() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("cup", BoundingBox::new(40, 30, 60, 50))];

        let frames = Compositor::default().compose(&store.snapshot(), &placements, (100, 80));
        assert_eq!(frames.len(), 1);
        let replay = &frames[0].replay;
        assert_eq!(*replay.get_pixel(40, 30), GREEN);
        assert_eq!(*replay.get_pixel(59, 49), GREEN);
        assert_eq!(replay.get_pixel(39, 30)[3], 0);
        assert_eq!(coverage(replay), 400);
    }

    #[test]
    fn test_history_keeps_scaled_offset_from_anchor() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("cup", BoundingBox::new(40, 30, 60, 50))];

        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (100, 80), 0);
        // Patch started 4 px left of the anchor; at 2x it starts 8 px left of the target.
        assert_eq!(frame.history.get_pixel(32, 30)[3], 255);
        assert_eq!(frame.history.get_pixel(31, 30)[3], 0);
        assert_eq!(coverage(&frame.history), 28 * 20);
    }

    #[test]
    fn test_layer_order_replay_on_top() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("cup", BoundingBox::new(10, 10, 20, 20))];
        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (64, 64), 0);

        assert_eq!(*frame.combined.get_pixel(12, 12), GREEN);
        // History shows where the replay does not cover it.
        assert_eq!(*frame.combined.get_pixel(7, 12), Rgba([90, 90, 90, 255]));
        assert_eq!(*frame.per_label["cup"].get_pixel(12, 12), GREEN);
    }

    #[test]
    fn test_clipping_at_canvas_edge() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("cup", BoundingBox::new(-5, 58, 5, 68))];
        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (64, 64), 0);
        assert_eq!(coverage(&frame.replay), 5 * 6);
    }

    #[test]
    fn test_missing_entry_falls_back_one_frame() {
        let store = MotionStore::new(10);
        record(&store, 3, BoundingBox::new(10, 10, 20, 20));
        record(&store, 6, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("cup", BoundingBox::new(10, 10, 20, 20))];
        let snapshot = store.snapshot();
        let compositor = Compositor::default();

        assert_eq!(coverage(&compositor.compose_frame(&snapshot, &placements, (64, 64), 4).replay), 100);
        assert_eq!(coverage(&compositor.compose_frame(&snapshot, &placements, (64, 64), 5).replay), 0);
        assert_eq!(compositor.compose(&snapshot, &placements, (64, 64)).len(), 4);
    }

    #[test]
    fn test_unplaced_or_unknown_labels_are_skipped() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        let placements = [Placement::new("hat", BoundingBox::new(10, 10, 20, 20))];
        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (64, 64), 0);
        assert_eq!(coverage(&frame.combined), 0);
        assert!(frame.per_label.is_empty());
    }

    #[test]
    fn test_trajectory_drawn_with_label_colour() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        record(&store, 1, BoundingBox::new(30, 10, 40, 20));
        let placements = [Placement::new("cup", BoundingBox::new(30, 10, 40, 20))];
        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (64, 64), 1);
        // Segment between the mapped centroids (15, 15) and (35, 15).
        assert_eq!(*frame.trajectory.get_pixel(25, 15), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_trajectory_dots_and_head_marker() {
        let store = MotionStore::new(10);
        record(&store, 0, BoundingBox::new(10, 10, 20, 20));
        record(&store, 1, BoundingBox::new(30, 10, 40, 20));
        let placements = [Placement::new("cup", BoundingBox::new(30, 10, 40, 20))];
        let frame = Compositor::default().compose_frame(&store.snapshot(), &placements, (64, 64), 1);
        let red = Rgba([255, 0, 0, 255]);

        // Dot of radius 3 on the older point (15, 15).
        assert_eq!(*frame.trajectory.get_pixel(15, 18), red);
        assert_eq!(frame.trajectory.get_pixel(15, 19)[3], 0);
        // 13 px square outline around the latest point (35, 15).
        assert_eq!(*frame.trajectory.get_pixel(41, 15), red);
        assert_eq!(*frame.trajectory.get_pixel(29, 21), red);
        assert_eq!(frame.trajectory.get_pixel(38, 18)[3], 0);
        assert_eq!(frame.trajectory.get_pixel(42, 15)[3], 0);
    }

    #[test]
    fn test_thick_stroke_covers_both_sides() {
        let mut layer = RgbaImage::new(20, 20);
        let colour = Rgba([0, 0, 255, 255]);
        stroke(&mut layer, (2, 10), (17, 10), colour, stroke_radius(5));
        assert_eq!(*layer.get_pixel(9, 8), colour);
        assert_eq!(*layer.get_pixel(9, 12), colour);
        assert_eq!(layer.get_pixel(9, 13)[3], 0);
    }
}
