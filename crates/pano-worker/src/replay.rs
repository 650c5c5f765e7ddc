//! Replay: one placement pass on the output frame, then the compositor
//! over everything the motion store recorded.

use std::sync::Arc;

use image::RgbImage;
use pano_media::detection::suppress_duplicates;
use pano_media::{
    encode_png, metrics, CompositeFrame, Compositor, MotionSnapshot, ObjectDetector, OutputKind,
    OutputLayout, Placement,
};
use pano_models::BoundingBox;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Default)]
pub struct ReplayOutput {
    pub placements: Vec<Placement>,
    /// Combined frames as PNG, in frame order.
    pub images: Vec<Vec<u8>>,
}

pub struct ReplayBuilder {
    detector: Arc<dyn ObjectDetector>,
    compositor: Compositor,
    output: Option<Arc<OutputLayout>>,
}

impl ReplayBuilder {
    pub fn new(detector: Arc<dyn ObjectDetector>, compositor: Compositor, output: Option<Arc<OutputLayout>>) -> Self {
        Self {
            detector,
            compositor,
            output,
        }
    }

    /// Where each label sits in `frame`; one box per label.
    pub fn placements(&self, frame: &RgbImage) -> WorkerResult<Vec<Placement>> {
        let detections = suppress_duplicates(self.detector.detect(frame)?);
        Ok(detections
            .into_iter()
            .map(|d| Placement::new(d.label, BoundingBox::from_xyxy(d.bbox)))
            .collect())
    }

    /// Compose, persist and encode the replay. Blocking.
    pub fn build(&self, frame: &RgbImage, snapshot: &MotionSnapshot) -> WorkerResult<ReplayOutput> {
        if snapshot.is_empty() {
            info!("Nothing recorded, replay is empty");
            return Ok(ReplayOutput::default());
        }
        let placements = self.placements(frame)?;
        let composites = self.compositor.compose(snapshot, &placements, frame.dimensions());

        let mut images = Vec::with_capacity(composites.len());
        for composite in &composites {
            self.persist(composite)?;
            images.push(encode_png(&composite.combined)?);
        }
        metrics::record_replay_frames(images.len());
        info!(
            frames = images.len(),
            placed = placements.len(),
            labels = snapshot.labels().len(),
            "Replay composed"
        );
        Ok(ReplayOutput { placements, images })
    }

    fn persist(&self, composite: &CompositeFrame) -> WorkerResult<()> {
        let Some(layout) = self.output.as_deref() else {
            return Ok(());
        };
        let index = composite.index;
        let layers = [
            (OutputKind::Visualization, &composite.combined),
            (OutputKind::MotionHistory, &composite.history),
            (OutputKind::MotionLine, &composite.trajectory),
            (OutputKind::Replay, &composite.replay),
            (OutputKind::GrayReplay, &composite.gray_replay),
        ];
        for (kind, image) in layers {
            layout.write(&kind, index, image.clone())?;
        }
        for (label, image) in &composite.per_label {
            layout.write(&OutputKind::LabelVisualization(label.clone()), index, image.clone())?;
        }
        Ok(())
    }
}

/// Image the placement pass runs on: an explicit file, else the last viewport.
pub fn load_replay_frame(
    path: Option<&std::path::Path>,
    last_viewport: Option<&Arc<RgbImage>>,
) -> WorkerResult<RgbImage> {
    if let Some(path) = path {
        return Ok(image::open(path)?.to_rgb8());
    }
    last_viewport
        .map(|frame| frame.as_ref().clone())
        .ok_or_else(|| WorkerError::replay_failed("no viewport frame to place replay on"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use pano_media::{MediaResult, MotionConfig, MotionEngine, MotionStore, RawDetection, Frame, DetectedObject};

    fn rect(label: &str, confidence: f32, x0: u32) -> RawDetection {
        RawDetection {
            mask: GrayImage::from_fn(40, 20, |x, y| {
                if x >= x0 && x < x0 + 8 && (4..12).contains(&y) {
                    Luma([255])
                } else {
                    Luma([0])
                }
            }),
            label: label.to_string(),
            confidence,
            bbox: [x0 as f32, 4.0, (x0 + 8) as f32, 12.0],
        }
    }

    struct FixedDetector(Vec<RawDetection>);

    impl ObjectDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    fn recorded_snapshot() -> MotionSnapshot {
        let store = Arc::new(MotionStore::new(10));
        let mut engine = MotionEngine::new(MotionConfig::default(), Arc::clone(&store));
        for index in 0..3u64 {
            let x0 = 2 + 4 * index as u32;
            let image = RgbImage::from_fn(40, 20, |x, y| {
                if x >= x0 && x < x0 + 8 && (4..12).contains(&y) {
                    image::Rgb([200, 40, 40])
                } else {
                    image::Rgb([20, 20, 20])
                }
            });
            let object = DetectedObject::from_raw(rect("cup", 90.0, x0), index);
            engine.process(&Frame::new(index, image), &[object]).unwrap();
        }
        store.snapshot()
    }

    #[test]
    fn test_placements_keep_best_box_per_label() {
        let builder = ReplayBuilder::new(
            Arc::new(FixedDetector(vec![rect("cup", 50.0, 0), rect("cup", 90.0, 20)])),
            Compositor::default(),
            None,
        );
        let placements = builder.placements(&RgbImage::new(40, 20)).unwrap();
        assert_eq!(placements, vec![Placement::new("cup", BoundingBox::new(20, 4, 28, 12))]);
    }

    #[test]
    fn test_build_persists_every_layer() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(OutputLayout::new(dir.path()));
        let builder = ReplayBuilder::new(
            Arc::new(FixedDetector(vec![rect("cup", 90.0, 20)])),
            Compositor::default(),
            Some(Arc::clone(&layout)),
        );

        let output = builder.build(&RgbImage::new(40, 20), &recorded_snapshot()).unwrap();
        assert_eq!(output.images.len(), 3);
        for kind in [
            OutputKind::Visualization,
            OutputKind::MotionHistory,
            OutputKind::MotionLine,
            OutputKind::Replay,
            OutputKind::GrayReplay,
            OutputKind::LabelVisualization("cup".to_string()),
        ] {
            assert_eq!(layout.written_indices(&kind).unwrap(), vec![0, 1, 2], "{kind:?}");
        }
    }

    #[test]
    fn test_empty_snapshot_yields_no_images() {
        let builder = ReplayBuilder::new(Arc::new(FixedDetector(Vec::new())), Compositor::default(), None);
        let output = builder.build(&RgbImage::new(4, 4), &MotionSnapshot::default()).unwrap();
        assert!(output.images.is_empty());
    }

    #[test]
    fn test_replay_frame_falls_back_to_last_viewport() {
        let last = Arc::new(RgbImage::new(6, 3));
        assert_eq!(load_replay_frame(None, Some(&last)).unwrap().dimensions(), (6, 3));
        assert!(load_replay_frame(None, None).is_err());
    }
}
