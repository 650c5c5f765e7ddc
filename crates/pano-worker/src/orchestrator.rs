//! Detection pipeline orchestrator.
//!
//! Pops stabilized frames from the [`FrameQueue`], runs the detector on a
//! blocking thread, applies the suppression rules against the latest
//! saliency map, stores the survivors and then waits for the motion worker
//! to commit the frame before taking the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pano_media::detection::suppress;
use pano_media::{metrics, DetectedObject, DetectionStore, Frame, ObjectDetector, SuppressionConfig};
use pano_models::FrameIndex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::motion_task::{self, MotionJob};
use crate::queue::FrameQueue;
use crate::saliency::SaliencyMap;

/// Index of the frame the orchestrator is working on.
#[derive(Debug, Clone, Default)]
pub struct FrameCursor(Arc<AtomicU64>);

impl FrameCursor {
    pub fn get(&self) -> FrameIndex {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, index: FrameIndex) {
        self.0.store(index, Ordering::SeqCst);
    }
}

pub struct DetectionOrchestrator {
    detector: Arc<dyn ObjectDetector>,
    config: SuppressionConfig,
    queue: Arc<FrameQueue>,
    store: Arc<DetectionStore>,
    saliency: watch::Receiver<Option<SaliencyMap>>,
    cursor: FrameCursor,
    motion: mpsc::Sender<MotionJob>,
    shutdown: watch::Receiver<bool>,
}

impl DetectionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        config: SuppressionConfig,
        queue: Arc<FrameQueue>,
        store: Arc<DetectionStore>,
        saliency: watch::Receiver<Option<SaliencyMap>>,
        cursor: FrameCursor,
        motion: mpsc::Sender<MotionJob>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            detector,
            config,
            queue,
            store,
            saliency,
            cursor,
            motion,
            shutdown,
        }
    }

    /// Loop until shutdown, or until the queue is closed and drained.
    pub async fn run(mut self) -> WorkerResult<()> {
        info!(detector = self.detector.name(), health = %self.detector.health(), "Detection orchestrator started");
        let queue = Arc::clone(&self.queue);
        let mut processed = 0usize;

        while let Some(frame) = queue.pop_ready(&mut self.shutdown).await {
            self.cursor.set(frame.index);
            let objects = self.detect(&frame).await?;
            let report = motion_task::submit(&self.motion, frame, objects).await?;
            processed += 1;
            debug!(frame = report.frame, labels = report.labels.len(), skipped = report.skipped, "Frame committed");
        }
        info!(processed, "Detection orchestrator stopped");
        Ok(())
    }

    /// Detect, suppress and store one frame's objects.
    pub async fn detect(&self, frame: &Frame) -> WorkerResult<Arc<Vec<DetectedObject>>> {
        let start = Instant::now();
        let detector = Arc::clone(&self.detector);
        let image = Arc::clone(&frame.image);
        let raw = tokio::task::spawn_blocking(move || detector.detect(&image)).await??;

        self.store.record_labels(raw.iter().map(|d| d.label.as_str()));

        let saliency = self.saliency.borrow().clone();
        if let Some(map) = &saliency {
            if map.map.dimensions() != frame.image.dimensions() {
                warn!(
                    frame = frame.index,
                    saliency_frame = map.frame,
                    "Saliency map size differs from viewport"
                );
            }
        }
        let (kept, report) = suppress(raw, saliency.as_ref().map(|s| s.map.as_ref()), &self.config);
        metrics::record_detection(start.elapsed().as_secs_f64(), &report);
        debug!(
            frame = frame.index,
            total = report.total,
            kept = report.kept,
            duplicate = report.duplicate,
            static_label = report.static_label,
            non_salient = report.non_salient,
            "Detections suppressed"
        );

        let objects = kept
            .into_iter()
            .map(|raw| DetectedObject::from_raw(raw, frame.index))
            .collect();
        Ok(self.store.insert(frame.index, objects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use pano_media::{MediaResult, RawDetection};
    use std::sync::Mutex;

    fn rect(label: &str, confidence: f32, x1: u32, y1: u32, x2: u32, y2: u32) -> RawDetection {
        let mask = GrayImage::from_fn(32, 32, |x, y| {
            if x >= x1 && x < x2 && y >= y1 && y < y2 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        RawDetection {
            mask,
            label: label.to_string(),
            confidence,
            bbox: [x1 as f32, y1 as f32, x2 as f32, y2 as f32],
        }
    }

    /// Same detections for every frame.
    struct ScriptedDetector(Vec<RawDetection>);

    impl ObjectDetector for ScriptedDetector {
        fn name(&self) -> &str {
            "scripted"
        }

        fn detect(&self, _image: &RgbImage) -> MediaResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct Harness {
        queue: Arc<FrameQueue>,
        store: Arc<DetectionStore>,
        saliency: watch::Sender<Option<SaliencyMap>>,
        jobs: mpsc::Receiver<MotionJob>,
        orchestrator: DetectionOrchestrator,
        _shutdown: watch::Sender<bool>,
    }

    fn harness(detections: Vec<RawDetection>) -> Harness {
        let queue = Arc::new(FrameQueue::new());
        let store = Arc::new(DetectionStore::new());
        let (saliency, saliency_rx) = watch::channel(None);
        let (motion_tx, jobs) = mpsc::channel(1);
        let (shutdown_tx, shutdown) = watch::channel(false);
        let orchestrator = DetectionOrchestrator::new(
            Arc::new(ScriptedDetector(detections)),
            SuppressionConfig::default(),
            Arc::clone(&queue),
            Arc::clone(&store),
            saliency_rx,
            FrameCursor::default(),
            motion_tx,
            shutdown,
        );
        Harness {
            queue,
            store,
            saliency,
            jobs,
            orchestrator,
            _shutdown: shutdown_tx,
        }
    }

    fn frame(index: FrameIndex) -> Frame {
        Frame::new(index, RgbImage::new(32, 32))
    }

    #[tokio::test]
    async fn test_suppression_rules_applied() {
        let h = harness(vec![
            rect("cup", 80.0, 0, 0, 10, 10),
            rect("cup", 60.0, 10, 10, 20, 20),
            rect("desk", 95.0, 0, 20, 32, 32),
            rect("book", 70.0, 20, 0, 30, 10),
        ]);
        let objects = h.orchestrator.detect(&frame(0)).await.unwrap();

        let kept: Vec<(&str, f32)> = objects.iter().map(|o| (o.label.as_str(), o.confidence)).collect();
        assert_eq!(kept, vec![("cup", 80.0), ("book", 70.0)]);
        assert_eq!(h.store.labels(), vec!["book", "cup", "desk"]);
        assert_eq!(h.store.get(0).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_saliency_map_gates_detections() {
        let h = harness(vec![rect("cup", 80.0, 0, 0, 10, 10), rect("book", 70.0, 20, 0, 30, 10)]);
        let map = GrayImage::from_fn(32, 32, |x, _| if x < 16 { Luma([200]) } else { Luma([0]) });
        h.saliency.send_replace(Some(SaliencyMap {
            frame: 0,
            map: Arc::new(map),
        }));

        let objects = h.orchestrator.detect(&frame(3)).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].label, "cup");
        assert_eq!(objects[0].frame_index, 3);
    }

    #[tokio::test]
    async fn test_frames_handed_to_motion_in_order() {
        let Harness {
            queue,
            store,
            mut jobs,
            orchestrator,
            _shutdown,
            ..
        } = harness(vec![rect("cup", 80.0, 0, 0, 10, 10)]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let motion = {
            let seen = Arc::clone(&seen);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                while let Some(job) = jobs.recv().await {
                    // Detections must be stored before the motion step runs.
                    assert!(store.get(job.frame.index).is_some());
                    seen.lock().unwrap().push(job.frame.index);
                    let report = pano_media::MotionFrameReport {
                        frame: job.frame.index,
                        labels: Vec::new(),
                        skipped: false,
                        object_mask: RgbImage::new(1, 1),
                        trail: RgbImage::new(1, 1),
                        history: None,
                    };
                    job.done.send(Ok(report)).unwrap();
                }
            })
        };

        for i in 0..4 {
            queue.push(frame(i));
        }
        queue.close();
        orchestrator.run().await.unwrap();
        motion.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(store.frame_count(), 4);
    }
}
