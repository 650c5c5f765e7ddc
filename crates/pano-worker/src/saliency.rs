//! Single-flight temporal saliency.
//!
//! Stabilized viewports are collected, downscaled, into a fixed-length
//! window. A full window starts one computation on a blocking thread; frames
//! arriving while it runs are ignored. The finished heatmap is tagged with
//! the orchestrator's current frame and published to the suppression rules.

use std::sync::Arc;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use pano_media::{metrics, OutputKind, OutputLayout, SaliencyConfig, SaliencyModel};
use pano_models::FrameIndex;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, trace};

use crate::error::WorkerResult;
use crate::orchestrator::FrameCursor;

/// A published heatmap at viewport size.
#[derive(Debug, Clone)]
pub struct SaliencyMap {
    /// Frame the orchestrator was on when the map finished.
    pub frame: FrameIndex,
    pub map: Arc<GrayImage>,
}

/// Frames gathered for the next computation.
#[derive(Debug)]
pub struct SaliencyWindow {
    frames: Vec<RgbImage>,
    len: usize,
    input_size: (u32, u32),
    view_size: Option<(u32, u32)>,
    busy: bool,
}

impl SaliencyWindow {
    pub fn new(config: &SaliencyConfig) -> Self {
        Self {
            frames: Vec::with_capacity(config.window_len),
            len: config.window_len.max(1),
            input_size: (config.input_width, config.input_height),
            view_size: None,
            busy: false,
        }
    }

    /// Add a frame; returns the whole window when this frame fills it.
    ///
    /// While a computation is in flight frames are dropped.
    pub fn offer(&mut self, frame: &RgbImage) -> Option<Vec<RgbImage>> {
        if self.busy {
            return None;
        }
        self.view_size = Some(frame.dimensions());
        let (w, h) = self.input_size;
        self.frames.push(imageops::resize(frame, w, h, FilterType::Triangle));
        if self.frames.len() < self.len {
            return None;
        }
        self.busy = true;
        Some(std::mem::take(&mut self.frames))
    }

    /// The in-flight computation is over; start collecting again.
    pub fn finish(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Size of the most recent viewport.
    pub fn view_size(&self) -> Option<(u32, u32)> {
        self.view_size
    }
}

/// Blur, stretch to a 0–255 range and resize to the viewport.
pub fn postprocess(raw: &GrayImage, blur_sigma: f32, (width, height): (u32, u32)) -> GrayImage {
    let blurred = if blur_sigma > 0.0 {
        imageops::blur(raw, blur_sigma)
    } else {
        raw.clone()
    };
    let max = blurred.pixels().map(|p| p[0]).max().unwrap_or(0);
    let normalised = if max == 0 {
        blurred
    } else {
        GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
            let v = blurred.get_pixel(x, y)[0] as u32 * 255 / max as u32;
            Luma([v as u8])
        })
    };
    if normalised.dimensions() == (width, height) {
        normalised
    } else {
        imageops::resize(&normalised, width, height, FilterType::Triangle)
    }
}

pub struct SaliencyWorker {
    model: Arc<dyn SaliencyModel>,
    config: SaliencyConfig,
    frames: mpsc::Receiver<Arc<RgbImage>>,
    publish: watch::Sender<Option<SaliencyMap>>,
    cursor: FrameCursor,
    output: Option<Arc<OutputLayout>>,
    shutdown: watch::Receiver<bool>,
}

impl SaliencyWorker {
    pub fn new(
        model: Arc<dyn SaliencyModel>,
        config: SaliencyConfig,
        frames: mpsc::Receiver<Arc<RgbImage>>,
        publish: watch::Sender<Option<SaliencyMap>>,
        cursor: FrameCursor,
        output: Option<Arc<OutputLayout>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            model,
            config,
            frames,
            publish,
            cursor,
            output,
            shutdown,
        }
    }

    /// Run until the frame channel closes or shutdown is signalled; a
    /// computation still in flight is awaited and published first.
    pub async fn run(self) -> WorkerResult<()> {
        let SaliencyWorker {
            model,
            config,
            mut frames,
            publish,
            cursor,
            output,
            mut shutdown,
        } = self;
        info!(model = model.name(), health = %model.health(), window = config.window_len, "Saliency worker started");

        let mut window = SaliencyWindow::new(&config);
        let mut in_flight: Option<JoinHandle<WorkerResult<SaliencyMap>>> = None;

        loop {
            tokio::select! {
                result = wait_for(&mut in_flight) => {
                    in_flight = None;
                    window.finish();
                    publish.send_replace(Some(result??));
                }
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    match window.offer(&frame) {
                        Some(batch) => {
                            let view_size = window.view_size().unwrap_or(frame.dimensions());
                            in_flight = Some(spawn_computation(
                                Arc::clone(&model),
                                batch,
                                config.blur_sigma,
                                view_size,
                                cursor.clone(),
                                output.clone(),
                            ));
                        }
                        None if window.is_busy() => trace!("Saliency busy, frame ignored"),
                        None => {}
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            publish.send_replace(Some(handle.await??));
        }
        debug!(pending = window.pending(), "Saliency worker stopped");
        Ok(())
    }
}

async fn wait_for<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn spawn_computation(
    model: Arc<dyn SaliencyModel>,
    batch: Vec<RgbImage>,
    blur_sigma: f32,
    view_size: (u32, u32),
    cursor: FrameCursor,
    output: Option<Arc<OutputLayout>>,
) -> JoinHandle<WorkerResult<SaliencyMap>> {
    tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let raw = model.score(&batch)?;
        let map = postprocess(&raw, blur_sigma, view_size);
        let frame = cursor.get();
        if let Some(layout) = output.as_deref() {
            layout.write(&OutputKind::SaliencyMap, frame, map.clone())?;
        }
        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_saliency_run(elapsed);
        debug!(frame, window = batch.len(), elapsed, "Saliency map published");
        Ok(SaliencyMap {
            frame,
            map: Arc::new(map),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_media::collaborators::fallback::FlatSaliency;
    use pano_media::MediaError;

    fn config(window_len: usize) -> SaliencyConfig {
        SaliencyConfig {
            window_len,
            input_width: 8,
            input_height: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_window_is_single_flight() {
        let mut window = SaliencyWindow::new(&config(3));
        let frame = RgbImage::new(16, 8);

        assert!(window.offer(&frame).is_none());
        assert!(window.offer(&frame).is_none());
        let batch = window.offer(&frame).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].dimensions(), (8, 4));
        assert!(window.is_busy());

        for _ in 0..5 {
            assert!(window.offer(&frame).is_none());
        }
        assert_eq!(window.pending(), 0);

        window.finish();
        assert!(window.offer(&frame).is_none());
        assert_eq!(window.pending(), 1);
        assert_eq!(window.view_size(), Some((16, 8)));
    }

    #[test]
    fn test_postprocess_stretches_and_resizes() {
        let mut raw = GrayImage::new(4, 2);
        raw.put_pixel(1, 0, Luma([40]));
        raw.put_pixel(2, 1, Luma([80]));
        let map = postprocess(&raw, 0.0, (4, 2));
        assert_eq!(map.get_pixel(2, 1)[0], 255);
        assert_eq!(map.get_pixel(1, 0)[0], 127);
        assert_eq!(map.get_pixel(0, 0)[0], 0);

        assert_eq!(postprocess(&raw, 1.0, (20, 10)).dimensions(), (20, 10));
        assert_eq!(postprocess(&GrayImage::new(3, 3), 1.0, (3, 3)), GrayImage::new(3, 3));
    }

    #[tokio::test]
    async fn test_published_map_is_tagged_and_sized() {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (publish, mut maps) = watch::channel(None);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let cursor = FrameCursor::default();
        cursor.set(5);

        let worker = SaliencyWorker::new(
            Arc::new(FlatSaliency { level: 100 }),
            config(2),
            frame_rx,
            publish,
            cursor,
            None,
            shutdown,
        );
        let handle = tokio::spawn(worker.run());

        let frame = Arc::new(RgbImage::new(16, 8));
        frame_tx.send(Arc::clone(&frame)).await.unwrap();
        frame_tx.send(frame).await.unwrap();

        maps.changed().await.unwrap();
        let published = maps.borrow_and_update().clone().unwrap();
        assert_eq!(published.frame, 5);
        assert_eq!(published.map.dimensions(), (16, 8));
        assert!(published.map.pixels().all(|p| p[0] > 240));

        drop(frame_tx);
        handle.await.unwrap().unwrap();
    }

    struct FailingSaliency;

    impl SaliencyModel for FailingSaliency {
        fn name(&self) -> &str {
            "failing"
        }

        fn score(&self, _window: &[RgbImage]) -> pano_media::MediaResult<GrayImage> {
            Err(MediaError::saliency_failed("model crashed"))
        }
    }

    #[tokio::test]
    async fn test_computation_error_stops_worker() {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (publish, _maps) = watch::channel(None);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let worker = SaliencyWorker::new(
            Arc::new(FailingSaliency),
            config(1),
            frame_rx,
            publish,
            FrameCursor::default(),
            None,
            shutdown,
        );
        let handle = tokio::spawn(worker.run());
        frame_tx.send(Arc::new(RgbImage::new(4, 4))).await.unwrap();

        assert!(handle.await.unwrap().is_err());
    }
}
