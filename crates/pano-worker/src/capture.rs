//! Capture task: pulls equirectangular frames from a [`FrameSource`] on a
//! blocking thread.
//!
//! Live sessions only ever see the newest frame (a `watch` slot that is
//! overwritten); recorded input is delivered frame by frame with
//! backpressure so nothing is skipped.

use std::sync::Arc;

use image::RgbImage;
use pano_media::FrameSource;
use pano_models::RunMode;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::WorkerResult;

/// Producer half, owned by the capture task.
pub enum CaptureSink {
    Latest(watch::Sender<Option<Arc<RgbImage>>>),
    Sequential(mpsc::Sender<Arc<RgbImage>>),
}

/// Consumer half, read by the session loop.
pub enum FrameFeed {
    Latest(watch::Receiver<Option<Arc<RgbImage>>>),
    Sequential(mpsc::Receiver<Arc<RgbImage>>),
}

/// Channel pair suited to `mode`.
pub fn frame_channel(mode: RunMode) -> (CaptureSink, FrameFeed) {
    match mode {
        RunMode::LiveStreaming => {
            let (tx, rx) = watch::channel(None);
            (CaptureSink::Latest(tx), FrameFeed::Latest(rx))
        }
        RunMode::VideoInput => {
            let (tx, rx) = mpsc::channel(1);
            (CaptureSink::Sequential(tx), FrameFeed::Sequential(rx))
        }
    }
}

impl CaptureSink {
    /// Hand over a frame; `false` once the feed is gone.
    ///
    /// Must be called from a blocking thread.
    fn deliver(&self, frame: RgbImage) -> bool {
        match self {
            CaptureSink::Latest(tx) => {
                if tx.is_closed() {
                    return false;
                }
                tx.send_replace(Some(Arc::new(frame)));
                true
            }
            CaptureSink::Sequential(tx) => tx.blocking_send(Arc::new(frame)).is_ok(),
        }
    }
}

impl FrameFeed {
    /// Next frame, or `None` once the capture task is done.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<Arc<RgbImage>> {
        match self {
            FrameFeed::Latest(rx) => {
                rx.changed().await.ok()?;
                rx.borrow_and_update().clone()
            }
            FrameFeed::Sequential(rx) => rx.recv().await,
        }
    }
}

/// Read `source` until it ends, the feed is dropped or shutdown is signalled.
pub async fn run_capture(
    mut source: Box<dyn FrameSource>,
    sink: CaptureSink,
    shutdown: watch::Receiver<bool>,
) -> WorkerResult<()> {
    let delivered = tokio::task::spawn_blocking(move || -> WorkerResult<u64> {
        let mut delivered = 0u64;
        while !*shutdown.borrow() {
            let Some(frame) = source.next_frame()? else {
                debug!("Frame source exhausted");
                break;
            };
            if !sink.deliver(frame) {
                debug!("Frame feed dropped");
                break;
            }
            delivered += 1;
        }
        Ok(delivered)
    })
    .await??;
    info!(delivered, "Capture finished");
    Ok(())
}
