//! Stabilized-frame queue between the viewport ingest and the detection
//! orchestrator.
//!
//! The consumer only takes a frame while more than one is waiting, so the
//! newest frame always stays pending. Once the queue is closed the remaining
//! frames are drained in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use pano_media::{metrics, Frame};
use tokio::sync::{watch, Notify};

/// Frames held back from the consumer while the queue is open.
const PENDING_RESERVE: usize = 1;

#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        let depth = {
            let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
            frames.push_back(frame);
            frames.len()
        };
        metrics::set_detection_queue_depth(depth);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No more frames will be pushed; the consumer may take the last one.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn try_pop(&self) -> Option<Frame> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let reserve = if self.is_closed() { 0 } else { PENDING_RESERVE };
        if frames.len() > reserve {
            let frame = frames.pop_front();
            metrics::set_detection_queue_depth(frames.len());
            frame
        } else {
            None
        }
    }

    /// Oldest frame once one is ready.
    ///
    /// Returns `None` on shutdown, or when the queue is closed and drained.
    pub async fn pop_ready(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Frame> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if self.is_closed() && self.is_empty() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(2, 2))
    }

    #[test]
    fn test_one_frame_is_left_pending() {
        let queue = FrameQueue::new();
        let (_tx, mut shutdown) = watch::channel(false);

        queue.push(frame(0));
        let mut pop = task::spawn(queue.pop_ready(&mut shutdown));
        assert_pending!(pop.poll());

        queue.push(frame(1));
        assert!(pop.is_woken());
        let popped = assert_ready!(pop.poll()).unwrap();
        assert_eq!(popped.index, 0);
        drop(pop);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_push_wakes_waiting_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let (_tx, mut shutdown) = watch::channel(false);

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop_ready(&mut shutdown).await.map(|f| f.index) })
        };
        tokio::task::yield_now().await;
        queue.push(frame(7));
        queue.push(frame(8));
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_close_drains_in_order() {
        let queue = FrameQueue::new();
        let (_tx, mut shutdown) = watch::channel(false);
        for i in 0..3 {
            queue.push(frame(i));
        }
        queue.close();

        let mut drained = Vec::new();
        while let Some(f) = queue.pop_ready(&mut shutdown).await {
            drained.push(f.index);
        }
        assert_eq!(drained, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let (tx, mut shutdown) = watch::channel(false);
        queue.push(frame(0));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop_ready(&mut shutdown).await })
        };
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        assert!(consumer.await.unwrap().is_none());
    }
}
