use pano_models::FrameIndex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::DetectedObject;

#[derive(Debug, Default)]
struct Inner {
    frames: BTreeMap<FrameIndex, Arc<Vec<DetectedObject>>>,
    labels_seen: BTreeSet<String>,
}

/// Surviving detections keyed by frame index, plus every label the
/// detector has ever reported.
///
/// The detection orchestrator is the only writer.
#[derive(Debug, Default)]
pub struct DetectionStore {
    inner: RwLock<Inner>,
}

impl DetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record labels as reported by the detector, before suppression.
    pub fn record_labels<'a>(&self, labels: impl IntoIterator<Item = &'a str>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for label in labels {
            if !inner.labels_seen.contains(label) {
                inner.labels_seen.insert(label.to_string());
            }
        }
    }

    pub fn insert(&self, frame: FrameIndex, objects: Vec<DetectedObject>) -> Arc<Vec<DetectedObject>> {
        let objects = Arc::new(objects);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.frames.insert(frame, Arc::clone(&objects));
        objects
    }

    pub fn get(&self, frame: FrameIndex) -> Option<Arc<Vec<DetectedObject>>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.frames.get(&frame).cloned()
    }

    /// Sorted labels seen so far.
    pub fn labels(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.labels_seen.iter().cloned().collect()
    }

    pub fn latest_frame(&self) -> Option<FrameIndex> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.frames.keys().next_back().copied()
    }

    pub fn frame_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_support::rect_detection;

    #[test]
    fn test_insert_and_labels() {
        let store = DetectionStore::new();
        store.record_labels(["cup", "desk", "cup"]);
        let obj = DetectedObject::from_raw(rect_detection("cup", 80.0, [0, 0, 2, 2], 4, 4), 5);
        store.insert(5, vec![obj]);
        store.insert(2, Vec::new());

        assert_eq!(store.labels(), vec!["cup".to_string(), "desk".to_string()]);
        assert_eq!(store.get(5).map(|v| v.len()), Some(1));
        assert!(store.get(3).is_none());
        assert_eq!(store.latest_frame(), Some(5));
        assert_eq!(store.frame_count(), 2);
    }
}
