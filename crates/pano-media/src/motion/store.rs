use image::{Rgba, RgbaImage};
use pano_models::{BoundingBox, FrameIndex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

/// A cropped motion-history patch.
#[derive(Debug, Clone)]
pub struct MotionHistoryEntry {
    pub frame: FrameIndex,
    pub patch: Arc<RgbaImage>,
    /// Viewport `(x, y)` of the patch's top-left corner.
    pub origin: (i32, i32),
    /// The label's box in the frame the patch was captured from.
    pub anchor: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub frame: FrameIndex,
    /// Mask centroid `(x, y)` in viewport pixels.
    pub centroid: (i32, i32),
    pub anchor: BoundingBox,
}

/// Masked object pixels, as captured and in grayscale.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub frame: FrameIndex,
    pub raw: Arc<RgbaImage>,
    pub gray: Arc<RgbaImage>,
    pub anchor: BoundingBox,
}

/// Everything recorded for one label.
#[derive(Debug, Clone)]
pub struct LabelTrack {
    /// Fixed at first sighting.
    pub colour: Rgba<u8>,
    /// Most recent entries only, oldest first.
    pub history: VecDeque<MotionHistoryEntry>,
    /// Append-only, in frame order.
    pub trajectory: Vec<TrajectoryPoint>,
    /// Whole session.
    pub replay: BTreeMap<FrameIndex, ReplayEntry>,
}

impl LabelTrack {
    fn new(colour: Rgba<u8>) -> Self {
        Self {
            colour,
            history: VecDeque::new(),
            trajectory: Vec::new(),
            replay: BTreeMap::new(),
        }
    }

    /// History entry for `frame`, falling back to `frame − 1`.
    pub fn history_at(&self, frame: FrameIndex) -> Option<&MotionHistoryEntry> {
        let find = |f: FrameIndex| self.history.iter().find(|e| e.frame == f);
        find(frame).or_else(|| frame.checked_sub(1).and_then(find))
    }

    /// Replay entry for `frame`, falling back to `frame − 1`.
    pub fn replay_at(&self, frame: FrameIndex) -> Option<&ReplayEntry> {
        self.replay
            .get(&frame)
            .or_else(|| frame.checked_sub(1).and_then(|f| self.replay.get(&f)))
    }

    /// Trajectory up to and including `frame`.
    pub fn trajectory_until(&self, frame: FrameIndex) -> &[TrajectoryPoint] {
        let end = self.trajectory.partition_point(|p| p.frame <= frame);
        &self.trajectory[..end]
    }

    fn frames(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.replay
            .keys()
            .copied()
            .chain(self.history.iter().map(|e| e.frame))
            .chain(self.trajectory.iter().map(|p| p.frame))
    }
}

/// One label's contribution from one frame.
#[derive(Debug, Clone)]
pub struct LabelUpdate {
    pub label: String,
    /// Used only if the label has no colour yet.
    pub colour: Rgba<u8>,
    pub history: Option<MotionHistoryEntry>,
    pub trajectory: Option<TrajectoryPoint>,
    pub replay: Option<ReplayEntry>,
}

/// Immutable copy of the store; patches are shared, not copied.
#[derive(Debug, Clone, Default)]
pub struct MotionSnapshot {
    pub tracks: BTreeMap<String, LabelTrack>,
}

impl MotionSnapshot {
    pub fn track(&self, label: &str) -> Option<&LabelTrack> {
        self.tracks.get(label)
    }

    pub fn labels(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    /// First and last frame with any recorded data.
    pub fn frame_range(&self) -> Option<(FrameIndex, FrameIndex)> {
        let mut frames = self.tracks.values().flat_map(LabelTrack::frames);
        let first = frames.next()?;
        Some(frames.fold((first, first), |(lo, hi), f| (lo.min(f), hi.max(f))))
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Per-label motion state, written only by the motion engine.
#[derive(Debug)]
pub struct MotionStore {
    inner: RwLock<MotionSnapshot>,
    retention: usize,
}

impl MotionStore {
    /// `retention` bounds the motion-history entries kept per label.
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(MotionSnapshot::default()),
            retention: retention.max(1),
        }
    }

    /// Apply one frame's updates under a single write lock.
    pub fn commit(&self, updates: Vec<LabelUpdate>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for update in updates {
            let track = inner
                .tracks
                .entry(update.label)
                .or_insert_with(|| LabelTrack::new(update.colour));
            if let Some(entry) = update.history {
                track.history.push_back(entry);
                while track.history.len() > self.retention {
                    track.history.pop_front();
                }
            }
            if let Some(point) = update.trajectory {
                track.trajectory.push(point);
            }
            if let Some(entry) = update.replay {
                track.replay.insert(entry.frame, entry);
            }
        }
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Visit every label's trajectory under the read lock, without copying.
    pub fn for_each_trajectory(&self, mut visit: impl FnMut(&str, &[TrajectoryPoint])) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        for (label, track) in &inner.tracks {
            visit(label, &track.trajectory);
        }
    }

    /// Colour already assigned to `label`.
    pub fn colour_of(&self, label: &str) -> Option<Rgba<u8>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.tracks.get(label).map(|t| t.colour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(frame: FrameIndex) -> MotionHistoryEntry {
        MotionHistoryEntry {
            frame,
            patch: Arc::new(RgbaImage::new(2, 2)),
            origin: (0, 0),
            anchor: BoundingBox::new(0, 0, 2, 2),
        }
    }

    fn update(label: &str, frame: FrameIndex) -> LabelUpdate {
        LabelUpdate {
            label: label.to_string(),
            colour: Rgba([frame as u8, 0, 0, 255]),
            history: Some(history(frame)),
            trajectory: Some(TrajectoryPoint {
                frame,
                centroid: (frame as i32, 0),
                anchor: BoundingBox::new(0, 0, 2, 2),
            }),
            replay: None,
        }
    }

    #[test]
    fn test_history_is_bounded_and_colour_fixed() {
        let store = MotionStore::new(3);
        for frame in 0..5 {
            store.commit(vec![update("cup", frame)]);
        }
        let snapshot = store.snapshot();
        let track = snapshot.track("cup").unwrap();
        let frames: Vec<_> = track.history.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![2, 3, 4]);
        assert_eq!(track.trajectory.len(), 5);
        assert_eq!(track.colour, Rgba([0, 0, 0, 255]));
        assert_eq!(snapshot.frame_range(), Some((0, 4)));
    }

    #[test]
    fn test_lookup_falls_back_one_frame() {
        let store = MotionStore::new(10);
        store.commit(vec![update("cup", 4)]);
        let snapshot = store.snapshot();
        let track = snapshot.track("cup").unwrap();
        assert_eq!(track.history_at(5).map(|e| e.frame), Some(4));
        assert!(track.history_at(6).is_none());
        assert!(track.history_at(3).is_none());
        assert_eq!(track.trajectory_until(3).len(), 0);
        assert_eq!(track.trajectory_until(4).len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = MotionStore::new(10);
        store.commit(vec![update("cup", 0)]);
        let before = store.snapshot();
        store.commit(vec![update("cup", 1), update("hat", 1)]);
        assert_eq!(before.track("cup").unwrap().trajectory.len(), 1);
        assert!(before.track("hat").is_none());
        assert_eq!(store.snapshot().labels(), vec!["cup".to_string(), "hat".to_string()]);
    }

    #[test]
    fn test_trajectories_visited_in_label_order() {
        let store = MotionStore::new(2);
        store.commit(vec![update("hat", 0)]);
        store.commit(vec![update("cup", 1), update("hat", 1)]);
        store.commit(vec![update("cup", 2)]);

        let mut seen = Vec::new();
        store.for_each_trajectory(|label, points| {
            let frames: Vec<_> = points.iter().map(|p| p.frame).collect();
            seen.push((label.to_string(), frames));
        });
        assert_eq!(
            seen,
            vec![("cup".to_string(), vec![1, 2]), ("hat".to_string(), vec![0, 1])]
        );
    }
}
