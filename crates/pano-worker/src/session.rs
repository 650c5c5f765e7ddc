//! Tracking session state, driven by control commands.

use std::collections::VecDeque;

use pano_models::{RunMode, SessionId, SessionState};
use tracing::{debug, warn};

use crate::logging::SessionLogger;

/// State of one run plus its queue of replay images.
///
/// Transitions:
/// `Idle → Marked` on calibration, `Marked → Tracking → Marked` around a
/// tracking period, `→ Replaying` on replay, back to `Marked` once every
/// replay image has been received.
#[derive(Debug)]
pub struct TrackingSession {
    id: SessionId,
    mode: RunMode,
    state: SessionState,
    replay_queue: VecDeque<Vec<u8>>,
    logger: SessionLogger,
}

impl TrackingSession {
    pub fn new(mode: RunMode) -> Self {
        let id = SessionId::new();
        let logger = SessionLogger::new(&id, mode);
        Self {
            id,
            mode,
            state: SessionState::Idle,
            replay_queue: VecDeque::new(),
            logger,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    fn transition(&mut self, allowed: &[SessionState], to: SessionState, event: &str) -> bool {
        if !allowed.contains(&self.state) {
            warn!(
                session_id = %self.id,
                state = %self.state,
                event,
                "Ignoring event in current state"
            );
            return false;
        }
        debug!(session_id = %self.id, from = %self.state, to = %to, event, "Session transition");
        self.state = to;
        true
    }

    /// A viewport offset was calibrated.
    pub fn mark(&mut self) -> bool {
        self.transition(
            &[SessionState::Idle, SessionState::Marked],
            SessionState::Marked,
            "mark",
        )
    }

    pub fn start_tracking(&mut self) -> bool {
        self.transition(&[SessionState::Marked], SessionState::Tracking, "start_tracking")
    }

    pub fn finish_tracking(&mut self) -> bool {
        self.transition(&[SessionState::Tracking], SessionState::Marked, "finish_tracking")
    }

    /// Queue composited PNGs for `RECEIVE`; replaces any earlier replay.
    pub fn begin_replay(&mut self, images: Vec<Vec<u8>>) -> bool {
        let started = self.transition(
            &[
                SessionState::Marked,
                SessionState::Tracking,
                SessionState::Replaying,
            ],
            SessionState::Replaying,
            "start_replay",
        );
        if started {
            self.replay_queue = images.into();
        }
        started
    }

    /// Next replay image. `None` once drained, which ends the replay.
    pub fn next_replay_image(&mut self) -> Option<Vec<u8>> {
        if self.state != SessionState::Replaying {
            return None;
        }
        let image = self.replay_queue.pop_front();
        if image.is_none() {
            self.transition(&[SessionState::Replaying], SessionState::Marked, "replay_drained");
        }
        image
    }

    pub fn replay_pending(&self) -> usize {
        self.replay_queue.len()
    }
}
