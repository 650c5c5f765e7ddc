//! Session runner.
//!
//! Owns one tracking session end to end: spawns the capture, detection,
//! motion and saliency workers under a [`Supervisor`], feeds captured frames
//! through the viewport ingest while tracking, and answers control commands.
//! Recorded input calibrates on its first usable frame, tracks until the
//! stream ends and then composes the replay.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use image::RgbImage;
use pano_media::collaborators::fallback::{FlatSaliency, NoopDetector, StaticMarker};
use pano_media::{
    Compositor, DetectionStore, EquirectangularView, FrameSource, MarkerLocator, MotionEngine,
    MotionStore, ObjectDetector, OutputLayout, PerspectiveProjector, RoiLocator, SaliencyModel,
    Stabilizer,
};
use pano_models::{Command, RunMode};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn, Instrument};

use crate::capture::{frame_channel, run_capture, FrameFeed};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::ingest::{IngestOutcome, ViewportIngest};
use crate::motion_task::MotionWorker;
use crate::orchestrator::{DetectionOrchestrator, FrameCursor};
use crate::queue::FrameQueue;
use crate::replay::{load_replay_frame, ReplayBuilder};
use crate::saliency::SaliencyWorker;
use crate::session::TrackingSession;
use crate::supervisor::Supervisor;

/// Stabilized frames waiting for the saliency worker.
const SALIENCY_INPUT_BUFFER: usize = 64;

/// The external models a session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn ObjectDetector>,
    pub saliency: Arc<dyn SaliencyModel>,
    pub marker: Arc<dyn MarkerLocator>,
    pub projector: Arc<dyn PerspectiveProjector>,
}

impl Collaborators {
    /// Built-in stand-ins: no detections, uniform saliency and a marker
    /// pinned to `marker`.
    pub fn fallback(marker: (f64, f64)) -> Self {
        Self {
            detector: Arc::new(NoopDetector),
            saliency: Arc::new(FlatSaliency::default()),
            marker: Arc::new(StaticMarker {
                x: marker.0,
                y: marker.1,
            }),
            projector: Arc::new(EquirectangularView),
        }
    }

    fn log_health(&self) {
        for (role, name, health) in [
            ("detector", self.detector.name(), self.detector.health()),
            ("saliency", self.saliency.name(), self.saliency.health()),
        ] {
            match health {
                pano_media::CollaboratorHealth::Ready => debug!(role, name, "Collaborator ready"),
                degraded => warn!(role, name, health = %degraded, "Collaborator degraded, continuing"),
            }
        }
    }
}

/// A control command and where to send its reply.
#[derive(Debug)]
pub struct CommandRequest {
    pub command: Command,
    /// `None` means the command is not answered.
    pub reply: oneshot::Sender<Option<Vec<u8>>>,
}

/// Send `command` to a running session and wait for the reply.
pub async fn send_command(
    commands: &mpsc::Sender<CommandRequest>,
    command: Command,
) -> WorkerResult<Option<Vec<u8>>> {
    let (reply, response) = oneshot::channel();
    commands
        .send(CommandRequest { command, reply })
        .await
        .map_err(|_| WorkerError::channel_closed("session commands"))?;
    response
        .await
        .map_err(|_| WorkerError::channel_closed("command reply"))
}

/// What a finished session did.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub mode: RunMode,
    pub output_root: PathBuf,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub labels: Vec<String>,
    pub replay_frames: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct SessionRunner {
    config: WorkerConfig,
    collaborators: Collaborators,
}

impl SessionRunner {
    pub fn new(config: WorkerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Run until the stream ends, a terminal command arrives or a worker fails.
    pub async fn run(
        self,
        source: Box<dyn FrameSource>,
        commands: mpsc::Receiver<CommandRequest>,
    ) -> WorkerResult<SessionSummary> {
        let session = TrackingSession::new(self.config.mode);
        let span = session.logger().create_span();
        self.run_session(session, source, commands).instrument(span).await
    }

    async fn run_session(
        self,
        session: TrackingSession,
        source: Box<dyn FrameSource>,
        mut commands: mpsc::Receiver<CommandRequest>,
    ) -> WorkerResult<SessionSummary> {
        let started_at = Utc::now();
        let SessionRunner {
            config,
            collaborators,
        } = self;
        let mode = config.mode;
        let logger = session.logger().clone();

        let output_name = mode.output_name(source.stem().as_deref());
        let layout = Arc::new(OutputLayout::new(config.output_dir.join(output_name)));
        layout.create_all()?;
        logger.log_start(&format!("writing to {}", layout.root().display()));
        collaborators.log_health();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sink, mut feed) = frame_channel(mode);
        let queue = Arc::new(FrameQueue::new());
        let (saliency_map_tx, saliency_map_rx) = watch::channel(None);
        let (saliency_frames_tx, saliency_frames_rx) = mpsc::channel(SALIENCY_INPUT_BUFFER);
        let (motion_tx, motion_rx) = mpsc::channel(1);
        let cursor = FrameCursor::default();
        let detections = Arc::new(DetectionStore::new());
        let motion_store = Arc::new(MotionStore::new(config.pipeline.motion.history_retention));

        let mut supervisor = Supervisor::new();
        supervisor.spawn("capture", run_capture(source, sink, shutdown_rx.clone()));
        supervisor.spawn(
            "orchestrator",
            DetectionOrchestrator::new(
                Arc::clone(&collaborators.detector),
                config.pipeline.suppression.clone(),
                Arc::clone(&queue),
                Arc::clone(&detections),
                saliency_map_rx,
                cursor.clone(),
                motion_tx,
                shutdown_rx.clone(),
            )
            .run(),
        );
        supervisor.spawn(
            "motion",
            MotionWorker::new(
                MotionEngine::new(config.pipeline.motion.clone(), Arc::clone(&motion_store)),
                motion_rx,
                Some(Arc::clone(&layout)),
            )
            .run(),
        );
        supervisor.spawn(
            "saliency",
            SaliencyWorker::new(
                Arc::clone(&collaborators.saliency),
                config.pipeline.saliency.clone(),
                saliency_frames_rx,
                saliency_map_tx,
                cursor,
                Some(Arc::clone(&layout)),
                shutdown_rx,
            )
            .run(),
        );

        let locator = RoiLocator::new(
            Arc::clone(&collaborators.marker),
            Arc::clone(&collaborators.projector),
            config.pipeline.viewport.clone(),
        );
        let ingest = ViewportIngest::new(
            locator,
            Stabilizer::new(config.pipeline.stabilizer.clone()),
            config.rotation,
            Some(Arc::clone(&layout)),
        );
        let replay = ReplayBuilder::new(
            Arc::clone(&collaborators.detector),
            Compositor::new(config.pipeline.compositor.clone()),
            Some(Arc::clone(&layout)),
        );

        let mut pipeline = Pipeline {
            session,
            layout,
            ingest: Arc::new(Mutex::new(ingest)),
            queue,
            saliency_frames: Some(saliency_frames_tx),
            detections,
            motion: motion_store,
            replay: Arc::new(replay),
            replay_frame: config.replay_frame.clone(),
            last_raw: None,
            last_view: None,
            replay_frames: 0,
        };

        let outcome = pipeline
            .event_loop(&mut supervisor, &mut feed, &mut commands)
            .await;

        // Stop feeding the workers, then let them drain.
        drop(feed);
        pipeline.queue.close();
        pipeline.saliency_frames = None;
        if outcome.is_err() || mode == RunMode::LiveStreaming {
            let _ = shutdown_tx.send(true);
        }
        let joined = supervisor.join_all().await;

        if let Err(e) = outcome.and(joined) {
            logger.log_error(&e.to_string());
            return Err(e);
        }

        if mode == RunMode::VideoInput {
            pipeline.build_replay().await?;
        }

        let (frames_accepted, frames_dropped) = {
            let ingest = lock(&pipeline.ingest);
            (ingest.accepted(), ingest.dropped())
        };
        let summary = SessionSummary {
            session_id: pipeline.session.id().to_string(),
            mode,
            output_root: pipeline.layout.root().to_path_buf(),
            frames_accepted,
            frames_dropped,
            labels: pipeline.detections.labels(),
            replay_frames: pipeline.replay_frames,
            started_at,
            finished_at: Utc::now(),
        };
        logger.log_completion(&format!(
            "{} frames accepted, {} dropped, {} replay frames",
            summary.frames_accepted, summary.frames_dropped, summary.replay_frames
        ));
        Ok(summary)
    }
}

fn lock(ingest: &Mutex<ViewportIngest>) -> MutexGuard<'_, ViewportIngest> {
    ingest.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-session state the event loop works on.
struct Pipeline {
    session: TrackingSession,
    layout: Arc<OutputLayout>,
    ingest: Arc<Mutex<ViewportIngest>>,
    queue: Arc<FrameQueue>,
    saliency_frames: Option<mpsc::Sender<Arc<RgbImage>>>,
    detections: Arc<DetectionStore>,
    motion: Arc<MotionStore>,
    replay: Arc<ReplayBuilder>,
    replay_frame: Option<PathBuf>,
    last_raw: Option<Arc<RgbImage>>,
    last_view: Option<Arc<RgbImage>>,
    replay_frames: usize,
}

impl Pipeline {
    async fn event_loop(
        &mut self,
        supervisor: &mut Supervisor,
        feed: &mut FrameFeed,
        commands: &mut mpsc::Receiver<CommandRequest>,
    ) -> WorkerResult<()> {
        let mode = self.session.mode();
        let mut commands_open = true;

        loop {
            tokio::select! {
                exit = supervisor.next_exit(), if !supervisor.is_empty() => {
                    match exit {
                        Some(Err(e)) => return Err(e),
                        Some(Ok(worker)) => debug!(worker = %worker, "Worker exited"),
                        None => {}
                    }
                }
                request = commands.recv(), if commands_open => {
                    let Some(CommandRequest { command, reply }) = request else {
                        commands_open = false;
                        if mode == RunMode::LiveStreaming {
                            info!("Command channel closed");
                            return Ok(());
                        }
                        continue;
                    };
                    let response = self.handle_command(command).await?;
                    if reply.send(response).is_err() {
                        debug!(command = command.as_str(), "Reply dropped by requester");
                    }
                    if command.is_terminal() {
                        info!(command = command.as_str(), "Session ending on command");
                        return Ok(());
                    }
                }
                frame = feed.next() => {
                    let Some(frame) = frame else {
                        info!("Frame stream ended");
                        return Ok(());
                    };
                    self.on_frame(frame).await?;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> WorkerResult<Option<Vec<u8>>> {
        debug!(command = command.as_str(), state = %self.session.state(), "Handling command");
        let reply = match command {
            Command::Startup => Some(self.layout.root().display().to_string().into_bytes()),
            Command::Shutdown => Some(b"SHUTDOWN".to_vec()),
            Command::MarkPrimaryRegion => {
                self.mark().await?;
                Some(b"Received_MARK_PRIMARY_REGION".to_vec())
            }
            Command::StartTracking => {
                if self.session.start_tracking() {
                    self.session.logger().log_progress("tracking started");
                }
                Some(b"Start tracking".to_vec())
            }
            Command::FinishTracking => {
                if self.session.finish_tracking() {
                    self.session.logger().log_progress("tracking finished");
                }
                Some(b"Finish tracking".to_vec())
            }
            Command::StartReplay => {
                let labels = self.detections.labels().join(",");
                let images = self.build_replay().await?;
                self.session.begin_replay(images);
                Some(labels.into_bytes())
            }
            Command::Receive => Some(self.session.next_replay_image().unwrap_or_default()),
            Command::Test => Some(b"test return".to_vec()),
            Command::Disconnect => None,
            Command::Unknown => {
                warn!("Malformed control message ignored");
                None
            }
        };
        Ok(reply)
    }

    /// Calibrate on the newest raw frame.
    async fn mark(&mut self) -> WorkerResult<bool> {
        let Some(frame) = self.last_raw.clone() else {
            self.session.logger().log_warning("no frame captured yet, cannot mark");
            return Ok(false);
        };
        let ingest = Arc::clone(&self.ingest);
        let calibrated = tokio::task::spawn_blocking(move || lock(&ingest).calibrate(&frame)).await??;
        if calibrated {
            self.session.mark();
        } else {
            self.session.logger().log_warning("marker not visible, region not marked");
        }
        Ok(calibrated)
    }

    async fn on_frame(&mut self, frame: Arc<RgbImage>) -> WorkerResult<()> {
        self.last_raw = Some(Arc::clone(&frame));

        if self.session.mode() == RunMode::VideoInput && !self.session.state().is_tracking() {
            if !self.mark().await? {
                return Ok(());
            }
            self.session.start_tracking();
        }
        if !self.session.state().is_tracking() {
            return Ok(());
        }

        let ingest = Arc::clone(&self.ingest);
        let outcome = tokio::task::spawn_blocking(move || lock(&ingest).ingest(&frame)).await??;
        if let IngestOutcome::Accepted { frame, .. } = outcome {
            self.last_view = Some(Arc::clone(&frame.image));
            if let Some(saliency) = &self.saliency_frames {
                if saliency.try_send(Arc::clone(&frame.image)).is_err() {
                    trace!(frame = frame.index, "Saliency input unavailable, frame skipped");
                }
            }
            self.queue.push(frame);
        }
        Ok(())
    }

    /// Compose the replay from everything recorded so far.
    async fn build_replay(&mut self) -> WorkerResult<Vec<Vec<u8>>> {
        let frame = match load_replay_frame(self.replay_frame.as_deref(), self.last_view.as_ref()) {
            Ok(frame) => frame,
            Err(e) => {
                self.session.logger().log_warning(&format!("replay skipped: {e}"));
                return Ok(Vec::new());
            }
        };
        let snapshot = self.motion.snapshot();
        let builder = Arc::clone(&self.replay);
        let output = tokio::task::spawn_blocking(move || builder.build(&frame, &snapshot)).await??;
        self.replay_frames = output.images.len();
        Ok(output.images)
    }
}
