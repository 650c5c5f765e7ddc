//! Motion worker: runs the motion engine for each frame the orchestrator
//! hands over and acknowledges completion through the job's oneshot.

use std::sync::Arc;

use pano_media::{DetectedObject, Frame, MotionEngine, MotionFrameReport, OutputKind, OutputLayout};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// One frame's motion step.
#[derive(Debug)]
pub struct MotionJob {
    pub frame: Frame,
    pub objects: Arc<Vec<DetectedObject>>,
    /// Completed once the frame's motion state is committed.
    pub done: oneshot::Sender<WorkerResult<MotionFrameReport>>,
}

pub struct MotionWorker {
    engine: MotionEngine,
    jobs: mpsc::Receiver<MotionJob>,
    output: Option<Arc<OutputLayout>>,
}

impl MotionWorker {
    pub fn new(engine: MotionEngine, jobs: mpsc::Receiver<MotionJob>, output: Option<Arc<OutputLayout>>) -> Self {
        Self { engine, jobs, output }
    }

    /// Process jobs until every sender is gone.
    pub async fn run(self) -> WorkerResult<()> {
        let MotionWorker {
            mut engine,
            mut jobs,
            output,
        } = self;

        while let Some(job) = jobs.recv().await {
            let MotionJob { frame, objects, done } = job;
            let output = output.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = step(&mut engine, &frame, &objects, output.as_deref());
                (engine, result)
            })
            .await?;
            engine = returned;

            if done.send(result).is_err() {
                warn!("Motion result dropped, orchestrator is gone");
            }
        }
        debug!("Motion job channel closed");
        Ok(())
    }
}

fn step(
    engine: &mut MotionEngine,
    frame: &Frame,
    objects: &[DetectedObject],
    output: Option<&OutputLayout>,
) -> WorkerResult<MotionFrameReport> {
    let report = engine.process(frame, objects)?;
    if let Some(layout) = output {
        layout.write(&OutputKind::ObjectMask, report.frame, report.object_mask.clone())?;
        layout.write(&OutputKind::MotionLineTrail, report.frame, report.trail.clone())?;
    }
    Ok(report)
}

/// Hand `frame` to the motion worker and wait until it is committed.
pub async fn submit(
    jobs: &mpsc::Sender<MotionJob>,
    frame: Frame,
    objects: Arc<Vec<DetectedObject>>,
) -> WorkerResult<MotionFrameReport> {
    let (done, completed) = oneshot::channel();
    jobs.send(MotionJob { frame, objects, done })
        .await
        .map_err(|_| WorkerError::channel_closed("motion jobs"))?;
    completed
        .await
        .map_err(|_| WorkerError::channel_closed("motion completion"))?
}
