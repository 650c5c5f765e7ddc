//! Named worker tasks whose failures surface to the session loop.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{WorkerError, WorkerResult};

#[derive(Default)]
pub struct Supervisor {
    tasks: JoinSet<(String, WorkerResult<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = WorkerResult<()>> + Send + 'static,
    {
        let name = name.into();
        debug!(worker = %name, "Spawning worker");
        self.tasks.spawn(async move { (name, task.await) });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next worker to finish.
    ///
    /// `Some(Ok(name))` for a clean exit, `Some(Err(_))` for a failure or a
    /// panic, `None` once every worker has been collected. Cancel safe.
    pub async fn next_exit(&mut self) -> Option<WorkerResult<String>> {
        let joined = self.tasks.join_next().await?;
        Some(match joined {
            Ok((name, Ok(()))) => {
                debug!(worker = %name, "Worker finished");
                Ok(name)
            }
            Ok((name, Err(e))) => {
                error!(worker = %name, error = %e, "Worker failed");
                Err(WorkerError::worker_failed(name, e.to_string()))
            }
            Err(join_error) => {
                error!(error = %join_error, "Worker panicked or was cancelled");
                Err(WorkerError::worker_failed("unknown", join_error.to_string()))
            }
        })
    }

    /// Collect every worker; the first failure wins.
    pub async fn join_all(mut self) -> WorkerResult<()> {
        let mut first_error = None;
        while let Some(exit) = self.next_exit().await {
            if let Err(e) = exit {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clean_exits_are_reported_by_name() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("capture", async { Ok(()) });
        assert_eq!(supervisor.len(), 1);

        let exit = supervisor.next_exit().await.unwrap().unwrap();
        assert_eq!(exit, "capture");
        assert!(supervisor.next_exit().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_surfaces_with_worker_name() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("saliency", async { Err(WorkerError::replay_failed("boom")) });

        let err = supervisor.next_exit().await.unwrap().unwrap_err();
        match err {
            WorkerError::WorkerFailed { name, reason } => {
                assert_eq!(name, "saliency");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_join_all_returns_first_failure() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("a", async { Ok(()) });
        supervisor.spawn("b", async { Err(WorkerError::channel_closed("motion jobs")) });
        supervisor.spawn("c", async { Ok(()) });
        assert!(supervisor.join_all().await.is_err());

        let mut clean = Supervisor::new();
        clean.spawn("a", async { Ok(()) });
        assert!(clean.join_all().await.is_ok());
    }
}
