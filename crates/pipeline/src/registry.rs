//! Supervised registry of running job tasks.
//!
//! Every spawned controller task is tracked by job id with its
//! cancellation token, so a job can be queried, cancelled, or awaited
//! explicitly instead of being fired and forgotten. Finished entries are
//! reaped lazily on access.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use skyguard_core::types::JobId;

struct TrackedJob {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Job-id keyed registry of background controller tasks.
///
/// Shared as `Arc<JobRegistry>` between the upload handler (spawn) and
/// the shutdown path (cancel all).
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, TrackedJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and track a job task. The closure receives the job's
    /// cancellation token; the returned future is the whole job run.
    ///
    /// Re-registering a live job id cancels the previous task first.
    pub async fn spawn<F, Fut>(&self, job_id: &str, make_task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = make_task(cancel.clone());
        let handle = tokio::spawn(task);

        let mut jobs = self.jobs.write().await;
        if let Some(previous) = jobs.insert(
            job_id.to_string(),
            TrackedJob { handle, cancel },
        ) {
            previous.cancel.cancel();
            previous.handle.abort();
            tracing::warn!(job_id, "Replaced an already-tracked job task");
        }
        tracing::debug!(job_id, "Job task registered");
    }

    /// Whether the job's task is still running.
    pub async fn is_running(&self, job_id: &str) -> bool {
        self.reap_finished().await;
        self.jobs.read().await.contains_key(job_id)
    }

    /// Number of live job tasks.
    pub async fn active_count(&self) -> usize {
        self.reap_finished().await;
        self.jobs.read().await.len()
    }

    /// Request cancellation of one job. Returns whether it was tracked
    /// and still running. The task observes the token at its next batch
    /// boundary; it is not aborted mid-batch.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(job_id) {
            Some(job) if !job.handle.is_finished() => {
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every tracked job and wait up to `grace` for each to stop.
    ///
    /// Used during graceful shutdown: jobs notice the token between
    /// batches; anything still running after the grace period is aborted.
    pub async fn shutdown_all(&self, grace: Duration) {
        let jobs: Vec<(JobId, TrackedJob)> = self.jobs.write().await.drain().collect();
        let count = jobs.len();
        for (_, job) in &jobs {
            job.cancel.cancel();
        }
        for (job_id, job) in jobs {
            if tokio::time::timeout(grace, job.handle).await.is_err() {
                tracing::warn!(job_id, "Job did not stop within grace period");
            }
        }
        tracing::info!(count, "Job registry shut down");
    }

    async fn reap_finished(&self) {
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, job| !job.handle.is_finished());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
