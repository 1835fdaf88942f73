//! Keyed frame-result store shared between one writer per job and any
//! number of concurrent readers.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use tokio::sync::RwLock;

use skyguard_core::detection::FrameResult;
use skyguard_core::job::{JobStatus, ProcessingStatus};
use skyguard_core::types::{FrameIndex, JobId};

/// Errors from result-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found in result store")]
    JobNotFound(JobId),

    /// Attempted status write after the job reached a terminal state.
    #[error("job {job_id} is already {status}, rejecting status update")]
    Terminal { job_id: JobId, status: JobStatus },
}

/// Per-job entry: ordered frame results plus the live status record.
///
/// Frames are keyed by frame index in a `BTreeMap` so "everything after
/// frame N" is a native range scan rather than a collect-sort-filter pass.
struct JobEntry {
    frames: BTreeMap<FrameIndex, FrameResult>,
    status: ProcessingStatus,
}

/// Job-id keyed store mapping each job to its accumulated frame results
/// and processing status.
///
/// Designed to be shared as `Arc<ResultStore>`: one controller task writes
/// per job while distributor sessions read concurrently. All locking is a
/// single `RwLock` around the job map; writes are brief (one map insert),
/// so readers observe whatever was last written without further
/// coordination. There is no cross-job lock ordering to get wrong because
/// there is only one lock.
#[derive(Default)]
pub struct ResultStore {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job entering `processing`. Resets any previous entry for
    /// the same id (a re-run starts from a clean slate).
    pub async fn init_job(&self, job_id: &str, total_frames: u64) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job_id.to_string(),
            JobEntry {
                frames: BTreeMap::new(),
                status: ProcessingStatus::started(total_frames),
            },
        );
        tracing::debug!(job_id, total_frames, "Result store entry initialized");
    }

    /// Store one frame result. Idempotent: re-writing a frame index
    /// replaces the previous value (last write wins).
    pub async fn put_frame(&self, job_id: &str, result: FrameResult) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        entry.frames.insert(result.frame_number, result);
        Ok(())
    }

    /// All frame results for a job, ascending by frame index.
    pub async fn all_frames(&self, job_id: &str) -> Result<Vec<FrameResult>, StoreError> {
        let jobs = self.jobs.read().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        Ok(entry.frames.values().cloned().collect())
    }

    /// Frame results with index strictly greater than `since_frame`
    /// (everything from the start when `None`), ascending, at most
    /// `limit` when given.
    pub async fn frames_since(
        &self,
        job_id: &str,
        since_frame: Option<FrameIndex>,
        limit: Option<usize>,
    ) -> Result<Vec<FrameResult>, StoreError> {
        let jobs = self.jobs.read().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        let lower = match since_frame {
            Some(frame) => Bound::Excluded(frame),
            None => Bound::Unbounded,
        };
        let range = entry
            .frames
            .range((lower, Bound::Unbounded))
            .map(|(_, result)| result.clone());
        Ok(match limit {
            Some(n) => range.take(n).collect(),
            None => range.collect(),
        })
    }

    /// Advance `current_frame` for a running job.
    ///
    /// The value is clamped to be non-decreasing; a stale writer can never
    /// move progress backwards. Rejected once the job is terminal.
    pub async fn advance_current_frame(
        &self,
        job_id: &str,
        frame: FrameIndex,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if entry.status.status.is_terminal() {
            return Err(StoreError::Terminal {
                job_id: job_id.to_string(),
                status: entry.status.status,
            });
        }
        entry.status.current_frame = entry.status.current_frame.max(frame);
        Ok(())
    }

    /// Move a job to a terminal or non-terminal status.
    ///
    /// Terminal states stamp `ended_at`; further status writes for the job
    /// return [`StoreError::Terminal`].
    pub async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if entry.status.status.is_terminal() {
            return Err(StoreError::Terminal {
                job_id: job_id.to_string(),
                status: entry.status.status,
            });
        }
        entry.status.status = status;
        entry.status.error = error;
        if status.is_terminal() {
            entry.status.ended_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    /// Snapshot of a job's processing status.
    pub async fn get_status(&self, job_id: &str) -> Option<ProcessingStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|entry| entry.status.clone())
    }

    /// Highest frame index stored for a job, if any frames exist.
    pub async fn latest_frame(&self, job_id: &str) -> Option<FrameIndex> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .and_then(|entry| entry.frames.keys().next_back().copied())
    }

    /// Drop a job's results entirely (called by retention/cleanup owners).
    pub async fn remove_job(&self, job_id: &str) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
