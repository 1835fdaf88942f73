//! Job status state machine and the hot processing-status entry.

use serde::{Deserialize, Serialize};

use crate::types::{FrameIndex, Timestamp};

/// Lifecycle of an analysis job.
///
/// ```text
/// uploaded -> processing -> processed
///                        -> failed
/// ```
///
/// `Processed` and `Failed` are terminal; no further status writes are
/// accepted for a job once it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "uploaded" => Some(JobStatus::Uploaded),
            "processing" => Some(JobStatus::Processing),
            "processed" => Some(JobStatus::Processed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Failed)
    }

    /// Whether the state machine admits `self -> next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Uploaded => matches!(next, JobStatus::Processing | JobStatus::Failed),
            JobStatus::Processing => {
                matches!(next, JobStatus::Processing | JobStatus::Processed | JobStatus::Failed)
            }
            JobStatus::Processed | JobStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live progress entry kept in the result store while a job runs.
///
/// `current_frame` is monotonically non-decreasing until the status turns
/// terminal; every frame result stored for the job has an index at or
/// below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub status: JobStatus,
    pub current_frame: FrameIndex,
    pub total_frames: u64,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl ProcessingStatus {
    /// Fresh entry for a job that just moved to `processing`.
    pub fn started(total_frames: u64) -> Self {
        Self {
            status: JobStatus::Processing,
            current_frame: 0,
            total_frames,
            started_at: chrono::Utc::now(),
            ended_at: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_admit_no_transitions() {
        for next in [
            JobStatus::Uploaded,
            JobStatus::Processing,
            JobStatus::Processed,
            JobStatus::Failed,
        ] {
            assert!(!JobStatus::Processed.can_transition_to(next));
            assert!(!JobStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn uploaded_moves_to_processing_or_failed() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Uploaded.can_transition_to(JobStatus::Processed));
    }

    #[test]
    fn processing_may_repeat_then_terminate() {
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Processed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn parse_round_trips_as_str() {
        for status in [
            JobStatus::Uploaded,
            JobStatus::Processing,
            JobStatus::Processed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("completed"), None);
    }
}
