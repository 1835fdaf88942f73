/// Jobs are identified by an opaque UUID string, assigned at upload time.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 0-based index of a frame within its source video.
pub type FrameIndex = u64;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}
