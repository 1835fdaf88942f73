//! Incremental result distribution: the push-session protocol.
//!
//! A [`PushSession`] wraps the result store for one subscriber and yields
//! [`StreamMessage`]s in protocol order: one metadata message, then frame
//! batches interleaved with status heartbeats, then a final status once
//! the job is terminal. The session is transport-agnostic; the API layer
//! serializes each message to a WebSocket text frame.
//!
//! Pending frames are always drained before status messages, so a
//! subscriber that joins late receives the full backlog (in ascending
//! batches) before it sees a heartbeat or the terminal status.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use skyguard_core::detection::FrameResult;
use skyguard_core::job::{JobStatus, ProcessingStatus};
use skyguard_core::types::{FrameIndex, JobId};

use crate::store::ResultStore;

/// Wire status strings. A successfully finished job is reported as
/// `completed` on the stream even though the catalog records `processed`.
fn wire_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Processed => "completed",
        other => other.as_str(),
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One frame entry inside a batch message.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFrame {
    /// Always `"detection"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub frame_number: FrameIndex,
    pub data: FrameResult,
}

/// Video metadata sent once at session start.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub video_id: JobId,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub frame_count: i64,
    pub duration: f64,
}

/// A message emitted by a push session, tagged with `"type"` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Metadata(SessionMetadata),
    Status {
        status: &'static str,
        current_frame: FrameIndex,
        total_frames: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Batch {
        frames: Vec<BatchFrame>,
    },
    Error {
        error: String,
    },
}

impl StreamMessage {
    fn status(progress: &ProcessingStatus) -> Self {
        StreamMessage::Status {
            status: wire_status(progress.status),
            current_frame: progress.current_frame,
            total_frames: progress.total_frames,
            error: progress.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Push session
// ---------------------------------------------------------------------------

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct PushSessionConfig {
    /// How often to poll the store when idle. Short enough to look
    /// real-time, long enough not to spin.
    pub poll_interval: Duration,
    /// Emit a status heartbeat once `current_frame` advanced this far
    /// past the last reported value.
    pub status_update_interval: u64,
    /// Maximum frames per batch message.
    pub batch_size: usize,
}

impl Default for PushSessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            status_update_interval: 10,
            batch_size: 5,
        }
    }
}

/// One subscriber's view of a running (or finished) job.
///
/// Call [`next_message`](PushSession::next_message) until it returns
/// `None`; the session has then emitted its final status and is done.
pub struct PushSession {
    store: Arc<ResultStore>,
    job_id: JobId,
    metadata: Option<SessionMetadata>,
    /// Highest frame index already delivered; `None` until the first batch.
    cursor: Option<FrameIndex>,
    /// `current_frame` as of the last status message.
    last_status_frame: FrameIndex,
    config: PushSessionConfig,
    finished: bool,
}

impl PushSession {
    pub fn new(
        store: Arc<ResultStore>,
        job_id: impl Into<JobId>,
        metadata: SessionMetadata,
        config: PushSessionConfig,
    ) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            metadata: Some(metadata),
            cursor: None,
            last_status_frame: 0,
            config,
            finished: false,
        }
    }

    /// Produce the next protocol message, waiting on the store when the
    /// job is still running and nothing new has landed yet.
    ///
    /// Returns `None` once the terminal status has been delivered (or
    /// after an [`StreamMessage::Error`]).
    pub async fn next_message(&mut self) -> Option<StreamMessage> {
        if self.finished {
            return None;
        }

        if let Some(metadata) = self.metadata.take() {
            return Some(StreamMessage::Metadata(metadata));
        }

        loop {
            let Some(progress) = self.store.get_status(&self.job_id).await else {
                // Entry vanished mid-session (e.g. retention cleanup).
                self.finished = true;
                return Some(StreamMessage::Error {
                    error: format!("job {} no longer in result store", self.job_id),
                });
            };

            // Frames first: a late subscriber drains the whole backlog
            // before any status traffic.
            let pending = match self
                .store
                .frames_since(&self.job_id, self.cursor, Some(self.config.batch_size))
                .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    self.finished = true;
                    return Some(StreamMessage::Error {
                        error: e.to_string(),
                    });
                }
            };

            if !pending.is_empty() {
                self.cursor = pending.last().map(|f| f.frame_number);
                let frames = pending
                    .into_iter()
                    .map(|data| BatchFrame {
                        kind: "detection",
                        frame_number: data.frame_number,
                        data,
                    })
                    .collect();
                return Some(StreamMessage::Batch { frames });
            }

            // Terminal and fully drained: emit the closing status.
            if progress.status.is_terminal() {
                self.finished = true;
                return Some(StreamMessage::status(&progress));
            }

            // Heartbeat when progress advanced far enough.
            if progress.current_frame - self.last_status_frame
                >= self.config.status_update_interval
            {
                self.last_status_frame = progress.current_frame;
                return Some(StreamMessage::status(&progress));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
