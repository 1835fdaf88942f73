//! Video catalog entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use skyguard_core::types::Timestamp;

/// A row from the `videos` table: the durable record of one analysis job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    /// Opaque UUID string used as the public job id.
    pub external_id: String,
    /// Stored filename (`{external_id}{ext}`).
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_path: String,
    pub file_size: i64,

    // Probed video properties.
    pub duration: f64,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub codec: String,

    // Processing lifecycle. `status` holds one of
    // uploaded | processing | processed | failed.
    pub status: String,
    pub processing_started_at: Option<Timestamp>,
    pub processing_completed_at: Option<Timestamp>,
    pub processing_error: Option<String>,
    pub total_frames_analyzed: i64,

    pub uploaded_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a freshly uploaded video.
#[derive(Debug, Clone)]
pub struct CreateVideo {
    pub external_id: String,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_path: String,
    pub file_size: i64,
    pub duration: f64,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub codec: String,
}
