//! Repository for the `videos` table.
//!
//! Status transitions mirror the job state machine: `uploaded` →
//! `processing` → `processed` | `failed`. The terminal updates are guarded
//! so a stale writer cannot resurrect a finished job.

use sqlx::PgPool;

use crate::models::video::{CreateVideo, VideoRecord};

/// Column list for `videos` queries.
const COLUMNS: &str = "\
    id, external_id, filename, original_filename, file_path, file_size, \
    duration, fps, width, height, codec, \
    status, processing_started_at, processing_completed_at, processing_error, \
    total_frames_analyzed, uploaded_at, created_at, updated_at";

/// Provides CRUD operations for uploaded videos.
pub struct VideoRepo;

impl VideoRepo {
    /// Register a freshly uploaded video with status `uploaded`.
    pub async fn create(pool: &PgPool, input: &CreateVideo) -> Result<VideoRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO videos \
             (external_id, filename, original_filename, file_path, file_size, \
              duration, fps, width, height, codec, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'uploaded') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRecord>(&query)
            .bind(&input.external_id)
            .bind(&input.filename)
            .bind(&input.original_filename)
            .bind(&input.file_path)
            .bind(input.file_size)
            .bind(input.duration)
            .bind(input.fps)
            .bind(input.width)
            .bind(input.height)
            .bind(&input.codec)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_external_id(
        pool: &PgPool,
        external_id: &str,
    ) -> Result<Option<VideoRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos WHERE external_id = $1");
        sqlx::query_as::<_, VideoRecord>(&query)
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    /// All videos, newest upload first.
    pub async fn list(pool: &PgPool) -> Result<Vec<VideoRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos ORDER BY uploaded_at DESC");
        sqlx::query_as::<_, VideoRecord>(&query).fetch_all(pool).await
    }

    /// `uploaded -> processing`; stamps `processing_started_at`.
    pub async fn mark_processing(
        pool: &PgPool,
        external_id: &str,
    ) -> Result<Option<VideoRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status = 'processing', processing_started_at = NOW(), updated_at = NOW() \
             WHERE external_id = $1 AND status NOT IN ('processed', 'failed') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRecord>(&query)
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    /// `processing -> processed`; records the number of frames analyzed.
    pub async fn mark_processed(
        pool: &PgPool,
        external_id: &str,
        total_frames_analyzed: i64,
    ) -> Result<Option<VideoRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status = 'processed', processing_completed_at = NOW(), \
                 total_frames_analyzed = $2, updated_at = NOW() \
             WHERE external_id = $1 AND status NOT IN ('processed', 'failed') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRecord>(&query)
            .bind(external_id)
            .bind(total_frames_analyzed)
            .fetch_optional(pool)
            .await
    }

    /// `processing -> failed`; captures the error text verbatim.
    pub async fn mark_failed(
        pool: &PgPool,
        external_id: &str,
        error: &str,
    ) -> Result<Option<VideoRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE videos \
             SET status = 'failed', processing_completed_at = NOW(), \
                 processing_error = $2, updated_at = NOW() \
             WHERE external_id = $1 AND status NOT IN ('processed', 'failed') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoRecord>(&query)
            .bind(external_id)
            .bind(error)
            .fetch_optional(pool)
            .await
    }

    /// Delete a video row. Returns whether a row was removed.
    pub async fn delete(pool: &PgPool, external_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM videos WHERE external_id = $1")
            .bind(external_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
