//! Handlers for the `/video` resource: upload, lifecycle status, metadata,
//! listing, deletion, and range-request file streaming.
//!
//! Upload is the entry point of the analysis pipeline: the file is saved
//! and probed synchronously (an unreadable source never becomes a job),
//! then the controller task is registered and the request returns — the
//! caller follows progress via the status endpoints or the push stream.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{self, HeaderMap};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use skyguard_core::error::CoreError;
use skyguard_core::ffmpeg;
use skyguard_core::job::JobStatus;
use skyguard_core::types::{new_job_id, Timestamp};
use skyguard_db::models::video::{CreateVideo, VideoRecord};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Maximum read chunk size for range streaming (1 MiB).
const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VideoUploadResponse {
    pub video_id: String,
    pub filename: String,
    pub status: String,
    pub metadata: VideoMetadataResponse,
}

#[derive(Debug, Serialize)]
pub struct VideoMetadataResponse {
    pub id: String,
    pub filename: String,
    pub duration: f64,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub size: i64,
    pub upload_time: Timestamp,
}

impl From<&VideoRecord> for VideoMetadataResponse {
    fn from(record: &VideoRecord) -> Self {
        Self {
            id: record.external_id.clone(),
            filename: record
                .original_filename
                .clone()
                .unwrap_or_else(|| record.filename.clone()),
            duration: record.duration,
            fps: record.fps,
            width: record.width,
            height: record.height,
            size: record.file_size,
            upload_time: record.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessingStatusResponse {
    pub video_id: String,
    pub status: String,
    pub current_frame: u64,
    pub total_frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoSummary>,
}

#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub id: String,
    pub filename: String,
    pub upload_time: Timestamp,
    pub duration: f64,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/video/upload
///
/// Multipart upload (`file` field, `video/*` content type). Saves the
/// file, validates it with ffprobe, registers the catalog row, and
/// schedules the analysis job. Returns as soon as the job is registered.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<VideoUploadResponse>> {
    let mut file_bytes: Option<axum::body::Bytes> = None;
    let mut original_filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            content_type = field.content_type().map(str::to_string);
            original_filename = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
            file_bytes = Some(bytes);
        }
    }

    let bytes =
        file_bytes.ok_or_else(|| AppError::BadRequest("Multipart field 'file' is required".into()))?;

    if !content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("video/"))
    {
        return Err(AppError::BadRequest("File must be a video".into()));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::BadRequest(format!(
            "Upload exceeds the {} byte limit",
            state.config.max_upload_bytes
        )));
    }

    // Save under a fresh job id, preserving the original extension.
    let file_id = new_job_id();
    let extension = original_filename
        .as_deref()
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp4");
    let filename = format!("{file_id}.{extension}");
    let file_path = PathBuf::from(&state.config.upload_dir).join(&filename);

    tokio::fs::create_dir_all(&state.config.upload_dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create upload dir: {e}")))?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to save upload: {e}")))?;
    tracing::info!(video_id = %file_id, path = %file_path.display(), "Video saved");

    // Validate before any job exists: unreadable sources surface here,
    // synchronously, and never reach the pipeline.
    let probe = match ffmpeg::probe_summary(&file_path).await {
        Ok(probe) if probe.is_valid() => probe,
        _ => {
            let _ = tokio::fs::remove_file(&file_path).await;
            return Err(AppError::BadRequest("Invalid video file".into()));
        }
    };

    let record = state
        .catalog
        .create(CreateVideo {
            external_id: file_id.clone(),
            filename: filename.clone(),
            original_filename: original_filename.clone(),
            file_path: file_path.to_string_lossy().to_string(),
            file_size: bytes.len() as i64,
            duration: probe.duration_seconds,
            fps: probe.fps,
            width: probe.width,
            height: probe.height,
            codec: probe.codec.clone(),
        })
        .await?;

    // Schedule the analysis job; the upload response does not wait for it.
    let controller = Arc::clone(&state.controller);
    let job_id = file_id.clone();
    let job_path = file_path.clone();
    state
        .registry
        .spawn(&file_id, move |cancel| async move {
            controller.run_video_file(&job_id, job_path, cancel).await;
        })
        .await;

    Ok(Json(VideoUploadResponse {
        video_id: file_id,
        filename: original_filename.unwrap_or(filename),
        status: record.status.clone(),
        metadata: VideoMetadataResponse::from(&record),
    }))
}

/// GET /api/v1/video/processing-status/{video_id}
///
/// Live progress from the result store, falling back to the catalog row
/// for jobs that finished in a previous process lifetime.
pub async fn processing_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<ProcessingStatusResponse>> {
    if let Some(status) = state.results.get_status(&video_id).await {
        return Ok(Json(ProcessingStatusResponse {
            video_id,
            status: status.status.as_str().to_string(),
            current_frame: status.current_frame,
            total_frames: status.total_frames,
            start_time: Some(status.started_at),
            end_time: status.ended_at,
            error: status.error,
        }));
    }

    let record = find_video(&state, &video_id).await?;
    let current_frame = if JobStatus::parse(&record.status).is_some_and(JobStatus::is_terminal) {
        record.total_frames_analyzed.max(0) as u64
    } else {
        0
    };
    Ok(Json(ProcessingStatusResponse {
        video_id,
        status: record.status,
        current_frame,
        total_frames: (record.duration * record.fps).round() as u64,
        start_time: record.processing_started_at,
        end_time: record.processing_completed_at,
        error: record.processing_error,
    }))
}

/// GET /api/v1/video/metadata/{video_id}
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<VideoMetadataResponse>> {
    let record = find_video(&state, &video_id).await?;
    Ok(Json(VideoMetadataResponse::from(&record)))
}

/// GET /api/v1/video/list
pub async fn list_videos(State(state): State<AppState>) -> AppResult<Json<VideoListResponse>> {
    let videos = state
        .catalog
        .list()
        .await?
        .iter()
        .map(|record| VideoSummary {
            id: record.external_id.clone(),
            filename: record
                .original_filename
                .clone()
                .unwrap_or_else(|| record.filename.clone()),
            upload_time: record.uploaded_at,
            duration: record.duration,
            status: record.status.clone(),
        })
        .collect();
    Ok(Json(VideoListResponse { videos }))
}

/// DELETE /api/v1/video/delete/{video_id}
///
/// Cancels any running job, removes the file, the catalog row, and the
/// accumulated results.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let record = find_video(&state, &video_id).await?;

    state.registry.cancel(&video_id).await;
    if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
        tracing::warn!(video_id = %video_id, error = %e, "Failed to remove video file");
    }
    state.catalog.delete(&video_id).await?;
    state.results.remove_job(&video_id).await;

    Ok(Json(serde_json::json!({
        "message": "Video deleted successfully"
    })))
}

/// GET /api/v1/video/stream/{video_id}
///
/// Streams the stored video file with HTTP range request support.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let record = find_video(&state, &video_id).await?;
    let path = FsPath::new(&record.file_path);

    if !path.exists() {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "VideoFile",
            id: video_id,
        }));
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let file_size = metadata.len();
    let content_type = content_type_for_extension(&record.file_path);

    // Check for Range header.
    if let Some(range_value) = headers.get(header::RANGE) {
        let range_str = range_value
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Range header".into()))?;

        if let Some((start, end)) = parse_range_header(range_str) {
            let end = end
                .map(|e| e.min(file_size - 1))
                .unwrap_or_else(|| (start + MAX_CHUNK_SIZE - 1).min(file_size - 1));

            if start >= file_size || start > end {
                return Ok(Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{file_size}"))
                    .body(Body::empty())
                    .unwrap());
            }

            let length = end - start + 1;

            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;

            let limited = file.take(length);
            let stream = ReaderStream::new(limited);

            return Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
                .unwrap());
        }
    }

    // No Range header — serve the full file.
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let stream = ReaderStream::new(file);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(stream))
        .unwrap())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn find_video(state: &AppState, video_id: &str) -> AppResult<VideoRecord> {
    state
        .catalog
        .find(video_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Video",
                id: video_id.to_string(),
            })
        })
}

/// Guess a Content-Type from a file extension.
fn content_type_for_extension(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Parse a `Range: bytes=START-END` header value.
/// Returns `(start, optional_end)`.
fn parse_range_header(range: &str) -> Option<(u64, Option<u64>)> {
    let range = range.strip_prefix("bytes=")?;
    let parts: Vec<&str> = range.splitn(2, '-').collect();
    if parts.len() != 2 {
        return None;
    }
    let start = parts[0].parse::<u64>().ok()?;
    let end = if parts[1].is_empty() {
        None
    } else {
        Some(parts[1].parse::<u64>().ok()?)
    };
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_parses_open_and_closed_forms() {
        assert_eq!(parse_range_header("bytes=0-499"), Some((0, Some(499))));
        assert_eq!(parse_range_header("bytes=500-"), Some((500, None)));
        assert_eq!(parse_range_header("bytes=-500"), None);
        assert_eq!(parse_range_header("0-499"), None);
        assert_eq!(parse_range_header("bytes=a-b"), None);
    }

    #[test]
    fn content_types_cover_common_containers() {
        assert_eq!(content_type_for_extension("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for_extension("clip.MOV"), "video/quicktime");
        assert_eq!(content_type_for_extension("clip.bin"), "application/octet-stream");
    }
}
