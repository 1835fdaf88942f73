//! Handlers for the `/classify` resource: scene classification of stored
//! videos and uploaded frames.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use skyguard_core::detection::Classification;
use skyguard_core::types::new_job_id;
use skyguard_pipeline::source::{FfmpegFrameSource, FrameSource, StridePolicy};

use crate::error::{AppError, AppResult};
use crate::handlers::video::find_video;
use crate::state::AppState;

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct ClassificationRequest {
    pub model_name: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct ClassificationResponse {
    pub classifications: Vec<Classification>,
    pub model_used: String,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// POST /api/v1/classify/video/{video_id}
///
/// Classify the content of a stored video. The representative frame is
/// the first batch-stride sample; results are ranked top-k.
pub async fn classify_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(request): Json<ClassificationRequest>,
) -> AppResult<Json<ClassificationResponse>> {
    let record = find_video(&state, &video_id).await?;
    let model = request
        .model_name
        .clone()
        .unwrap_or_else(|| state.config.classification_model.clone());

    let mut source = FfmpegFrameSource::open(
        record.file_path.clone(),
        StridePolicy::Batch,
        skyguard_pipeline::source::DEFAULT_FRAME_CAP_MULTIPLIER,
    )
    .await?;

    let started = Instant::now();
    let frame = source
        .next_frame()
        .await?
        .ok_or_else(|| AppError::BadRequest("No frames extracted from video".into()))?;

    let mut outputs = state.classifier.classify_frame(&frame.image, &model).await?;
    outputs.truncate(request.top_k);

    let classifications = outputs
        .into_iter()
        .enumerate()
        .map(|(i, output)| Classification {
            id: format!("cls_{video_id}_{}_{i}", frame.index),
            label: output.label,
            confidence: output.confidence,
            category: output.category,
            frame_number: frame.index,
        })
        .collect();

    Ok(Json(ClassificationResponse {
        classifications,
        model_used: model,
        processing_time: started.elapsed().as_secs_f64(),
        video_id: Some(video_id),
    }))
}

/// POST /api/v1/classify/frame
///
/// Classify a single uploaded image.
pub async fn classify_frame(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ClassificationResponse>> {
    let mut image_bytes: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            content_type = field.content_type().map(str::to_string);
            image_bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?,
            );
        }
    }
    let bytes = image_bytes
        .ok_or_else(|| AppError::BadRequest("Multipart field 'file' is required".into()))?;
    if !content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"))
    {
        return Err(AppError::BadRequest("File must be an image".into()));
    }

    let image = image::load_from_memory(&bytes)
        .map_err(|e| AppError::BadRequest(format!("Could not decode image: {e}")))?;

    let model = state.config.classification_model.clone();
    let started = Instant::now();
    let outputs = state.classifier.classify_frame(&image, &model).await?;

    let request_id = new_job_id();
    let classifications = outputs
        .into_iter()
        .enumerate()
        .map(|(i, output)| Classification {
            id: format!("cls_img_{request_id}_{i}"),
            label: output.label,
            confidence: output.confidence,
            category: output.category,
            frame_number: 0,
        })
        .collect();

    Ok(Json(ClassificationResponse {
        classifications,
        model_used: model,
        processing_time: started.elapsed().as_secs_f64(),
        video_id: None,
    }))
}
