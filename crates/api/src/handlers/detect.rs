//! Handlers for the `/detect` resource.
//!
//! Three analysis surfaces share the injected Detector/Classifier:
//! single-image detection, synchronous whole-video analysis, and the
//! NDJSON live path. The live path intentionally degrades per frame
//! (placeholder classifications on classifier failure) while the
//! synchronous path fails fast — the two behaviors are distinct by
//! design and must stay that way.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, State};
use axum::response::Response;
use axum::Json;
use futures::SinkExt;
use serde::{Deserialize, Serialize};

use skyguard_core::detection::{severity_for, Classification, Detection};
use skyguard_core::postprocess;
use skyguard_core::types::{new_job_id, FrameIndex};
use skyguard_pipeline::inference::{classify_with_fallback, ClassifierOutput, RawDetection};
use skyguard_pipeline::source::{FfmpegFrameSource, FrameSource, StridePolicy};
use skyguard_db::models::detection::NewDetection;

use crate::error::{AppError, AppResult};
use crate::handlers::video::find_video;
use crate::state::AppState;

/// IoU threshold used by the analysis endpoints.
const ANALYSIS_NMS_IOU: f64 = 0.5;

/// Classifications attached to a detection's context.
const CONTEXT_TOP_K: usize = 3;

/// Classifications included in a whole-video response.
const RESPONSE_TOP_K: usize = 10;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

fn default_confidence_threshold() -> f64 {
    postprocess::DEFAULT_CONFIDENCE_THRESHOLD
}

#[derive(Debug, Deserialize)]
pub struct DetectionRequest {
    pub model_name: Option<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct ImageDetectParams {
    pub model_name: Option<String>,
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    pub since_frame: Option<FrameIndex>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A kept detection plus the same-frame scene context.
#[derive(Debug, Serialize)]
pub struct DetectionWithContext {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub detections: Vec<DetectionWithContext>,
    pub model_used: String,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_dimensions: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<Classification>>,
}

#[derive(Debug, Serialize)]
pub struct LiveDetectionsResponse {
    pub video_id: String,
    pub status: String,
    pub detections: Vec<skyguard_core::detection::FrameResult>,
    pub total_frames_analyzed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_frame: Option<FrameIndex>,
}

// ---------------------------------------------------------------------------
// Image detection
// ---------------------------------------------------------------------------

/// POST /api/v1/detect/image
///
/// Detect objects in one uploaded image, filtered by confidence, and
/// record the kept detections to the history.
pub async fn detect_image(
    State(state): State<AppState>,
    Query(params): Query<ImageDetectParams>,
    mut multipart: Multipart,
) -> AppResult<Json<DetectionResponse>> {
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

    let model = params
        .model_name
        .unwrap_or_else(|| state.config.detection_model.clone());
    let threshold = params
        .confidence_threshold
        .unwrap_or(postprocess::DEFAULT_CONFIDENCE_THRESHOLD);

    let started = Instant::now();
    let raw = state.detector.detect(&image, &model, threshold).await?;

    let request_id = new_job_id();
    let detections: Vec<Detection> = raw
        .into_iter()
        .enumerate()
        .map(|(i, raw)| to_detection(raw, &format!("det_img_{request_id}_{i}"), 0))
        .collect();
    let detections = postprocess::filter_by_confidence(detections, threshold);

    record_history(&state, &detections, None).await?;

    Ok(Json(DetectionResponse {
        detections: detections
            .into_iter()
            .map(|detection| DetectionWithContext {
                detection,
                context: None,
            })
            .collect(),
        model_used: model,
        processing_time: started.elapsed().as_secs_f64(),
        video_id: None,
        image_dimensions: Some(serde_json::json!({
            "width": image.width(),
            "height": image.height(),
        })),
        classifications: None,
    }))
}

// ---------------------------------------------------------------------------
// Whole-video detection
// ---------------------------------------------------------------------------

/// POST /api/v1/detect/video/{video_id}
///
/// Synchronous analysis of a stored video at batch stride. Detection and
/// classification run concurrently per frame; suppression is applied over
/// the whole video's detections so a static object is reported once.
/// Fail-fast: any inference error aborts the request.
pub async fn detect_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(request): Json<DetectionRequest>,
) -> AppResult<Json<DetectionResponse>> {
    let record = find_video(&state, &video_id).await?;
    let model = request
        .model_name
        .clone()
        .unwrap_or_else(|| state.config.detection_model.clone());

    let mut source = FfmpegFrameSource::open(
        record.file_path.clone(),
        StridePolicy::Batch,
        skyguard_pipeline::source::DEFAULT_FRAME_CAP_MULTIPLIER,
    )
    .await?;

    let started = Instant::now();
    let mut all_detections: Vec<Detection> = Vec::new();
    let mut all_classifications: Vec<Classification> = Vec::new();

    while let Some(frame) = source.next_frame().await? {
        let detect = state
            .detector
            .detect(&frame.image, &model, request.confidence_threshold);
        let classify = state
            .classifier
            .classify_frame(&frame.image, &state.config.classification_model);
        let (raw_detections, outputs) = tokio::try_join!(detect, classify)?;

        for raw in raw_detections {
            let id = format!("det_{video_id}_{}_{}", frame.index, all_detections.len());
            all_detections.push(to_detection(raw, &id, frame.index));
        }
        for output in outputs {
            let id = format!("cls_{video_id}_{}_{}", frame.index, all_classifications.len());
            all_classifications.push(to_classification(output, &id, frame.index));
        }
    }

    let filtered = postprocess::filter_by_confidence(all_detections, request.confidence_threshold);
    let final_detections = postprocess::non_max_suppression(filtered, ANALYSIS_NMS_IOU);

    record_history(&state, &final_detections, Some(&video_id)).await?;

    let detections = final_detections
        .into_iter()
        .map(|detection| {
            let context = frame_context(&all_classifications, detection.frame_number);
            DetectionWithContext { detection, context }
        })
        .collect();

    all_classifications.truncate(RESPONSE_TOP_K);
    Ok(Json(DetectionResponse {
        detections,
        model_used: model,
        processing_time: started.elapsed().as_secs_f64(),
        video_id: Some(video_id),
        image_dimensions: None,
        classifications: Some(all_classifications),
    }))
}

// ---------------------------------------------------------------------------
// NDJSON live path
// ---------------------------------------------------------------------------

/// POST /api/v1/detect/video/{video_id}/stream
///
/// Streams per-frame analysis as newline-delimited JSON while the video
/// is decoded at live (denser) stride. Classification degrades to
/// placeholders on per-frame failure; a detector failure terminates the
/// stream with an error line.
pub async fn stream_video_detection(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Json(request): Json<DetectionRequest>,
) -> AppResult<Response> {
    let record = find_video(&state, &video_id).await?;
    let model = request
        .model_name
        .clone()
        .unwrap_or_else(|| state.config.detection_model.clone());

    let mut source = FfmpegFrameSource::open(
        record.file_path.clone(),
        StridePolicy::Live,
        skyguard_pipeline::source::DEFAULT_FRAME_CAP_MULTIPLIER,
    )
    .await?;

    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, std::convert::Infallible>>(16);

    let detector = Arc::clone(&state.detector);
    let classifier = Arc::clone(&state.classifier);
    let classification_model = state.config.classification_model.clone();
    let confidence_threshold = request.confidence_threshold;

    tokio::spawn(async move {
        let started = Instant::now();
        let metadata = source.metadata().clone();

        let header = serde_json::json!({
            "type": "metadata",
            "video_id": video_id,
            "fps": metadata.fps,
            "width": metadata.width,
            "height": metadata.height,
            "frame_count": metadata.total_frames,
            "duration": metadata.duration_seconds,
        });
        if send_line(&mut tx, &header).await.is_err() {
            return;
        }

        let mut frames_processed: u64 = 0;
        loop {
            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    let _ = send_line(
                        &mut tx,
                        &serde_json::json!({ "type": "error", "error": e.to_string() }),
                    )
                    .await;
                    return;
                }
            };

            let raw_detections = match detector
                .detect(&frame.image, &model, confidence_threshold)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    let _ = send_line(
                        &mut tx,
                        &serde_json::json!({ "type": "error", "error": e.to_string() }),
                    )
                    .await;
                    return;
                }
            };
            // Frame-level classification failures degrade, per the live
            // path's contract.
            let outputs =
                classify_with_fallback(classifier.as_ref(), &frame.image, &classification_model)
                    .await;

            let detections: Vec<Detection> = raw_detections
                .into_iter()
                .enumerate()
                .map(|(i, raw)| {
                    to_detection(raw, &format!("det_{video_id}_{}_{i}", frame.index), frame.index)
                })
                .collect();
            let detections =
                postprocess::filter_by_confidence(detections, confidence_threshold);
            let detections = postprocess::non_max_suppression(detections, ANALYSIS_NMS_IOU);

            let classifications: Vec<Classification> = outputs
                .into_iter()
                .enumerate()
                .map(|(i, output)| {
                    to_classification(
                        output,
                        &format!("cls_{video_id}_{}_{i}", frame.index),
                        frame.index,
                    )
                })
                .collect();

            let line = serde_json::json!({
                "type": "frame_result",
                "frame_number": frame.index,
                "timestamp": frame.timestamp,
                "detections": detections,
                "classifications": classifications,
            });
            if send_line(&mut tx, &line).await.is_err() {
                return;
            }
            frames_processed += 1;
        }

        let _ = send_line(
            &mut tx,
            &serde_json::json!({
                "type": "complete",
                "total_frames_processed": frames_processed,
                "processing_time": started.elapsed().as_secs_f64(),
            }),
        )
        .await;
    });

    Ok(Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(rx))
        .unwrap())
}

// ---------------------------------------------------------------------------
// Pull mode
// ---------------------------------------------------------------------------

/// GET /api/v1/detect/live/{video_id}?since_frame=N
///
/// All accumulated frame results with index strictly greater than
/// `since_frame` (everything when omitted), ascending, plus job status.
pub async fn live_detections(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(params): Query<LiveParams>,
) -> AppResult<Json<LiveDetectionsResponse>> {
    let record = find_video(&state, &video_id).await?;

    let (detections, status) = match state.results.get_status(&video_id).await {
        Some(status) => {
            let frames = state
                .results
                .frames_since(&video_id, params.since_frame, None)
                .await?;
            (frames, status.status.as_str().to_string())
        }
        // No hot entry: the job finished in a previous process lifetime
        // or has not started yet. The catalog row still answers status.
        None => (Vec::new(), record.status.clone()),
    };

    let latest_frame = detections.last().map(|f| f.frame_number);
    Ok(Json(LiveDetectionsResponse {
        video_id,
        status,
        detections,
        total_frames_analyzed: record.total_frames_analyzed,
        latest_frame,
    }))
}

// ---------------------------------------------------------------------------
// Model registry, history, stats
// ---------------------------------------------------------------------------

/// GET /api/v1/detect/models
pub async fn list_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "models": [
            {
                "name": "facebook/detr-resnet-50",
                "description": "DETR with ResNet-50 backbone for general object detection",
                "type": "object_detection",
                "accuracy": "high",
                "speed": "medium"
            },
            {
                "name": "microsoft/yolov5",
                "description": "YOLOv5 for fast and accurate object detection",
                "type": "object_detection",
                "accuracy": "very_high",
                "speed": "fast"
            },
            {
                "name": "ultralytics/yolov8",
                "description": "Latest YOLOv8 model with improved accuracy",
                "type": "object_detection",
                "accuracy": "very_high",
                "speed": "fast"
            }
        ]
    }))
}

/// GET /api/v1/detect/history
pub async fn detection_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<serde_json::Value>> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);
    let (detections, total) = state.catalog.detection_history(limit, offset).await?;

    let pages = total / limit + i64::from(total % limit != 0);
    Ok(Json(serde_json::json!({
        "detections": detections,
        "total": total,
        "page": offset / limit + 1,
        "pages": pages,
    })))
}

/// GET /api/v1/detect/summary/{video_id}
///
/// Aggregate view of a job's kept detections: per-label confidence
/// statistics and the severity histogram.
pub async fn detection_summary(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    find_video(&state, &video_id).await?;
    let frames = state.results.all_frames(&video_id).await?;
    let detections: Vec<Detection> = frames
        .into_iter()
        .flat_map(|frame| frame.detections)
        .collect();
    let summary = postprocess::summarize(&detections);
    Ok(Json(serde_json::json!({
        "video_id": video_id,
        "summary": summary,
    })))
}

/// GET /api/v1/detect/stats
pub async fn detection_stats(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let stats = state.catalog.detection_stats().await?;
    Ok(Json(serde_json::json!({
        "total_detections": stats.total_detections,
        "detections_by_type": stats.detections_by_type,
        "confidence_distribution": stats.confidence_distribution,
        "average_confidence": (stats.average_confidence * 100.0).round() / 100.0,
        "frames_processed": stats.total_detections,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_detection(raw: RawDetection, id: &str, frame_number: FrameIndex) -> Detection {
    Detection {
        id: id.to_string(),
        severity: severity_for(&raw.label, raw.confidence),
        label: raw.label,
        confidence: raw.confidence,
        bounding_box: raw.bounding_box,
        frame_number,
    }
}

fn to_classification(output: ClassifierOutput, id: &str, frame_number: FrameIndex) -> Classification {
    Classification {
        id: id.to_string(),
        label: output.label,
        confidence: output.confidence,
        category: output.category,
        frame_number,
    }
}

/// Top same-frame classifications, as a detection's scene context.
fn frame_context(
    classifications: &[Classification],
    frame_number: FrameIndex,
) -> Option<serde_json::Value> {
    let same_frame: Vec<&Classification> = classifications
        .iter()
        .filter(|c| c.frame_number == frame_number)
        .take(CONTEXT_TOP_K)
        .collect();
    if same_frame.is_empty() {
        return None;
    }
    Some(serde_json::json!({
        "classifications": same_frame
            .iter()
            .map(|c| serde_json::json!({
                "label": c.label,
                "confidence": c.confidence,
                "category": c.category,
            }))
            .collect::<Vec<_>>(),
    }))
}

async fn record_history(
    state: &AppState,
    detections: &[Detection],
    video_id: Option<&str>,
) -> AppResult<()> {
    if detections.is_empty() {
        return Ok(());
    }
    let rows = detections
        .iter()
        .map(|d| NewDetection {
            id: d.id.clone(),
            label: d.label.clone(),
            confidence: d.confidence,
            video_external_id: video_id.map(str::to_string),
            severity: d.severity.as_str().to_string(),
        })
        .collect();
    state.catalog.record_detections(rows).await?;
    Ok(())
}

async fn send_line(
    tx: &mut futures::channel::mpsc::Sender<Result<Bytes, std::convert::Infallible>>,
    value: &serde_json::Value,
) -> Result<(), ()> {
    let mut line = value.to_string();
    line.push('\n');
    tx.send(Ok(Bytes::from(line))).await.map_err(|_| ())
}
