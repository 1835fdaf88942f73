//! Route tree assembly.

pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /video/upload                      multipart upload, schedules analysis (POST)
/// /video/processing-status/{id}      live job progress (GET)
/// /video/metadata/{id}               probed video metadata (GET)
/// /video/list                        all uploads (GET)
/// /video/delete/{id}                 remove video + results (DELETE)
/// /video/stream/{id}                 range-request file streaming (GET)
///
/// /detect/image                      single-image detection (POST)
/// /detect/video/{id}                 synchronous whole-video analysis (POST)
/// /detect/video/{id}/stream          NDJSON live analysis (POST)
/// /detect/live/{id}                  pull accumulated frame results (GET)
/// /detect/models                     model registry (GET)
/// /detect/history                    detection history (GET)
/// /detect/stats                      aggregate statistics (GET)
/// /detect/summary/{id}               per-job detection summary (GET)
///
/// /classify/video/{id}               classify stored video (POST)
/// /classify/frame                    classify uploaded image (POST)
///
/// /alerts                            list, create (GET, POST)
/// /alerts/{id}                       update status/severity (PATCH)
///
/// /weather/current                   mock current conditions (GET)
/// /weather/forecast                  mock forecast (GET)
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    let video = Router::new()
        .route("/upload", post(handlers::video::upload_video))
        .route(
            "/processing-status/{video_id}",
            get(handlers::video::processing_status),
        )
        .route("/metadata/{video_id}", get(handlers::video::get_metadata))
        .route("/list", get(handlers::video::list_videos))
        .route("/delete/{video_id}", delete(handlers::video::delete_video))
        .route("/stream/{video_id}", get(handlers::video::stream_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let detect = Router::new()
        .route("/image", post(handlers::detect::detect_image))
        .route("/video/{video_id}", post(handlers::detect::detect_video))
        .route(
            "/video/{video_id}/stream",
            post(handlers::detect::stream_video_detection),
        )
        .route("/live/{video_id}", get(handlers::detect::live_detections))
        .route("/models", get(handlers::detect::list_models))
        .route("/history", get(handlers::detect::detection_history))
        .route("/stats", get(handlers::detect::detection_stats))
        .route(
            "/summary/{video_id}",
            get(handlers::detect::detection_summary),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let classify = Router::new()
        .route("/video/{video_id}", post(handlers::classify::classify_video))
        .route("/frame", post(handlers::classify::classify_frame))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let alerts = Router::new()
        .route(
            "/",
            get(handlers::alerts::list_alerts).post(handlers::alerts::create_alert),
        )
        .route("/{alert_id}", patch(handlers::alerts::update_alert));

    let weather = Router::new()
        .route("/current", get(handlers::weather::current_weather))
        .route("/forecast", get(handlers::weather::weather_forecast));

    Router::new()
        .nest("/video", video)
        .nest("/detect", detect)
        .nest("/classify", classify)
        .nest("/alerts", alerts)
        .nest("/weather", weather)
}

/// Root-level WebSocket routes (outside `/api/v1`, matching the public
/// streaming contract).
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/detections/{video_id}", get(ws::detections_ws_handler))
}
