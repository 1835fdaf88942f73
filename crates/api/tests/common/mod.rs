//! Shared fixtures for API integration tests.
//!
//! Builds the full application router against the in-memory catalog and
//! the static inference backends, mirroring the construction in `main.rs`
//! so tests exercise the same middleware stack production uses.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use skyguard_api::config::ServerConfig;
use skyguard_api::routes;
use skyguard_api::state::AppState;
use skyguard_db::catalog::MemoryCatalog;
use skyguard_db::models::video::CreateVideo;
use skyguard_pipeline::inference::{StaticClassifier, StaticDetector};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        upload_dir: std::env::temp_dir()
            .join("skyguard-test-uploads")
            .to_string_lossy()
            .to_string(),
        max_upload_bytes: 8 * 1024 * 1024,
        inference_endpoint: None,
        detection_model: "facebook/detr-resnet-50".to_string(),
        classification_model: "MCG-NJU/videomae-base".to_string(),
    }
}

/// Build the application router plus the state handle so tests can seed
/// the catalog and the result store directly.
pub fn build_test_app() -> (Router, AppState) {
    let config = test_config();
    let max_upload_bytes = config.max_upload_bytes;
    let state = AppState::new(
        config,
        Arc::new(MemoryCatalog::new()),
        Arc::new(StaticDetector::surveillance_defaults()),
        Arc::new(StaticClassifier::surveillance_defaults()),
    );

    let request_id_header = HeaderName::from_static("x-request-id");
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::PATCH])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::ws_routes())
        .nest("/api/v1", routes::api_routes(max_upload_bytes))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state.clone());

    (app, state)
}

/// A catalog row for a stored video, pointing at `file_path`.
pub fn video_record(external_id: &str, file_path: &str) -> CreateVideo {
    CreateVideo {
        external_id: external_id.to_string(),
        filename: format!("{external_id}.mp4"),
        original_filename: Some("footage.mp4".to_string()),
        file_path: file_path.to_string(),
        file_size: 2048,
        duration: 5.0,
        fps: 30.0,
        width: 1920,
        height: 1080,
        codec: "h264".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn send_json(app: Router, method: Method, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// POST a single-file multipart body with the given part content type.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    filename: &str,
    part_content_type: &str,
    bytes: Vec<u8>,
) -> Response<Body> {
    const BOUNDARY: &str = "skyguard-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {part_content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(&bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Encode a small PNG for image-endpoint tests.
pub fn tiny_png() -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(16, 16);
    let mut bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}
