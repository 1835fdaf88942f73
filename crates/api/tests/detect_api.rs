//! Integration tests for the `/detect` and `/classify` resources.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, get, post_multipart, send_json, video_record};

use skyguard_core::detection::{severity_for, BoundingBox, Detection, FrameResult};
use skyguard_db::models::detection::NewDetection;

fn frame(n: u64) -> FrameResult {
    FrameResult {
        frame_number: n,
        timestamp: n as f64 / 30.0,
        detections: Vec::new(),
        classifications: Vec::new(),
    }
}

fn detection(id: &str, label: &str, confidence: f64, frame_number: u64) -> Detection {
    Detection {
        id: id.to_string(),
        label: label.to_string(),
        confidence,
        bounding_box: BoundingBox {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
        },
        severity: severity_for(label, confidence),
        frame_number,
    }
}

// ---------------------------------------------------------------------------
// Test: model registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn models_endpoint_lists_registry() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/detect/models").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let models = json["models"].as_array().unwrap();
    assert_eq!(models.len(), 3);
    assert_eq!(models[0]["name"], "facebook/detr-resnet-50");
}

// ---------------------------------------------------------------------------
// Test: pull mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_detections_unknown_video_is_404() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/detect/live/ghost").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_detections_return_frames_after_since_frame() {
    let (app, state) = common::build_test_app();
    state
        .catalog
        .create(video_record("vid-1", "/tmp/vid-1.mp4"))
        .await
        .unwrap();
    state.results.init_job("vid-1", 100).await;
    for n in [10u64, 20, 30] {
        state.results.advance_current_frame("vid-1", n).await.unwrap();
        state.results.put_frame("vid-1", frame(n)).await.unwrap();
    }

    let response = get(app.clone(), "/api/v1/detect/live/vid-1?since_frame=10").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "processing");
    let frames = json["detections"].as_array().unwrap();
    let indices: Vec<u64> = frames
        .iter()
        .map(|f| f["frame_number"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![20, 30]);
    assert_eq!(json["latest_frame"], 30);

    // Without since_frame, everything comes back.
    let response = get(app, "/api/v1/detect/live/vid-1").await;
    let json = body_json(response).await;
    assert_eq!(json["detections"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn live_detections_fall_back_to_catalog_status() {
    let (app, state) = common::build_test_app();
    state
        .catalog
        .create(video_record("vid-1", "/tmp/vid-1.mp4"))
        .await
        .unwrap();
    state.catalog.mark_processing("vid-1").await.unwrap();
    state.catalog.mark_failed("vid-1", "boom").await.unwrap();

    let response = get(app, "/api/v1/detect/live/vid-1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "failed");
    assert!(json["detections"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: image detection with the static backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detect_image_returns_filtered_detections() {
    let (app, state) = common::build_test_app();
    let response = post_multipart(
        app,
        "/api/v1/detect/image",
        "frame.png",
        "image/png",
        common::tiny_png(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(json["model_used"], "facebook/detr-resnet-50");
    assert_eq!(json["image_dimensions"]["width"], 16);

    // Kept detections are recorded to history.
    let (_, total) = state.catalog.detection_history(10, 0).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn detect_image_respects_confidence_threshold() {
    let (app, _state) = common::build_test_app();
    let response = post_multipart(
        app,
        "/api/v1/detect/image?confidence_threshold=0.9",
        "frame.png",
        "image/png",
        common::tiny_png(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["label"], "Person");
}

#[tokio::test]
async fn detect_image_rejects_non_image() {
    let (app, _state) = common::build_test_app();
    let response = post_multipart(
        app,
        "/api/v1/detect/image",
        "clip.mp4",
        "video/mp4",
        vec![0u8; 32],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: history and stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_and_stats_report_recorded_detections() {
    let (app, state) = common::build_test_app();
    state
        .catalog
        .record_detections(vec![
            NewDetection {
                id: "d1".into(),
                label: "Fire".into(),
                confidence: 0.93,
                video_external_id: Some("vid-1".into()),
                severity: "high".into(),
            },
            NewDetection {
                id: "d2".into(),
                label: "Person".into(),
                confidence: 0.55,
                video_external_id: Some("vid-1".into()),
                severity: "low".into(),
            },
        ])
        .await
        .unwrap();

    let response = get(app.clone(), "/api/v1/detect/history?limit=10").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["page"], 1);
    assert_eq!(json["detections"].as_array().unwrap().len(), 2);

    let response = get(app, "/api/v1/detect/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_detections"], 2);
    assert_eq!(json["detections_by_type"]["Fire"], 1);
    assert_eq!(json["confidence_distribution"]["high"], 1);
    assert_eq!(json["confidence_distribution"]["low"], 1);
}

// ---------------------------------------------------------------------------
// Test: per-job detection summary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn summary_aggregates_a_jobs_kept_detections() {
    let (app, state) = common::build_test_app();
    state
        .catalog
        .create(video_record("vid-1", "/tmp/vid-1.mp4"))
        .await
        .unwrap();
    state.results.init_job("vid-1", 100).await;

    let mut first = frame(10);
    first.detections = vec![
        detection("d1", "Fire", 0.9, 10),
        detection("d2", "Person", 0.85, 10),
    ];
    let mut second = frame(20);
    second.detections = vec![detection("d3", "Person", 0.55, 20)];
    for (n, f) in [(10u64, first), (20u64, second)] {
        state.results.advance_current_frame("vid-1", n).await.unwrap();
        state.results.put_frame("vid-1", f).await.unwrap();
    }

    let response = get(app, "/api/v1/detect/summary/vid-1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let summary = &json["summary"];
    assert_eq!(summary["total_detections"], 3);
    assert_eq!(summary["by_type"]["Person"]["count"], 2);
    assert_eq!(summary["severity_distribution"]["high"], 1);
    assert_eq!(summary["severity_distribution"]["medium"], 1);
    assert_eq!(summary["severity_distribution"]["low"], 1);
}

// ---------------------------------------------------------------------------
// Test: classification endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn classify_frame_returns_ranked_labels() {
    let (app, _state) = common::build_test_app();
    let response = post_multipart(
        app,
        "/api/v1/classify/frame",
        "frame.png",
        "image/png",
        common::tiny_png(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let classifications = json["classifications"].as_array().unwrap();
    assert_eq!(classifications.len(), 4);
    assert_eq!(classifications[0]["label"], "Surveillance Activity");
    assert_eq!(classifications[0]["category"], "security");
}

#[tokio::test]
async fn classify_video_unknown_id_is_404() {
    let (app, _state) = common::build_test_app();
    let response = send_json(
        app,
        Method::POST,
        "/api/v1/classify/video/ghost",
        serde_json::json!({ "top_k": 3 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn detect_video_unknown_id_is_404() {
    let (app, _state) = common::build_test_app();
    let response = send_json(
        app,
        Method::POST,
        "/api/v1/detect/video/ghost",
        serde_json::json!({ "confidence_threshold": 0.5 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
