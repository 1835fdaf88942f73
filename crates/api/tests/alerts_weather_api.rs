//! Integration tests for the mock data surfaces: `/alerts` and `/weather`.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, get, send_json};

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alerts_list_seeded_entries() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/alerts").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let alerts = json.as_array().unwrap();
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0]["id"], "alert_001");
    assert_eq!(alerts[0]["type"], "fire");
}

#[tokio::test]
async fn alerts_filter_by_severity_and_status() {
    let (app, _state) = common::build_test_app();

    let response = get(app.clone(), "/api/v1/alerts?severity=critical").await;
    let json = body_json(response).await;
    let alerts = json.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["title"], "Fire Detected");

    let response = get(app, "/api/v1/alerts?status=acknowledged").await;
    let json = body_json(response).await;
    let alerts = json.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["id"], "alert_002");
}

#[tokio::test]
async fn created_alert_appears_in_list() {
    let (app, _state) = common::build_test_app();
    let response = send_json(
        app.clone(),
        Method::POST,
        "/api/v1/alerts",
        serde_json::json!({
            "title": "Smoke Plume",
            "description": "Smoke visible over ridge line.",
            "severity": "high",
            "confidence": 81,
            "location": "Sector C-2",
            "type": "fire",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "new");
    let id = created["id"].as_str().unwrap().to_string();

    let response = get(app, "/api/v1/alerts").await;
    let json = body_json(response).await;
    let alerts = json.as_array().unwrap();
    assert_eq!(alerts.len(), 4);
    assert_eq!(alerts[0]["id"], id);
}

#[tokio::test]
async fn alert_update_changes_status() {
    let (app, _state) = common::build_test_app();
    let response = send_json(
        app.clone(),
        Method::PATCH,
        "/api/v1/alerts/alert_001",
        serde_json::json!({ "status": "acknowledged" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "acknowledged");

    let response = send_json(
        app,
        Method::PATCH,
        "/api/v1/alerts/alert_999",
        serde_json::json!({ "status": "resolved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[tokio::test]
async fn current_weather_echoes_location() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/weather/current?lat=37.77&lon=-122.42").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["location"]["latitude"], 37.77);
    assert_eq!(json["location"]["longitude"], -122.42);
    assert!(json["current"]["temperature"].is_number());
}

#[tokio::test]
async fn forecast_respects_day_count() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/weather/forecast?lat=37.77&lon=-122.42&days=3").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["forecast"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn weather_requires_coordinates() {
    let (app, _state) = common::build_test_app();
    let response = get(app, "/api/v1/weather/current").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
