//! Handlers for the `/weather` resource.
//!
//! Mock data surface mirroring the operational dashboard's needs. Thin
//! plumbing by design; a real deployment points these at an upstream
//! weather provider.

use axum::extract::Query;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub lat: f64,
    pub lon: f64,
    pub days: Option<u32>,
}

/// GET /api/v1/weather/current
pub async fn current_weather(
    Query(params): Query<WeatherParams>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(serde_json::json!({
        "location": {
            "latitude": params.lat,
            "longitude": params.lon,
        },
        "current": {
            "temperature": 24.5,
            "humidity": 65,
            "pressure": 1013.2,
            "wind_speed": 12.3,
            "wind_direction": 315,
            "wind_direction_text": "NW",
            "visibility": 10.0,
            "conditions": "partly_cloudy",
            "description": "Partly cloudy with light winds",
            "uv_index": 6,
            "cloud_cover": 40,
        },
        "timestamp": chrono::Utc::now(),
    })))
}

/// GET /api/v1/weather/forecast
pub async fn weather_forecast(
    Query(params): Query<ForecastParams>,
) -> AppResult<Json<serde_json::Value>> {
    let days = params.days.unwrap_or(5).min(14);
    let today = chrono::Utc::now().date_naive();
    let forecast: Vec<serde_json::Value> = (0..days)
        .map(|i| {
            serde_json::json!({
                "date": today + chrono::Duration::days(i64::from(i) + 1),
                "temperature_max": 26 + i,
                "temperature_min": 18 + i,
                "humidity": 60 + i * 2,
                "wind_speed": 10 + i,
                "conditions": if i % 2 == 0 { "partly_cloudy" } else { "sunny" },
                "precipitation_probability": 20 + i * 10,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "location": {
            "latitude": params.lat,
            "longitude": params.lon,
        },
        "forecast": forecast,
    })))
}
