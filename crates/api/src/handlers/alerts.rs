//! Handlers for the `/alerts` resource.
//!
//! A mock data surface: alerts live on an in-memory board seeded with
//! representative entries. Thin plumbing by design.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use skyguard_core::error::CoreError;
use skyguard_core::types::Timestamp;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub timestamp: Timestamp,
    /// One of critical | high | medium | low.
    pub severity: String,
    pub confidence: i32,
    pub location: String,
    /// One of new | acknowledged | resolved.
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
pub struct AlertCreate {
    pub title: String,
    pub description: String,
    pub severity: String,
    pub confidence: i32,
    pub location: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
pub struct AlertUpdate {
    pub status: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertFilter {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// In-memory alert storage, newest first.
#[derive(Default)]
pub struct AlertBoard {
    alerts: RwLock<Vec<Alert>>,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board pre-populated with representative alerts.
    pub fn with_seed_data() -> Self {
        let now = chrono::Utc::now();
        let seed = vec![
            Alert {
                id: "alert_001".to_string(),
                title: "Fire Detected".to_string(),
                description: "Potential wildfire detected in sector A-7 with high heat signature."
                    .to_string(),
                timestamp: now - chrono::Duration::minutes(5),
                severity: "critical".to_string(),
                confidence: 94,
                location: "Sector A-7, North Ridge".to_string(),
                status: "new".to_string(),
                kind: "fire".to_string(),
                coordinates: Some(Coordinates {
                    lat: 37.7749,
                    lng: -122.4194,
                }),
            },
            Alert {
                id: "alert_002".to_string(),
                title: "Unauthorized Vehicle".to_string(),
                description:
                    "Unidentified vehicle detected in restricted area near the perimeter fence."
                        .to_string(),
                timestamp: now - chrono::Duration::minutes(15),
                severity: "high".to_string(),
                confidence: 87,
                location: "Perimeter Zone B, East Entrance".to_string(),
                status: "acknowledged".to_string(),
                kind: "intrusion".to_string(),
                coordinates: Some(Coordinates {
                    lat: 37.7759,
                    lng: -122.4204,
                }),
            },
            Alert {
                id: "alert_003".to_string(),
                title: "Crowd Formation".to_string(),
                description:
                    "Unusual crowd density detected in public area exceeding safety thresholds."
                        .to_string(),
                timestamp: now - chrono::Duration::minutes(30),
                severity: "medium".to_string(),
                confidence: 76,
                location: "Central Plaza, Main Entrance".to_string(),
                status: "new".to_string(),
                kind: "crowd".to_string(),
                coordinates: Some(Coordinates {
                    lat: 37.7769,
                    lng: -122.4174,
                }),
            },
        ];
        Self {
            alerts: RwLock::new(seed),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<Alert>>> {
    let alerts = state.alerts.alerts.read().await;
    let filtered = alerts
        .iter()
        .filter(|a| filter.status.as_deref().is_none_or(|s| a.status == s))
        .filter(|a| filter.severity.as_deref().is_none_or(|s| a.severity == s))
        .skip(filter.offset.unwrap_or(0))
        .take(filter.limit.unwrap_or(100))
        .cloned()
        .collect();
    Ok(Json(filtered))
}

/// POST /api/v1/alerts
pub async fn create_alert(
    State(state): State<AppState>,
    Json(input): Json<AlertCreate>,
) -> AppResult<(StatusCode, Json<Alert>)> {
    let alert = Alert {
        id: format!("alert_{}", uuid::Uuid::new_v4()),
        title: input.title,
        description: input.description,
        timestamp: chrono::Utc::now(),
        severity: input.severity,
        confidence: input.confidence,
        location: input.location,
        status: "new".to_string(),
        kind: input.kind,
        coordinates: input.coordinates,
    };
    let mut alerts = state.alerts.alerts.write().await;
    alerts.insert(0, alert.clone());
    Ok((StatusCode::CREATED, Json(alert)))
}

/// PATCH /api/v1/alerts/{alert_id}
pub async fn update_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(update): Json<AlertUpdate>,
) -> AppResult<Json<Alert>> {
    let mut alerts = state.alerts.alerts.write().await;
    let alert = alerts
        .iter_mut()
        .find(|a| a.id == alert_id)
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Alert",
                id: alert_id.clone(),
            })
        })?;
    if let Some(status) = update.status {
        alert.status = status;
    }
    if let Some(severity) = update.severity {
        alert.severity = severity;
    }
    Ok(Json(alert.clone()))
}
