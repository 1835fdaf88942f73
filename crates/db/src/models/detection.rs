//! Detection history entity models and aggregate views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use skyguard_core::types::Timestamp;

/// A row from the `detections` table. One row per detection kept after
/// postprocessing, for the history and stats endpoints.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Detection id as produced by the pipeline (`det_{job}_{frame}_{n}`).
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub detected_at: Timestamp,
    /// Job the detection came from, when it came from a video.
    pub video_external_id: Option<String>,
    pub severity: String,
    pub status: String,
}

/// DTO for recording a batch of kept detections.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub video_external_id: Option<String>,
    pub severity: String,
}

/// Confidence-bucketed counts for the stats endpoint.
///
/// Buckets follow the dashboard's definition: high >= 0.85,
/// medium in [0.6, 0.85), low < 0.6.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfidenceDistribution {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

/// Aggregate detection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionStats {
    pub total_detections: i64,
    pub detections_by_type: BTreeMap<String, i64>,
    pub confidence_distribution: ConfidenceDistribution,
    pub average_confidence: f64,
}
