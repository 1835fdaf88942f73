//! Repository for the `detections` table (detection history).

use std::collections::BTreeMap;

use sqlx::{PgPool, Row};

use crate::models::detection::{
    ConfidenceDistribution, DetectionRecord, DetectionStats, NewDetection,
};

/// Column list for `detections` queries.
const COLUMNS: &str =
    "id, label, confidence, detected_at, video_external_id, severity, status";

/// High-confidence bucket floor for the stats endpoint.
const HIGH_CONFIDENCE: f64 = 0.85;

/// Medium-confidence bucket floor.
const MEDIUM_CONFIDENCE: f64 = 0.6;

/// Provides history recording and aggregate queries for detections.
pub struct DetectionRepo;

impl DetectionRepo {
    /// Record a batch of kept detections. Re-recording an id is ignored;
    /// a retried frame writes the same detections.
    pub async fn record_batch(
        pool: &PgPool,
        detections: &[NewDetection],
    ) -> Result<(), sqlx::Error> {
        for d in detections {
            sqlx::query(
                "INSERT INTO detections (id, label, confidence, video_external_id, severity, status) \
                 VALUES ($1, $2, $3, $4, $5, 'active') \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&d.id)
            .bind(&d.label)
            .bind(d.confidence)
            .bind(&d.video_external_id)
            .bind(&d.severity)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Detection history, newest first, with the total row count for
    /// pagination.
    pub async fn history(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DetectionRecord>, i64), sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM detections ORDER BY detected_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, DetectionRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
            .fetch_one(pool)
            .await?;
        Ok((rows, total))
    }

    /// Aggregate statistics over all recorded detections.
    pub async fn stats(pool: &PgPool) -> Result<DetectionStats, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
            .fetch_one(pool)
            .await?;

        let by_label_rows = sqlx::query(
            "SELECT label, COUNT(*) AS count FROM detections GROUP BY label",
        )
        .fetch_all(pool)
        .await?;
        let mut detections_by_type = BTreeMap::new();
        for row in by_label_rows {
            detections_by_type.insert(row.get::<String, _>("label"), row.get::<i64, _>("count"));
        }

        let high: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections WHERE confidence >= $1")
            .bind(HIGH_CONFIDENCE)
            .fetch_one(pool)
            .await?;
        let medium: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM detections WHERE confidence >= $1 AND confidence < $2",
        )
        .bind(MEDIUM_CONFIDENCE)
        .bind(HIGH_CONFIDENCE)
        .fetch_one(pool)
        .await?;
        let low: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections WHERE confidence < $1")
            .bind(MEDIUM_CONFIDENCE)
            .fetch_one(pool)
            .await?;

        let average_confidence: Option<f64> =
            sqlx::query_scalar("SELECT AVG(confidence) FROM detections")
                .fetch_one(pool)
                .await?;

        Ok(DetectionStats {
            total_detections: total,
            detections_by_type,
            confidence_distribution: ConfidenceDistribution { high, medium, low },
            average_confidence: average_confidence.unwrap_or(0.0),
        })
    }
}
