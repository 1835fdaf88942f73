//! The durable record store behind one trait.
//!
//! [`VideoCatalog`] is the seam between the pipeline/API and whatever
//! holds job metadata durably. [`PgCatalog`] delegates to the sqlx
//! repositories; [`MemoryCatalog`] keeps everything in process for tests
//! and for running the service without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::detection::{
    ConfidenceDistribution, DetectionRecord, DetectionStats, NewDetection,
};
use crate::models::video::{CreateVideo, VideoRecord};
use crate::repositories::{DetectionRepo, VideoRepo};
use crate::DbPool;

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("video {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Durable store of job metadata and detection history.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Register a freshly uploaded video with status `uploaded`.
    async fn create(&self, input: CreateVideo) -> Result<VideoRecord, CatalogError>;

    async fn find(&self, external_id: &str) -> Result<Option<VideoRecord>, CatalogError>;

    /// All videos, newest upload first.
    async fn list(&self) -> Result<Vec<VideoRecord>, CatalogError>;

    /// Remove the record. Returns whether it existed.
    async fn delete(&self, external_id: &str) -> Result<bool, CatalogError>;

    /// `uploaded -> processing`. No-op if the job is already terminal.
    async fn mark_processing(&self, external_id: &str) -> Result<(), CatalogError>;

    /// `processing -> processed`, recording the frame count.
    async fn mark_processed(
        &self,
        external_id: &str,
        total_frames_analyzed: i64,
    ) -> Result<(), CatalogError>;

    /// `processing -> failed`, capturing the error text verbatim.
    async fn mark_failed(&self, external_id: &str, error: &str) -> Result<(), CatalogError>;

    /// Record kept detections for the history/stats endpoints.
    async fn record_detections(&self, detections: Vec<NewDetection>) -> Result<(), CatalogError>;

    /// Detection history (newest first) plus total row count.
    async fn detection_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DetectionRecord>, i64), CatalogError>;

    async fn detection_stats(&self) -> Result<DetectionStats, CatalogError>;
}

// ---------------------------------------------------------------------------
// Postgres-backed catalog
// ---------------------------------------------------------------------------

/// Catalog backed by the sqlx repositories.
pub struct PgCatalog {
    pool: DbPool,
}

impl PgCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoCatalog for PgCatalog {
    async fn create(&self, input: CreateVideo) -> Result<VideoRecord, CatalogError> {
        Ok(VideoRepo::create(&self.pool, &input).await?)
    }

    async fn find(&self, external_id: &str) -> Result<Option<VideoRecord>, CatalogError> {
        Ok(VideoRepo::find_by_external_id(&self.pool, external_id).await?)
    }

    async fn list(&self) -> Result<Vec<VideoRecord>, CatalogError> {
        Ok(VideoRepo::list(&self.pool).await?)
    }

    async fn delete(&self, external_id: &str) -> Result<bool, CatalogError> {
        Ok(VideoRepo::delete(&self.pool, external_id).await?)
    }

    async fn mark_processing(&self, external_id: &str) -> Result<(), CatalogError> {
        VideoRepo::mark_processing(&self.pool, external_id).await?;
        Ok(())
    }

    async fn mark_processed(
        &self,
        external_id: &str,
        total_frames_analyzed: i64,
    ) -> Result<(), CatalogError> {
        VideoRepo::mark_processed(&self.pool, external_id, total_frames_analyzed).await?;
        Ok(())
    }

    async fn mark_failed(&self, external_id: &str, error: &str) -> Result<(), CatalogError> {
        VideoRepo::mark_failed(&self.pool, external_id, error).await?;
        Ok(())
    }

    async fn record_detections(&self, detections: Vec<NewDetection>) -> Result<(), CatalogError> {
        DetectionRepo::record_batch(&self.pool, &detections).await?;
        Ok(())
    }

    async fn detection_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DetectionRecord>, i64), CatalogError> {
        Ok(DetectionRepo::history(&self.pool, limit, offset).await?)
    }

    async fn detection_stats(&self) -> Result<DetectionStats, CatalogError> {
        Ok(DetectionRepo::stats(&self.pool).await?)
    }
}

// ---------------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    videos: HashMap<String, VideoRecord>,
    detections: Vec<DetectionRecord>,
    next_id: i64,
}

/// In-process catalog with the same transition semantics as [`PgCatalog`].
#[derive(Default)]
pub struct MemoryCatalog {
    inner: RwLock<MemoryInner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_terminal(status: &str) -> bool {
    status == "processed" || status == "failed"
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn create(&self, input: CreateVideo) -> Result<VideoRecord, CatalogError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let now = chrono::Utc::now();
        let record = VideoRecord {
            id: inner.next_id,
            external_id: input.external_id.clone(),
            filename: input.filename,
            original_filename: input.original_filename,
            file_path: input.file_path,
            file_size: input.file_size,
            duration: input.duration,
            fps: input.fps,
            width: input.width,
            height: input.height,
            codec: input.codec,
            status: "uploaded".to_string(),
            processing_started_at: None,
            processing_completed_at: None,
            processing_error: None,
            total_frames_analyzed: 0,
            uploaded_at: now,
            created_at: now,
            updated_at: now,
        };
        inner.videos.insert(input.external_id, record.clone());
        Ok(record)
    }

    async fn find(&self, external_id: &str) -> Result<Option<VideoRecord>, CatalogError> {
        Ok(self.inner.read().await.videos.get(external_id).cloned())
    }

    async fn list(&self) -> Result<Vec<VideoRecord>, CatalogError> {
        let inner = self.inner.read().await;
        let mut videos: Vec<VideoRecord> = inner.videos.values().cloned().collect();
        videos.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(videos)
    }

    async fn delete(&self, external_id: &str) -> Result<bool, CatalogError> {
        Ok(self.inner.write().await.videos.remove(external_id).is_some())
    }

    async fn mark_processing(&self, external_id: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.videos.get_mut(external_id) {
            if !is_terminal(&record.status) {
                record.status = "processing".to_string();
                record.processing_started_at = Some(chrono::Utc::now());
                record.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_processed(
        &self,
        external_id: &str,
        total_frames_analyzed: i64,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.videos.get_mut(external_id) {
            if !is_terminal(&record.status) {
                record.status = "processed".to_string();
                record.processing_completed_at = Some(chrono::Utc::now());
                record.total_frames_analyzed = total_frames_analyzed;
                record.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, external_id: &str, error: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.videos.get_mut(external_id) {
            if !is_terminal(&record.status) {
                record.status = "failed".to_string();
                record.processing_completed_at = Some(chrono::Utc::now());
                record.processing_error = Some(error.to_string());
                record.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }

    async fn record_detections(&self, detections: Vec<NewDetection>) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().await;
        let now = chrono::Utc::now();
        for d in detections {
            if inner.detections.iter().any(|existing| existing.id == d.id) {
                continue;
            }
            inner.detections.push(DetectionRecord {
                id: d.id,
                label: d.label,
                confidence: d.confidence,
                detected_at: now,
                video_external_id: d.video_external_id,
                severity: d.severity,
                status: "active".to_string(),
            });
        }
        Ok(())
    }

    async fn detection_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DetectionRecord>, i64), CatalogError> {
        let inner = self.inner.read().await;
        let mut rows = inner.detections.clone();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn detection_stats(&self) -> Result<DetectionStats, CatalogError> {
        let inner = self.inner.read().await;
        let rows = &inner.detections;
        let total = rows.len() as i64;

        let mut detections_by_type: BTreeMap<String, i64> = BTreeMap::new();
        let mut distribution = ConfidenceDistribution::default();
        let mut confidence_sum = 0.0;
        for d in rows {
            *detections_by_type.entry(d.label.clone()).or_insert(0) += 1;
            confidence_sum += d.confidence;
            if d.confidence >= 0.85 {
                distribution.high += 1;
            } else if d.confidence >= 0.6 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }

        Ok(DetectionStats {
            total_detections: total,
            detections_by_type,
            confidence_distribution: distribution,
            average_confidence: if total > 0 {
                confidence_sum / total as f64
            } else {
                0.0
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn create_input(external_id: &str) -> CreateVideo {
        CreateVideo {
            external_id: external_id.to_string(),
            filename: format!("{external_id}.mp4"),
            original_filename: Some("footage.mp4".to_string()),
            file_path: format!("uploads/{external_id}.mp4"),
            file_size: 1024,
            duration: 5.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
        }
    }

    fn detection(id: &str, confidence: f64) -> NewDetection {
        NewDetection {
            id: id.to_string(),
            label: "Person".to_string(),
            confidence,
            video_external_id: Some("vid".to_string()),
            severity: "low".to_string(),
        }
    }

    #[tokio::test]
    async fn create_find_list_delete_round_trip() {
        let catalog = MemoryCatalog::new();
        catalog.create(create_input("a")).await.unwrap();
        catalog.create(create_input("b")).await.unwrap();

        let found = catalog.find("a").await.unwrap().unwrap();
        assert_eq!(found.status, "uploaded");
        assert_eq!(catalog.list().await.unwrap().len(), 2);

        assert!(catalog.delete("a").await.unwrap());
        assert!(!catalog.delete("a").await.unwrap());
        assert!(catalog.find("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lifecycle_transitions_stamp_fields() {
        let catalog = MemoryCatalog::new();
        catalog.create(create_input("vid")).await.unwrap();

        catalog.mark_processing("vid").await.unwrap();
        let record = catalog.find("vid").await.unwrap().unwrap();
        assert_eq!(record.status, "processing");
        assert!(record.processing_started_at.is_some());

        catalog.mark_processed("vid", 5).await.unwrap();
        let record = catalog.find("vid").await.unwrap().unwrap();
        assert_eq!(record.status, "processed");
        assert_eq!(record.total_frames_analyzed, 5);
        assert!(record.processing_completed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let catalog = MemoryCatalog::new();
        catalog.create(create_input("vid")).await.unwrap();
        catalog.mark_processing("vid").await.unwrap();
        catalog.mark_failed("vid", "boom").await.unwrap();

        // A late success report cannot overwrite the failure.
        catalog.mark_processed("vid", 99).await.unwrap();
        let record = catalog.find("vid").await.unwrap().unwrap();
        assert_eq!(record.status, "failed");
        assert_eq!(record.processing_error.as_deref(), Some("boom"));
        assert_eq!(record.total_frames_analyzed, 0);
    }

    #[tokio::test]
    async fn recording_detections_is_idempotent_per_id() {
        let catalog = MemoryCatalog::new();
        catalog
            .record_detections(vec![detection("d1", 0.9), detection("d1", 0.9)])
            .await
            .unwrap();
        catalog
            .record_detections(vec![detection("d1", 0.9), detection("d2", 0.5)])
            .await
            .unwrap();

        let (rows, total) = catalog.detection_history(10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn stats_bucket_confidences() {
        let catalog = MemoryCatalog::new();
        catalog
            .record_detections(vec![
                detection("d1", 0.9),
                detection("d2", 0.7),
                detection("d3", 0.5),
                detection("d4", 0.85),
            ])
            .await
            .unwrap();

        let stats = catalog.detection_stats().await.unwrap();
        assert_eq!(stats.total_detections, 4);
        assert_eq!(stats.confidence_distribution.high, 2);
        assert_eq!(stats.confidence_distribution.medium, 1);
        assert_eq!(stats.confidence_distribution.low, 1);
        assert_eq!(stats.detections_by_type["Person"], 4);
        assert!((stats.average_confidence - 0.7375).abs() < 1e-9);
    }
}
