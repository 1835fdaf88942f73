//! Job controller: drives one analysis job through its state machine.
//!
//! ```text
//! uploaded -> processing -> processed
//!                        -> failed
//! ```
//!
//! The controller owns both status surfaces: the hot entry in the result
//! store (what live subscribers poll) and the durable catalog row (what
//! history endpoints read). Batches are committed strictly in frame
//! order: progress advances to the batch's maximum index first, then each
//! frame result lands, so readers never observe a frame beyond
//! `current_frame`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use skyguard_core::detection::FrameResult;
use skyguard_core::job::JobStatus;
use skyguard_db::catalog::VideoCatalog;
use skyguard_db::models::detection::NewDetection;
use skyguard_store::ResultStore;

use crate::error::PipelineError;
use crate::inference::{Classifier, Detector};
use crate::orchestrator::{BatchOrchestrator, InferenceSettings, DEFAULT_BATCH_SIZE, DEFAULT_CALL_TIMEOUT};
use crate::source::{FfmpegFrameSource, FrameSource, StridePolicy, DEFAULT_FRAME_CAP_MULTIPLIER};

/// Pipeline-wide processing parameters, shared by every job the service
/// runs. Per-job parameters (the job id) are bound at run time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub detection_model: String,
    pub classification_model: String,
    pub confidence_threshold: f64,
    pub nms_iou_threshold: f64,
    pub call_timeout: std::time::Duration,
    /// Raw-frame traversal cap, as a multiple of the stride.
    pub frame_cap_multiplier: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            detection_model: "facebook/detr-resnet-50".to_string(),
            classification_model: "MCG-NJU/videomae-base".to_string(),
            confidence_threshold: skyguard_core::postprocess::DEFAULT_CONFIDENCE_THRESHOLD,
            nms_iou_threshold: 0.5,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            frame_cap_multiplier: DEFAULT_FRAME_CAP_MULTIPLIER,
        }
    }
}

impl PipelineConfig {
    fn settings_for(&self, job_id: &str) -> InferenceSettings {
        InferenceSettings {
            job_id: job_id.to_string(),
            detection_model: self.detection_model.clone(),
            classification_model: self.classification_model.clone(),
            confidence_threshold: self.confidence_threshold,
            nms_iou_threshold: self.nms_iou_threshold,
            call_timeout: self.call_timeout,
        }
    }
}

/// Drives jobs from `uploaded` to a terminal state.
///
/// Cheap to clone-by-Arc into background tasks; holds only shared handles.
pub struct JobController {
    store: Arc<ResultStore>,
    catalog: Arc<dyn VideoCatalog>,
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    config: PipelineConfig,
}

impl JobController {
    pub fn new(
        store: Arc<ResultStore>,
        catalog: Arc<dyn VideoCatalog>,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            detector,
            classifier,
            config,
        }
    }

    /// Open a stored video at batch stride and run it as a job.
    ///
    /// An open failure at this point (the upload-time probe succeeded but
    /// the file is gone or unreadable now) fails the job on both status
    /// surfaces rather than leaving it stuck in `uploaded`.
    pub async fn run_video_file(
        &self,
        job_id: &str,
        path: impl Into<std::path::PathBuf>,
        cancel: CancellationToken,
    ) {
        let source = match FfmpegFrameSource::open(
            path,
            StridePolicy::Batch,
            self.config.frame_cap_multiplier,
        )
        .await
        {
            Ok(source) => source,
            Err(error) => {
                let message = error.to_string();
                self.store.init_job(job_id, 0).await;
                let _ = self
                    .store
                    .set_status(job_id, JobStatus::Failed, Some(message.clone()))
                    .await;
                if let Err(e) = self.catalog.mark_failed(job_id, &message).await {
                    tracing::error!(job_id, error = %e, "Failed to update catalog row");
                }
                tracing::warn!(job_id, error = %message, "Job failed before processing");
                return;
            }
        };
        self.run(job_id, source, cancel).await;
    }

    /// Run one job to completion, recording the terminal state on both
    /// status surfaces. Never panics; every failure ends in `failed` with
    /// the error text captured verbatim.
    pub async fn run<S: FrameSource>(&self, job_id: &str, source: S, cancel: CancellationToken) {
        tracing::info!(job_id, "Job processing started");

        match self.process(job_id, source, &cancel).await {
            Ok(frames_analyzed) => {
                if let Err(e) = self
                    .store
                    .set_status(job_id, JobStatus::Processed, None)
                    .await
                {
                    tracing::error!(job_id, error = %e, "Failed to record processed status");
                }
                if let Err(e) = self
                    .catalog
                    .mark_processed(job_id, frames_analyzed as i64)
                    .await
                {
                    tracing::error!(job_id, error = %e, "Failed to update catalog row");
                }
                tracing::info!(job_id, frames_analyzed, "Job processed");
            }
            Err(error) => {
                let message = error.to_string();
                if let Err(e) = self
                    .store
                    .set_status(job_id, JobStatus::Failed, Some(message.clone()))
                    .await
                {
                    tracing::error!(job_id, error = %e, "Failed to record failed status");
                }
                if let Err(e) = self.catalog.mark_failed(job_id, &message).await {
                    tracing::error!(job_id, error = %e, "Failed to update catalog row");
                }
                tracing::warn!(job_id, error = %message, "Job failed");
            }
        }
    }

    async fn process<S: FrameSource>(
        &self,
        job_id: &str,
        source: S,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        let total_frames = source.metadata().total_frames.max(0) as u64;

        self.catalog.mark_processing(job_id).await?;
        self.store.init_job(job_id, total_frames).await;

        let mut orchestrator = BatchOrchestrator::new(
            source,
            Arc::clone(&self.detector),
            Arc::clone(&self.classifier),
            self.config.settings_for(job_id),
            self.config.batch_size,
        );

        let mut frames_analyzed: u64 = 0;
        loop {
            // Checked only at the batch boundary: an in-flight batch
            // either finishes and commits whole, or is never written.
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let Some(batch) = orchestrator.next_batch().await? else {
                break;
            };

            self.commit_batch(job_id, batch, &mut frames_analyzed).await?;
        }

        Ok(frames_analyzed)
    }

    /// Commit one completed batch: advance progress to the batch maximum,
    /// then write each frame result and its detection history.
    async fn commit_batch(
        &self,
        job_id: &str,
        batch: Vec<FrameResult>,
        frames_analyzed: &mut u64,
    ) -> Result<(), PipelineError> {
        let Some(max_frame) = batch.last().map(|r| r.frame_number) else {
            return Ok(());
        };
        self.store.advance_current_frame(job_id, max_frame).await?;

        let history: Vec<NewDetection> = batch
            .iter()
            .flat_map(|result| result.detections.iter())
            .map(|d| NewDetection {
                id: d.id.clone(),
                label: d.label.clone(),
                confidence: d.confidence,
                video_external_id: Some(job_id.to_string()),
                severity: d.severity.as_str().to_string(),
            })
            .collect();
        if !history.is_empty() {
            self.catalog.record_detections(history).await?;
        }

        for result in batch {
            *frames_analyzed += 1;
            self.store.put_frame(job_id, result).await?;
        }
        Ok(())
    }
}
