//! Bounded-batch inference orchestration.
//!
//! Pulls frames from the source in batches of `batch_size`; within a batch
//! every frame's detector and classifier calls run concurrently, and the
//! whole batch is in flight at once. The batch boundary is the only
//! synchronization point: `next_batch` returns once every frame in the
//! batch has both results, so at most one batch of raw pixel buffers is
//! held at a time.
//!
//! Failure policy is fail-fast: the first inference error cancels the
//! batch's remaining calls and propagates, and the controller fails the
//! job.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use skyguard_core::detection::{severity_for, Classification, Detection, FrameResult};
use skyguard_core::postprocess;
use skyguard_core::types::JobId;

use crate::error::PipelineError;
use crate::inference::{Classifier, Detector};
use crate::source::{Frame, FrameSource, SourceMetadata};

/// Frames pulled per batch when the caller does not override it.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Ceiling on a single detector/classifier call. A batch cannot advance
/// past a hung call, so collaborators that never answer would otherwise
/// stall the job forever.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-job inference parameters, fixed for the job's lifetime.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub job_id: JobId,
    pub detection_model: String,
    pub classification_model: String,
    pub confidence_threshold: f64,
    pub nms_iou_threshold: f64,
    pub call_timeout: Duration,
}

impl InferenceSettings {
    pub fn new(job_id: impl Into<JobId>, detection_model: &str, classification_model: &str) -> Self {
        Self {
            job_id: job_id.into(),
            detection_model: detection_model.to_string(),
            classification_model: classification_model.to_string(),
            confidence_threshold: postprocess::DEFAULT_CONFIDENCE_THRESHOLD,
            nms_iou_threshold: 0.5,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Batched, concurrent scheduler over one frame source.
pub struct BatchOrchestrator<S: FrameSource> {
    source: S,
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    settings: Arc<InferenceSettings>,
    batch_size: usize,
    exhausted: bool,
}

impl<S: FrameSource> BatchOrchestrator<S> {
    pub fn new(
        source: S,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        settings: InferenceSettings,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            detector,
            classifier,
            settings: Arc::new(settings),
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    pub fn metadata(&self) -> &SourceMetadata {
        self.source.metadata()
    }

    /// Process the next batch, returning its frame results ascending by
    /// frame index, or `None` once the source is exhausted.
    ///
    /// Any frame's inference error aborts the whole batch; remaining
    /// in-flight calls for the batch are dropped.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<FrameResult>>, PipelineError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut frames: Vec<Frame> = Vec::with_capacity(self.batch_size);
        while frames.len() < self.batch_size {
            match self.source.next_frame().await? {
                Some(frame) => frames.push(frame),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if frames.is_empty() {
            return Ok(None);
        }

        let first = frames.first().map(|f| f.index).unwrap_or_default();
        let last = frames.last().map(|f| f.index).unwrap_or_default();

        let tasks = frames.into_iter().map(|frame| {
            let detector = Arc::clone(&self.detector);
            let classifier = Arc::clone(&self.classifier);
            let settings = Arc::clone(&self.settings);
            async move { analyze_frame(detector, classifier, settings, frame).await }
        });

        // `try_join_all` keeps input order, so the batch stays ascending,
        // and short-circuits on the first error.
        let results = futures::future::try_join_all(tasks).await?;

        tracing::debug!(
            job_id = %self.settings.job_id,
            first_frame = first,
            last_frame = last,
            frames = results.len(),
            "Batch processed"
        );

        Ok(Some(results))
    }
}

/// Run detection and classification for one frame concurrently, then
/// postprocess the detections (confidence filter, per-class NMS).
async fn analyze_frame(
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    settings: Arc<InferenceSettings>,
    frame: Frame,
) -> Result<FrameResult, PipelineError> {
    let detect = with_timeout(
        settings.call_timeout,
        "detector",
        detector.detect(
            &frame.image,
            &settings.detection_model,
            settings.confidence_threshold,
        ),
    );
    let classify = with_timeout(
        settings.call_timeout,
        "classifier",
        classifier.classify_frame(&frame.image, &settings.classification_model),
    );

    // Both must complete before the frame counts as processed.
    let (raw_detections, outputs) = tokio::try_join!(detect, classify)?;

    let detections: Vec<Detection> = raw_detections
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Detection {
            id: format!("det_{}_{}_{}", settings.job_id, frame.index, i),
            severity: severity_for(&raw.label, raw.confidence),
            label: raw.label,
            confidence: raw.confidence,
            bounding_box: raw.bounding_box,
            frame_number: frame.index,
        })
        .collect();
    let detections = postprocess::filter_by_confidence(detections, settings.confidence_threshold);
    let detections = postprocess::non_max_suppression(detections, settings.nms_iou_threshold);

    let classifications: Vec<Classification> = outputs
        .into_iter()
        .enumerate()
        .map(|(i, output)| Classification {
            id: format!("cls_{}_{}_{}", settings.job_id, frame.index, i),
            label: output.label,
            confidence: output.confidence,
            category: output.category,
            frame_number: frame.index,
        })
        .collect();

    Ok(FrameResult {
        frame_number: frame.index,
        timestamp: frame.timestamp,
        detections,
        classifications,
    })
}

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Inference(format!(
            "{what} call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use image::DynamicImage;

    use skyguard_core::detection::BoundingBox;

    use crate::inference::{ClassifierOutput, RawDetection, StaticClassifier, StaticDetector};
    use crate::source::MemoryFrameSource;

    fn settings() -> InferenceSettings {
        InferenceSettings::new("job", "detr", "videomae")
    }

    fn orchestrator(
        source: MemoryFrameSource,
        detector: Arc<dyn Detector>,
    ) -> BatchOrchestrator<MemoryFrameSource> {
        BatchOrchestrator::new(
            source,
            detector,
            Arc::new(StaticClassifier::surveillance_defaults()),
            settings(),
            DEFAULT_BATCH_SIZE,
        )
    }

    #[tokio::test]
    async fn batches_are_ascending_and_bounded() {
        // 12 sampled frames, batch size 5 -> 5 + 5 + 2.
        let source = MemoryFrameSource::sampled(30.0, 360, 30);
        let mut orch = orchestrator(source, Arc::new(StaticDetector::surveillance_defaults()));

        let mut sizes = Vec::new();
        let mut all_indices = Vec::new();
        while let Some(batch) = orch.next_batch().await.unwrap() {
            sizes.push(batch.len());
            all_indices.extend(batch.iter().map(|r| r.frame_number));
        }
        assert_eq!(sizes, vec![5, 5, 2]);
        let expected: Vec<u64> = (0..12).map(|n| n * 30).collect();
        assert_eq!(all_indices, expected);
    }

    #[tokio::test]
    async fn exhausted_orchestrator_returns_none_repeatedly() {
        let source = MemoryFrameSource::sampled(30.0, 30, 30);
        let mut orch = orchestrator(source, Arc::new(StaticDetector::surveillance_defaults()));
        assert!(orch.next_batch().await.unwrap().is_some());
        assert!(orch.next_batch().await.unwrap().is_none());
        assert!(orch.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn detection_ids_are_unique_within_the_job() {
        let source = MemoryFrameSource::sampled(30.0, 150, 30);
        let mut orch = orchestrator(source, Arc::new(StaticDetector::surveillance_defaults()));

        let mut ids = HashSet::new();
        while let Some(batch) = orch.next_batch().await.unwrap() {
            for result in &batch {
                for d in &result.detections {
                    assert!(ids.insert(d.id.clone()), "duplicate id {}", d.id);
                    assert_eq!(d.frame_number, result.frame_number);
                }
                for c in &result.classifications {
                    assert!(ids.insert(c.id.clone()), "duplicate id {}", c.id);
                }
            }
        }
        assert!(!ids.is_empty());
    }

    #[tokio::test]
    async fn overlapping_detections_are_suppressed_per_frame() {
        // Two vehicles with IoU above 0.5 plus one person overlapping both:
        // NMS keeps the stronger vehicle and the person.
        let detector = StaticDetector::new(vec![
            RawDetection {
                label: "Vehicle".to_string(),
                confidence: 0.9,
                bounding_box: BoundingBox {
                    x: 0,
                    y: 0,
                    width: 100,
                    height: 50,
                },
            },
            RawDetection {
                label: "Vehicle".to_string(),
                confidence: 0.7,
                bounding_box: BoundingBox {
                    x: 25,
                    y: 0,
                    width: 100,
                    height: 50,
                },
            },
            RawDetection {
                label: "Person".to_string(),
                confidence: 0.8,
                bounding_box: BoundingBox {
                    x: 25,
                    y: 0,
                    width: 100,
                    height: 50,
                },
            },
        ]);
        let source = MemoryFrameSource::sampled(30.0, 30, 30);
        let mut orch = orchestrator(source, Arc::new(detector));

        let batch = orch.next_batch().await.unwrap().unwrap();
        let result = &batch[0];
        let mut labels: Vec<&str> = result.detections.iter().map(|d| d.label.as_str()).collect();
        labels.sort();
        assert_eq!(labels, vec!["Person", "Vehicle"]);
        let vehicle = result
            .detections
            .iter()
            .find(|d| d.label == "Vehicle")
            .unwrap();
        assert!((vehicle.confidence - 0.9).abs() < 1e-9);
    }

    /// Fails every call after the first `ok_calls`.
    struct FlakyDetector {
        inner: StaticDetector,
        calls: AtomicU64,
        ok_calls: u64,
    }

    #[async_trait]
    impl Detector for FlakyDetector {
        async fn detect(
            &self,
            image: &DynamicImage,
            model_name: &str,
            confidence_threshold: f64,
        ) -> Result<Vec<RawDetection>, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.ok_calls {
                return Err(PipelineError::Inference("CUDA device lost".into()));
            }
            self.inner.detect(image, model_name, confidence_threshold).await
        }
    }

    #[tokio::test]
    async fn first_inference_error_aborts_the_batch() {
        let detector = FlakyDetector {
            inner: StaticDetector::surveillance_defaults(),
            calls: AtomicU64::new(0),
            ok_calls: 0,
        };
        let source = MemoryFrameSource::sampled(30.0, 150, 30);
        let mut orch = orchestrator(source, Arc::new(detector));

        let err = orch.next_batch().await.err().expect("batch must fail");
        assert!(matches!(err, PipelineError::Inference(_)));
        assert!(err.to_string().contains("CUDA device lost"));
    }

    struct SlowClassifier;

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify_frame(
            &self,
            _image: &DynamicImage,
            _model_name: &str,
        ) -> Result<Vec<ClassifierOutput>, PipelineError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_collaborator_times_out() {
        let mut cfg = settings();
        cfg.call_timeout = Duration::from_millis(100);
        let source = MemoryFrameSource::sampled(30.0, 30, 30);
        let mut orch = BatchOrchestrator::new(
            source,
            Arc::new(StaticDetector::surveillance_defaults()),
            Arc::new(SlowClassifier),
            cfg,
            DEFAULT_BATCH_SIZE,
        );

        let err = orch.next_batch().await.err().expect("must time out");
        assert!(matches!(err, PipelineError::Inference(_)));
        assert!(err.to_string().contains("classifier"));
    }
}
