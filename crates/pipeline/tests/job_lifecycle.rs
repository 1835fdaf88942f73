//! Integration tests for the job controller: the full state machine over
//! mock sources and inference backends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;

use skyguard_core::job::JobStatus;
use skyguard_db::catalog::{MemoryCatalog, VideoCatalog};
use skyguard_db::models::video::CreateVideo;
use skyguard_pipeline::controller::{JobController, PipelineConfig};
use skyguard_pipeline::inference::{
    Detector, RawDetection, StaticClassifier, StaticDetector,
};
use skyguard_pipeline::source::MemoryFrameSource;
use skyguard_pipeline::PipelineError;
use skyguard_store::ResultStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_input(job_id: &str) -> CreateVideo {
    CreateVideo {
        external_id: job_id.to_string(),
        filename: format!("{job_id}.mp4"),
        original_filename: Some("clip.mp4".to_string()),
        file_path: format!("uploads/{job_id}.mp4"),
        file_size: 4096,
        duration: 5.0,
        fps: 30.0,
        width: 64,
        height: 64,
        codec: "h264".to_string(),
    }
}

struct Fixture {
    store: Arc<ResultStore>,
    catalog: Arc<MemoryCatalog>,
}

impl Fixture {
    async fn new(job_id: &str) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.create(create_input(job_id)).await.unwrap();
        Self {
            store: Arc::new(ResultStore::new()),
            catalog,
        }
    }

    fn controller(&self, detector: Arc<dyn Detector>) -> JobController {
        JobController::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog) as Arc<dyn VideoCatalog>,
            detector,
            Arc::new(StaticClassifier::surveillance_defaults()),
            PipelineConfig::default(),
        )
    }
}

/// Detector that fails every call from `fail_from` (0-based) onwards.
struct FailingDetector {
    inner: StaticDetector,
    calls: AtomicU64,
    fail_from: u64,
}

impl FailingDetector {
    fn after(ok_calls: u64) -> Self {
        Self {
            inner: StaticDetector::surveillance_defaults(),
            calls: AtomicU64::new(0),
            fail_from: ok_calls,
        }
    }
}

#[async_trait]
impl Detector for FailingDetector {
    async fn detect(
        &self,
        image: &DynamicImage,
        model_name: &str,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from {
            return Err(PipelineError::Inference(
                "detector backend returned HTTP 500".into(),
            ));
        }
        self.inner.detect(image, model_name, confidence_threshold).await
    }
}

// ---------------------------------------------------------------------------
// Test: 150 raw frames at stride 30 process exactly 5 sampled frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stride_sampling_processes_one_frame_per_second() {
    let fixture = Fixture::new("job").await;
    let controller = fixture.controller(Arc::new(StaticDetector::surveillance_defaults()));

    let source = MemoryFrameSource::sampled(30.0, 150, 30);
    controller.run("job", source, CancellationToken::new()).await;

    let frames = fixture.store.all_frames("job").await.unwrap();
    let indices: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
    assert_eq!(indices, vec![0, 30, 60, 90, 120]);

    let status = fixture.store.get_status("job").await.unwrap();
    assert_eq!(status.status, JobStatus::Processed);
    assert_eq!(status.current_frame, 120);
    assert!(status.ended_at.is_some());

    let record = fixture.catalog.find("job").await.unwrap().unwrap();
    assert_eq!(record.status, "processed");
    assert_eq!(record.total_frames_analyzed, 5);
    assert!(record.processing_completed_at.is_some());
}

// ---------------------------------------------------------------------------
// Test: every stored frame carries both detections and classifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn frame_results_are_written_whole() {
    let fixture = Fixture::new("job").await;
    let controller = fixture.controller(Arc::new(StaticDetector::surveillance_defaults()));

    controller
        .run("job", MemoryFrameSource::sampled(30.0, 90, 30), CancellationToken::new())
        .await;

    let frames = fixture.store.all_frames("job").await.unwrap();
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert!(!frame.detections.is_empty());
        assert!(!frame.classifications.is_empty());
        assert!((frame.timestamp - frame.frame_number as f64 / 30.0).abs() < 1e-9);
    }
}

// ---------------------------------------------------------------------------
// Test: a detector failure in the first batch fails the job with no frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detector_failure_in_first_batch_leaves_no_results() {
    let fixture = Fixture::new("job").await;
    // Frame index 2 of a 5-frame job sits in the first (only) batch; the
    // whole batch aborts, so nothing is written.
    let controller = fixture.controller(Arc::new(FailingDetector::after(2)));

    controller
        .run("job", MemoryFrameSource::sampled(1.0, 5, 1), CancellationToken::new())
        .await;

    let status = fixture.store.get_status("job").await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    let error = status.error.expect("failed status must carry the error");
    assert!(error.contains("detector backend returned HTTP 500"));

    let frames = fixture.store.all_frames("job").await.unwrap();
    assert!(frames.is_empty(), "no frame from the aborted batch may land");

    let record = fixture.catalog.find("job").await.unwrap().unwrap();
    assert_eq!(record.status, "failed");
    assert!(record
        .processing_error
        .unwrap()
        .contains("detector backend returned HTTP 500"));
}

// ---------------------------------------------------------------------------
// Test: failure in a later batch keeps every earlier batch's results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detector_failure_keeps_results_from_completed_batches() {
    let fixture = Fixture::new("job").await;
    // 10 sampled frames, batch size 5. The first five calls succeed, so
    // batch one commits; the failure lands in batch two.
    let controller = fixture.controller(Arc::new(FailingDetector::after(5)));

    controller
        .run("job", MemoryFrameSource::sampled(30.0, 300, 30), CancellationToken::new())
        .await;

    let status = fixture.store.get_status("job").await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);

    let frames = fixture.store.all_frames("job").await.unwrap();
    let indices: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
    assert_eq!(indices, vec![0, 30, 60, 90, 120]);
    assert_eq!(status.current_frame, 120);
}

// ---------------------------------------------------------------------------
// Test: current_frame is monotone while the job runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn current_frame_is_monotone_during_processing() {
    let fixture = Fixture::new("job").await;
    let controller = Arc::new(fixture.controller(Arc::new(StaticDetector::surveillance_defaults())));

    let store = Arc::clone(&fixture.store);
    let observer = tokio::spawn(async move {
        let mut last = 0u64;
        loop {
            // Frames are read before the status snapshot: progress is
            // advanced before a batch's frames land, so every visible
            // frame index is covered by the later status read.
            let frames = match store.all_frames("job").await {
                Ok(frames) => frames,
                Err(_) => {
                    tokio::task::yield_now().await;
                    continue;
                }
            };
            let Some(status) = store.get_status("job").await else {
                tokio::task::yield_now().await;
                continue;
            };
            assert!(status.current_frame >= last, "current_frame went backwards");
            last = status.current_frame;
            for frame in &frames {
                assert!(frame.frame_number <= status.current_frame);
            }
            if status.status.is_terminal() {
                return last;
            }
            tokio::task::yield_now().await;
        }
    });

    controller
        .run("job", MemoryFrameSource::sampled(30.0, 900, 30), CancellationToken::new())
        .await;

    let final_seen = observer.await.unwrap();
    assert_eq!(final_seen, 870);
}

// ---------------------------------------------------------------------------
// Test: a cancelled job stops between batches and reports failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_before_first_batch_fails_cleanly() {
    let fixture = Fixture::new("job").await;
    let controller = fixture.controller(Arc::new(StaticDetector::surveillance_defaults()));

    let cancel = CancellationToken::new();
    cancel.cancel();
    controller
        .run("job", MemoryFrameSource::sampled(30.0, 150, 30), cancel)
        .await;

    let status = fixture.store.get_status("job").await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.error.unwrap().contains("cancelled"));
    assert!(fixture.store.all_frames("job").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: kept detections land in the catalog history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kept_detections_are_recorded_to_history() {
    let fixture = Fixture::new("job").await;
    let controller = fixture.controller(Arc::new(StaticDetector::surveillance_defaults()));

    controller
        .run("job", MemoryFrameSource::sampled(30.0, 60, 30), CancellationToken::new())
        .await;

    let (rows, total) = fixture.catalog.detection_history(100, 0).await.unwrap();
    // 2 detections per frame, 2 sampled frames.
    assert_eq!(total, 4);
    assert!(rows.iter().all(|r| r.video_external_id.as_deref() == Some("job")));

    let stats = fixture.catalog.detection_stats().await.unwrap();
    assert_eq!(stats.total_detections, 4);
    assert_eq!(stats.detections_by_type["Person"], 2);
    assert_eq!(stats.detections_by_type["Vehicle"], 2);
}

// ---------------------------------------------------------------------------
// Test: two jobs run independently against the same shared stores
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_jobs_do_not_interfere() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.create(create_input("job-a")).await.unwrap();
    catalog.create(create_input("job-b")).await.unwrap();
    let store = Arc::new(ResultStore::new());

    let controller = Arc::new(JobController::new(
        Arc::clone(&store),
        Arc::clone(&catalog) as Arc<dyn VideoCatalog>,
        Arc::new(StaticDetector::surveillance_defaults()),
        Arc::new(StaticClassifier::surveillance_defaults()),
        PipelineConfig::default(),
    ));

    let a = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .run("job-a", MemoryFrameSource::sampled(30.0, 150, 30), CancellationToken::new())
                .await;
        })
    };
    let b = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .run("job-b", MemoryFrameSource::sampled(30.0, 300, 30), CancellationToken::new())
                .await;
        })
    };
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(store.all_frames("job-a").await.unwrap().len(), 5);
    assert_eq!(store.all_frames("job-b").await.unwrap().len(), 10);
    assert_eq!(
        store.get_status("job-a").await.unwrap().status,
        JobStatus::Processed
    );
    assert_eq!(
        store.get_status("job-b").await.unwrap().status,
        JobStatus::Processed
    );
}
