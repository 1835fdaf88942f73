//! Detector and Classifier capabilities.
//!
//! The models themselves are external collaborators; the pipeline talks to
//! them through these traits. Implementations are constructed once at
//! startup and injected wherever inference is needed — there is no
//! process-wide default instance.

mod remote;
mod stub;

use async_trait::async_trait;
use image::DynamicImage;

use skyguard_core::detection::BoundingBox;

use crate::error::PipelineError;

pub use remote::{HttpClassifier, HttpDetector};
pub use stub::{StaticClassifier, StaticDetector};

/// A labeled box as returned by a detector, before id assignment and
/// postprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// A ranked scene label as returned by a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    pub label: String,
    pub confidence: f64,
    pub category: String,
}

/// Object detection capability.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect objects in one frame. Returned labels are already mapped
    /// onto the surveillance vocabulary; detections the model reports
    /// outside it are dropped by the implementation.
    async fn detect(
        &self,
        image: &DynamicImage,
        model_name: &str,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PipelineError>;
}

/// Scene classification capability. Results are ranked by confidence
/// descending (top-k).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify_frame(
        &self,
        image: &DynamicImage,
        model_name: &str,
    ) -> Result<Vec<ClassifierOutput>, PipelineError>;
}

/// Placeholder classifications served when the live path's per-frame
/// classification fails. The batch pipeline never uses these — there a
/// classifier error fails the whole job.
pub fn placeholder_classifications() -> Vec<ClassifierOutput> {
    vec![
        ClassifierOutput {
            label: "Outdoor Scene".to_string(),
            confidence: 0.94,
            category: "environment".to_string(),
        },
        ClassifierOutput {
            label: "Daytime".to_string(),
            confidence: 0.92,
            category: "time".to_string(),
        },
    ]
}

/// Classify a frame, degrading to [`placeholder_classifications`] on
/// failure. Used only on the real-time streaming path.
pub async fn classify_with_fallback(
    classifier: &dyn Classifier,
    image: &DynamicImage,
    model_name: &str,
) -> Vec<ClassifierOutput> {
    match classifier.classify_frame(image, model_name).await {
        Ok(outputs) => outputs,
        Err(e) => {
            tracing::warn!(error = %e, "Frame classification failed, serving placeholders");
            placeholder_classifications()
        }
    }
}
