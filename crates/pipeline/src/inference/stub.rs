//! Deterministic in-process inference backends.
//!
//! Used by the test suites and as the startup fallback when no remote
//! inference endpoint is configured: the pipeline stays exercisable end
//! to end without network access or model weights.

use async_trait::async_trait;
use image::DynamicImage;

use skyguard_core::detection::BoundingBox;

use crate::error::PipelineError;

use super::{Classifier, ClassifierOutput, Detector, RawDetection};

/// Detector that returns the same detection set for every frame.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    detections: Vec<RawDetection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }

    /// A typical surveillance frame: one person, one vehicle.
    pub fn surveillance_defaults() -> Self {
        Self::new(vec![
            RawDetection {
                label: "Person".to_string(),
                confidence: 0.91,
                bounding_box: BoundingBox {
                    x: 120,
                    y: 80,
                    width: 60,
                    height: 160,
                },
            },
            RawDetection {
                label: "Vehicle".to_string(),
                confidence: 0.84,
                bounding_box: BoundingBox {
                    x: 400,
                    y: 220,
                    width: 220,
                    height: 140,
                },
            },
        ])
    }
}

#[async_trait]
impl Detector for StaticDetector {
    async fn detect(
        &self,
        _image: &DynamicImage,
        _model_name: &str,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PipelineError> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }
}

/// Classifier that returns a fixed ranked list for every frame.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    outputs: Vec<ClassifierOutput>,
}

impl StaticClassifier {
    pub fn new(outputs: Vec<ClassifierOutput>) -> Self {
        Self { outputs }
    }

    /// The stock scene readout for an outdoor daytime surveillance feed.
    pub fn surveillance_defaults() -> Self {
        Self::new(vec![
            ClassifierOutput {
                label: "Surveillance Activity".to_string(),
                confidence: 0.92,
                category: "security".to_string(),
            },
            ClassifierOutput {
                label: "Outdoor Scene".to_string(),
                confidence: 0.88,
                category: "environment".to_string(),
            },
            ClassifierOutput {
                label: "Daytime".to_string(),
                confidence: 0.95,
                category: "time".to_string(),
            },
            ClassifierOutput {
                label: "Clear Weather".to_string(),
                confidence: 0.83,
                category: "weather".to_string(),
            },
        ])
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify_frame(
        &self,
        _image: &DynamicImage,
        _model_name: &str,
    ) -> Result<Vec<ClassifierOutput>, PipelineError> {
        Ok(self.outputs.clone())
    }
}
