//! HTTP-backed inference clients.
//!
//! Talks to a remote inference service (one endpoint per capability) with
//! multipart requests carrying the PNG-encoded frame. Raw model labels
//! come back unfiltered; the detector maps them onto the surveillance
//! vocabulary and drops everything else.

use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use skyguard_core::detection::{category_for, map_target_class, BoundingBox};

use crate::error::PipelineError;

use super::{Classifier, ClassifierOutput, Detector, RawDetection};

/// Wire shape of one remote detection: corner-form box `[x1, y1, x2, y2]`.
#[derive(Debug, Deserialize)]
struct RemoteDetection {
    label: String,
    confidence: f64,
    #[serde(rename = "box")]
    bbox: [f64; 4],
}

/// Wire shape of one remote classification.
#[derive(Debug, Deserialize)]
struct RemoteClassification {
    label: String,
    confidence: f64,
}

fn inference_error(e: reqwest::Error) -> PipelineError {
    PipelineError::Inference(e.to_string())
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| PipelineError::Inference(format!("frame encode failed: {e}")))?;
    Ok(bytes)
}

fn image_part(bytes: Vec<u8>) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes)
        .file_name("frame.png")
        .mime_str("image/png")
        .expect("static mime type is valid")
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Detector backed by `POST {endpoint}/v1/detect`.
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(
        &self,
        image: &DynamicImage,
        model_name: &str,
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>, PipelineError> {
        let form = reqwest::multipart::Form::new()
            .part("image", image_part(encode_png(image)?))
            .text("model", model_name.to_string())
            .text("confidence_threshold", confidence_threshold.to_string());

        let response = self
            .client
            .post(format!("{}/v1/detect", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(inference_error)?
            .error_for_status()
            .map_err(inference_error)?;

        let raw: Vec<RemoteDetection> = response.json().await.map_err(inference_error)?;

        let detections = raw
            .into_iter()
            .filter_map(|d| convert_detection(d, confidence_threshold))
            .collect();
        Ok(detections)
    }
}

/// Map one remote detection into the surveillance vocabulary.
///
/// Drops detections outside the vocabulary, below the threshold, or with
/// degenerate boxes.
fn convert_detection(remote: RemoteDetection, confidence_threshold: f64) -> Option<RawDetection> {
    let label = map_target_class(&remote.label)?;
    if remote.confidence < confidence_threshold {
        return None;
    }

    let [x1, y1, x2, y2] = remote.bbox;
    let width = (x2 - x1).round() as i32;
    let height = (y2 - y1).round() as i32;
    if width <= 0 || height <= 0 {
        return None;
    }

    Some(RawDetection {
        label: label.to_string(),
        confidence: remote.confidence,
        bounding_box: BoundingBox {
            x: x1.round() as i32,
            y: y1.round() as i32,
            width,
            height,
        },
    })
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classifier backed by `POST {endpoint}/v1/classify`.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    top_k: usize,
}

impl HttpClassifier {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, top_k: usize) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            top_k,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify_frame(
        &self,
        image: &DynamicImage,
        model_name: &str,
    ) -> Result<Vec<ClassifierOutput>, PipelineError> {
        let form = reqwest::multipart::Form::new()
            .part("image", image_part(encode_png(image)?))
            .text("model", model_name.to_string())
            .text("top_k", self.top_k.to_string());

        let response = self
            .client
            .post(format!("{}/v1/classify", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(inference_error)?
            .error_for_status()
            .map_err(inference_error)?;

        let mut raw: Vec<RemoteClassification> =
            response.json().await.map_err(inference_error)?;

        // The service contract is confidence-descending; enforce it anyway
        // so downstream top-k slicing is stable.
        raw.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        raw.truncate(self.top_k);

        Ok(raw
            .into_iter()
            .map(|c| ClassifierOutput {
                category: category_for(&c.label).to_string(),
                label: c.label,
                confidence: c.confidence,
            })
            .collect())
    }
}
