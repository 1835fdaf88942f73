//! Detection postprocessing: confidence filtering, per-class non-maximum
//! suppression, and aggregation for summary endpoints.
//!
//! Everything here is a pure function over a set of [`Detection`]s so the
//! batch pipeline, the live stream path, and the tests all share one
//! implementation.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::detection::{Detection, Severity};

/// Confidence floor applied when a caller does not supply one.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Service-default IoU threshold for suppression. Call sites pass their
/// threshold explicitly; the analysis endpoints use 0.5.
pub const DEFAULT_NMS_IOU: f64 = 0.4;

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Keep only detections with `confidence >= threshold`.
///
/// Output order follows input order. Filtering twice with the same
/// threshold is a no-op on the second pass.
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    let before = detections.len();
    let kept: Vec<Detection> = detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect();
    tracing::debug!(
        before,
        after = kept.len(),
        threshold,
        "Confidence filter applied"
    );
    kept
}

// ---------------------------------------------------------------------------
// Non-maximum suppression
// ---------------------------------------------------------------------------

/// Greedy per-class non-maximum suppression.
///
/// Detections are grouped by label; within each group the highest-confidence
/// detection is kept and every remaining detection whose IoU with it is at
/// or above `iou_threshold` is suppressed, repeating until the group is
/// exhausted. Detections with different labels never suppress each other.
///
/// The result is the union of kept detections across classes; ordering
/// within the result is not significant.
pub fn non_max_suppression(detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    if detections.len() <= 1 {
        return detections;
    }

    let before = detections.len();

    let mut by_label: HashMap<String, Vec<Detection>> = HashMap::new();
    for detection in detections {
        by_label
            .entry(detection.label.clone())
            .or_default()
            .push(detection);
    }

    let mut kept = Vec::with_capacity(before);
    for (_, mut group) in by_label {
        // Highest confidence first; ties keep input order.
        group.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut remaining = group;
        while let Some(best) = remaining.first().cloned() {
            remaining = remaining
                .into_iter()
                .skip(1)
                .filter(|d| best.bounding_box.iou(&d.bounding_box) < iou_threshold)
                .collect();
            kept.push(best);
        }
    }

    tracing::debug!(before, after = kept.len(), iou_threshold, "NMS applied");
    kept
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Per-label statistics within a detection set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats {
    pub count: u64,
    pub avg_confidence: f64,
    pub max_confidence: f64,
    pub min_confidence: f64,
}

/// Confidence statistics over a whole detection set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Aggregate view of a detection set, used by summary endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub total_detections: u64,
    pub by_type: BTreeMap<String, LabelStats>,
    pub confidence_stats: ConfidenceStats,
    /// Histogram over low / medium / high / critical. All four buckets are
    /// always present, zero-filled.
    pub severity_distribution: BTreeMap<&'static str, u64>,
}

/// Compute count/mean/min/max confidence per label plus a severity
/// histogram for a detection set.
pub fn summarize(detections: &[Detection]) -> DetectionSummary {
    let mut by_type: BTreeMap<String, LabelStats> = BTreeMap::new();
    let mut groups: HashMap<&str, Vec<f64>> = HashMap::new();
    for d in detections {
        groups.entry(&d.label).or_default().push(d.confidence);
    }
    for (label, confidences) in groups {
        let count = confidences.len() as u64;
        let sum: f64 = confidences.iter().sum();
        by_type.insert(
            label.to_string(),
            LabelStats {
                count,
                avg_confidence: sum / count as f64,
                max_confidence: confidences.iter().cloned().fold(f64::MIN, f64::max),
                min_confidence: confidences.iter().cloned().fold(f64::MAX, f64::min),
            },
        );
    }

    let mut severity_distribution: BTreeMap<&'static str, u64> =
        [("low", 0), ("medium", 0), ("high", 0), ("critical", 0)]
            .into_iter()
            .collect();
    for d in detections {
        *severity_distribution.entry(d.severity.as_str()).or_insert(0) += 1;
    }

    DetectionSummary {
        total_detections: detections.len() as u64,
        by_type,
        confidence_stats: confidence_stats(detections),
        severity_distribution,
    }
}

fn confidence_stats(detections: &[Detection]) -> ConfidenceStats {
    if detections.is_empty() {
        return ConfidenceStats {
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }
    let confidences: Vec<f64> = detections.iter().map(|d| d.confidence).collect();
    let n = confidences.len() as f64;
    let mean = confidences.iter().sum::<f64>() / n;
    let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    ConfidenceStats {
        mean,
        std: variance.sqrt(),
        min: confidences.iter().cloned().fold(f64::MAX, f64::min),
        max: confidences.iter().cloned().fold(f64::MIN, f64::max),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
