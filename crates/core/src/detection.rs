//! Detection, classification, and per-frame result types.
//!
//! These are the wire types served to clients: field names follow the
//! public JSON contract (`frame_number`, `bounding_box`, lowercase
//! severity strings), so every layer from the orchestrator to the
//! WebSocket push serializes them identically.

use serde::{Deserialize, Serialize};

use crate::types::FrameIndex;

// ---------------------------------------------------------------------------
// Label vocabulary
// ---------------------------------------------------------------------------

/// Surveillance vocabulary the detectors are mapped onto, with the raw model
/// labels that count as each target class.
const TARGET_CLASSES: [(&str, &[&str]); 3] = [
    ("Person", &["person", "people"]),
    ("Vehicle", &["car", "truck", "bus", "motorcycle", "bicycle", "vehicle"]),
    ("Fire", &["fire", "flame", "smoke"]),
];

/// Labels that always map to high severity regardless of confidence.
const HAZARD_LABELS: [&str; 3] = ["fire", "flame", "smoke"];

/// Labels that map to medium severity when detected with confidence > 0.8.
const GUARDED_LABELS: [&str; 6] = ["person", "people", "vehicle", "car", "truck", "bus"];

/// Substring → category table for classification labels.
const CATEGORY_TABLE: [(&str, &str); 8] = [
    ("fire", "hazard"),
    ("smoke", "hazard"),
    ("person", "security"),
    ("vehicle", "security"),
    ("day", "time"),
    ("night", "time"),
    ("indoor", "environment"),
    ("outdoor", "environment"),
];

/// Map a raw model label onto the surveillance vocabulary.
///
/// Returns `None` for labels outside the vocabulary; the detector drops
/// those detections entirely.
pub fn map_target_class(raw_label: &str) -> Option<&'static str> {
    let lower = raw_label.to_lowercase();
    TARGET_CLASSES
        .iter()
        .find(|(_, aliases)| aliases.contains(&lower.as_str()))
        .map(|(target, _)| *target)
}

/// Map a classification label to its category (hazard, security, time,
/// environment) by substring match, defaulting to `"other"`.
pub fn category_for(label: &str) -> &'static str {
    let lower = label.to_lowercase();
    CATEGORY_TABLE
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, category)| *category)
        .unwrap_or("other")
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a detection, derived deterministically from label and
/// confidence. Serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a severity from a detection's label and confidence.
///
/// Hazard labels are always high. Person/vehicle labels are medium only
/// above 0.8 confidence. Everything else is low. `Critical` is reserved
/// for alert escalation and never produced here.
pub fn severity_for(label: &str, confidence: f64) -> Severity {
    let lower = label.to_lowercase();
    if HAZARD_LABELS.contains(&lower.as_str()) {
        Severity::High
    } else if GUARDED_LABELS.contains(&lower.as_str()) && confidence > 0.8 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Intersection-over-Union with another box.
    ///
    /// Returns 0.0 for disjoint boxes and for degenerate (zero-area) pairs.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) as i64 * (y2 - y1) as i64;
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A single labeled box found in a frame. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Unique within the owning job: `det_{job_id}_{frame}_{n}`.
    pub id: String,
    pub label: String,
    /// In `0.0..=1.0`.
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    pub severity: Severity,
    pub frame_number: FrameIndex,
}

/// A scene-level label for a frame. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Unique within the owning job: `cls_{job_id}_{frame}_{n}`.
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub category: String,
    pub frame_number: FrameIndex,
}

/// The atomic per-frame analysis unit written to the result store.
///
/// Written as a whole or not at all; rewriting the same `frame_number`
/// is idempotent (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_number: FrameIndex,
    /// Seconds from the start of the video: `frame_number / fps`.
    pub timestamp: f64,
    pub detections: Vec<Detection>,
    pub classifications: Vec<Classification>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
