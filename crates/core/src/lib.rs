//! Domain core for the SkyGuard video-analysis platform.
//!
//! Holds the shared vocabulary (detections, classifications, job status),
//! the pure postprocessing functions (confidence filtering, per-class NMS,
//! aggregation), and the ffmpeg/ffprobe subprocess utilities. No internal
//! dependencies; every other crate in the workspace builds on this one.

pub mod detection;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod postprocess;
pub mod types;
