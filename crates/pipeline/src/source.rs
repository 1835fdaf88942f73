//! Frame sources: sampled iteration over a decoded video.
//!
//! [`FfmpegFrameSource`] is the production implementation, extracting one
//! frame per stride step through the `ffmpeg` subprocess utilities in
//! `skyguard_core::ffmpeg`. [`MemoryFrameSource`] serves tests and smoke
//! runs with synthetic frames.

use std::path::PathBuf;

use async_trait::async_trait;
use image::DynamicImage;

use skyguard_core::ffmpeg::{self, FfmpegError, VideoProbe};
use skyguard_core::types::FrameIndex;

use crate::error::PipelineError;

/// Default bound on raw frames traversed per job, as a multiple of the
/// stride. Guarantees termination on containers that misreport their
/// frame count.
pub const DEFAULT_FRAME_CAP_MULTIPLIER: u64 = 100;

/// One sampled frame. Consumed exactly once by the orchestrator.
pub struct Frame {
    /// 0-based index within the raw (unsampled) video.
    pub index: FrameIndex,
    pub image: DynamicImage,
    /// Seconds from the start of the video: `index / fps`.
    pub timestamp: f64,
}

/// Static properties of an open source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub total_frames: i64,
    pub duration_seconds: f64,
}

impl From<&VideoProbe> for SourceMetadata {
    fn from(probe: &VideoProbe) -> Self {
        Self {
            fps: probe.fps,
            width: probe.width,
            height: probe.height,
            total_frames: probe.total_frames,
            duration_seconds: probe.duration_seconds,
        }
    }
}

/// A finite, forward-only sequence of sampled frames.
///
/// Not restartable: once `next_frame` returns `Ok(None)` the source is
/// exhausted and a new one must be opened.
#[async_trait]
pub trait FrameSource: Send {
    fn metadata(&self) -> &SourceMetadata;

    /// The sampling stride this source was opened with.
    fn stride(&self) -> u64;

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
}

/// How to derive the sampling stride from the source's frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StridePolicy {
    /// Roughly one sampled frame per second of video (batch analysis).
    Batch,
    /// Twice as dense as [`StridePolicy::Batch`] (live streaming).
    Live,
    /// A fixed stride, for callers that know better.
    Exact(u64),
}

impl StridePolicy {
    pub fn resolve(self, fps: f64) -> u64 {
        match self {
            StridePolicy::Batch => (fps.round() as u64).max(1),
            StridePolicy::Live => ((fps / 2.0).round() as u64).max(1),
            StridePolicy::Exact(stride) => stride.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// FFmpeg-backed source
// ---------------------------------------------------------------------------

/// Samples frames out of a video file by seeking with `ffmpeg`.
///
/// Every extraction is a short-lived subprocess, so there is no decoder
/// handle to leak; the only retained state is the probed metadata and the
/// sampling cursor.
pub struct FfmpegFrameSource {
    path: PathBuf,
    metadata: SourceMetadata,
    stride: u64,
    /// Raw frame index the next call will sample.
    next_index: FrameIndex,
    /// Exclusive upper bound on raw frame indexes, after applying the cap.
    limit: FrameIndex,
}

impl FfmpegFrameSource {
    /// Probe and open a video for sampled iteration.
    ///
    /// Fails with [`PipelineError::SourceUnreadable`] when the file is
    /// missing, not a video, or has no usable video stream.
    pub async fn open(
        path: impl Into<PathBuf>,
        policy: StridePolicy,
        frame_cap_multiplier: u64,
    ) -> Result<Self, PipelineError> {
        let path = path.into();
        let probe = ffmpeg::probe_summary(&path)
            .await
            .map_err(source_unreadable)?;
        if !probe.is_valid() {
            return Err(PipelineError::SourceUnreadable(format!(
                "no usable video stream in {}",
                path.display()
            )));
        }

        let stride = policy.resolve(probe.fps);
        let declared = probe.total_frames.max(0) as u64;
        let cap = frame_cap_multiplier.saturating_mul(stride);
        let limit = declared.min(cap);

        tracing::debug!(
            path = %path.display(),
            fps = probe.fps,
            total_frames = declared,
            stride,
            limit,
            "Opened video source"
        );

        Ok(Self {
            path,
            metadata: SourceMetadata::from(&probe),
            stride,
            next_index: 0,
            limit,
        })
    }
}

fn source_unreadable(e: FfmpegError) -> PipelineError {
    PipelineError::SourceUnreadable(e.to_string())
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn stride(&self) -> u64 {
        self.stride
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.next_index >= self.limit {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += self.stride;
        let timestamp = index as f64 / self.metadata.fps;

        let bytes = match ffmpeg::extract_frame(&self.path, timestamp).await {
            Ok(bytes) => bytes,
            // Containers routinely overstate nb_frames; a clean seek past
            // the last frame is end-of-stream, not an error.
            Err(FfmpegError::ParseError(_)) => return Ok(None),
            Err(e) => return Err(source_unreadable(e)),
        };

        let image = image::load_from_memory(&bytes).map_err(|e| {
            PipelineError::SourceUnreadable(format!("frame {index} decode failed: {e}"))
        })?;

        Ok(Some(Frame {
            index,
            image,
            timestamp,
        }))
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Frame source over pre-built synthetic frames.
pub struct MemoryFrameSource {
    metadata: SourceMetadata,
    stride: u64,
    indices: std::vec::IntoIter<FrameIndex>,
}

impl MemoryFrameSource {
    /// Model a video with `total_raw_frames` frames sampled at `stride`:
    /// yields frames 0, stride, 2*stride, ... below the total.
    pub fn sampled(fps: f64, total_raw_frames: u64, stride: u64) -> Self {
        let stride = stride.max(1);
        let indices: Vec<FrameIndex> = (0..total_raw_frames).step_by(stride as usize).collect();
        Self {
            metadata: SourceMetadata {
                fps,
                width: 64,
                height: 64,
                total_frames: total_raw_frames as i64,
                duration_seconds: total_raw_frames as f64 / fps,
            },
            stride,
            indices: indices.into_iter(),
        }
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn stride(&self) -> u64 {
        self.stride
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let Some(index) = self.indices.next() else {
            return Ok(None);
        };
        Ok(Some(Frame {
            index,
            image: DynamicImage::new_rgb8(
                self.metadata.width as u32,
                self.metadata.height as u32,
            ),
            timestamp: index as f64 / self.metadata.fps,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
