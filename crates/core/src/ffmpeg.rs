//! FFmpeg/FFprobe subprocess utilities.
//!
//! The pipeline never links a decoder; it shells out to `ffprobe` for
//! container metadata and to `ffmpeg` for sampled frame extraction. Each
//! extraction is its own short-lived process, so decoder state is released
//! with the child regardless of how the caller exits.

use std::path::Path;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
}

/// Condensed metadata for a probed video, in the shape the catalog and
/// the streaming metadata message need.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub total_frames: i64,
    pub duration_seconds: f64,
    pub codec: String,
    pub size_bytes: i64,
}

impl VideoProbe {
    /// A probe is usable when it found a video stream with real dimensions
    /// and a positive frame rate.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fps > 0.0
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Probe a video and condense the result into a [`VideoProbe`].
pub async fn probe_summary(path: &Path) -> Result<VideoProbe, FfmpegError> {
    let probe = probe_video(path).await?;
    Ok(summarize_probe(&probe))
}

/// Condense raw ffprobe output into a [`VideoProbe`].
pub fn summarize_probe(probe: &FfprobeOutput) -> VideoProbe {
    let (width, height) = parse_resolution(probe);
    VideoProbe {
        fps: parse_framerate(probe),
        width,
        height,
        total_frames: parse_total_frames(probe),
        duration_seconds: parse_duration(probe),
        codec: parse_video_codec(probe),
        size_bytes: probe
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0),
    }
}

/// Decode the frame nearest `timestamp_secs` and return it as encoded PNG
/// bytes on stdout.
///
/// PNG rather than JPEG so the extraction is lossless with respect to what
/// the decoder produced; the caller decodes it with the `image` crate.
pub async fn extract_frame(
    video_path: &Path,
    timestamp_secs: f64,
) -> Result<Vec<u8>, FfmpegError> {
    if !video_path.exists() {
        return Err(FfmpegError::VideoNotFound(
            video_path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{timestamp_secs:.3}"), "-i"])
        .arg(video_path)
        .args(["-vframes", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    if output.stdout.is_empty() {
        // Seeking past the end of the stream exits 0 with no frame written.
        return Err(FfmpegError::ParseError(format!(
            "no frame decoded at {timestamp_secs:.3}s"
        )));
    }

    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then the video stream's own.
    if let Some(d) = &probe.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    if let Some(stream) = first_video_stream(probe) {
        if let Some(d) = &stream.duration {
            if let Ok(secs) = d.parse::<f64>() {
                return secs;
            }
        }
    }
    0.0
}

/// Parse the video framerate from ffprobe output.
///
/// The `r_frame_rate` field is a fraction like `"30/1"` or `"24000/1001"`.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Count total frames from ffprobe output, estimating from duration and
/// framerate when the container does not carry `nb_frames`.
pub fn parse_total_frames(probe: &FfprobeOutput) -> i64 {
    if let Some(stream) = first_video_stream(probe) {
        if let Some(nb) = &stream.nb_frames {
            if let Ok(n) = nb.parse::<i64>() {
                return n;
            }
        }
    }
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

/// Find the first video stream's codec name.
pub fn parse_video_codec(probe: &FfprobeOutput) -> String {
    first_video_stream(probe)
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_default()
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(
        fps: &str,
        width: i32,
        height: i32,
        duration: Option<&str>,
        nb_frames: Option<&str>,
    ) -> FfprobeStream {
        FfprobeStream {
            codec_name: Some("h264".into()),
            codec_type: Some("video".into()),
            width: Some(width),
            height: Some(height),
            r_frame_rate: Some(fps.into()),
            duration: duration.map(Into::into),
            nb_frames: nb_frames.map(Into::into),
        }
    }

    fn probe(streams: Vec<FfprobeStream>, duration: Option<&str>, size: Option<&str>) -> FfprobeOutput {
        FfprobeOutput {
            streams,
            format: FfprobeFormat {
                duration: duration.map(Into::into),
                size: size.map(Into::into),
            },
        }
    }

    #[test]
    fn fraction_parsing_handles_common_rates() {
        assert!((parse_fraction("30/1") - 30.0).abs() < 0.001);
        assert!((parse_fraction("24000/1001") - 23.976).abs() < 0.01);
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
        assert!((parse_fraction("30/0") - 0.0).abs() < 0.001);
    }

    #[test]
    fn duration_prefers_format_level() {
        let p = probe(
            vec![video_stream("30/1", 1920, 1080, Some("60.0"), None)],
            Some("120.5"),
            None,
        );
        assert!((parse_duration(&p) - 120.5).abs() < 0.001);
    }

    #[test]
    fn duration_falls_back_to_stream() {
        let p = probe(
            vec![video_stream("30/1", 1920, 1080, Some("60.0"), None)],
            None,
            None,
        );
        assert!((parse_duration(&p) - 60.0).abs() < 0.001);
    }

    #[test]
    fn total_frames_prefers_nb_frames() {
        let p = probe(
            vec![video_stream("30/1", 1920, 1080, Some("10.0"), Some("300"))],
            Some("10.0"),
            None,
        );
        assert_eq!(parse_total_frames(&p), 300);
    }

    #[test]
    fn total_frames_estimates_from_duration() {
        let p = probe(
            vec![video_stream("30/1", 1920, 1080, None, None)],
            Some("10.0"),
            None,
        );
        assert_eq!(parse_total_frames(&p), 300);
    }

    #[test]
    fn summary_collects_stream_fields() {
        let p = probe(
            vec![video_stream("30/1", 1920, 1080, None, Some("150"))],
            Some("5.0"),
            Some("1048576"),
        );
        let summary = summarize_probe(&p);
        assert!((summary.fps - 30.0).abs() < 0.001);
        assert_eq!((summary.width, summary.height), (1920, 1080));
        assert_eq!(summary.total_frames, 150);
        assert_eq!(summary.codec, "h264");
        assert_eq!(summary.size_bytes, 1_048_576);
        assert!(summary.is_valid());
    }

    #[test]
    fn audio_only_probe_is_invalid() {
        let p = probe(
            vec![FfprobeStream {
                codec_name: Some("aac".into()),
                codec_type: Some("audio".into()),
                width: None,
                height: None,
                r_frame_rate: None,
                duration: None,
                nb_frames: None,
            }],
            Some("10.0"),
            None,
        );
        let summary = summarize_probe(&p);
        assert!(!summary.is_valid());
    }
}
