//! FFprobe source inspection.
//!
//! Uploaded source video is probed once, at registration time, to capture
//! the metadata the transform model needs (duration, framerate,
//! dimensions). The encoder crate owns the actual transcoding; this module
//! only reads.

use std::path::Path;

use serde::Deserialize;

/// Error type for ffprobe invocation and parsing.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("source video not found: {0}")]
    VideoNotFound(String),

    #[error("source has no video stream: {0}")]
    NoVideoStream(String),
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

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// A fraction like "30/1" or "24000/1001".
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

/// The probed facts the transform model cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    pub duration_secs: f64,
    pub framerate: f64,
    pub width: i32,
    pub height: i32,
    pub total_frames: i64,
}

// ---------------------------------------------------------------------------
// Probing
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

/// Probe a source and condense it to [`SourceMetadata`].
pub async fn probe_source_metadata(path: &Path) -> Result<SourceMetadata, FfmpegError> {
    let probe = probe_video(path).await?;
    source_metadata(&probe)
        .ok_or_else(|| FfmpegError::NoVideoStream(path.to_string_lossy().to_string()))
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

/// Condense raw ffprobe output into [`SourceMetadata`]. `None` when the
/// file has no video stream.
pub fn source_metadata(probe: &FfprobeOutput) -> Option<SourceMetadata> {
    let stream = first_video_stream(probe)?;

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| stream.duration.as_deref().and_then(|d| d.parse().ok()))
        .unwrap_or(0.0);

    let framerate = stream
        .r_frame_rate
        .as_deref()
        .map(parse_fraction)
        .unwrap_or(0.0);

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or_else(|| {
            if duration_secs > 0.0 && framerate > 0.0 {
                (duration_secs * framerate).round() as i64
            } else {
                0
            }
        });

    Some(SourceMetadata {
        duration_secs,
        framerate,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        total_frames,
    })
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let num = num.parse::<f64>().unwrap_or(0.0);
        let den = den.parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(duration: Option<&str>, nb_frames: Option<&str>) -> FfprobeStream {
        FfprobeStream {
            codec_type: Some("video".into()),
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: Some("30/1".into()),
            duration: duration.map(Into::into),
            nb_frames: nb_frames.map(Into::into),
        }
    }

    #[test]
    fn fraction_standard_rate() {
        assert!((parse_fraction("30/1") - 30.0).abs() < 0.001);
    }

    #[test]
    fn fraction_ntsc_rate() {
        assert!((parse_fraction("24000/1001") - 23.976).abs() < 0.01);
    }

    #[test]
    fn fraction_plain_number() {
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
    }

    #[test]
    fn fraction_zero_denominator_is_zero() {
        assert_eq!(parse_fraction("30/0"), 0.0);
    }

    #[test]
    fn metadata_prefers_format_duration() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(Some("60.0"), None)],
            format: FfprobeFormat { duration: Some("120.5".into()) },
        };
        let meta = source_metadata(&probe).unwrap();
        assert!((meta.duration_secs - 120.5).abs() < 0.001);
    }

    #[test]
    fn metadata_falls_back_to_stream_duration() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(Some("60.0"), None)],
            format: FfprobeFormat { duration: None },
        };
        let meta = source_metadata(&probe).unwrap();
        assert!((meta.duration_secs - 60.0).abs() < 0.001);
    }

    #[test]
    fn metadata_estimates_frames_from_duration_and_rate() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(None, None)],
            format: FfprobeFormat { duration: Some("10.0".into()) },
        };
        let meta = source_metadata(&probe).unwrap();
        assert_eq!(meta.total_frames, 300);
    }

    #[test]
    fn metadata_uses_reported_frame_count_when_present() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(Some("10.0"), Some("299"))],
            format: FfprobeFormat { duration: Some("10.0".into()) },
        };
        let meta = source_metadata(&probe).unwrap();
        assert_eq!(meta.total_frames, 299);
        assert_eq!((meta.width, meta.height), (1920, 1080));
    }

    #[test]
    fn audio_only_file_has_no_metadata() {
        let probe = FfprobeOutput {
            streams: vec![FfprobeStream {
                codec_type: Some("audio".into()),
                width: None,
                height: None,
                r_frame_rate: None,
                duration: None,
                nb_frames: None,
            }],
            format: FfprobeFormat { duration: Some("10.0".into()) },
        };
        assert!(source_metadata(&probe).is_none());
    }
}
