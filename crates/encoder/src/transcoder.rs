//! The transcoder seam: a trait the render engine drives, and the ffmpeg
//! subprocess implementation behind it.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::filter::EncodeSpec;
use crate::progress::ProgressParser;

/// Error type for encoder invocations.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("ffmpeg binary not found: {0}")]
    Spawn(std::io::Error),

    /// The encoder exited nonzero. `stderr` is attached verbatim so the
    /// job record carries the encoder's own diagnostic.
    #[error("ffmpeg exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error while driving ffmpeg: {0}")]
    Io(std::io::Error),
}

/// Something that can run one encode to completion, streaming percent
/// progress as it goes.
///
/// The render engine only ever talks to this trait; tests substitute a
/// scripted implementation so orchestration is exercised without a real
/// ffmpeg binary.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), EncodeError>;
}

/// The production implementation: spawns `ffmpeg` with machine-readable
/// progress on stdout and diagnostics on stderr.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Override the binary path (e.g. a vendored build).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), EncodeError> {
        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-nostats", "-progress", "pipe:1"])
            .args(&spec.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let stdout = child.stdout.take().expect("stdout piped above");
        let mut stderr = child.stderr.take().expect("stderr piped above");

        // Drain stderr concurrently; a blocked stderr pipe stalls ffmpeg.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut parser = ProgressParser::new(spec.expected_output_secs);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await.map_err(EncodeError::Io)? {
            if let Some(percent) = parser.parse_line(&line) {
                // A dropped receiver means nobody is watching; keep encoding.
                let _ = progress.send(percent).await;
            }
        }

        let status = child.wait().await.map_err(EncodeError::Io)?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(EncodeError::Failed {
                exit_code: status.code(),
                stderr: stderr_output,
            });
        }

        tracing::debug!(args = ?spec.args, "Encode finished");
        Ok(())
    }
}
