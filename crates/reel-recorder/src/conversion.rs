//! Post-processing of finished recordings by an external transcoder.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::error::ConversionError;

/// How long a killed transcoder's remaining output is still forwarded.
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Remux of one finished raw recording into the converted container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionJob {
    input: PathBuf,
    output: PathBuf,
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Transcoder arguments: stream copy, no re-encoding.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-i".into(),
            self.input.clone().into_os_string(),
            "-c".into(),
            "copy".into(),
            self.output.clone().into_os_string(),
        ]
    }
}

/// How a conversion ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The transcoder exited successfully.
    Converted,
    /// The transcoder was terminated because cancellation was requested.
    Cancelled,
}

impl ConversionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Runs a conversion job to completion.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(
        &self,
        job: &ConversionJob,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError>;
}

/// Transcoder backed by an `ffmpeg`-compatible executable.
///
/// Stdout and stderr of the process are forwarded line by line to the log.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(
        &self,
        job: &ConversionJob,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        let _ = cmd
            .args(job.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, args = ?job.args(), "spawning transcoder");

        let mut child = cmd.spawn().map_err(|source| ConversionError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut stdout = tokio::spawn(
            forward_lines(child.stdout.take(), "stdout").instrument(tracing::Span::current()),
        );
        let mut stderr = tokio::spawn(
            forward_lines(child.stderr.take(), "stderr").instrument(tracing::Span::current()),
        );

        let status = tokio::select! {
            status = child.wait() => status,
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                // A grandchild may still hold the pipes open.
                let drained = tokio::time::timeout(CANCEL_DRAIN_TIMEOUT, async {
                    let _ = (&mut stdout).await;
                    let _ = (&mut stderr).await;
                })
                .await;
                if drained.is_err() {
                    stdout.abort();
                    stderr.abort();
                }
                return Ok(ConversionOutcome::Cancelled);
            }
        };

        // Drain both pipes so every line is logged before the job completes.
        let _ = stdout.await;
        let _ = stderr.await;

        let status = status.map_err(|source| ConversionError::Wait {
            program: self.program.clone(),
            source,
        })?;

        if status.success() {
            Ok(ConversionOutcome::Converted)
        } else {
            Err(ConversionError::ExitStatus {
                program: self.program.clone(),
                status,
            })
        }
    }
}

async fn forward_lines<R>(reader: Option<R>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else { return };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                info!(stream, "{}", line.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                // Keep the pipe drained so the transcoder never blocks or gets SIGPIPE.
                debug!(stream, error = %e, "transcoder output unreadable, discarding the rest");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
}
