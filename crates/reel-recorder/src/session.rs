//! Recording session: drives one connection's frames into a sink.
//!
//! The sink is opened lazily by the first binary frame, every later binary
//! frame is appended, and when the stream ends (peer close, read error or
//! shutdown) the sink is closed and a conversion job is handed to the
//! completion tracker. The session never waits for the conversion.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use futures::{Stream, StreamExt};
use reel_telemetry::{RECORDINGS_FAILED_TOTAL, RECORDINGS_STARTED_TOTAL, RECORDING_BYTES_TOTAL};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::conversion::ConversionJob;
use crate::error::SinkError;
use crate::frame::Frame;
use crate::ids::SessionId;
use crate::recorder::Recorder;
use crate::sink::FrameSink;
use crate::tracker::Reservation;

/// Lifecycle of a recording session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingFirstFrame,
    Recording,
    Finalizing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingFirstFrame => "awaiting_first_frame",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub id: String,
    pub state: SessionState,
    /// Raw recording, if a sink was opened.
    pub path: Option<PathBuf>,
    pub frames: u64,
    pub bytes: u64,
    pub job_submitted: bool,
    /// Open or write failure that cut the session short.
    pub sink_error: Option<String>,
}

/// Per-connection controller. Consumed by [`run`](Self::run).
pub struct RecordingSession {
    id: SessionId,
    basename: PathBuf,
    state: SessionState,
    sink: Option<FrameSink>,
    sink_error: Option<String>,
    /// Taken at creation so shutdown waits for this session's job.
    reservation: Option<Reservation>,
    recorder: Recorder,
    cancel: CancellationToken,
}

impl RecordingSession {
    pub(crate) fn new(
        recorder: Recorder,
        created_at: DateTime<Local>,
        cancel: CancellationToken,
    ) -> Self {
        let basename = recorder.config().basename(&created_at);
        let reservation = recorder.tracker().reserve().ok();
        Self {
            id: SessionId::new(),
            basename,
            state: SessionState::AwaitingFirstFrame,
            sink: None,
            sink_error: None,
            reservation,
            recorder,
            cancel,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Raw file this session writes to once its first binary frame arrives.
    pub fn raw_path(&self) -> PathBuf {
        self.recorder.config().raw_path(&self.basename)
    }

    /// Consume frames until the stream ends, fails or shutdown is requested,
    /// then finalize.
    pub async fn run<S, E>(mut self, mut frames: S) -> SessionReport
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: fmt::Display,
    {
        debug!(basename = %self.basename.display(), "session opened");

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }
                next = frames.next() => next,
            };

            match next {
                None => {
                    debug!("connection closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    info!(error = %e, "connection read failed");
                    break;
                }
                Some(Ok(Frame::Binary(data))) => {
                    if self.on_binary(&data).await.is_err() {
                        break;
                    }
                }
                Some(Ok(frame)) => trace!(kind = frame.kind(), "ignoring frame"),
            }
        }

        self.finalize().await
    }

    async fn on_binary(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => {
                let sink = self.open_sink().await?;
                self.transition(SessionState::Recording);
                sink
            }
        };
        let sink = self.sink.insert(sink);

        if let Err(e) = sink.write(data).await {
            error!(error = %e, "failed to write frame");
            metrics::counter!(RECORDINGS_FAILED_TOTAL, "stage" => "write").increment(1);
            self.sink_error = Some(e.to_string());
            return Err(e);
        }
        metrics::counter!(RECORDING_BYTES_TOTAL).increment(data.len() as u64);
        Ok(())
    }

    async fn open_sink(&mut self) -> Result<FrameSink, SinkError> {
        match FrameSink::open(self.raw_path()).await {
            Ok(sink) => {
                info!(path = %sink.path().display(), "recording started");
                metrics::counter!(RECORDINGS_STARTED_TOTAL).increment(1);
                Ok(sink)
            }
            Err(e) => {
                error!(error = %e, "failed to open recording");
                metrics::counter!(RECORDINGS_FAILED_TOTAL, "stage" => "open").increment(1);
                self.sink_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn finalize(mut self) -> SessionReport {
        self.transition(SessionState::Finalizing);

        let mut report = SessionReport {
            id: self.id.to_string(),
            state: SessionState::Finalizing,
            path: None,
            frames: 0,
            bytes: 0,
            job_submitted: false,
            sink_error: self.sink_error.take(),
        };

        match self.sink.take() {
            Some(mut sink) => {
                if let Err(e) = sink.close().await {
                    error!(error = %e, "failed to close recording");
                }
                info!(
                    path = %sink.path().display(),
                    frames = sink.frames_written(),
                    bytes = sink.bytes_written(),
                    "recording finished"
                );

                let output = self.recorder.config().converted_path(&self.basename);
                let job = ConversionJob::new(sink.path(), output);
                let tracker = self.recorder.tracker();
                let submitted = match self.reservation.take() {
                    Some(reservation) => {
                        tracker.submit_reserved(reservation, job, self.recorder.transcoder());
                        Ok(())
                    }
                    None => tracker.submit(job, self.recorder.transcoder()),
                };
                match submitted {
                    Ok(()) => report.job_submitted = true,
                    Err(e) => warn!(error = %e, "conversion not scheduled"),
                }

                report.path = Some(sink.path().to_path_buf());
                report.frames = sink.frames_written();
                report.bytes = sink.bytes_written();
            }
            None => debug!("no binary frames received, nothing to convert"),
        }

        self.transition(SessionState::Closed);
        report.state = self.state;
        report
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("id", &self.id)
            .field("basename", &self.basename)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
