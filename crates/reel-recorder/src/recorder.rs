use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RecorderConfig;
use crate::conversion::{FfmpegTranscoder, Transcoder};
use crate::error::RecorderError;
use crate::session::RecordingSession;
use crate::tracker::CompletionTracker;

/// Shared context handed to every recording session.
#[derive(Clone)]
pub struct Recorder {
    config: Arc<RecorderConfig>,
    tracker: Arc<CompletionTracker>,
    transcoder: Arc<dyn Transcoder>,
}

impl Recorder {
    pub fn new(config: RecorderConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            config: Arc::new(config),
            tracker: Arc::new(CompletionTracker::new()),
            transcoder,
        }
    }

    /// Recorder converting with the configured `ffmpeg` executable.
    pub fn with_ffmpeg(config: RecorderConfig) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder_program.clone()));
        Self::new(config, transcoder)
    }

    /// Create the recordings directory.
    pub async fn prepare(&self) -> Result<(), RecorderError> {
        let dir = &self.config.recordings_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| RecorderError::RecordingsDir {
                path: dir.clone(),
                source,
            })?;
        info!(dir = %dir.display(), "recordings directory ready");
        Ok(())
    }

    /// New session stamped with the current local time.
    pub fn session(&self, cancel: CancellationToken) -> RecordingSession {
        RecordingSession::new(self.clone(), Local::now(), cancel)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    pub fn transcoder(&self) -> Arc<dyn Transcoder> {
        Arc::clone(&self.transcoder)
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("outstanding", &self.tracker.outstanding())
            .finish_non_exhaustive()
    }
}
