//! Frame sink: the output file of one recording session.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::SinkError;

/// Owns the output file handle of a single recording.
///
/// Frames are appended verbatim in the order `write` is called and flushed to
/// the OS before `write` returns. `close` is idempotent.
#[derive(Debug)]
pub struct FrameSink {
    path: PathBuf,
    file: Option<File>,
    frames_written: u64,
    bytes_written: u64,
}

impl FrameSink {
    /// Create a new file at `path`. Fails if it cannot be created or already exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Create {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Some(file),
            frames_written: 0,
            bytes_written: 0,
        })
    }

    /// Append one frame.
    pub async fn write(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(SinkError::Closed(self.path.clone()));
        };

        write_flushed(file, frame).await.map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.frames_written += 1;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }

    /// Flush and release the file. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        file.flush().await.map_err(|source| SinkError::Close {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Swap the handle for a read-only one so the next write fails.
    #[cfg(test)]
    pub(crate) async fn reopen_read_only(&mut self) -> std::io::Result<()> {
        self.file = Some(File::open(&self.path).await?);
        Ok(())
    }
}

async fn write_flushed(file: &mut File, frame: &[u8]) -> std::io::Result<()> {
    file.write_all(frame).await?;
    file.flush().await
}
