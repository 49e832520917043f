//! Recorder configuration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout of a recording basename, e.g. `2026_10_14_09_30_05`.
pub const BASENAME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Configuration for recording sessions and their conversion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory holding raw and converted recordings (default `./recording`).
    pub recordings_dir: PathBuf,
    /// Extension of the raw stream file (default `flv`).
    pub raw_extension: String,
    /// Extension of the converted file (default `mp4`).
    pub converted_extension: String,
    /// Transcoder executable (default `ffmpeg`, resolved through `PATH`).
    pub transcoder_program: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("./recording"),
            raw_extension: "flv".into(),
            converted_extension: "mp4".into(),
            transcoder_program: "ffmpeg".into(),
        }
    }
}

impl RecorderConfig {
    /// Path stem shared by the raw and converted files of a session.
    ///
    /// Whole-second resolution: two sessions created within the same second
    /// map to the same basename.
    pub fn basename(&self, created_at: &DateTime<Local>) -> PathBuf {
        self.recordings_dir
            .join(created_at.format(BASENAME_FORMAT).to_string())
    }

    /// Raw stream file for a basename.
    pub fn raw_path(&self, basename: &Path) -> PathBuf {
        with_extension(basename, &self.raw_extension)
    }

    /// Converted file for a basename.
    pub fn converted_path(&self, basename: &Path) -> PathBuf {
        with_extension(basename, &self.converted_extension)
    }
}

// `Path::with_extension` would replace anything after a dot in the stem.
fn with_extension(basename: &Path, extension: &str) -> PathBuf {
    let mut name = basename.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
