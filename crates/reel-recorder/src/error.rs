use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink already closed: {0}")]
    Closed(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    ExitStatus {
        program: String,
        status: std::process::ExitStatus,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("completion tracker is closed, shutdown in progress")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to create recordings directory {path}: {source}")]
    RecordingsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
