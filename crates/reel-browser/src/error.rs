use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// Auto-start requested without a user token.
    #[error("auto-start requires a user token (--user-token)")]
    MissingUserToken,

    #[error("Chrome not found, install Google Chrome or pass --chrome-path")]
    ChromeNotFound,

    #[error("failed to create browser profile directory: {0}")]
    Profile(#[source] std::io::Error),

    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
