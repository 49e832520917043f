//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on open sessions.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shutdown signal for the listener and every recording session, plus the
/// bookkeeping needed to wait for those sessions to finalize.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a session. Held from upgrade request until the session ends.
    pub fn track_session(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the server and wait for its sessions.
    ///
    /// 1. Cancel the shutdown token (listener stops, sessions finalize)
    /// 2. Wait up to `timeout` for the server task
    /// 3. Wait up to `timeout` for every registered session
    pub async fn graceful_shutdown(&self, server: JoinHandle<()>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            sessions = self.active_sessions(),
            timeout_secs = timeout.as_secs(),
            "waiting for server and sessions to stop"
        );

        if tokio::time::timeout(timeout, server).await.is_err() {
            warn!("server did not stop within {timeout:?}");
        }

        let _ = self.sessions.close();
        if tokio::time::timeout(timeout, self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                sessions = self.active_sessions(),
                "sessions still open after {timeout:?}"
            );
        }
    }
}
