//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once shutdown started.
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Open recording sessions.
    pub active_sessions: usize,
    /// Conversion jobs not finished yet.
    pub outstanding_conversions: usize,
}

pub fn health_check(
    start_time: Instant,
    shutting_down: bool,
    sessions: usize,
    conversions: usize,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions: sessions,
        outstanding_conversions: conversions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_shutdown() {
        assert_eq!(health_check(Instant::now(), false, 0, 0).status, "ok");
        assert_eq!(health_check(Instant::now(), true, 0, 0).status, "shutting_down");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, false, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), false, 2, 1);
        let parsed: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_sessions"], 2);
        assert_eq!(parsed["outstanding_conversions"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }
}
