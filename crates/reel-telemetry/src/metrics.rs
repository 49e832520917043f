//! Prometheus metrics recorder and metric names shared across crates.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Sinks opened (counter).
pub const RECORDINGS_STARTED_TOTAL: &str = "recordings_started_total";
/// Sink open or write failures (counter, labels: stage).
pub const RECORDINGS_FAILED_TOTAL: &str = "recordings_failed_total";
/// Bytes appended to sinks (counter).
pub const RECORDING_BYTES_TOTAL: &str = "recording_bytes_total";
/// Finished conversion jobs (counter, labels: outcome).
pub const CONVERSIONS_TOTAL: &str = "conversions_total";
/// Conversion jobs currently running (gauge).
pub const CONVERSIONS_ACTIVE: &str = "conversions_active";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            RECORDINGS_STARTED_TOTAL,
            RECORDINGS_FAILED_TOTAL,
            RECORDING_BYTES_TOTAL,
            CONVERSIONS_TOTAL,
            CONVERSIONS_ACTIVE,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
