mod metrics;

pub use metrics::{
    install_recorder, render, CONVERSIONS_ACTIVE, CONVERSIONS_TOTAL, RECORDING_BYTES_TOTAL,
    RECORDINGS_FAILED_TOTAL, RECORDINGS_STARTED_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
};

use std::collections::BTreeMap;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the stdout log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable, single line per event.
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(TelemetryError::InvalidFormat(other.to_string())),
        }
    }
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: String,
    /// Per-module level overrides (e.g. "reel_recorder" => "debug").
    pub module_levels: BTreeMap<String, String>,
    /// Stdout log format.
    pub format: LogFormat,
    /// Whether the Prometheus recorder is installed.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            module_levels: BTreeMap::new(),
            format: LogFormat::default(),
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Filter directives built from the configured levels, e.g. `info,reel_server=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{module}={}", level.to_lowercase()));
        }
        filter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("tracing subscriber already installed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("unknown log format: {0}")]
    InvalidFormat(String),
}

/// Keeps the telemetry handles alive for the lifetime of the process.
pub struct TelemetryGuard {
    metrics: Option<PrometheusHandle>,
}

impl TelemetryGuard {
    /// Prometheus handle, if metrics recording is enabled.
    pub fn metrics(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter_directives())?,
    };

    let (json_layer, text_layer) = match config.format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(tracing_subscriber::fmt::layer().with_target(true)),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    let metrics = if config.metrics_enabled {
        Some(install_recorder()?)
    } else {
        None
    };

    Ok(TelemetryGuard { metrics })
}
