//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If a settings file was given, deep-merge its values over defaults
//! 3. Apply `REEL_*` environment variable overrides
//!
//! Command line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use reel_browser::BrowserConfig;
use reel_recorder::RecorderConfig;
use reel_server::ServerConfig;
use reel_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Complete process configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub recorder: RecorderConfig,
    pub telemetry: TelemetryConfig,
    pub browser: BrowserConfig,
}

/// Load settings from an optional JSON file with env var overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

fn load_settings_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, SettingsError> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = match path {
        Some(path) => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => defaults,
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `REEL_*` overrides. Invalid values are ignored with a warning.
fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = string("REEL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("REEL_PORT") {
        match v.parse::<u16>() {
            Ok(port) => settings.server.port = port,
            Err(_) => tracing::warn!(key = "REEL_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = string("REEL_WEB_DIR") {
        settings.server.web_dir = PathBuf::from(v);
    }
    if let Some(v) = string("REEL_RECORDINGS_DIR") {
        settings.recorder.recordings_dir = PathBuf::from(v);
    }
    if let Some(v) = string("REEL_FFMPEG") {
        settings.recorder.transcoder_program = v;
    }
    if let Some(v) = string("REEL_LOG_LEVEL") {
        settings.telemetry.log_level = v;
    }
    if let Some(v) = string("REEL_LOG_FORMAT") {
        match v.parse::<LogFormat>() {
            Ok(format) => settings.telemetry.format = format,
            Err(e) => tracing::warn!(key = "REEL_LOG_FORMAT", error = %e, "ignoring"),
        }
    }
    if let Some(v) = string("REEL_METRICS") {
        match parse_bool(&v) {
            Some(enabled) => settings.telemetry.metrics_enabled = enabled,
            None => tracing::warn!(key = "REEL_METRICS", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = string("REEL_CHROME_PATH") {
        settings.browser.chrome_path = Some(PathBuf::from(v));
    }
    if let Some(v) = string("REEL_USER_TOKEN") {
        settings.browser.user_token = Some(v);
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let settings = load_settings_with(None, no_env).unwrap();
        assert_eq!(settings.server.port, 8009);
        assert_eq!(settings.recorder.recordings_dir, PathBuf::from("./recording"));
        assert_eq!(settings.recorder.transcoder_program, "ffmpeg");
        assert!(!settings.browser.auto_start);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9100}, "recorder": {"recordings_dir": "/srv/rec"}, "telemetry": {"format": "json"}}"#,
        )
        .unwrap();

        let settings = load_settings_with(Some(&path), no_env).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.recorder.recordings_dir, PathBuf::from("/srv/rec"));
        assert_eq!(settings.recorder.raw_extension, "flv");
        assert_eq!(settings.telemetry.format, LogFormat::Json);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_settings_with(Some(Path::new("/nonexistent/reel.json")), no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/reel.json"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ port: ").unwrap();
        assert!(matches!(
            load_settings_with(Some(&path), no_env),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}}"#).unwrap();

        let env = env_of(&[
            ("REEL_PORT", "9200"),
            ("REEL_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("REEL_METRICS", "off"),
            ("REEL_LOG_FORMAT", "json"),
            ("REEL_USER_TOKEN", "tok"),
        ]);
        let settings = load_settings_with(Some(&path), env).unwrap();
        assert_eq!(settings.server.port, 9200);
        assert_eq!(settings.recorder.transcoder_program, "/opt/ffmpeg/bin/ffmpeg");
        assert!(!settings.telemetry.metrics_enabled);
        assert_eq!(settings.telemetry.format, LogFormat::Json);
        assert_eq!(settings.browser.user_token.as_deref(), Some("tok"));
    }

    #[test]
    fn invalid_env_values_ignored() {
        let env = env_of(&[
            ("REEL_PORT", "not-a-port"),
            ("REEL_METRICS", "maybe"),
            ("REEL_LOG_FORMAT", "xml"),
            ("REEL_HOST", ""),
        ]);
        let settings = load_settings_with(None, env).unwrap();
        assert_eq!(settings.server.port, 8009);
        assert!(settings.telemetry.metrics_enabled);
        assert_eq!(settings.telemetry.format, LogFormat::Pretty);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn deep_merge_rules() {
        let target = json!({"a": {"b": 1, "c": 2}, "list": [1, 2], "keep": "x"});
        let source = json!({"a": {"b": 10}, "list": [3], "keep": null, "new": true});
        assert_eq!(
            deep_merge(target, source),
            json!({"a": {"b": 10, "c": 2}, "list": [3], "keep": "x", "new": true})
        );
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
