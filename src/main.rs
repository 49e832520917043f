//! # reel
//!
//! Records binary WebSocket streams to disk and remuxes each finished
//! recording with ffmpeg. Wires together the recorder, server, browser and
//! telemetry crates.

#![deny(unsafe_code)]

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reel_browser::{AutoStart, Browser};
use reel_recorder::Recorder;
use reel_telemetry::{LogFormat, TelemetryGuard};
use tracing::{info, warn};

use crate::settings::Settings;

/// Stream recording server.
#[derive(Parser, Debug)]
#[command(name = "reel", version, about)]
struct Cli {
    /// JSON settings file, merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind [default: 8009].
    #[arg(long)]
    port: Option<u16>,

    /// Directory for raw and converted recordings [default: ./recording].
    #[arg(long)]
    recordings_dir: Option<PathBuf>,

    /// Directory with the client UI [default: ./web].
    #[arg(long)]
    web_dir: Option<PathBuf>,

    /// Transcoder executable [default: ffmpeg].
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Log level, e.g. `info` or `debug` (RUST_LOG wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Launch headless Chrome on the client page after the server starts.
    #[arg(long)]
    auto_start: bool,

    #[arg(long)]
    app_id: Option<String>,

    #[arg(long)]
    room_id: Option<String>,

    #[arg(long)]
    user_id: Option<String>,

    /// Required with --auto-start.
    #[arg(long)]
    user_token: Option<String>,

    /// Chrome executable, searched for when not given.
    #[arg(long)]
    chrome_path: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line override every other source.
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.web_dir {
            settings.server.web_dir = dir.clone();
        }
        if let Some(dir) = &self.recordings_dir {
            settings.recorder.recordings_dir = dir.clone();
        }
        if let Some(program) = &self.ffmpeg {
            settings.recorder.transcoder_program = program.clone();
        }
        if let Some(level) = &self.log_level {
            settings.telemetry.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            settings.telemetry.format = format;
        }

        let browser = &mut settings.browser;
        browser.auto_start |= self.auto_start;
        if let Some(v) = &self.app_id {
            browser.app_id = v.clone();
        }
        if let Some(v) = &self.room_id {
            browser.room_id = v.clone();
        }
        if let Some(v) = &self.user_id {
            browser.user_id = v.clone();
        }
        if let Some(v) = &self.user_token {
            browser.user_token = Some(v.clone());
        }
        if let Some(path) = &self.chrome_path {
            browser.chrome_path = Some(path.clone());
        }
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse::<LogFormat>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        settings::load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);

    let telemetry = reel_telemetry::init_telemetry(&settings.telemetry)
        .context("Failed to initialize telemetry")?;

    run(settings, &telemetry).await
}

async fn run(settings: Settings, telemetry: &TelemetryGuard) -> Result<()> {
    let auto_start = if settings.browser.auto_start {
        Some(AutoStart::from_config(&settings.browser).context("Invalid auto-start settings")?)
    } else {
        None
    };

    let recorder = Recorder::with_ffmpeg(settings.recorder.clone());
    recorder
        .prepare()
        .await
        .context("Failed to prepare recordings directory")?;

    let server = reel_server::start(&settings.server, recorder.clone(), telemetry.metrics().cloned())
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr()))?;
    info!(port = server.port(), "reel ready");

    let browser = match auto_start {
        Some(auto) => {
            let url = auto.url(server.port());
            let browser = Browser::launch(settings.browser.chrome_path.as_deref(), &url)
                .await
                .context("Failed to start browser")?;
            Some(tokio::spawn(browser.supervise(server.shutdown_token())))
        }
        None => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    server.shutdown().await;
    if let Some(browser) = browser {
        let _ = browser.await;
    }

    let tracker = Arc::clone(recorder.tracker());
    info!(outstanding = tracker.outstanding(), "waiting for conversions");
    tokio::select! {
        () = tracker.wait_all() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("second interrupt, cancelling conversions");
            tracker.cancel();
            tracker.wait_all().await;
        }
    }

    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_untouched() {
        let cli = Cli::parse_from(["reel"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.server.port, 8009);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.recorder.transcoder_program, "ffmpeg");
        assert!(!settings.browser.auto_start);
        assert!(settings.browser.user_token.is_none());
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "reel",
            "--port",
            "9000",
            "--recordings-dir",
            "/tmp/rec",
            "--web-dir",
            "/srv/web",
            "--ffmpeg",
            "/usr/local/bin/ffmpeg",
            "--log-format",
            "json",
        ]);
        let mut settings = Settings::default();
        settings.server.port = 1234;
        cli.apply(&mut settings);

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.recorder.recordings_dir, PathBuf::from("/tmp/rec"));
        assert_eq!(settings.server.web_dir, PathBuf::from("/srv/web"));
        assert_eq!(settings.recorder.transcoder_program, "/usr/local/bin/ffmpeg");
        assert_eq!(settings.telemetry.format, LogFormat::Json);
    }

    #[test]
    fn cli_auto_start_flags() {
        let cli = Cli::parse_from([
            "reel",
            "--auto-start",
            "--app-id",
            "app",
            "--room-id",
            "room",
            "--user-id",
            "user",
            "--user-token",
            "secret",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        let browser = &settings.browser;
        assert!(browser.auto_start);
        assert_eq!(browser.app_id, "app");
        assert_eq!(browser.room_id, "room");
        assert_eq!(browser.user_id, "user");
        assert_eq!(browser.user_token.as_deref(), Some("secret"));
    }

    #[test]
    fn cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["reel", "--log-format", "xml"]).is_err());
    }
}
