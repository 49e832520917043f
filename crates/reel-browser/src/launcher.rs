//! Auto-start URL construction and Chrome process supervision.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chrome::find_chrome;
use crate::error::BrowserError;

/// Query component escaping: unreserved characters kept, space as `+`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Flags passed to every launched browser, before the profile dir and URL.
pub const CHROME_FLAGS: &[&str] = &[
    "--headless=new",
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
    "--autoplay-policy=no-user-gesture-required",
    "--hide-scrollbars",
    "--safebrowsing-disable-auto-update",
];

/// Browser auto-start settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub auto_start: bool,
    pub chrome_path: Option<PathBuf>,
    pub app_id: String,
    pub room_id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub user_token: Option<String>,
}

/// Session parameters handed to the client page.
#[derive(Debug)]
pub struct AutoStart {
    pub app_id: String,
    pub room_id: String,
    pub user_id: String,
    user_token: SecretString,
}

impl AutoStart {
    /// Fails with [`BrowserError::MissingUserToken`] when no token is set.
    pub fn from_config(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let token = config
            .user_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(BrowserError::MissingUserToken)?;

        Ok(Self {
            app_id: config.app_id.clone(),
            room_id: config.room_id.clone(),
            user_id: config.user_id.clone(),
            user_token: SecretString::from(token.to_owned()),
        })
    }

    /// Client page URL on the local server, query keys sorted.
    pub fn url(&self, port: u16) -> String {
        let params = [
            ("appId", self.app_id.as_str()),
            ("autoStart", "1"),
            ("roomId", self.room_id.as_str()),
            ("userId", self.user_id.as_str()),
            ("userToken", self.user_token.expose_secret()),
        ];
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", escape(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("http://localhost:{port}/?{query}")
    }
}

fn escape(value: &str) -> String {
    // A literal '%' encodes as "%25", so "%20" can only come from a space.
    utf8_percent_encode(value, QUERY_VALUE)
        .to_string()
        .replace("%20", "+")
}

/// Arguments for one browser launch.
pub fn chrome_args(profile_dir: &Path, url: &str) -> Vec<String> {
    let mut args: Vec<String> = CHROME_FLAGS.iter().map(|f| (*f).to_owned()).collect();
    args.push(format!("--user-data-dir={}", profile_dir.display()));
    args.push(url.to_owned());
    args
}

/// A running browser with its throwaway profile.
#[derive(Debug)]
pub struct Browser {
    child: Child,
    path: PathBuf,
    _profile: TempDir,
}

impl Browser {
    /// Locate Chrome and open `url` in it.
    pub async fn launch(explicit: Option<&Path>, url: &str) -> Result<Self, BrowserError> {
        let path = find_chrome(explicit).ok_or(BrowserError::ChromeNotFound)?;
        Self::launch_with(path, url)
    }

    fn launch_with(path: PathBuf, url: &str) -> Result<Self, BrowserError> {
        let profile = tempfile::Builder::new()
            .prefix("reel-chrome-")
            .tempdir()
            .map_err(BrowserError::Profile)?;

        let child = Command::new(&path)
            .args(chrome_args(profile.path(), url))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BrowserError::Launch {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), pid = child.id(), "browser launched");
        Ok(Self {
            child,
            path,
            _profile: profile,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the browser to exit, killing it once `cancel` fires.
    pub async fn supervise(mut self, cancel: CancellationToken) {
        tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) if status.success() => info!("browser exited"),
                Ok(status) => warn!(%status, "browser exited unexpectedly"),
                Err(e) => warn!(error = %e, "failed waiting for browser"),
            },
            () = cancel.cancelled() => {
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill browser");
                } else {
                    info!("browser stopped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> BrowserConfig {
        BrowserConfig {
            auto_start: true,
            app_id: "app 1".into(),
            room_id: "room/7".into(),
            user_id: "alice".into(),
            user_token: token.map(str::to_owned),
            ..BrowserConfig::default()
        }
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(
            AutoStart::from_config(&config(None)),
            Err(BrowserError::MissingUserToken)
        ));
        assert!(matches!(
            AutoStart::from_config(&config(Some(""))),
            Err(BrowserError::MissingUserToken)
        ));
    }

    #[test]
    fn url_has_sorted_escaped_query() {
        let auto = AutoStart::from_config(&config(Some("t0k&n=%"))).unwrap();
        assert_eq!(
            auto.url(8009),
            "http://localhost:8009/?appId=app+1&autoStart=1&roomId=room%2F7&userId=alice&userToken=t0k%26n%3D%25"
        );
    }

    #[test]
    fn token_not_in_debug_output() {
        let auto = AutoStart::from_config(&config(Some("very-secret"))).unwrap();
        assert!(!format!("{auto:?}").contains("very-secret"));
    }

    #[test]
    fn token_not_serialized() {
        let json = serde_json::to_string(&config(Some("very-secret"))).unwrap();
        assert!(!json.contains("very-secret"));
    }

    #[test]
    fn args_end_with_profile_and_url() {
        let args = chrome_args(Path::new("/tmp/profile"), "http://localhost:1/");
        let n = args.len();
        assert_eq!(args[n - 2], "--user-data-dir=/tmp/profile");
        assert_eq!(args[n - 1], "http://localhost:1/");
        assert!(args.contains(&"--autoplay-policy=no-user-gesture-required".to_owned()));
        assert!(args.contains(&"--hide-scrollbars".to_owned()));
    }

    #[tokio::test]
    async fn launch_of_missing_binary_fails() {
        let err = Browser::launch_with(PathBuf::from("/nonexistent/chrome"), "about:blank");
        assert!(matches!(err, Err(BrowserError::Launch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervise_kills_on_cancel() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-chrome");
        std::fs::write(&fake, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let browser = Browser::launch(Some(&fake), "about:blank").await.unwrap();
        assert_eq!(browser.path(), fake.as_path());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(browser.supervise(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
