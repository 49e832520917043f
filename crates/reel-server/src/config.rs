//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the recording server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8009`, `0` for auto-assign).
    pub port: u16,
    /// Directory with the client UI, served for every non-API path.
    pub web_dir: PathBuf,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for the listener and open sessions on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8009,
            web_dir: PathBuf::from("./web"),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8009);
        assert_eq!(cfg.web_dir, PathBuf::from("./web"));
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.shutdown_timeout_secs, 30);
    }
}
