//! Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use reel_recorder::Recorder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::stream::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Recorder,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
    pub max_message_size: usize,
}

impl AppState {
    pub fn new(recorder: Recorder, metrics: Option<PrometheusHandle>, max_message_size: usize) -> Self {
        Self {
            recorder,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
            max_message_size,
        }
    }
}

/// Build the Axum router with all routes. Unmatched paths are served from `web_dir`.
pub fn build_router(state: AppState, web_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback_service(ServeDir::new(web_dir))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve in the background.
pub async fn start(
    config: &ServerConfig,
    recorder: Recorder,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(recorder, metrics, config.max_message_size);
    let shutdown = Arc::clone(&state.shutdown);
    let router = build_router(state, &config.web_dir);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    info!(%addr, web_dir = %config.web_dir.display(), "recording server started");

    let token = shutdown.token();
    let server = tokio::spawn(async move {
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown,
        server,
        timeout: Duration::from_secs(config.shutdown_timeout_secs),
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    server: JoinHandle<()>,
    timeout: Duration,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Token cancelled when shutdown starts.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    pub fn active_sessions(&self) -> usize {
        self.shutdown.active_sessions()
    }

    /// Stop accepting connections and wait until every session finalized.
    ///
    /// Conversions submitted by those sessions may still be running.
    pub async fn shutdown(self) {
        self.shutdown
            .graceful_shutdown(self.server, Some(self.timeout))
            .await;
        info!("recording server stopped");
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        state.shutdown.active_sessions(),
        state.recorder.tracker().outstanding(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            reel_telemetry::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use reel_recorder::mock::MockTranscoder;
    use reel_recorder::RecorderConfig;
    use tower::ServiceExt;

    fn recorder() -> Recorder {
        Recorder::new(RecorderConfig::default(), Arc::new(MockTranscoder::succeeding()))
    }

    fn router_with(web_dir: &Path, metrics: Option<PrometheusHandle>) -> Router {
        build_router(AppState::new(recorder(), metrics, 1024), web_dir)
    }

    async fn body_string(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_counters() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router_with(dir.path(), None).oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_sessions"], 0);
        assert_eq!(parsed["outstanding_conversions"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_disabled_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router_with(dir.path(), None).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_renders_text() {
        let dir = tempfile::tempdir().unwrap();
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let resp = router_with(dir.path(), Some(handle))
            .oneshot(get("/metrics"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn static_files_served_from_web_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>reel</h1>").unwrap();
        std::fs::write(dir.path().join("index.js"), "start()").unwrap();

        let app = router_with(dir.path(), None);
        let resp = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "<h1>reel</h1>");

        let resp = app.oneshot(get("/index.js?autoStart=1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "start()");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router_with(dir.path(), None).oneshot(get("/missing.css")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    fn ws_request() -> Request<Body> {
        let mut req = get("/ws");
        let _ = req
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        req
    }

    #[tokio::test]
    async fn ws_refused_once_shutting_down() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(recorder(), None, 1024);
        state.shutdown.shutdown();

        let resp = build_router(state, dir.path()).oneshot(ws_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router_with(dir.path(), None).oneshot(ws_request()).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            web_dir: dir.path().to_path_buf(),
            shutdown_timeout_secs: 5,
            ..ServerConfig::default()
        };

        let handle = start(&config, recorder(), None).await.unwrap();
        assert_ne!(handle.port(), 0);
        let token = handle.shutdown_token();
        handle.shutdown().await;
        assert!(token.is_cancelled());
    }
}
