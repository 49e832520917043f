//! `/ws`: one recording session per accepted WebSocket.

use std::net::SocketAddr;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use reel_recorder::Frame;
use reel_telemetry::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, info, info_span, Instrument};

use crate::server::AppState;

/// WebSocket upgrade handler. Refuses new sessions once shutdown started.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let registration = state.shutdown.track_session();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(move |e| debug!(%peer, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| record(socket, peer, state, registration))
}

async fn record(socket: WebSocket, peer: SocketAddr, state: AppState, registration: TaskTrackerToken) {
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let session = state.recorder.session(state.shutdown.token());
    let span = info_span!("session", session_id = %session.id(), %peer);

    async move {
        info!("websocket connected");
        let report = session.run(frames(socket)).await;
        info!(
            state = %report.state,
            frames = report.frames,
            bytes = report.bytes,
            conversion = report.job_submitted,
            "websocket session ended"
        );
    }
    .instrument(span)
    .await;

    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    drop(registration);
}

/// Incoming messages as frames. A close message ends the stream.
pub fn frames(socket: WebSocket) -> BoxStream<'static, Result<Frame, axum::Error>> {
    socket
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .map(|msg| msg.map(into_frame))
        .boxed()
}

pub fn into_frame(msg: Message) -> Frame {
    match msg {
        Message::Binary(data) => Frame::Binary(data),
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => Frame::Control,
    }
}
