//! Request handlers.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{future, SinkExt, StreamExt};
use protocol::{ConnectRequest, ConnectResponse, HealthStatus};
use serde::Deserialize;

use super::AppState;
use crate::admission::AdmissionError;
use crate::session::{bridge, ConnectOptions, Credentials, Frame, RemoteShell, SessionError};

/// `POST /connect`: authenticate to the remote host and park the session.
pub async fn connect(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let source = client_source(&headers, peer, state.settings.trust_proxy_headers);
    if !state.limiter.check(&source) {
        tracing::warn!(source = %source, "Create-session rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ConnectResponse::failure(AdmissionError::RateLimited.to_string())),
        );
    }

    match create_session(&state, &body).await {
        Ok(session_id) => (StatusCode::OK, Json(ConnectResponse::ok(session_id))),
        Err(message) => (StatusCode::OK, Json(ConnectResponse::failure(message))),
    }
}

/// Validates, admits and opens one session. Errors are user-facing messages.
async fn create_session(state: &AppState, body: &[u8]) -> Result<String, String> {
    let target = ConnectRequest::from_json(body)
        .and_then(ConnectRequest::validate)
        .map_err(|e| e.to_string())?;

    // Held across the connect so in-flight creates count toward the ceiling.
    let slot = state
        .registry
        .reserve(state.settings.max_sessions)
        .map_err(|e| e.to_string())?;

    let options = ConnectOptions {
        hostname: target.hostname,
        port: target.port,
        username: target.username,
        credentials: Credentials {
            password: target.password,
            private_key: target.private_key,
            passphrase: target.passphrase,
        },
        timeout: state.settings.connect_timeout,
        buffer_size: state.settings.buffer_size,
        host_key_policy: state.settings.host_key_policy.clone(),
    };

    let shell = RemoteShell::open(state.connector.as_ref(), &options)
        .await
        .map_err(|e| {
            tracing::warn!(
                addr = %options.addr(),
                user = %options.username,
                kind = ?e.kind(),
                error = %e,
                "Failed to open session"
            );
            e.user_message()
        })?;

    Ok(slot.register(shell))
}

/// Rate-limit key for a request.
fn client_source(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded.or(real_ip) {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

#[derive(Debug, Deserialize)]
pub struct AttachParams {
    session_id: Option<String>,
}

/// `GET /ws?session_id=`: claim a parked session and bridge it.
pub async fn attach(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<AttachParams>,
) -> impl IntoResponse {
    let session_id = params.session_id.filter(|id| !id.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: Option<String>) {
    let Some(session_id) = session_id else {
        reject(&mut socket, "error: missing session_id").await;
        return;
    };

    let shell = match state.registry.claim(&session_id) {
        Ok(shell) => shell,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Attach rejected");
            reject(&mut socket, &format!("error: {}", e.user_message())).await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, "WebSocket attached");

    let (ws_tx, ws_rx) = socket.split();
    let sink = ws_tx.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = ws_rx.filter_map(|msg| future::ready(from_message(msg)));

    match bridge::run(shell, sink, stream).await {
        Ok(exit) => tracing::debug!(session_id = %session_id, exit = ?exit, "Attach finished"),
        Err(SessionError::Closed(_)) => {
            tracing::debug!(session_id = %session_id, "Session closed before shell start")
        }
        Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Attach failed"),
    }
}

/// Sends an error text frame and closes the socket.
async fn reject(socket: &mut WebSocket, message: &str) {
    let _ = socket.send(Message::Text(message.to_string().into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Close => Message::Close(None),
    }
}

/// Maps socket messages to frames. Ping/pong are answered by axum and skipped.
fn from_message(msg: Result<Message, axum::Error>) -> Option<Result<Frame, axum::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_string()))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(HealthStatus::ok(env!("CARGO_PKG_VERSION")))
}
