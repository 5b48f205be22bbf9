//! WebSocket handler: transport adapter for the presence protocol.
//!
//! DESIGN
//! ======
//! The connection is admitted and registered before the upgrade completes,
//! so a refused connection gets a plain HTTP 503. After upgrade the task
//! enters a `select!` loop:
//! - Incoming text frames → `Connection::handle_text`
//! - Events queued by the dispatcher → serialize and write to the socket
//!
//! All protocol decisions live in `services::connection`; this module only
//! moves bytes.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `connected {id}` is already queued
//! 2. Loop until peer close, read error or write error
//! 3. `Connection::close` → unregister, leave, `playerLeft`

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::frame::{ErrorCode, ProtocolError, ServerEvent};
use crate::services::connection::Connection;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let (connection, outbound) = match Connection::open(state) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "ws: connection refused");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    // If the upgrade never completes the closure is dropped, and with it the
    // connection, whose drop guard tears the registration down.
    ws.on_upgrade(move |socket| run_ws(socket, connection, outbound))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, mut connection: Connection, mut outbound: mpsc::Receiver<ServerEvent>) {
    let client_id = connection.id();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => connection.handle_text(&text).await,
                    Message::Binary(_) => connection.drop_frame(&ProtocolError::Binary),
                    Message::Close(_) => break,
                    // Ping/pong are answered by the transport.
                    _ => {}
                }
            }
            Some(event) = outbound.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    debug!(%client_id, "ws: write failed");
                    break;
                }
            }
        }
    }

    connection.close().await;
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match event.encode() {
        Ok(j) => j,
        Err(e) => {
            warn!(event = event.name(), error = %e, "ws: failed to serialize event");
            return Ok(());
        }
    };
    debug!(event = event.name(), "ws: send event");
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
