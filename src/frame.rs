//! Frame: the wire envelope for the plaza presence protocol.
//!
//! ARCHITECTURE
//! ============
//! Every WebSocket text message is a JSON envelope `{"event": .., "data": ..}`.
//! Inbound envelopes decode into a `ClientEvent`, outbound `ServerEvent`s
//! encode into the same shape. The connection layer dispatches on the
//! decoded variant and never inspects raw JSON.
//!
//! DESIGN
//! ======
//! - Strict envelope: invalid JSON, oversized text or an unknown event name
//!   is a `ProtocolError` and the frame is dropped.
//! - Lenient payload: blank display fields degrade to "absent" and malformed
//!   movement degrades to "stay still" instead of failing the frame.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::services::registry::Participant;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

pub const EVENT_JOIN: &str = "join";
pub const EVENT_MOVE: &str = "move";

const FIELD_NAME: &str = "name";
const FIELD_COLOR: &str = "color";
const FIELD_DX: &str = "dx";
const FIELD_DZ: &str = "dz";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code attached to structured log lines.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("frame too large: {len} bytes (max {max})")]
    Oversized { len: usize, max: usize },
    #[error("binary frames are not supported")]
    Binary,
}

impl ErrorCode for ProtocolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::Oversized { .. } => "E_FRAME_TOO_LARGE",
            Self::Binary => "E_BINARY_FRAME",
        }
    }
}

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A validated client→server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Register this connection as a participant. Fields are trimmed and
    /// `None` when blank.
    Join { name: Option<String>, color: Option<String> },
    /// Request a position delta. Both components are finite.
    Move { dx: f64, dz: f64 },
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns a `ProtocolError` for oversized text, invalid JSON, or an event
/// name outside the protocol.
pub fn decode(text: &str, max_bytes: usize) -> Result<ClientEvent, ProtocolError> {
    if text.len() > max_bytes {
        return Err(ProtocolError::Oversized { len: text.len(), max: max_bytes });
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.event.as_str() {
        EVENT_JOIN => Ok(ClientEvent::Join {
            name: text_field(&envelope.data, FIELD_NAME),
            color: text_field(&envelope.data, FIELD_COLOR),
        }),
        EVENT_MOVE => Ok(ClientEvent::Move {
            dx: delta_field(&envelope.data, FIELD_DX),
            dz: delta_field(&envelope.data, FIELD_DZ),
        }),
        _ => Err(ProtocolError::UnknownEvent(envelope.event)),
    }
}

fn text_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn delta_field(data: &Value, key: &str) -> f64 {
    data.get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// A server→client event. Serializes as `{"event": "<camelCase>", "data": ..}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Identity of the receiving connection, sent once on accept.
    Connected { id: Uuid },
    /// Full registry snapshot, sent to a connection right after it joins.
    Players(HashMap<Uuid, Participant>),
    PlayerJoined(Participant),
    PlayerMoved(Participant),
    PlayerLeft(Uuid),
}

impl ServerEvent {
    /// Wire name of the event, for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Players(_) => "players",
            Self::PlayerJoined(_) => "playerJoined",
            Self::PlayerMoved(_) => "playerMoved",
            Self::PlayerLeft(_) => "playerLeft",
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
