//! Admission policy: decides whether a new connection may register.
//!
//! The policy is consulted by the dispatcher while it holds its write lock,
//! so the live-connection count it sees is exact. `AppState` carries it as a
//! trait object; callers can swap in their own policy without touching the
//! connection path.

use uuid::Uuid;

use crate::frame::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("connection limit reached (max {max})")]
    LimitReached { max: usize },
    #[error("connection already registered: {0}")]
    DuplicateConnection(Uuid),
}

impl ErrorCode for AdmissionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LimitReached { .. } => "E_CONNECTION_LIMIT",
            Self::DuplicateConnection(_) => "E_DUPLICATE_CONNECTION",
        }
    }
}

pub trait AdmissionPolicy: Send + Sync {
    /// Decide on one new connection given the number already live.
    ///
    /// # Errors
    ///
    /// Returns an `AdmissionError` when the connection must be refused.
    fn admit(&self, live_connections: usize) -> Result<(), AdmissionError>;
}

/// Caps the number of live connections. `None` admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionLimit {
    max: Option<usize>,
}

impl ConnectionLimit {
    #[must_use]
    pub const fn new(max: Option<usize>) -> Self {
        Self { max }
    }
}

impl AdmissionPolicy for ConnectionLimit {
    fn admit(&self, live_connections: usize) -> Result<(), AdmissionError> {
        match self.max {
            Some(max) if live_connections >= max => Err(AdmissionError::LimitReached { max }),
            _ => Ok(()),
        }
    }
}
