//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! is built once at startup and lives for the whole process: the session
//! registry (participants), the broadcast dispatcher (live connections),
//! the admission policy and the immutable config. Nothing is persisted.

use std::sync::Arc;

use crate::config::Config;
use crate::services::admission::{AdmissionPolicy, ConnectionLimit};
use crate::services::dispatcher::Dispatcher;
use crate::services::registry::SessionRegistry;

/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub admission: Arc<dyn AdmissionPolicy>,
}

impl AppState {
    /// Build state with the `ConnectionLimit` admission policy from config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let admission = Arc::new(ConnectionLimit::new(config.max_connections));
        Self::with_admission(config, admission)
    }

    /// Build state with a caller-supplied admission policy.
    #[must_use]
    pub fn with_admission(config: Config, admission: Arc<dyn AdmissionPolicy>) -> Self {
        let registry = SessionRegistry::new(config.spawn_half_extent, config.move_scale);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            dispatcher: Arc::new(Dispatcher::new()),
            admission,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
