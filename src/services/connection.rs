//! Connection service: per-connection protocol handling and teardown.
//!
//! DESIGN
//! ======
//! A `Connection` is the server side of one transport session. It is opened
//! with a fresh random id, registered with the dispatcher (subject to the
//! admission policy) and handed the receiving half of its outbound queue.
//! The transport feeds it decoded inbound text in arrival order; it applies
//! the event to the registry and asks the dispatcher to fan out the result.
//! It never writes to a socket.
//!
//! LIFECYCLE
//! =========
//! 1. `open` → queue `connected {id}`, then register
//! 2. `join` at most once → snapshot to self, `playerJoined` to others
//! 3. `move` after join → `playerMoved` to everyone, sender included
//! 4. `close` (or drop) → unregister, `leave`, `playerLeft` to the rest
//!
//! Teardown runs exactly once: `close` consumes the connection, and a
//! connection dropped without `close` (cancelled task, failed upgrade)
//! schedules the same teardown from `Drop`.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::frame::{self, ClientEvent, ErrorCode, ProtocolError, ServerEvent};
use crate::services::admission::AdmissionError;
use crate::state::AppState;

pub struct Connection {
    id: Uuid,
    state: AppState,
    joined: bool,
    closed: bool,
}

impl Connection {
    /// Admit a new connection and register its outbound queue.
    ///
    /// # Errors
    ///
    /// Returns an `AdmissionError` if the admission policy refuses it.
    pub fn open(state: AppState) -> Result<(Self, mpsc::Receiver<ServerEvent>), AdmissionError> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(state.config.outbound_queue_capacity);

        // Queued before registration so it precedes any fan-out.
        if tx.try_send(ServerEvent::Connected { id }).is_err() {
            warn!(client_id = %id, "connection: greeting dropped");
        }
        let live = state.dispatcher.register(id, tx, state.admission.as_ref())?;
        info!(client_id = %id, connections = live, "connection: opened");

        Ok((Self { id, state, joined: false, closed: false }, rx))
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Decode and apply one inbound text frame. Bad frames are dropped.
    pub async fn handle_text(&mut self, text: &str) {
        match frame::decode(text, self.state.config.max_frame_bytes) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => self.drop_frame(&e),
        }
    }

    /// Log and discard a frame that failed protocol validation.
    pub fn drop_frame(&self, err: &ProtocolError) {
        warn!(client_id = %self.id, code = err.error_code(), error = %err, "connection: dropped inbound frame");
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join { name, color } => self.join(name.as_deref(), color.as_deref()).await,
            ClientEvent::Move { dx, dz } => self.move_by(dx, dz).await,
        }
    }

    async fn join(&mut self, name: Option<&str>, color: Option<&str>) {
        if self.joined {
            debug!(client_id = %self.id, "connection: repeated join ignored");
            return;
        }

        let id = self.id;
        let dispatcher = &self.state.dispatcher;
        let mut participants = 0;
        let joined = self
            .state
            .registry
            .join(id, name, color, |participant, all| {
                participants = all.len();
                dispatcher.send_to(id, ServerEvent::Players(all.clone()));
                dispatcher.broadcast_all_except(id, ServerEvent::PlayerJoined(participant.clone()));
            })
            .await;

        match joined {
            Ok(participant) => {
                self.joined = true;
                info!(client_id = %id, name = %participant.display_name, participants, "connection: joined");
            }
            Err(e) => {
                error!(client_id = %id, code = e.error_code(), error = %e, "connection: join rejected");
            }
        }
    }

    async fn move_by(&mut self, dx: f64, dz: f64) {
        if !self.joined {
            return;
        }
        let dispatcher = &self.state.dispatcher;
        // Echoed to the mover as well; clients reconcile against it.
        self.state
            .registry
            .move_by(self.id, dx, dz, |participant| {
                dispatcher.broadcast_all(ServerEvent::PlayerMoved(participant.clone()));
            })
            .await;
    }

    /// Tear the connection down and release its registrations.
    pub async fn close(mut self) {
        self.closed = true;
        teardown(&self.state, self.id).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(client_id = %self.id, "connection: dropped outside runtime; teardown skipped");
            return;
        };
        let state = self.state.clone();
        let id = self.id;
        handle.spawn(async move { teardown(&state, id).await });
    }
}

async fn teardown(state: &AppState, id: Uuid) {
    state.dispatcher.unregister(id);
    let mut idle = None;
    state
        .registry
        .leave(id, |participant| {
            idle = Some(participant.idle_for());
            state.dispatcher.broadcast_all(ServerEvent::PlayerLeft(id));
        })
        .await;
    let participants = state.registry.len().await;
    info!(client_id = %id, idle = ?idle, participants = participants, "connection: closed");
    if idle.is_some() && state.registry.is_empty().await {
        debug!("connection: last participant left");
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
