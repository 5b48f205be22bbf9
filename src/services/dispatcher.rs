//! Broadcast dispatcher: fan-out of server events to live connections.
//!
//! DESIGN
//! ======
//! The dispatcher tracks membership only: connection id -> sender half of
//! that connection's bounded outbound queue. The socket itself belongs to
//! the connection task, which drains the queue and writes frames.
//!
//! Delivery is best-effort and never blocks. `try_send` under the read lock
//! means one slow or dead peer cannot stall a broadcast: a full queue drops
//! the event for that peer only, a closed queue is skipped silently. Nothing
//! is retried; every `playerMoved` carries full state, so the next event a
//! peer does receive brings it back to current truth.
//!
//! Every method is synchronous so the registry can fan out from inside its
//! own critical section. The lock is never held across an await.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use crate::frame::ServerEvent;
use crate::services::admission::{AdmissionError, AdmissionPolicy};

#[derive(Default)]
pub struct Dispatcher {
    connections: RwLock<HashMap<Uuid, mpsc::Sender<ServerEvent>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the live set if `policy` admits it. Returns the
    /// live connection count including the new one.
    ///
    /// # Errors
    ///
    /// Returns the policy's `AdmissionError`, or `DuplicateConnection` if
    /// `id` is already registered.
    pub fn register(
        &self,
        id: Uuid,
        tx: mpsc::Sender<ServerEvent>,
        policy: &dyn AdmissionPolicy,
    ) -> Result<usize, AdmissionError> {
        let mut connections = self.write();
        policy.admit(connections.len())?;
        match connections.entry(id) {
            Entry::Occupied(_) => Err(AdmissionError::DuplicateConnection(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(connections.len())
            }
        }
    }

    /// Drop a connection from the live set. Returns whether it was present.
    pub fn unregister(&self, id: Uuid) -> bool {
        self.write().remove(&id).is_some()
    }

    /// Queue an event for one connection. A connection that is gone or whose
    /// queue is full does not receive it.
    pub fn send_to(&self, id: Uuid, event: ServerEvent) -> bool {
        let connections = self.read();
        let Some(tx) = connections.get(&id) else {
            return false;
        };
        deliver(id, tx, event)
    }

    /// Queue an event for every live connection. Returns how many accepted it.
    pub fn broadcast_all(&self, event: ServerEvent) -> usize {
        self.fan_out(&event, None)
    }

    /// Queue an event for every live connection except `exclude`.
    pub fn broadcast_all_except(&self, exclude: Uuid, event: ServerEvent) -> usize {
        self.fan_out(&event, Some(exclude))
    }

    fn fan_out(&self, event: &ServerEvent, exclude: Option<Uuid>) -> usize {
        let connections = self.read();
        let mut delivered = 0;
        for (client_id, tx) in connections.iter() {
            if exclude == Some(*client_id) {
                continue;
            }
            if deliver(*client_id, tx, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, mpsc::Sender<ServerEvent>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, mpsc::Sender<ServerEvent>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(client_id: Uuid, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(%client_id, event = event.name(), "dispatch: outbound queue full; event dropped");
            false
        }
        // Connection task already gone; teardown will unregister it.
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
