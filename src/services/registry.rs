//! Session registry: the authoritative set of participants.
//!
//! DESIGN
//! ======
//! One registry per process, constructed at startup and shared through
//! `AppState`. It is the only writer of `Participant` fields. Every mutation
//! takes the write lock for a single map operation; `snapshot` clones under
//! the read lock so callers never observe a torn map and never hold a
//! reference into it.
//!
//! ORDERING
//! ========
//! `join`, `move_by` and `leave` take an `announce` hook that runs while the
//! write lock is still held. Fan-out queued from the hook is therefore
//! ordered exactly like the mutations themselves: a joiner's snapshot can
//! never be overtaken by an older `playerLeft` or `playerMoved`. The hook
//! must not block or await; queueing with `try_send` is fine.
//!
//! The world is unbounded: moves are scaled but never clamped. Spawn points
//! are uniform over a square centred on the origin, with no collision
//! avoidance. A move that would leave the finite `f64` range is refused so
//! positions are always defined.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::frame::ErrorCode;

/// Color assigned when a join carries none.
pub const DEFAULT_COLOR: &str = "#ff4d4f";

const GUEST_PREFIX: &str = "Guest";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("participant already registered: {0}")]
    DuplicateId(Uuid),
}

impl ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "E_DUPLICATE_PARTICIPANT",
        }
    }
}

/// One connected participant. Serializes to the wire shape
/// `{id, name, color, x, z}`.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: Uuid,
    #[serde(rename = "name")]
    pub display_name: String,
    pub color: String,
    pub x: f64,
    pub z: f64,
    /// Refreshed on every accepted move.
    #[serde(skip)]
    pub last_activity: Instant,
}

impl Participant {
    /// Time since the last join or move.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

pub struct SessionRegistry {
    participants: RwLock<HashMap<Uuid, Participant>>,
    spawn_half_extent: f64,
    move_scale: f64,
}

impl SessionRegistry {
    /// Create an empty registry. Spawns are drawn from
    /// `[-spawn_half_extent, spawn_half_extent]` on each axis and move deltas
    /// are multiplied by `move_scale`.
    #[must_use]
    pub fn new(spawn_half_extent: f64, move_scale: f64) -> Self {
        Self { participants: RwLock::new(HashMap::new()), spawn_half_extent, move_scale }
    }

    /// Create a participant at a random spawn point. `announce` receives the
    /// new record and the full post-join map inside the critical section.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if `id` already has a record; the existing
    /// record is left untouched and `announce` is not called.
    pub async fn join<F>(
        &self,
        id: Uuid,
        name: Option<&str>,
        color: Option<&str>,
        announce: F,
    ) -> Result<Participant, RegistryError>
    where
        F: FnOnce(&Participant, &HashMap<Uuid, Participant>),
    {
        let (x, z) = self.random_spawn();
        let participant = Participant {
            id,
            display_name: normalize_name(name),
            color: normalize_color(color),
            x,
            z,
            last_activity: Instant::now(),
        };

        let mut participants = self.participants.write().await;
        let participant = match participants.entry(id) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateId(id)),
            Entry::Vacant(slot) => slot.insert(participant).clone(),
        };
        announce(&participant, &*participants);
        Ok(participant)
    }

    /// Apply a scaled position delta and hand the post-move state to
    /// `announce`. Returns `None`, without announcing, if `id` has no record
    /// (a move racing disconnect teardown).
    ///
    /// A delta that would push either coordinate out of the finite range
    /// leaves the position unchanged.
    pub async fn move_by<F>(&self, id: Uuid, dx: f64, dz: f64, announce: F) -> Option<Participant>
    where
        F: FnOnce(&Participant),
    {
        let mut participants = self.participants.write().await;
        let participant = participants.get_mut(&id)?;
        let x = participant.x + dx * self.move_scale;
        let z = participant.z + dz * self.move_scale;
        if x.is_finite() && z.is_finite() {
            participant.x = x;
            participant.z = z;
        }
        participant.last_activity = Instant::now();
        announce(&*participant);
        Some(participant.clone())
    }

    /// Remove a participant. `announce` sees the removed record and only runs
    /// if one existed. Returns whether a record was removed.
    pub async fn leave<F>(&self, id: Uuid, announce: F) -> bool
    where
        F: FnOnce(&Participant),
    {
        let mut participants = self.participants.write().await;
        match participants.remove(&id) {
            Some(participant) => {
                announce(&participant);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every participant.
    pub async fn snapshot(&self) -> HashMap<Uuid, Participant> {
        self.participants.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.participants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.participants.read().await.is_empty()
    }

    fn random_spawn(&self) -> (f64, f64) {
        let h = self.spawn_half_extent;
        let mut rng = rand::rng();
        (rng.random_range(-h..=h), rng.random_range(-h..=h))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn normalize_name(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.to_owned(),
        None => guest_name(),
    }
}

fn normalize_color(color: Option<&str>) -> String {
    color
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_COLOR)
        .to_owned()
}

fn guest_name() -> String {
    let suffix: u16 = rand::rng().random();
    format!("{GUEST_PREFIX}-{suffix:04x}")
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
