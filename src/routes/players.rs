//! Read-only participant snapshot over HTTP.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use uuid::Uuid;

use crate::services::registry::Participant;
use crate::state::AppState;

/// `GET /api/players`: the same mapping a joiner receives in `players`.
pub async fn list_players(State(state): State<AppState>) -> Json<HashMap<Uuid, Participant>> {
    Json(state.registry.snapshot().await)
}
