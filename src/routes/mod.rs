//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the presence WebSocket, a read-only snapshot
//! endpoint and a health probe. CORS follows `FRONTEND_ORIGIN` so the
//! browser client can live on a different origin than this server.

pub mod players;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AllowedOrigins;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/socket", get(ws::handle_ws))
        .route("/api/players", get(players::list_players))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    match origins {
        AllowedOrigins::Any => cors.allow_origin(Any),
        AllowedOrigins::List(list) => {
            // Entries were validated as header values when config was parsed.
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect();
            cors.allow_origin(AllowOrigin::list(values))
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
