//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The hub exposes three endpoints: the websocket transport at `/ws`, the
//! HTTP ingress bridge at `/emit` used by the HR backend, and a health
//! probe. CORS origins come from `SOCKET_ORIGINS`; an empty list allows any
//! origin (development default).

pub mod emit;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.socket_origins);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/emit", post(emit::handle_emit))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
