//! Router assembly.
//!
//! The gateway exposes exactly two routes: the WebSocket endpoint all
//! real-time traffic flows through, and a liveness document for the
//! platform's monitoring. Everything else (CRUD, auth, media) lives in the
//! platform's HTTP services.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::gateway::ws_handler;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    // The platform's web clients connect cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness document (GET /health).
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.connection_count().await,
        "online": state.registry.list_online().await.len(),
    }))
}
