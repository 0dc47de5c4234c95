use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use super::{api, websocket};
use crate::app::SharedState;

/// Create the axum router with all routes.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // --- Core ---
        .route("/status", get(status_handler))
        .route("/ws", get(websocket::ws_handler))
        // --- Settings ---
        .route("/api/settings", get(api::settings::get_settings).put(api::settings::update_settings))
        // --- Session ---
        .route("/api/session/login", post(api::session::login))
        .route("/api/session/logout", post(api::session::logout))
        .route("/api/notifications/{id}/read", post(api::session::mark_read))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status_handler(State(state): State<SharedState>) -> Json<Value> {
    let session = state.session();
    let presenter = session.presenter();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connection": session.state(),
        "enabled": session.is_enabled(),
        "toast": presenter.current(),
        "pending": presenter.pending(),
        "started_at": state.started_at().to_rfc3339(),
    }))
}
