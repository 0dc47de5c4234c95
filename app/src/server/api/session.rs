//! Session API:
//!   POST /api/session/login           – store a bearer token
//!   POST /api/session/logout          – clear the bearer token
//!   POST /api/notifications/{id}/read – acknowledge a notification

use axum::Json;
use axum::extract::{Path, State};
use realtime_client::AckOutcome;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::app::SharedState;

use super::err_json;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub token: String,
    #[serde(default)]
    pub remember: bool,
}

/// POST /api/session/login
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, (axum::http::StatusCode, Json<Value>)> {
    state
        .credentials()
        .login(&body.token, body.remember)
        .map_err(|e| err_json(400, &format!("Login failed: {e}")))?;
    Ok(Json(json!({ "status": "ok", "remember": body.remember })))
}

/// POST /api/session/logout
pub async fn logout(
    State(state): State<SharedState>,
) -> Result<Json<Value>, (axum::http::StatusCode, Json<Value>)> {
    state
        .credentials()
        .logout()
        .map_err(|e| err_json(500, &format!("Logout failed: {e}")))?;
    Ok(Json(json!({ "status": "ok" })))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, (axum::http::StatusCode, Json<Value>)> {
    match state.session().mark_read(id) {
        AckOutcome::Sent => Ok(Json(json!({ "status": "ok", "sent": true }))),
        AckOutcome::Dropped => Ok(Json(json!({ "status": "ok", "sent": false }))),
        AckOutcome::Rejected => Err(err_json(400, &format!("Invalid notification id: {id}"))),
    }
}
