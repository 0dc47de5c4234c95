//! Settings management API:
//!   GET /api/settings – get all settings + feature status
//!   PUT /api/settings – update settings

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::app::SharedState;
use crate::config::SettingsManager;

use super::err_json;

/// GET /api/settings
pub async fn get_settings(
    State(state): State<SharedState>,
) -> Result<Json<Value>, (axum::http::StatusCode, Json<Value>)> {
    let sm = SettingsManager::new(state.db().clone());

    let all = sm
        .get_all_settings()
        .map_err(|e| err_json(500, &format!("Failed to get settings: {e}")))?;

    let status = sm
        .check_feature_status()
        .map_err(|e| err_json(500, &format!("Failed to check status: {e}")))?;

    Ok(Json(json!({
        "settings": all,
        "status": status,
    })))
}

/// PUT /api/settings
///
/// Connection options take effect on the next start; `REALTIME_ENABLED`
/// applies immediately.
pub async fn update_settings(
    State(state): State<SharedState>,
    Json(body): Json<HashMap<String, String>>,
) -> Result<Json<Value>, (axum::http::StatusCode, Json<Value>)> {
    let sm = SettingsManager::new(state.db().clone());

    let mut updated = 0u32;
    for (key, value) in &body {
        sm.set_setting(key, value)
            .map_err(|e| err_json(400, &format!("{key}: {e}")))?;
        updated += 1;
    }

    // Reload runtime config
    state
        .reload_config()
        .await
        .map_err(|e| err_json(500, &format!("Failed to reload config: {e}")))?;

    if let Some(enabled) = body.get("REALTIME_ENABLED") {
        state.session().set_enabled(enabled == "true");
    }

    let status = sm
        .check_feature_status()
        .map_err(|e| err_json(500, &format!("Failed to check status: {e}")))?;

    tracing::info!(updated, "Settings updated via API");
    Ok(Json(json!({
        "updated": updated,
        "status": status,
    })))
}
