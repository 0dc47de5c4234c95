//! Overlay event constants and helpers.
//!
//! These events are broadcast as JSON envelopes (`{"type", "data"}`) to
//! every overlay page connected to the local `/ws` endpoint.

use serde::Serialize;

// -- Event name constants --

pub const CONNECTED: &str = "connected";
pub const TOAST_SHOW: &str = "toast_show";
pub const TOAST_HIDE: &str = "toast_hide";
pub const NAVIGATE: &str = "navigate";
pub const CONNECTION_STATE: &str = "connection_state";
pub const PONG: &str = "pong";

// -- Payload types --

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPayload {
    #[serde(rename = "clientId")]
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToastHidePayload {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigatePayload {
    pub target: String,
}

/// Wrap `data` in the envelope overlay pages expect.
pub fn envelope<T: Serialize>(event: &str, data: &T) -> String {
    let data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    serde_json::json!({ "type": event, "data": data }).to_string()
}
