//! All setting definitions with their default values.

use std::collections::HashMap;
use std::sync::LazyLock;

type DefTuple = (&'static str, &'static str, bool, &'static str);

const DEFS: &[DefTuple] = &[
    (
        "API_BASE_URL",
        "",
        true,
        "Platform API base URL, e.g. https://api.example.com/api/v1",
    ),
    ("REALTIME_ENABLED", "true", false, "Receive realtime notifications"),
    ("NOTIFICATION_DWELL_MS", "3500", false, "How long each notification stays on screen"),
    ("RECONNECTION_DELAY_MS", "1000", false, "First automatic reconnection delay"),
    ("RECONNECTION_DELAY_MAX_MS", "5000", false, "Cap for the reconnection delay"),
    ("RECONNECTION_ATTEMPTS", "5", false, "Automatic reconnection attempts before giving up"),
    ("CONNECT_TIMEOUT_MS", "20000", false, "Handshake timeout per connection attempt"),
    (
        "SERVER_DISCONNECT_RETRY_MS",
        "2000",
        false,
        "Delay before reconnecting after the server ends the session",
    ),
    ("REALTIME_TRANSPORTS", "websocket,polling", false, "Transports in preference order"),
    ("TRANSPORT_UPGRADE", "true", false, "Upgrade polling sessions to WebSocket"),
    ("SERVER_PORT", "8090", false, "Port of the local overlay server"),
];

/// A single setting definition.
#[derive(Debug, Clone)]
pub struct SettingDef {
    pub key: &'static str,
    pub default: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Setting definitions indexed by key.
pub static DEFAULT_SETTINGS: LazyLock<HashMap<&'static str, SettingDef>> = LazyLock::new(|| {
    DEFS.iter()
        .map(|&(key, default, required, description)| {
            (
                key,
                SettingDef {
                    key,
                    default,
                    required,
                    description,
                },
            )
        })
        .collect()
});

/// Get the default value for a setting key, or `None` if not defined.
pub fn get_default(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS.get(key).map(|d| d.default)
}
