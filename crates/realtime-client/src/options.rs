//! Connection options and their defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine.IO transports the client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" => Ok(Self::Polling),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Parse a comma separated transport list such as `websocket,polling`.
pub fn parse_transports(list: &str) -> Result<Vec<TransportKind>, String> {
    let mut transports = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let kind = part.parse::<TransportKind>()?;
        if !transports.contains(&kind) {
            transports.push(kind);
        }
    }
    if transports.is_empty() {
        return Err("transport list is empty".into());
    }
    Ok(transports)
}

/// Tunables for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Engine.IO request path on the endpoint's origin.
    pub path: String,
    /// Transports in preference order.
    pub transports: Vec<TransportKind>,
    /// Probe and switch from polling to WebSocket when the server offers it.
    pub upgrade: bool,
    /// Start reconnects on the transport a previous session upgraded to.
    pub remember_upgrade: bool,
    /// Delay before the first automatic reconnection attempt.
    pub reconnection_delay: Duration,
    /// Cap for the exponential reconnection delay.
    pub reconnection_delay_max: Duration,
    /// Automatic reconnection attempts before giving up.
    pub reconnection_attempts: u32,
    /// Jitter applied to each reconnection delay (0.0 to 1.0).
    pub randomization_factor: f64,
    /// Bound on the whole handshake of one connection attempt.
    pub timeout: Duration,
    /// Delay of the single reconnection scheduled after a server-side disconnect.
    pub server_disconnect_retry: Duration,
    /// Pause between teardown and connect in `reconnect()`.
    pub reconnect_settle: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            path: "/socket.io/".into(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            upgrade: true,
            remember_upgrade: false,
            reconnection_delay: Duration::from_millis(1000),
            reconnection_delay_max: Duration::from_millis(5000),
            reconnection_attempts: 5,
            randomization_factor: 0.5,
            timeout: Duration::from_millis(20_000),
            server_disconnect_retry: Duration::from_millis(2000),
            reconnect_settle: Duration::from_millis(100),
        }
    }
}
