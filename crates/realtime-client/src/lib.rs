//! Realtime notification client for the Courtside coaching platform.
//!
//! Provides endpoint derivation, a Socket.IO / Engine.IO text codec,
//! WebSocket and long-polling transports, and a connection manager with
//! automatic reconnection and acknowledgement emission.

pub mod backoff;
pub mod endpoint;
pub mod manager;
pub mod notification;
pub mod options;
pub mod protocol;
pub mod timers;
pub mod transport;

#[cfg(test)]
mod test_server;

pub use endpoint::Endpoint;
pub use manager::{AckOutcome, ConnectAttempt, ConnectionManager, ConnectionState, SkipReason};
pub use notification::{Notification, NotificationKind};
pub use options::{ClientOptions, TransportKind};

/// Inbound event carrying a notification.
pub const EVENT_NOTIFICATION_SEND: &str = "notification.send";
/// Outbound event acknowledging a notification.
pub const EVENT_NOTIFICATION_READ: &str = "notification.read";

/// Read access to the session's bearer token.
///
/// The manager calls this at connection time and again before any
/// scheduled reconnection. It never writes credentials.
pub trait CredentialSource: Send + Sync + 'static {
    fn bearer_token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn bearer_token(&self) -> Option<String> {
        self()
    }
}

/// Unified error type for the realtime-client crate.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid endpoint configuration: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection rejected by server: {0}")]
    Rejected(String),

    #[error("HTTP status {status} from polling transport")]
    Status { status: u16 },

    #[error("Connection timeout")]
    Timeout,

    #[error("Transport closed")]
    Closed,
}
