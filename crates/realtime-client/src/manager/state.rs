use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;

/// Observable lifecycle of the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected { error: Option<String> },
    Connecting,
    Connected { sid: String },
    Reconnecting { attempt: u32 },
    Failed { error: String },
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected { error: None }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected { .. } => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected { .. } => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Disconnected { error } => error.as_deref(),
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Result of [`ConnectionManager::connect`](super::ConnectionManager::connect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    Started,
    AlreadyConnected,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingCredential,
    InvalidEndpoint,
    /// A disconnect arrived while waiting to reconnect.
    Cancelled,
}

/// Result of [`ConnectionManager::acknowledge`](super::ConnectionManager::acknowledge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Sent,
    /// No live connection; nothing was queued.
    Dropped,
    /// The id was not a positive integer.
    Rejected,
}

/// Writes state on behalf of one connection generation.
///
/// Once the manager moves to a newer generation, publishes from older
/// drivers are discarded.
#[derive(Clone)]
pub(super) struct StatePublisher {
    tx: Arc<watch::Sender<ConnectionState>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl StatePublisher {
    pub(super) fn new(
        tx: Arc<watch::Sender<ConnectionState>>,
        current: Arc<AtomicU64>,
        generation: u64,
    ) -> Self {
        Self {
            tx,
            current,
            generation,
        }
    }

    pub(super) fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub(super) fn publish(&self, state: ConnectionState) -> bool {
        self.tx.send_if_modified(|slot| {
            if !self.is_current() {
                tracing::trace!(generation = self.generation, "Discarding stale state update");
                return false;
            }
            tracing::debug!(state = state.label(), "Connection state changed");
            *slot = state;
            true
        })
    }
}
