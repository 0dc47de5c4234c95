//! Connection lifecycle for the realtime notification channel.
//!
//! [`ConnectionManager`] owns at most one live connection. Each connection
//! runs in its own driver task; the manager tears drivers down, schedules
//! the single retry after a server-initiated disconnect, and forwards
//! acknowledgements to whichever driver is current.

mod driver;
mod state;


use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::json;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use state::{AckOutcome, ConnectAttempt, ConnectionState, SkipReason};

use self::driver::{Command, Driver, DriverExit};
use self::state::StatePublisher;
use crate::endpoint::Endpoint;
use crate::notification::Notification;
use crate::options::ClientOptions;
use crate::protocol::SocketPacket;
use crate::timers::Timers;
use crate::{CredentialSource, EVENT_NOTIFICATION_READ};

const NOTIFICATION_CAPACITY: usize = 64;

/// Cloneable handle to the realtime channel.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    options: ClientOptions,
    credentials: Arc<dyn CredentialSource>,
    enabled: AtomicBool,
    state: Arc<watch::Sender<ConnectionState>>,
    generation: Arc<AtomicU64>,
    notifications: broadcast::Sender<Notification>,
    live: Mutex<Option<LiveConnection>>,
    timers: Timers,
    http: reqwest::Client,
}

struct LiveConnection {
    generation: u64,
    namespace: String,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl LiveConnection {
    /// Stop the driver; it sends its goodbye and exits on its own.
    fn teardown(self) {
        self.cancel.cancel();
    }
}

impl Inner {
    fn lock_live(&self) -> MutexGuard<'_, Option<LiveConnection>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.timers.cancel_all();
        let live = self
            .live
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(live) = live {
            live.teardown();
        }
    }
}

impl ConnectionManager {
    pub fn new(
        base_url: impl Into<String>,
        options: ClientOptions,
        credentials: impl CredentialSource,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                options,
                credentials: Arc::new(credentials),
                enabled: AtomicBool::new(true),
                state: Arc::new(state),
                generation: Arc::new(AtomicU64::new(0)),
                notifications,
                live: Mutex::new(None),
                timers: Timers::new(),
                http: reqwest::Client::new(),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Stream of inbound notifications, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Turning the session off closes any connection and cancels pending
    /// retries; turning it back on connects.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if !enabled {
            self.disconnect();
        } else if !was {
            self.connect();
        }
    }

    fn current_token(&self) -> Option<String> {
        self.inner
            .credentials
            .bearer_token()
            .filter(|t| !t.trim().is_empty())
    }

    /// Open the realtime channel unless one is already connected.
    ///
    /// A handle that is still connecting or retrying is torn down and
    /// replaced, so at most one connection is ever live.
    pub fn connect(&self) -> ConnectAttempt {
        let inner = &self.inner;
        if !self.is_enabled() {
            tracing::debug!("Realtime session disabled; not connecting");
            return ConnectAttempt::Skipped(SkipReason::Disabled);
        }
        let Some(token) = self.current_token() else {
            tracing::warn!("No credential available; realtime channel not started");
            return ConnectAttempt::Skipped(SkipReason::MissingCredential);
        };
        let endpoint = match Endpoint::derive(&inner.base_url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(error = %e, "Realtime endpoint unavailable");
                return ConnectAttempt::Skipped(SkipReason::InvalidEndpoint);
            }
        };

        let mut live = inner.lock_live();
        if let Some(existing) = live.as_ref() {
            let current = existing.generation == inner.generation.load(Ordering::SeqCst);
            if current && !existing.task.is_finished() && inner.state.borrow().is_connected() {
                tracing::debug!("Realtime channel already connected");
                return ConnectAttempt::AlreadyConnected;
            }
        }
        if let Some(previous) = live.take() {
            tracing::debug!(generation = previous.generation, "Replacing previous connection handle");
            previous.teardown();
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.state.send_replace(ConnectionState::Connecting);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let namespace = endpoint.namespace().to_string();
        tracing::info!(endpoint = %endpoint, generation, "Connecting realtime channel");

        let driver = Driver {
            endpoint,
            options: inner.options.clone(),
            credentials: Arc::clone(&inner.credentials),
            token,
            publisher: StatePublisher::new(Arc::clone(&inner.state), Arc::clone(&inner.generation), generation),
            notifications: inner.notifications.clone(),
            commands: commands_rx,
            cancel: cancel.clone(),
            http: inner.http.clone(),
        };
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let exit = driver.run().await;
            tracing::debug!(?exit, generation, "Connection driver stopped");
            if exit == DriverExit::ServerDisconnect {
                schedule_server_reconnect(weak, generation);
            }
        });

        *live = Some(LiveConnection {
            generation,
            namespace,
            cancel,
            commands: commands_tx,
            task,
        });
        ConnectAttempt::Started
    }

    /// Close the channel, cancel pending retries and reset state.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.timers.cancel_all();

        let mut live = inner.lock_live();
        let previous = live.take();
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner
            .state
            .send_replace(ConnectionState::Disconnected { error: None });
        drop(live);

        if let Some(previous) = previous {
            tracing::info!(generation = previous.generation, "Realtime channel closed");
            previous.teardown();
        }
    }

    /// Disconnect, wait briefly, then connect again.
    pub async fn reconnect(&self) -> ConnectAttempt {
        self.disconnect();
        if !self.inner.timers.delay(self.inner.options.reconnect_settle).await {
            tracing::debug!("Reconnect superseded by disconnect");
            return ConnectAttempt::Skipped(SkipReason::Cancelled);
        }
        self.connect()
    }

    /// Tell the server a notification was read.
    ///
    /// Sent only while connected; never buffered for later.
    pub fn acknowledge(&self, id: i64) -> AckOutcome {
        if id <= 0 {
            tracing::warn!(notification_id = id, "Rejecting acknowledgement with invalid id");
            return AckOutcome::Rejected;
        }

        let live = self.inner.lock_live();
        let Some(conn) = live.as_ref() else {
            tracing::debug!(notification_id = id, "No realtime channel; acknowledgement dropped");
            return AckOutcome::Dropped;
        };
        if !self.inner.state.borrow().is_connected() {
            tracing::debug!(notification_id = id, "Realtime channel not connected; acknowledgement dropped");
            return AckOutcome::Dropped;
        }

        let packet = SocketPacket::event(&conn.namespace, EVENT_NOTIFICATION_READ, vec![json!(id)]);
        match conn.commands.send(Command::Emit(packet)) {
            Ok(()) => {
                tracing::debug!(notification_id = id, "Acknowledgement sent");
                AckOutcome::Sent
            }
            Err(_) => AckOutcome::Dropped,
        }
    }
}

/// One retry after the server closed the session, re-checking the
/// enabled flag and credential when it fires.
fn schedule_server_reconnect(weak: Weak<Inner>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let delay = inner.options.server_disconnect_retry;
    tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnection after server disconnect");

    let weak = Arc::downgrade(&inner);
    inner.timers.schedule(delay, async move {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let manager = ConnectionManager { inner };
        if manager.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Connection superseded; skipping scheduled reconnection");
            return;
        }
        if !manager.is_enabled() {
            tracing::info!("Session disabled; skipping scheduled reconnection");
            return;
        }
        if manager.current_token().is_none() {
            tracing::info!("Credential gone; skipping scheduled reconnection");
            return;
        }
        manager.connect();
    });
}
