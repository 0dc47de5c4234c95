//! One user session: the realtime connection wired to the toast presenter.

use client_store::CredentialStore;
use realtime_client::{AckOutcome, ConnectAttempt, ConnectionManager, ConnectionState};
use tokio::sync::{broadcast, watch};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::events;
use crate::notification::Presenter;

#[derive(Clone)]
pub struct NotificationSession {
    manager: ConnectionManager,
    presenter: Presenter,
    credentials: CredentialStore,
    ui: broadcast::Sender<String>,
}

impl NotificationSession {
    pub fn new(
        config: &AppConfig,
        credentials: CredentialStore,
        presenter: Presenter,
        ui: broadcast::Sender<String>,
    ) -> Self {
        let source = credentials.clone();
        let manager = ConnectionManager::new(
            config.api_base_url.clone(),
            config.client_options(),
            move || source.bearer_token(),
        );
        manager.set_enabled(config.realtime_enabled);

        Self {
            manager,
            presenter,
            credentials,
            ui,
        }
    }

    /// Spawn the background loops and open the connection.
    ///
    /// The loops stop when `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) {
        // Subscribe before connecting so a token change racing the first
        // connect is still observed by the watcher.
        let credential_changes = self.credentials.subscribe();

        tokio::spawn(forward_notifications(
            self.manager.subscribe(),
            self.presenter.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(broadcast_state(self.manager.clone(), self.ui.clone(), shutdown.clone()));

        let connected_with = self.credentials.bearer_token();
        match self.manager.connect() {
            ConnectAttempt::Started => tracing::info!("Realtime connection started"),
            other => tracing::info!(outcome = ?other, "Realtime connection not started"),
        }

        tokio::spawn(watch_credentials(
            credential_changes,
            connected_with,
            self.manager.clone(),
            shutdown,
        ));
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        tracing::info!(enabled, "Realtime notifications toggled");
        self.manager.set_enabled(enabled);
    }

    /// Acknowledge a notification and take it off screen.
    pub fn mark_read(&self, id: u64) -> AckOutcome {
        let outcome = match i64::try_from(id) {
            Ok(id) => self.manager.acknowledge(id),
            Err(_) => {
                tracing::warn!(notification_id = id, "Notification id out of range; not acknowledged");
                AckOutcome::Rejected
            }
        };
        if self.presenter.current().is_some_and(|n| n.id == id) {
            self.presenter.dismiss();
        }
        outcome
    }

    /// Acknowledge the notification on screen, if any.
    pub fn mark_current_read(&self) -> Option<AckOutcome> {
        let current = self.presenter.current()?;
        Some(self.mark_read(current.id))
    }

    pub fn dismiss(&self) -> Option<u64> {
        self.presenter.dismiss()
    }

    pub fn open(&self) -> bool {
        self.presenter.open()
    }

    /// Close the connection and cancel pending retries.
    pub fn shutdown(&self) {
        self.manager.disconnect();
    }
}

async fn forward_notifications(
    mut rx: broadcast::Receiver<realtime_client::Notification>,
    presenter: Presenter,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(notification) => {
                tracing::debug!(notification_id = notification.id, "Notification received");
                presenter.enqueue(notification);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification forwarder lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("Notification forwarder stopped");
}

/// Reconnect on a new token, disconnect when it is removed.
///
/// `acted_on` is the token the last connect used; any other value seen on
/// `rx`, including the one current at subscription, is a change.
async fn watch_credentials(
    mut rx: watch::Receiver<Option<String>>,
    mut acted_on: Option<String>,
    manager: ConnectionManager,
    shutdown: CancellationToken,
) {
    loop {
        let token = rx.borrow_and_update().clone();
        if token != acted_on {
            match &token {
                Some(_) => {
                    tracing::info!("Credential changed; reconnecting");
                    let outcome = manager.reconnect().await;
                    tracing::debug!(outcome = ?outcome, "Reconnect after credential change");
                }
                None => {
                    tracing::info!("Credential removed; disconnecting");
                    manager.disconnect();
                }
            }
            acted_on = token;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn broadcast_state(
    manager: ConnectionManager,
    ui: broadcast::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut rx = manager.watch_state();
    drop(manager);
    loop {
        let state = rx.borrow_and_update().clone();
        match state.error() {
            Some(error) => tracing::info!(state = state.label(), error, "Connection state changed"),
            None => tracing::info!(state = state.label(), "Connection state changed"),
        }
        let _ = ui.send(events::envelope(events::CONNECTION_STATE, &state));

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use client_store::Database;
    use realtime_client::TransportKind;

    use super::*;
    use crate::notification::BroadcastSurface;

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn session() -> (NotificationSession, broadcast::Receiver<String>) {
        let port = closed_port().await;
        let config = AppConfig {
            api_base_url: format!("http://127.0.0.1:{port}/api/v1"),
            transports: vec![TransportKind::WebSocket],
            reconnection_attempts: 0,
            connect_timeout_ms: 2000,
            ..AppConfig::default()
        };
        let (ui, ui_rx) = broadcast::channel(64);
        let credentials = CredentialStore::new(Database::open_in_memory().unwrap());
        let presenter = Presenter::new(
            config.notification_dwell(),
            Arc::new(BroadcastSurface::new(ui.clone())),
        );
        (NotificationSession::new(&config, credentials, presenter, ui), ui_rx)
    }

    async fn wait_state(session: &NotificationSession, pred: impl Fn(&ConnectionState) -> bool) {
        let mut rx = session.manager.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("state not reached")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_login_connects_and_logout_disconnects() {
        let (session, _ui) = session().await;
        let shutdown = CancellationToken::new();
        session.start(shutdown.clone());
        assert_eq!(session.state(), ConnectionState::Disconnected { error: None });

        session.credentials().login("coach-token", false).unwrap();
        wait_state(&session, |s| matches!(s, ConnectionState::Failed { .. })).await;

        session.credentials().logout().unwrap();
        wait_state(&session, |s| *s == ConnectionState::Disconnected { error: None }).await;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_login_right_after_start_is_acted_on() {
        let (session, _ui) = session().await;
        let shutdown = CancellationToken::new();
        session.start(shutdown.clone());
        // No await point between start and login.
        session.credentials().login("coach-token", false).unwrap();

        wait_state(&session, |s| !matches!(s, ConnectionState::Disconnected { .. })).await;
        wait_state(&session, |s| matches!(s, ConnectionState::Failed { .. })).await;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_token_present_at_start_connects_once() {
        let (session, _ui) = session().await;
        session.credentials().login("coach-token", true).unwrap();
        let mut states = session.manager.watch_state();

        let shutdown = CancellationToken::new();
        session.start(shutdown.clone());
        wait_state(&session, |s| matches!(s, ConnectionState::Failed { .. })).await;

        // The watcher already saw the token connect() used; no second attempt.
        states.borrow_and_update();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!states.has_changed().unwrap());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_state_changes_reach_overlay() {
        let (session, mut ui) = session().await;
        let shutdown = CancellationToken::new();
        session.start(shutdown.clone());

        let first = tokio::time::timeout(Duration::from_secs(5), ui.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["type"], "connection_state");
        assert_eq!(value["data"]["status"], "disconnected");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_mark_read_outcomes() {
        let (session, _ui) = session().await;
        assert_eq!(session.mark_read(u64::MAX), AckOutcome::Rejected);
        assert_eq!(session.mark_read(42), AckOutcome::Dropped);
        assert_eq!(session.mark_current_read(), None);
    }

    #[tokio::test]
    async fn test_disabled_session_does_not_connect() {
        let (session, _ui) = session().await;
        session.set_enabled(false);
        session.credentials().login("coach-token", true).unwrap();

        let shutdown = CancellationToken::new();
        session.start(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!session.is_enabled());
        assert_eq!(session.state(), ConnectionState::Disconnected { error: None });
        shutdown.cancel();
    }
}
