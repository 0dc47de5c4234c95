use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use client_store::{CredentialStore, Database};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, SettingsManager};
use crate::notification::{BroadcastSurface, Presenter};
use crate::session::NotificationSession;

/// Application shared state accessible from axum handlers and the console.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<SharedStateInner>,
}

struct SharedStateInner {
    /// Broadcast channel for overlay WebSocket messages
    ws_tx: broadcast::Sender<String>,
    /// Application configuration (reloadable)
    config: RwLock<AppConfig>,
    /// Database handle
    db: Database,
    /// Data directory path
    data_dir: PathBuf,
    credentials: CredentialStore,
    session: NotificationSession,
    /// Cancelled once on shutdown; background loops select on it.
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
}

impl SharedState {
    /// Create shared state from an already-opened database and loaded config.
    pub fn new(db: Database, config: AppConfig, data_dir: PathBuf) -> Self {
        let (ws_tx, _) = broadcast::channel(256);
        let credentials = CredentialStore::new(db.clone());
        let presenter = Presenter::new(
            config.notification_dwell(),
            Arc::new(BroadcastSurface::new(ws_tx.clone())),
        );
        let session = NotificationSession::new(&config, credentials.clone(), presenter, ws_tx.clone());

        Self {
            inner: Arc::new(SharedStateInner {
                ws_tx,
                config: RwLock::new(config),
                db,
                data_dir,
                credentials,
                session,
                shutdown: CancellationToken::new(),
                started_at: Utc::now(),
            }),
        }
    }

    pub fn server_port(&self) -> u16 {
        // Read from config; fallback to 8090.
        self.inner
            .config
            .try_read()
            .map(|c| c.server_port)
            .unwrap_or(8090)
    }

    pub fn ws_sender(&self) -> &broadcast::Sender<String> {
        &self.inner.ws_tx
    }

    pub fn subscribe_ws(&self) -> broadcast::Receiver<String> {
        self.inner.ws_tx.subscribe()
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.inner.data_dir
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn session(&self) -> &NotificationSession {
        &self.inner.session
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Ask the process to shut down (same path as Ctrl+C).
    pub fn request_shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Get a read lock on the current config.
    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.config.read().await
    }

    /// Reload config from the database.
    pub async fn reload_config(&self) -> Result<(), anyhow::Error> {
        let sm = SettingsManager::new(self.inner.db.clone());
        let mut config = self.inner.config.write().await;
        config.reload(&sm)?;
        Ok(())
    }
}
