//! Credential store with a persistent and a session scope.
//!
//! Reads check the persistent scope first, then the session scope. Every
//! change to the bearer token is published on a `watch` channel so the
//! realtime session can react without polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::{Database, DbError};

/// Key under which the bearer token is stored.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    /// Survives restarts (SQLite).
    Persistent,
    /// Lives as long as the process.
    Session,
}

#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db: Database,
    session: Mutex<HashMap<String, String>>,
    changes: watch::Sender<Option<String>>,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        let inner = StoreInner {
            db,
            session: Mutex::new(HashMap::new()),
            changes: watch::channel(None).0,
        };
        let store = Self {
            inner: Arc::new(inner),
        };
        store.publish();
        store
    }

    fn session(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Value for `key`, persistent scope first.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.inner.db.get_credential(key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "Failed to read persistent credential"),
        }
        self.session().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str, scope: CredentialScope) -> Result<(), DbError> {
        match scope {
            CredentialScope::Persistent => self.inner.db.save_credential(key, value)?,
            CredentialScope::Session => {
                self.session().insert(key.to_string(), value.to_string());
            }
        }
        self.publish();
        Ok(())
    }

    /// Remove `key` from both scopes.
    pub fn remove(&self, key: &str) -> Result<(), DbError> {
        self.session().remove(key);
        let result = self.inner.db.delete_credential(key);
        self.publish();
        result
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.get(TOKEN_KEY).filter(|token| !token.trim().is_empty())
    }

    /// Store a bearer token. `remember` keeps it across restarts.
    ///
    /// The other scope is cleared so a stale token cannot shadow the new one.
    pub fn login(&self, token: &str, remember: bool) -> Result<(), DbError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DbError::InvalidData("empty bearer token".into()));
        }
        if remember {
            self.session().remove(TOKEN_KEY);
            self.inner.db.save_credential(TOKEN_KEY, token)?;
        } else {
            self.inner.db.delete_credential(TOKEN_KEY)?;
            self.session().insert(TOKEN_KEY.to_string(), token.to_string());
        }
        tracing::info!(remember, "Bearer token stored");
        self.publish();
        Ok(())
    }

    pub fn logout(&self) -> Result<(), DbError> {
        self.session().clear();
        let result = self.inner.db.delete_all_credentials();
        tracing::info!("Credentials cleared");
        self.publish();
        result
    }

    /// Receiver that sees the current bearer token and every change to it.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.inner.changes.subscribe()
    }

    fn publish(&self) {
        let current = self.bearer_token();
        self.inner.changes.send_if_modified(|slot| {
            if *slot == current {
                return false;
            }
            *slot = current;
            true
        });
    }
}
