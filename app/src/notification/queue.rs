//! Presentation queue and drain loop.
//!
//! Notifications are shown one at a time in arrival order. Each stays on
//! screen for the dwell time; dismissing early hides it but the next one
//! still waits for the full dwell.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use realtime_client::Notification;
use tokio::time::sleep;

use super::surface::ToastSurface;

pub const DEFAULT_DWELL: Duration = Duration::from_millis(3500);

#[derive(Default)]
struct QueueState {
    items: VecDeque<Notification>,
    draining: bool,
    /// Id of the toast currently on screen, cleared by an early dismissal.
    visible: Option<u64>,
}

struct PresenterInner {
    state: Mutex<QueueState>,
    dwell: Duration,
    surface: Arc<dyn ToastSurface>,
}

/// FIFO toast presenter with per-id deduplication.
#[derive(Clone)]
pub struct Presenter {
    inner: Arc<PresenterInner>,
}

impl Presenter {
    pub fn new(dwell: Duration, surface: Arc<dyn ToastSurface>) -> Self {
        Self {
            inner: Arc::new(PresenterInner {
                state: Mutex::new(QueueState::default()),
                dwell,
                surface,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a notification. Returns `false` when its id is already queued.
    pub fn enqueue(&self, notification: Notification) -> bool {
        let id = notification.id;
        let start = {
            let mut state = self.lock();
            if state.items.iter().any(|n| n.id == id) {
                tracing::debug!(notification_id = id, "Duplicate notification ignored");
                return false;
            }
            state.items.push_back(notification);
            !std::mem::replace(&mut state.draining, true)
        };

        if start {
            tokio::spawn(drain(self.inner.clone()));
        }
        true
    }

    /// Hide the toast on screen without shortening its dwell.
    pub fn dismiss(&self) -> Option<u64> {
        let id = self.lock().visible.take()?;
        self.inner.surface.hide(id);
        Some(id)
    }

    /// Follow the visible toast's deep link and dismiss it.
    ///
    /// Returns `false` when nothing is visible or the toast has no target.
    pub fn open(&self) -> bool {
        let target = {
            let state = self.lock();
            let Some(id) = state.visible else {
                return false;
            };
            state
                .items
                .iter()
                .find(|n| n.id == id)
                .and_then(|n| n.navigation_target().map(str::to_string))
        };

        match target {
            Some(target) => {
                self.inner.surface.navigate(&target);
                self.dismiss();
                true
            }
            None => false,
        }
    }

    /// The notification currently on screen.
    pub fn current(&self) -> Option<Notification> {
        let state = self.lock();
        let id = state.visible?;
        state.items.iter().find(|n| n.id == id).cloned()
    }

    /// Number of queued notifications, including the one on screen.
    pub fn pending(&self) -> usize {
        self.lock().items.len()
    }

    pub fn dwell(&self) -> Duration {
        self.inner.dwell
    }
}

async fn drain(inner: Arc<PresenterInner>) {
    loop {
        let head = {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            match state.items.front() {
                Some(head) => {
                    let head = head.clone();
                    state.visible = Some(head.id);
                    head
                }
                None => {
                    state.draining = false;
                    return;
                }
            }
        };

        inner.surface.show(&head);
        sleep(inner.dwell).await;

        let still_visible = {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.items.pop_front();
            if state.visible == Some(head.id) {
                state.visible = None;
                true
            } else {
                false
            }
        };
        if still_visible {
            inner.surface.hide(head.id);
        }
    }
}
