//! Cancellable delays owned by one connection manager.
//!
//! Every delay is tied to a child of the current root token, so
//! [`Timers::cancel_all`] drops all pending delays in one step.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct Timers {
    root: Mutex<CancellationToken>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    fn child(&self) -> CancellationToken {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    /// Run `task` after `delay` unless cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.child();
        tokio::spawn(async move {
            if !sleep_or_cancel(&token, delay).await {
                task.await;
            }
        });
    }

    /// Wait for `delay`. Returns `false` if the wait was cancelled.
    pub async fn delay(&self, delay: Duration) -> bool {
        let token = self.child();
        !sleep_or_cancel(&token, delay).await
    }

    /// Cancel every pending delay; later delays are unaffected.
    pub fn cancel_all(&self) {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        root.cancel();
        *root = CancellationToken::new();
    }
}

/// Returns `true` when cancelled before the delay elapsed.
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_runs_after_delay() {
        let timers = Timers::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        timers.schedule(Duration::from_millis(2000), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(1999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending_tasks_only() {
        let timers = Timers::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        timers.schedule(Duration::from_millis(100), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        timers.cancel_all();

        let f = fired.clone();
        timers.schedule(Duration::from_millis(100), async move {
            f.fetch_add(10, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_reports_cancellation() {
        let timers = Arc::new(Timers::new());
        let t = timers.clone();
        let waiter = tokio::spawn(async move { t.delay(Duration::from_secs(10)).await });
        sleep(Duration::from_millis(1)).await;
        timers.cancel_all();
        assert!(!waiter.await.unwrap());
        assert!(timers.delay(Duration::from_millis(1)).await);
    }
}
