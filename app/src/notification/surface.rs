//! Where toasts are rendered.

use realtime_client::Notification;
use tokio::sync::broadcast;

use crate::events::{self, NavigatePayload, ToastHidePayload};

/// Rendering target for the presenter.
pub trait ToastSurface: Send + Sync + 'static {
    fn show(&self, notification: &Notification);
    fn hide(&self, id: u64);
    fn navigate(&self, target: &str);
}

/// Broadcasts toast events to overlay pages over the local WebSocket.
#[derive(Clone)]
pub struct BroadcastSurface {
    tx: broadcast::Sender<String>,
}

impl BroadcastSurface {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }

    fn send(&self, message: String) {
        // No receivers just means no overlay page is open.
        let _ = self.tx.send(message);
    }
}

impl ToastSurface for BroadcastSurface {
    fn show(&self, notification: &Notification) {
        tracing::debug!(notification_id = notification.id, "Showing toast");
        self.send(events::envelope(events::TOAST_SHOW, notification));
    }

    fn hide(&self, id: u64) {
        self.send(events::envelope(events::TOAST_HIDE, &ToastHidePayload { id }));
    }

    fn navigate(&self, target: &str) {
        tracing::info!(navigate_to = %target, "Navigating to notification target");
        self.send(events::envelope(
            events::NAVIGATE,
            &NavigatePayload { target: target.to_string() },
        ));
    }
}

#[cfg(test)]
mod tests {
    use realtime_client::NotificationKind;

    use super::*;

    #[test]
    fn test_show_broadcasts_wire_shape() {
        let (tx, mut rx) = broadcast::channel(8);
        let surface = BroadcastSurface::new(tx);
        surface.show(&Notification {
            id: 3,
            kind: NotificationKind::Info,
            title: "Session booked".into(),
            body: "Thursday 18:00".into(),
            navigate_to: None,
        });
        surface.hide(3);

        let shown: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(shown["type"], "toast_show");
        assert_eq!(shown["data"]["type"], "INFO");
        assert!(shown["data"].get("navigateTo").is_none());

        let hidden: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(hidden["type"], "toast_hide");
        assert_eq!(hidden["data"]["id"], 3);
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let (tx, _) = broadcast::channel(1);
        BroadcastSurface::new(tx).navigate("/home");
    }
}
