//! Notification payload carried by `notification.send`.

use serde::{Deserialize, Serialize};

/// Presentation category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

/// A notification pushed by the platform backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(rename = "navigateTo", default, skip_serializing_if = "Option::is_none")]
    pub navigate_to: Option<String>,
}

impl Notification {
    /// Decode the first argument of a `notification.send` event.
    pub fn from_event_args(args: &[serde_json::Value]) -> Result<Self, serde_json::Error> {
        let payload = args.first().cloned().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(payload)
    }

    /// Non-empty navigation target, if any.
    pub fn navigation_target(&self) -> Option<&str> {
        self.navigate_to
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_wire_payload() {
        let args = vec![json!({
            "id": 7,
            "type": "SUCCESS",
            "title": "Course approved",
            "body": "Dinking fundamentals is live",
            "navigateTo": "/coach/courses/12"
        })];
        let notification = Notification::from_event_args(&args).unwrap();
        assert_eq!(notification.id, 7);
        assert_eq!(notification.kind, NotificationKind::Success);
        assert_eq!(notification.navigation_target(), Some("/coach/courses/12"));
    }

    #[test]
    fn navigate_to_is_optional() {
        let args = vec![json!({"id": 1, "type": "INFO", "title": "t", "body": "b"})];
        let notification = Notification::from_event_args(&args).unwrap();
        assert_eq!(notification.navigate_to, None);

        let blank = Notification {
            navigate_to: Some("  ".into()),
            ..notification
        };
        assert_eq!(blank.navigation_target(), None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(Notification::from_event_args(&[]).is_err());
        assert!(Notification::from_event_args(&[json!({"id": "x", "type": "INFO"})]).is_err());
        assert!(
            Notification::from_event_args(&[json!({"id": 1, "type": "WARN", "title": "", "body": ""})])
                .is_err()
        );
    }
}
