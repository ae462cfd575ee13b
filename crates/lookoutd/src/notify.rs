//! Real-time notification fan-out.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

pub const EVENT_ADMITTED: &str = "detection-admitted";
pub const EVENT_CLASSIFIED: &str = "detection-classified";
pub const EVENT_DELETED: &str = "detection-deleted";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("no subscribers listening for {0}")]
    NoSubscribers(String),
}

/// A message addressed to everyone watching one user's alerts.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Delivery scope, `user:<id>`.
    pub scope: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn for_user(user_id: &str, event: &str, payload: serde_json::Value) -> Self {
        Self {
            scope: format!("user:{user_id}"),
            event: event.to_string(),
            payload,
        }
    }
}

/// Pub/sub channel for alerts.
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// In-process broadcast; subscribers forward to whatever transport they own.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        let scope = notification.scope.clone();
        let receivers = self
            .tx
            .send(notification)
            .map_err(|_| NotifyError::NoSubscribers(scope.clone()))?;
        tracing::debug!(scope = %scope, receivers, "notification published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_format() {
        let n = Notification::for_user("42", EVENT_ADMITTED, serde_json::json!({}));
        assert_eq!(n.scope, "user:42");
        assert_eq!(n.event, "detection-admitted");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier
            .publish(Notification::for_user(
                "alice",
                EVENT_DELETED,
                serde_json::json!({ "record_id": "r1" }),
            ))
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.scope, "user:alice");
        assert_eq!(got.payload["record_id"], "r1");
    }

    #[test]
    fn test_publish_without_subscribers_errors() {
        let notifier = BroadcastNotifier::new(8);
        let err = notifier
            .publish(Notification::for_user("alice", EVENT_ADMITTED, serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, NotifyError::NoSubscribers(scope) if scope == "user:alice"));
    }
}
