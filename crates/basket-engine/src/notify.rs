//! # Notifications
//!
//! Fire-and-forget dispatch of "an order happened" messages. Delivery is
//! someone else's problem; this module only hands messages off.
//!
//! ```text
//! CheckoutService (after commit)
//!        │  tokio::spawn
//!        ▼
//!   dyn Notifier ──┬── LogNotifier      (tracing::info!)
//!                  └── ChannelNotifier  (bounded mpsc, try_send)
//!                             │
//!                             ▼
//!                       consumer task
//! ```
//!
//! `notify` never blocks and never fails the caller's operation: errors are
//! returned as [`Ignorable`] and logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use ts_rs::TS;

use basket_core::Ignorable;

const STEP: &str = "notification dispatch";

/// What kind of event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Sent to administrators.
    OrderPlaced,
    /// Sent to the purchaser.
    OrderConfirmation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::OrderConfirmation => "order_confirmation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    Closed,
}

/// Hands a notification to whatever delivers it.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), Ignorable<NotifyError>>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> Result<(), Ignorable<NotifyError>> {
        info!(
            kind = notification.kind.as_str(),
            recipients = notification.recipients.len(),
            title = %notification.title,
            metadata = %notification.metadata,
            "Notification"
        );
        Ok(())
    }
}

/// Queues notifications on a bounded channel drained by a consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiving end for the consumer.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (ChannelNotifier { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) -> Result<(), Ignorable<NotifyError>> {
        self.tx.try_send(notification).map_err(|err| {
            let source = match err {
                mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
            };
            Ignorable::new(STEP, source)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            recipients: vec!["admin-1".to_string()],
            kind: NotificationKind::OrderPlaced,
            title: "New order".to_string(),
            message: "Order ORD-000001 was placed".to_string(),
            action_url: None,
            metadata: serde_json::json!({ "order_number": "ORD-000001" }),
        }
    }

    #[tokio::test]
    async fn test_channel_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.notify(notification()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::OrderPlaced);
    }

    #[test]
    fn test_full_queue_is_ignorable() {
        let (notifier, _rx) = ChannelNotifier::new(1);
        notifier.notify(notification()).unwrap();
        let err = notifier.notify(notification()).unwrap_err();
        assert_eq!(err.step(), "notification dispatch");
        assert!(matches!(err.into_inner(), NotifyError::QueueFull));
    }

    #[test]
    fn test_closed_queue_is_ignorable() {
        let (notifier, rx) = ChannelNotifier::new(1);
        drop(rx);
        let err = notifier.notify(notification()).unwrap_err();
        assert!(matches!(err.into_inner(), NotifyError::Closed));
    }

    #[test]
    fn test_log_notifier_accepts_everything() {
        assert!(LogNotifier.notify(notification()).is_ok());
    }
}
