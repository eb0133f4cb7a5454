//! Fire-and-forget document status notifications.
//!
//! A broadcast channel carrying status transitions. Senders never fail:
//! having no subscribers is the normal idle state.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::DocumentStatus;

const CHANNEL_CAPACITY: usize = 256;

/// One status transition for a document
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub document_id: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Handle for publishing and subscribing to status events
#[derive(Clone)]
pub struct StatusNotifier {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. A send error only means nobody is listening.
    pub fn publish(&self, document_id: &str, status: DocumentStatus, detail: Option<String>) {
        let _ = self.sender.send(StatusEvent {
            document_id: document_id.to_string(),
            status,
            detail,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = StatusNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.publish("doc-1", DocumentStatus::Processing, None);
        notifier.publish(
            "doc-1",
            DocumentStatus::Processed,
            Some("pipeline finished".to_string()),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.document_id, "doc-1");
        assert_eq!(first.status, DocumentStatus::Processing);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.status, DocumentStatus::Processed);
        assert_eq!(second.detail.as_deref(), Some("pipeline finished"));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let notifier = StatusNotifier::new();
        notifier.publish("doc-2", DocumentStatus::Queued, None);
    }
}
