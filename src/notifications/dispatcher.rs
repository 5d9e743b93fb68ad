use std::sync::Arc;
use tokio::sync::mpsc;

use super::NotificationHandler;
use crate::models::NotificationEvent;

/// Drains the event queue in order and fans each event out to the handlers.
pub struct NotificationDispatcher {
    receiver: mpsc::Receiver<NotificationEvent>,
    handlers: Vec<Arc<dyn NotificationHandler>>,
}

impl NotificationDispatcher {
    pub fn new(receiver: mpsc::Receiver<NotificationEvent>) -> Self {
        Self {
            receiver,
            handlers: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Runs until every sender is gone; returns the number of events drained.
    pub async fn run(mut self) -> u64 {
        let mut delivered = 0;

        while let Some(event) = self.receiver.recv().await {
            delivered += 1;
            metrics::counter!("slot_watcher_notifications_dispatched_total").increment(1);

            for handler in &self.handlers {
                if let Err(e) = handler.notify(&event).await {
                    tracing::error!(
                        handler = handler.name(),
                        category = %event.category,
                        location = %event.location,
                        error = %e,
                        "Notification handler failed"
                    );
                }
            }
        }

        tracing::info!(delivered, "Notification queue closed");
        delivered
    }
}
