//! Hand-off of notification events to the dispatch side.
//!
//! The crawler only pushes [`NotificationEvent`]s into a [`NotificationSink`].
//! Subscriber lookup, cooldowns and push delivery belong to whoever drains
//! the queue; the bundled [`NotificationDispatcher`] forwards events to a
//! log line and, optionally, a webhook.

pub mod dispatcher;
pub mod webhook;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::NotificationEvent;
use crate::utils::error::{AppError, Result};

pub use dispatcher::NotificationDispatcher;
pub use webhook::WebhookHandler;

/// Where the crawler puts events. Implementations keep per-key emission order.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, event: NotificationEvent) -> Result<()>;
}

/// A consumer of drained events.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Bounded FIFO queue; `emit` waits while the queue is full.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<NotificationEvent>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn emit(&self, event: NotificationEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| AppError::Internal("notification queue closed".to_string()))
    }
}

pub struct LogHandler;

#[async_trait]
impl NotificationHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        tracing::info!(
            category = %event.category,
            location = %event.location,
            slots_count = event.slots_count,
            occurred_at = %event.occurred_at,
            "{}\n{}",
            event.title(),
            event.summary()
        );
        Ok(())
    }
}
