use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::NotificationHandler;
use crate::config::NotificationsConfig;
use crate::models::NotificationEvent;
use crate::utils::error::{AppError, Result};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// POSTs each event as JSON to a dispatch endpoint.
pub struct WebhookHandler {
    client: Client,
    url: String,
    attempts: u32,
}

impl WebhookHandler {
    pub fn new(url: impl Into<String>, timeout: Duration, attempts: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("slot-watcher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            attempts: attempts.max(1),
        })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &NotificationsConfig) -> Result<Option<Self>> {
        config
            .webhook_url
            .as_ref()
            .map(|url| Self::new(url.clone(), Duration::from_secs(config.webhook_timeout_secs), config.webhook_attempts))
            .transpose()
    }

    fn create_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        json!({
            "title": event.title(),
            "body": event.summary(),
            "category": event.category,
            "category_name": event.category_name,
            "location": event.location,
            "previous_has_slots": event.previous_has_slots,
            "new_has_slots": event.new_has_slots,
            "slots_count": event.slots_count,
            "occurred_at": event.occurred_at.to_rfc3339(),
            "days": event.days,
        })
    }

    async fn post_once(&self, payload: &serde_json::Value) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::Internal(format!("Webhook returned {}: {}", status, error_text)))
        }
    }
}

#[async_trait]
impl NotificationHandler for WebhookHandler {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let payload = self.create_payload(event);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => {
                    tracing::debug!(attempt, location = %event.location, "Webhook delivered");
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(attempt, max_attempts = self.attempts, error = %e, "Webhook delivery failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
