use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use watcher_core::NotificationBatch;

use super::{Channel, NotifyError};
use crate::fetch::DEFAULT_USER_AGENT;

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: String,
    /// JSON field carrying the listing, e.g. `content` (Discord) or `text` (Slack).
    pub payload_key: String,
    pub timeout: Duration,
}

impl WebhookSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload_key: "content".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Posts one JSON message per run listing every new code.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    settings: WebhookSettings,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(settings: WebhookSettings) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| NotifyError::Http(err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn payload(&self, batch: &NotificationBatch) -> Value {
        let mut body = Map::new();
        body.insert(
            self.settings.payload_key.clone(),
            Value::String(batch.listing()),
        );
        Value::Object(body)
    }
}

#[async_trait::async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, batch: &NotificationBatch) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&self.payload(batch))
            .map_err(|err| NotifyError::Message(err.to_string()))?;
        let response = self
            .client
            .post(&self.settings.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| NotifyError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
