//! Notification channels for newly discovered codes.
//!
//! Every channel receives the whole batch once per run. Channels are isolated
//! from each other and from the store: a failed delivery is reported in the
//! run's outcomes and nothing is retried or rolled back.
mod email;
mod webhook;

pub use email::{compose_message, EmailChannel, EmailSettings};
pub use webhook::{WebhookChannel, WebhookSettings};

use engine_logging::{engine_info, engine_warn};
use futures_util::future::join_all;
use thiserror::Error;
use watcher_core::{ChannelOutcome, ChannelResult, NotificationBatch};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("delivery rejected with status {0}")]
    Status(u16),
    #[error("invalid address {address}: {message}")]
    Address { address: String, message: String },
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("smtp transport failed: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, batch: &NotificationBatch) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self { channels }
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver `batch` on every channel concurrently; one outcome per channel.
    ///
    /// An empty batch touches no channel.
    pub async fn notify(&self, batch: &NotificationBatch) -> Vec<ChannelOutcome> {
        if batch.is_empty() {
            return Vec::new();
        }

        let deliveries = self.channels.iter().map(|channel| async move {
            let result = match channel.deliver(batch).await {
                Ok(()) => {
                    engine_info!(
                        "Notified {} new code(s) via {}",
                        batch.len(),
                        channel.name()
                    );
                    ChannelResult::Delivered
                }
                Err(err) => {
                    engine_warn!("Notification via {} failed: {}", channel.name(), err);
                    ChannelResult::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            ChannelOutcome {
                channel: channel.name().to_string(),
                result,
            }
        });

        join_all(deliveries).await
    }
}
