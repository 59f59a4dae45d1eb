use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use watcher_core::NotificationBatch;

use super::{Channel, NotifyError};

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    /// Upgrade the session with STARTTLS before authenticating.
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub timeout: Duration,
}

/// Build the single message sent for a batch: subject carries the count,
/// body lists every code with its source.
pub fn compose_message(
    settings: &EmailSettings,
    batch: &NotificationBatch,
) -> Result<Message, NotifyError> {
    if settings.to.is_empty() {
        return Err(NotifyError::Message("no recipients configured".into()));
    }
    let mut builder = Message::builder()
        .from(parse_mailbox(&settings.from)?)
        .subject(batch.subject())
        .header(ContentType::TEXT_PLAIN);
    for recipient in &settings.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }
    builder
        .body(batch.listing())
        .map_err(|err| NotifyError::Message(err.to_string()))
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotifyError> {
    raw.parse::<Mailbox>().map_err(|err| NotifyError::Address {
        address: raw.to_string(),
        message: err.to_string(),
    })
}

/// Sends one SMTP message per run.
///
/// The transport is built per delivery and dropped afterwards, so each send
/// opens, uses and closes its own session.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    settings: EmailSettings,
}

impl EmailChannel {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let host = self.settings.host.as_str();
        let builder = if self.settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|err| NotifyError::Transport(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let mut builder = builder
            .port(self.settings.port)
            .timeout(Some(self.settings.timeout));
        match (&self.settings.username, &self.settings.password) {
            (Some(username), Some(password)) => {
                builder =
                    builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (None, None) => {}
            _ => {
                return Err(NotifyError::Transport(
                    "username and password must be set together".into(),
                ))
            }
        }
        Ok(builder.build())
    }
}

#[async_trait::async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, batch: &NotificationBatch) -> Result<(), NotifyError> {
        let message = compose_message(&self.settings, batch)?;
        let transport = self.transport()?;
        transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(())
    }
}
