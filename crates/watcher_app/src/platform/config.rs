//! YAML configuration for the watcher.
//!
//! Every section and field has its own default, so a partially written nested
//! section (say, an `email` block without `port`) keeps the defaults of the
//! fields it leaves out. A missing `webhook` or `email` block disables that
//! channel.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use engine_logging::engine_warn;
use serde::Deserialize;
use watcher_core::{CodeScanner, PatternError, Source, DEFAULT_MIN_LENGTH};
use watcher_engine::{
    EmailChannel, EmailSettings, FetchSettings, Notifier, NotifyError, WebhookChannel,
    WebhookSettings, DEFAULT_MAX_IN_FLIGHT, DEFAULT_USER_AGENT,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub sources: Vec<Source>,
    pub database: PathBuf,
    pub fetch: FetchConfig,
    pub scanner: ScannerConfig,
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            database: PathBuf::from("shift_codes.db"),
            fetch: FetchConfig::default(),
            scanner: ScannerConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_in_flight: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            timeout_secs: settings.request_timeout.as_secs(),
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_bytes: settings.max_bytes,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn to_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.timeout_secs),
            max_bytes: self.max_bytes,
            user_agent: self.user_agent.clone(),
            ..FetchSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// Replaces the built-in matchers when present.
    pub patterns: Option<Vec<String>>,
    pub min_length: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            patterns: None,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl ScannerConfig {
    pub fn build(&self) -> Result<CodeScanner, PatternError> {
        match &self.patterns {
            Some(patterns) => CodeScanner::from_sources(patterns, self.min_length),
            None => {
                let builtin = CodeScanner::default();
                Ok(CodeScanner::new(builtin.patterns().to_vec(), self.min_length))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub webhook: Option<WebhookConfig>,
    pub email: Option<EmailConfig>,
}

impl NotifyConfig {
    pub fn build_notifier(&self) -> Result<Notifier, NotifyError> {
        let mut notifier = Notifier::default();
        if let Some(webhook) = &self.webhook {
            notifier.add(Box::new(WebhookChannel::new(webhook.to_settings())?));
        }
        if let Some(email) = &self.email {
            notifier.add(Box::new(EmailChannel::new(email.to_settings())));
        }
        Ok(notifier)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_payload_key")]
    pub payload_key: String,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl WebhookConfig {
    fn to_settings(&self) -> WebhookSettings {
        WebhookSettings {
            url: self.url.clone(),
            payload_key: self.payload_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl EmailConfig {
    fn to_settings(&self) -> EmailSettings {
        EmailSettings {
            host: self.host.clone(),
            port: self.port,
            starttls: self.starttls,
            username: self.username.clone(),
            password: self.password.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_payload_key() -> String {
    "content".to_string()
}

fn default_webhook_timeout() -> u64 {
    15
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Read and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    parse_config(&content).with_context(|| format!("Failed to parse config {:?}", path))
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    let mut config: AppConfig = if content.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };

    if config.sources.is_empty() {
        engine_warn!("No sources configured; nothing will be scanned");
    }

    let mut seen = HashSet::new();
    config.sources.retain(|source| {
        let first = seen.insert(source.url.clone());
        if !first {
            engine_warn!("Ignoring duplicate source {}", source.url);
        }
        first
    });

    if let Some(email) = &config.notify.email {
        if email.username.is_some() != email.password.is_some() {
            bail!("notify.email: username and password must be set together");
        }
    }

    if config.fetch.max_in_flight == 0 {
        engine_warn!("fetch.max_in_flight must be at least 1; using 1");
        config.fetch.max_in_flight = 1;
    }

    Ok(config)
}
