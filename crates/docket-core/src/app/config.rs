//! Runtime configuration.
//!
//! Defaults work out of the box; `from_env` overrides them from `DOCKET_*`
//! variables.

use std::collections::BTreeSet;

use crate::domain::EventType;
use crate::error::ValidationError;

pub const ENV_WORKERS: &str = "DOCKET_WORKERS";
pub const ENV_USER_AGENT: &str = "DOCKET_WEBHOOK_USER_AGENT";
pub const ENV_SIGNATURE_HEADER: &str = "DOCKET_WEBHOOK_SIGNATURE_HEADER";
pub const ENV_EVENTS: &str = "DOCKET_WEBHOOK_EVENTS";

pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_USER_AGENT: &str = concat!("docket-webhooks/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Event types accepted by `create_endpoint` / `send_webhook`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventCatalog {
    /// Any well-formed dotted name.
    #[default]
    Open,
    Restricted(BTreeSet<EventType>),
}

impl EventCatalog {
    pub fn restricted<'a>(
        events: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ValidationError> {
        let events = events
            .into_iter()
            .map(EventType::parse)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(EventCatalog::Restricted(events))
    }

    pub fn check(&self, raw: &str) -> Result<EventType, ValidationError> {
        let event = EventType::parse(raw)?;
        match self {
            EventCatalog::Open => Ok(event),
            EventCatalog::Restricted(allowed) if allowed.contains(&event) => Ok(event),
            EventCatalog::Restricted(_) => Err(ValidationError::UnknownEventType(event.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub user_agent: String,
    pub signature_header: String,
    /// Response bodies are truncated to this many bytes before being stored.
    pub max_response_body_bytes: usize,
    pub event_catalog: EventCatalog,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            event_catalog: EventCatalog::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocketConfig {
    /// Fixed size of the worker pool.
    pub worker_count: usize,
    pub webhook: WebhookConfig,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            webhook: WebhookConfig::default(),
        }
    }
}

impl DocketConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = DocketConfig::default();

        if let Some(raw) = lookup(ENV_WORKERS) {
            config.worker_count = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_WORKERS,
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    });
                }
            };
        }

        if let Some(raw) = lookup(ENV_USER_AGENT) {
            config.webhook.user_agent = non_empty(ENV_USER_AGENT, raw)?;
        }

        if let Some(raw) = lookup(ENV_SIGNATURE_HEADER) {
            config.webhook.signature_header = non_empty(ENV_SIGNATURE_HEADER, raw)?;
        }

        if let Some(raw) = lookup(ENV_EVENTS) {
            let names: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                config.webhook.event_catalog =
                    EventCatalog::restricted(names).map_err(|err| ConfigError::Invalid {
                        key: ENV_EVENTS,
                        value: raw.clone(),
                        reason: err.to_string(),
                    })?;
            }
        }

        Ok(config)
    }
}

fn non_empty(key: &'static str, raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
