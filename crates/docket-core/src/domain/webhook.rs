//! Webhook endpoints, deliveries and the envelope sent over the wire.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{DeliveryId, EndpointId, EventId, JobId};
use super::job::check_range;
use crate::error::ValidationError;

pub const ENDPOINT_MAX_RETRIES_RANGE: RangeInclusive<u64> = 0..=10;
pub const ENDPOINT_RETRY_DELAY_RANGE: RangeInclusive<u64> = 1..=3600;
pub const ENDPOINT_TIMEOUT_RANGE: RangeInclusive<u64> = 10..=300;

pub const DEFAULT_ENDPOINT_TIMEOUT_SECONDS: u64 = 30;

/// Event name such as `case.created` or `timeline.event.created`.
///
/// The set of names is open; [`crate::app::EventCatalog`] decides which are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub const CASE_CREATED: &'static str = "case.created";
    pub const CASE_UPDATED: &'static str = "case.updated";
    pub const DOCUMENT_UPLOADED: &'static str = "document.uploaded";
    pub const DOCUMENT_ANALYZED: &'static str = "document.analyzed";
    pub const TIMELINE_EVENT_CREATED: &'static str = "timeline.event.created";
    pub const EXPORT_COMPLETED: &'static str = "export.completed";
    /// Sent by `test_endpoint`.
    pub const WEBHOOK_TEST: &'static str = "webhook.test";

    /// Dotted lowercase segments: `case.created`, `timeline.event.created`.
    pub fn parse(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let well_formed = !s.is_empty()
            && s.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            });
        if well_formed {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidEventType(s))
        }
    }

    pub fn webhook_test() -> Self {
        Self(Self::WEBHOOK_TEST.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Externally registered delivery target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub name: String,
    pub url: String,
    pub events: BTreeSet<EventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub active: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event: &EventType) -> bool {
        self.events.contains(event)
    }

    /// Re-check the invariants after a create or update.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        validate_url(&self.url)?;
        if self.events.is_empty() {
            return Err(ValidationError::EmptyEvents);
        }
        check_range(
            "max_retries",
            self.max_retries.into(),
            &ENDPOINT_MAX_RETRIES_RANGE,
        )?;
        check_range(
            "retry_delay_seconds",
            self.retry_delay_seconds,
            &ENDPOINT_RETRY_DELAY_RANGE,
        )?;
        check_range(
            "timeout_seconds",
            self.timeout_seconds,
            &ENDPOINT_TIMEOUT_RANGE,
        )?;
        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }
        Ok(())
    }
}

/// HTTP で送れないヘッダーは登録時に弾く
pub fn validate_header(name: &str, value: &str) -> Result<(), ValidationError> {
    let name_ok = reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_ok();
    if !name_ok || reqwest::header::HeaderValue::from_str(value).is_err() {
        return Err(ValidationError::InvalidHeader(name.to_string()));
    }
    Ok(())
}

/// `http`/`https` with a host; anything else is rejected.
pub fn validate_url(raw: &str) -> Result<(), ValidationError> {
    let url = reqwest::Url::parse(raw).map_err(|_| ValidationError::InvalidUrl(raw.to_string()))?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    if !scheme_ok || url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::InvalidUrl(raw.to_string()));
    }
    Ok(())
}

/// Fields accepted by `create_endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_endpoint_retries")]
    pub max_retries: u32,
    #[serde(default = "default_endpoint_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_active() -> bool {
    true
}

fn default_endpoint_retries() -> u32 {
    super::job::DEFAULT_MAX_RETRIES
}

fn default_endpoint_retry_delay() -> u64 {
    super::job::DEFAULT_RETRY_DELAY_SECONDS
}

fn default_endpoint_timeout() -> u64 {
    DEFAULT_ENDPOINT_TIMEOUT_SECONDS
}

impl NewEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, events: &[&str]) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            events: events.iter().map(|e| e.to_string()).collect(),
            secret: None,
            active: true,
            max_retries: default_endpoint_retries(),
            retry_delay_seconds: default_endpoint_retry_delay(),
            timeout_seconds: DEFAULT_ENDPOINT_TIMEOUT_SECONDS,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_seconds: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_seconds = retry_delay_seconds;
        self
    }
}

/// Partial update for `update_endpoint`; `None` leaves the field unchanged.
///
/// `secret: Some(None)` clears the secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub secret: Option<Option<String>>,
    pub active: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<BTreeMap<String, String>>,
}

/// Body POSTed to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: EventId,
    pub event: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Queryable projection of one delivery job's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub endpoint_id: EndpointId,
    pub job_id: JobId,
    pub event_type: EventType,
    pub payload: WebhookEnvelope,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub response_code: Option<u16>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl WebhookDelivery {
    pub fn pending(
        id: DeliveryId,
        endpoint_id: EndpointId,
        job_id: JobId,
        payload: WebhookEnvelope,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            endpoint_id,
            job_id,
            event_type: payload.event.clone(),
            payload,
            status: DeliveryStatus::Pending,
            created_at,
            delivered_at: None,
            response_code: None,
            error_message: None,
            retry_count: 0,
        }
    }
}

/// Result of the synchronous `test_endpoint` ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointTestResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::https("https://hooks.example.com/legal", true)]
    #[case::http_with_port("http://localhost:8080/hook", true)]
    #[case::ftp("ftp://example.com/hook", false)]
    #[case::relative("/just/a/path", false)]
    #[case::empty("", false)]
    #[case::no_host("https://", false)]
    fn url_validation(#[case] url: &str, #[case] ok: bool) {
        assert_eq!(validate_url(url).is_ok(), ok, "{url}");
    }

    #[rstest]
    #[case::plain("X-Tenant", "acme", true)]
    #[case::lowercase("x-tenant", "acme", true)]
    #[case::space_in_name("X Tenant", "acme", false)]
    #[case::empty_name("", "acme", false)]
    #[case::newline_in_value("X-Tenant", "acme\r\nX-Injected: 1", false)]
    fn header_validation(#[case] name: &str, #[case] value: &str, #[case] ok: bool) {
        assert_eq!(validate_header(name, value).is_ok(), ok, "{name}: {value}");
    }

    #[rstest]
    #[case::simple("case.created", true)]
    #[case::three_segments("timeline.event.created", true)]
    #[case::single("ping", true)]
    #[case::empty("", false)]
    #[case::trailing_dot("case.", false)]
    #[case::uppercase("Case.Created", false)]
    fn event_type_parsing(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(EventType::parse(raw).is_ok(), ok, "{raw}");
    }

    #[test]
    fn new_endpoint_json_uses_defaults() {
        let req: NewEndpoint = serde_json::from_str(
            r#"{ "name": "crm", "url": "https://x/y", "events": ["case.created"] }"#,
        )
        .unwrap();
        assert!(req.active);
        assert_eq!(req.max_retries, 3);
        assert_eq!(req.retry_delay_seconds, 60);
        assert_eq!(req.timeout_seconds, 30);
    }
}
