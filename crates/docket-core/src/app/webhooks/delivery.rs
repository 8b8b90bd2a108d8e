//! `webhook_delivery` handler: signs an envelope and POSTs it to one endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::signing;
use crate::app::config::WebhookConfig;
use crate::domain::{HandlerResult, JobError, WebhookEndpoint, WebhookEnvelope};
use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::typed::{DynHandler, JobCall};

pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_ID: &str = "X-Webhook-Id";
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";

/// Job arguments of a delivery: `[endpoint, envelope]`.
pub(crate) fn delivery_args(
    endpoint: &WebhookEndpoint,
    envelope: &WebhookEnvelope,
) -> Result<Vec<Value>, serde_json::Error> {
    Ok(vec![
        serde_json::to_value(endpoint)?,
        serde_json::to_value(envelope)?,
    ])
}

fn decode_args(call: &JobCall) -> Result<(WebhookEndpoint, WebhookEnvelope), JobError> {
    let [endpoint, envelope] = call.args.as_slice() else {
        return Err(JobError::handler(format!(
            "expected [endpoint, envelope] arguments, got {}",
            call.args.len()
        )));
    };
    let endpoint = serde_json::from_value(endpoint.clone())
        .map_err(|e| JobError::handler(format!("invalid endpoint argument: {e}")))?;
    let envelope = serde_json::from_value(envelope.clone())
        .map_err(|e| JobError::handler(format!("invalid envelope argument: {e}")))?;
    Ok((endpoint, envelope))
}

#[derive(Clone)]
pub struct WebhookDeliveryHandler {
    transport: Arc<dyn HttpTransport>,
    config: WebhookConfig,
}

impl WebhookDeliveryHandler {
    pub fn new(transport: Arc<dyn HttpTransport>, config: WebhookConfig) -> Self {
        Self { transport, config }
    }

    fn build_request(
        &self,
        endpoint: &WebhookEndpoint,
        envelope: &WebhookEnvelope,
    ) -> Result<HttpRequest, JobError> {
        let body = serde_json::to_vec(envelope)
            .map_err(|e| JobError::handler(format!("envelope encode: {e}")))?;

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());
        headers.insert(HEADER_EVENT.to_string(), envelope.event.to_string());
        headers.insert(HEADER_ID.to_string(), envelope.id.to_string());
        headers.insert(
            HEADER_TIMESTAMP.to_string(),
            envelope.timestamp.timestamp().to_string(),
        );
        if let Some(secret) = endpoint.secret.as_deref().filter(|s| !s.is_empty()) {
            let signature = signing::sign(secret, &body)
                .map_err(|e| JobError::handler(format!("signing failed: {e}")))?;
            headers.insert(self.config.signature_header.clone(), signature);
        }

        // ヘッダー名は大文字小文字を区別しない。プロトコルヘッダーと衝突するものは捨てる
        for (name, value) in &endpoint.headers {
            if self.is_reserved(name) {
                tracing::debug!(
                    endpoint_id = %endpoint.id,
                    header = %name,
                    "reserved header dropped"
                );
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        Ok(HttpRequest {
            url: endpoint.url.clone(),
            headers,
            body,
            timeout: Duration::from_secs(endpoint.timeout_seconds),
        })
    }

    fn is_reserved(&self, name: &str) -> bool {
        ["Content-Type", "User-Agent", HEADER_EVENT, HEADER_ID, HEADER_TIMESTAMP]
            .into_iter()
            .chain([self.config.signature_header.as_str()])
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
    }

    /// POST the envelope; any HTTP status comes back as `Ok`.
    pub async fn send(
        &self,
        endpoint: &WebhookEndpoint,
        envelope: &WebhookEnvelope,
    ) -> Result<Result<HttpResponse, TransportError>, JobError> {
        let request = self.build_request(endpoint, envelope)?;
        Ok(self
            .transport
            .post(request)
            .await
            .map(|response| self.truncate(response)))
    }

    /// POST the envelope; non-2xx responses and transport failures are delivery errors.
    pub async fn deliver(
        &self,
        endpoint: &WebhookEndpoint,
        envelope: &WebhookEnvelope,
    ) -> HandlerResult {
        match self.send(endpoint, envelope).await? {
            Ok(response) if response.is_success() => Ok(json!({
                "status_code": response.status,
                "body": response.body,
            })),
            Ok(response) => Err(JobError::delivery(format!(
                "HTTP {}: {}",
                response.status, response.body
            ))),
            Err(err) => Err(JobError::delivery(err.to_string())),
        }
    }

    fn truncate(&self, mut response: HttpResponse) -> HttpResponse {
        let max = self.config.max_response_body_bytes;
        if response.body.len() > max {
            let mut cut = max;
            while !response.body.is_char_boundary(cut) {
                cut -= 1;
            }
            response.body.truncate(cut);
        }
        response
    }
}

#[async_trait]
impl DynHandler for WebhookDeliveryHandler {
    async fn handle_dyn(&self, call: JobCall) -> HandlerResult {
        let (endpoint, envelope) = decode_args(&call)?;
        tracing::debug!(
            job_id = %call.job_id,
            endpoint_id = %endpoint.id,
            event = %envelope.event,
            attempt = call.retry_count + 1,
            "delivering webhook"
        );
        self.deliver(&endpoint, &envelope).await
    }
}
