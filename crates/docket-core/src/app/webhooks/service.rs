//! WebhookService - endpoint registry, fan-out dispatch and delivery queries.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::delivery::{WebhookDeliveryHandler, delivery_args};
use crate::app::config::EventCatalog;
use crate::app::scheduler::JobScheduler;
use crate::domain::{
    DeliveryId, DeliveryStatistics, EndpointId, EndpointTestResult, EndpointUpdate, EventType,
    JobPriority, JobRequest, NewEndpoint, TaskName, WebhookDelivery, WebhookEndpoint,
    WebhookEnvelope,
};
use crate::error::{DocketError, StoreError, ValidationError};
use crate::ports::{Clock, DeliveryStore, EndpointStore, IdGenerator};

pub struct WebhookService {
    endpoints: Arc<dyn EndpointStore>,
    deliveries: Arc<dyn DeliveryStore>,
    scheduler: Arc<JobScheduler>,
    handler: Arc<WebhookDeliveryHandler>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    catalog: EventCatalog,
}

impl WebhookService {
    pub fn new(
        endpoints: Arc<dyn EndpointStore>,
        deliveries: Arc<dyn DeliveryStore>,
        scheduler: Arc<JobScheduler>,
        handler: Arc<WebhookDeliveryHandler>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        catalog: EventCatalog,
    ) -> Self {
        Self {
            endpoints,
            deliveries,
            scheduler,
            handler,
            clock,
            ids,
            catalog,
        }
    }

    fn check_events(&self, raw: &[String]) -> Result<BTreeSet<EventType>, ValidationError> {
        raw.iter().map(|e| self.catalog.check(e)).collect()
    }

    pub async fn create_endpoint(&self, new: NewEndpoint) -> Result<WebhookEndpoint, DocketError> {
        let now = self.clock.now();
        let endpoint = WebhookEndpoint {
            id: self.ids.generate_endpoint_id(),
            name: new.name.trim().to_string(),
            url: new.url,
            events: self.check_events(&new.events)?,
            secret: new.secret,
            active: new.active,
            max_retries: new.max_retries,
            retry_delay_seconds: new.retry_delay_seconds,
            timeout_seconds: new.timeout_seconds,
            headers: new.headers,
            created_at: now,
            updated_at: now,
        };
        endpoint.validate()?;
        self.endpoints.insert(endpoint.clone()).await?;
        info!(endpoint_id = %endpoint.id, url = %endpoint.url, "webhook endpoint created");
        Ok(endpoint)
    }

    /// Oldest first.
    pub async fn list_endpoints(&self, active_only: bool) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let mut endpoints = self.endpoints.list().await?;
        if active_only {
            endpoints.retain(|e| e.active);
        }
        Ok(endpoints)
    }

    pub async fn get_endpoint(&self, id: EndpointId) -> Result<Option<WebhookEndpoint>, StoreError> {
        self.endpoints.get(id).await
    }

    /// Apply a partial update; the merged endpoint is re-validated as a whole.
    /// `Ok(None)` when the endpoint does not exist.
    pub async fn update_endpoint(
        &self,
        id: EndpointId,
        update: EndpointUpdate,
    ) -> Result<Option<WebhookEndpoint>, DocketError> {
        let Some(mut endpoint) = self.endpoints.get(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            endpoint.name = name.trim().to_string();
        }
        if let Some(url) = update.url {
            endpoint.url = url;
        }
        if let Some(events) = update.events {
            endpoint.events = self.check_events(&events)?;
        }
        if let Some(secret) = update.secret {
            endpoint.secret = secret;
        }
        if let Some(active) = update.active {
            endpoint.active = active;
        }
        if let Some(max_retries) = update.max_retries {
            endpoint.max_retries = max_retries;
        }
        if let Some(delay) = update.retry_delay_seconds {
            endpoint.retry_delay_seconds = delay;
        }
        if let Some(timeout) = update.timeout_seconds {
            endpoint.timeout_seconds = timeout;
        }
        if let Some(headers) = update.headers {
            endpoint.headers = headers;
        }
        endpoint.updated_at = self.clock.now();
        endpoint.validate()?;

        if !self.endpoints.replace(endpoint.clone()).await? {
            return Ok(None);
        }
        info!(endpoint_id = %id, "webhook endpoint updated");
        Ok(Some(endpoint))
    }

    /// Past deliveries stay queryable.
    pub async fn delete_endpoint(&self, id: EndpointId) -> Result<bool, StoreError> {
        let removed = self.endpoints.remove(id).await?;
        if removed {
            info!(endpoint_id = %id, "webhook endpoint deleted");
        }
        Ok(removed)
    }

    /// Send a `webhook.test` envelope right now, bypassing the queue.
    pub async fn test_endpoint(
        &self,
        id: EndpointId,
    ) -> Result<Option<EndpointTestResult>, StoreError> {
        let Some(endpoint) = self.endpoints.get(id).await? else {
            return Ok(None);
        };
        let envelope = WebhookEnvelope {
            id: self.ids.generate_event_id(),
            event: EventType::webhook_test(),
            timestamp: self.clock.now(),
            data: json!({
                "message": "Test webhook delivery",
                "endpoint_id": endpoint.id.to_string(),
            }),
        };

        let result = match self.handler.send(&endpoint, &envelope).await {
            Ok(Ok(response)) => {
                let success = response.is_success();
                EndpointTestResult {
                    success,
                    status_code: Some(response.status),
                    error: (!success).then(|| format!("HTTP {}", response.status)),
                    response_body: Some(response.body),
                    delivered_at: success.then(|| self.clock.now()),
                }
            }
            Ok(Err(err)) => failed_test(err.to_string()),
            Err(err) => failed_test(err.message),
        };
        info!(endpoint_id = %id, success = result.success, "webhook endpoint tested");
        Ok(Some(result))
    }

    /// Most recent first.
    pub async fn list_deliveries(
        &self,
        endpoint_id: EndpointId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        self.deliveries
            .list_for_endpoint(endpoint_id, limit, offset)
            .await
    }

    pub async fn get_delivery(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>, StoreError> {
        self.deliveries.get(id).await
    }

    /// Fan `data` out as `event_type` to the explicit `endpoint_ids`, or to
    /// every active endpoint subscribed to the event. Inactive and unknown
    /// endpoints are skipped.
    pub async fn send_webhook(
        &self,
        event_type: &str,
        data: Value,
        endpoint_ids: Option<&[EndpointId]>,
    ) -> Result<Vec<DeliveryId>, DocketError> {
        let event = self.catalog.check(event_type)?;

        let targets: Vec<WebhookEndpoint> = match endpoint_ids {
            Some(ids) => {
                let mut targets = Vec::with_capacity(ids.len());
                for &id in ids {
                    match self.endpoints.get(id).await? {
                        Some(endpoint) if endpoint.active => targets.push(endpoint),
                        Some(_) => debug!(endpoint_id = %id, "skipping inactive endpoint"),
                        None => debug!(endpoint_id = %id, "skipping unknown endpoint"),
                    }
                }
                targets
            }
            None => self
                .endpoints
                .list()
                .await?
                .into_iter()
                .filter(|e| e.active && e.subscribes_to(&event))
                .collect(),
        };

        let mut delivery_ids = Vec::with_capacity(targets.len());
        for endpoint in &targets {
            delivery_ids.push(self.dispatch(endpoint, &event, &data).await?);
        }
        info!(
            event = %event,
            deliveries = delivery_ids.len(),
            "webhook event dispatched"
        );
        Ok(delivery_ids)
    }

    /// One endpoint: delivery row first, then the job, so the row exists
    /// before any worker can report on it.
    async fn dispatch(
        &self,
        endpoint: &WebhookEndpoint,
        event: &EventType,
        data: &Value,
    ) -> Result<DeliveryId, DocketError> {
        let now = self.clock.now();
        let envelope = WebhookEnvelope {
            id: self.ids.generate_event_id(),
            event: event.clone(),
            timestamp: now,
            data: data.clone(),
        };
        let delivery_id = self.ids.generate_delivery_id();

        let args = delivery_args(endpoint, &envelope)?;
        let mut metadata = Map::new();
        metadata.insert("endpoint_id".to_string(), json!(endpoint.id.to_string()));
        metadata.insert("delivery_id".to_string(), json!(delivery_id.to_string()));
        metadata.insert("event_type".to_string(), json!(event.as_str()));

        let request = JobRequest {
            task_name: TaskName::WEBHOOK_DELIVERY.to_string(),
            args,
            kwargs: Map::new(),
            priority: JobPriority::Normal,
            max_retries: endpoint.max_retries,
            retry_delay_seconds: endpoint.retry_delay_seconds,
            timeout_seconds: endpoint.timeout_seconds,
            metadata,
        };
        let job = self.scheduler.prepare(request)?;

        self.deliveries
            .insert(WebhookDelivery::pending(
                delivery_id,
                endpoint.id,
                job.job_id,
                envelope,
                now,
            ))
            .await?;

        let job_id = self.scheduler.enqueue(job).await;
        debug!(%delivery_id, %job_id, endpoint_id = %endpoint.id, "delivery queued");
        Ok(delivery_id)
    }

    pub async fn get_delivery_statistics(
        &self,
        endpoint_id: Option<EndpointId>,
        hours: u32,
    ) -> Result<DeliveryStatistics, StoreError> {
        let deliveries = self.deliveries.list_all().await?;
        let endpoints = self.endpoints.list().await?;
        if let Some(id) = endpoint_id
            && !endpoints.iter().any(|e| e.id == id)
        {
            warn!(endpoint_id = %id, "statistics requested for unknown endpoint");
        }
        Ok(DeliveryStatistics::compute(
            &deliveries,
            &endpoints,
            endpoint_id,
            self.clock.now(),
            hours,
        ))
    }
}

fn failed_test(error: String) -> EndpointTestResult {
    EndpointTestResult {
        success: false,
        status_code: None,
        response_body: None,
        error: Some(error),
        delivered_at: None,
    }
}
