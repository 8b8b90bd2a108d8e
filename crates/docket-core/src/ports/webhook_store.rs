//! Webhook stores - endpoint とdelivery の正本
//!
//! In-memory 実装は `impls::inmem_webhook_store` にあります。
//! 永続化する場合もこの trait を実装するだけで差し替えられます。

use async_trait::async_trait;

use crate::domain::{DeliveryId, EndpointId, JobId, WebhookDelivery, WebhookEndpoint};
use crate::error::StoreError;

#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn insert(&self, endpoint: WebhookEndpoint) -> Result<(), StoreError>;

    /// Replace an existing endpoint; `false` if it does not exist.
    async fn replace(&self, endpoint: WebhookEndpoint) -> Result<bool, StoreError>;

    async fn get(&self, id: EndpointId) -> Result<Option<WebhookEndpoint>, StoreError>;

    async fn remove(&self, id: EndpointId) -> Result<bool, StoreError>;

    /// All endpoints, oldest first.
    async fn list(&self) -> Result<Vec<WebhookEndpoint>, StoreError>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), StoreError>;

    async fn get(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>, StoreError>;

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<WebhookDelivery>, StoreError>;

    /// Apply `update` to the delivery owned by `job_id`; returns the new row.
    async fn update_by_job(
        &self,
        job_id: JobId,
        update: Box<dyn for<'a> FnOnce(&'a mut WebhookDelivery) + Send>,
    ) -> Result<Option<WebhookDelivery>, StoreError>;

    /// Deliveries of one endpoint, most recent first.
    async fn list_for_endpoint(
        &self,
        endpoint_id: EndpointId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;

    async fn list_all(&self) -> Result<Vec<WebhookDelivery>, StoreError>;
}
