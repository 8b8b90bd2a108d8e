//! In-memory webhook stores - 開発用・テスト用の正本
//!
//! # 実装詳細
//! - tokio の RwLock<HashMap<..>> で排他制御
//! - ロックはメソッド内で完結し、await を跨がない

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DeliveryId, EndpointId, JobId, WebhookDelivery, WebhookEndpoint};
use crate::error::StoreError;
use crate::ports::{DeliveryStore, EndpointStore};

#[derive(Default)]
pub struct InMemoryEndpointStore {
    endpoints: RwLock<HashMap<EndpointId, WebhookEndpoint>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn insert(&self, endpoint: WebhookEndpoint) -> Result<(), StoreError> {
        self.endpoints.write().await.insert(endpoint.id, endpoint);
        Ok(())
    }

    async fn replace(&self, endpoint: WebhookEndpoint) -> Result<bool, StoreError> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(&endpoint.id) {
            Some(slot) => {
                *slot = endpoint;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: EndpointId) -> Result<Option<WebhookEndpoint>, StoreError> {
        Ok(self.endpoints.read().await.get(&id).cloned())
    }

    async fn remove(&self, id: EndpointId) -> Result<bool, StoreError> {
        Ok(self.endpoints.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let mut endpoints: Vec<WebhookEndpoint> =
            self.endpoints.read().await.values().cloned().collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(endpoints)
    }
}

#[derive(Default)]
struct DeliveryTables {
    rows: HashMap<DeliveryId, WebhookDelivery>,
    by_job: HashMap<JobId, DeliveryId>,
}

#[derive(Default)]
pub struct InMemoryDeliveryStore {
    tables: RwLock<DeliveryTables>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.by_job.insert(delivery.job_id, delivery.id);
        tables.rows.insert(delivery.id, delivery);
        Ok(())
    }

    async fn get(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>, StoreError> {
        Ok(self.tables.read().await.rows.get(&id).cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<WebhookDelivery>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_job
            .get(&job_id)
            .and_then(|id| tables.rows.get(id))
            .cloned())
    }

    async fn update_by_job(
        &self,
        job_id: JobId,
        update: Box<dyn for<'a> FnOnce(&'a mut WebhookDelivery) + Send>,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(id) = tables.by_job.get(&job_id).copied() else {
            return Ok(None);
        };
        Ok(tables.rows.get_mut(&id).map(|row| {
            update(row);
            row.clone()
        }))
    }

    async fn list_for_endpoint(
        &self,
        endpoint_id: EndpointId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&WebhookDelivery> = tables
            .rows
            .values()
            .filter(|row| row.endpoint_id == endpoint_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<WebhookDelivery>, StoreError> {
        Ok(self.tables.read().await.rows.values().cloned().collect())
    }
}
