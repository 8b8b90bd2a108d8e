//! DeliveryTracker - projects `webhook_delivery` job transitions onto delivery rows.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{DeliveryStatus, JobEvent, TaskName, WebhookDelivery};
use crate::ports::{Clock, DeliveryStore, EventSink};

pub struct DeliveryTracker {
    deliveries: Arc<dyn DeliveryStore>,
    clock: Arc<dyn Clock>,
}

impl DeliveryTracker {
    pub fn new(deliveries: Arc<dyn DeliveryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { deliveries, clock }
    }

    fn update_for(
        &self,
        event: &JobEvent,
    ) -> Box<dyn for<'a> FnOnce(&'a mut WebhookDelivery) + Send> {
        let job = event.job();
        let retry_count = job.retry_count;
        match event {
            JobEvent::Completed(_) => {
                let response_code = job
                    .result
                    .as_ref()
                    .and_then(|r| r.value.as_ref())
                    .and_then(|v| v.get("status_code"))
                    .and_then(|v| v.as_u64())
                    .and_then(|code| u16::try_from(code).ok());
                let delivered_at = job.completed_at.unwrap_or_else(|| self.clock.now());
                Box::new(move |row| {
                    row.status = DeliveryStatus::Delivered;
                    row.response_code = response_code;
                    row.delivered_at = Some(delivered_at);
                    row.error_message = None;
                    row.retry_count = retry_count;
                })
            }
            JobEvent::RetryScheduled { error, .. } => {
                let message = error.message.clone();
                Box::new(move |row| {
                    row.retry_count = retry_count;
                    row.error_message = Some(message);
                })
            }
            JobEvent::Failed(_) => {
                let message = job
                    .result
                    .as_ref()
                    .and_then(|r| r.error.clone())
                    .or_else(|| job.last_error.as_ref().map(|e| e.message.clone()));
                Box::new(move |row| {
                    row.status = DeliveryStatus::Failed;
                    row.retry_count = retry_count;
                    row.error_message = message;
                })
            }
            // 再実行の結果が先に届いていれば何もしない。直前のエラーは残す
            JobEvent::Requeued(_) => Box::new(move |row| {
                if row.retry_count < retry_count {
                    row.status = DeliveryStatus::Pending;
                    row.retry_count = retry_count;
                }
            }),
            JobEvent::Cancelled(_) => Box::new(move |row| {
                row.status = DeliveryStatus::Failed;
                row.retry_count = retry_count;
                row.error_message = Some("delivery cancelled".to_string());
            }),
        }
    }
}

#[async_trait]
impl EventSink for DeliveryTracker {
    async fn emit(&self, event: &JobEvent) {
        let job = event.job();
        if job.task_name.as_str() != TaskName::WEBHOOK_DELIVERY {
            return;
        }

        match self
            .deliveries
            .update_by_job(job.job_id, self.update_for(event))
            .await
        {
            Ok(Some(row)) => debug!(
                delivery_id = %row.id,
                job_id = %job.job_id,
                status = row.status.as_str(),
                transition = event.name(),
                "delivery updated"
            ),
            Ok(None) => warn!(job_id = %job.job_id, "no delivery row for webhook job"),
            Err(err) => warn!(job_id = %job.job_id, error = %err, "delivery update failed"),
        }
    }
}
