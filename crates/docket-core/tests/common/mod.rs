#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docket_core::domain::{DeliveryId, DeliveryStatus, JobId, JobRecord, WebhookDelivery};
use docket_core::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use docket_core::{App, AppBuilder, DocketConfig};

/// Answers from a script (last entry repeats) and keeps every request.
pub struct MockTransport {
    script: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::status(200, "ok")
    }

    pub fn status(status: u16, body: &str) -> Arc<Self> {
        Self::new(vec![Ok(HttpResponse {
            status,
            body: body.to_string(),
        })])
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

pub fn builder(workers: usize, transport: Arc<MockTransport>) -> AppBuilder {
    let config = DocketConfig {
        worker_count: workers,
        ..DocketConfig::default()
    };
    AppBuilder::new()
        .with_config(config)
        .with_transport(transport)
}

pub async fn wait_for_job<F>(app: &App, job_id: JobId, pred: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    let wait = async {
        loop {
            if let Some(record) = app.scheduler.get_job_status(job_id).await
                && pred(&record)
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("job did not reach the expected state")
}

pub async fn wait_terminal(app: &App, job_id: JobId) -> JobRecord {
    wait_for_job(app, job_id, JobRecord::is_terminal).await
}

pub async fn wait_delivery_settled(app: &App, delivery_id: DeliveryId) -> WebhookDelivery {
    let wait = async {
        loop {
            if let Some(row) = app.webhooks.get_delivery(delivery_id).await.unwrap()
                && row.status != DeliveryStatus::Pending
            {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("delivery did not settle")
}
