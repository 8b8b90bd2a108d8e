use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing::info;

use docket_core::domain::{
    HandlerResult, JobError, JobId, JobPriority, JobRequest, NewEndpoint, TaskName,
};
use docket_core::typed::{Handler, JobCall, Task};
use docket_core::{App, AppBuilder, DocketConfig, observability};

const ENV_WEBHOOK_URL: &str = "DOCKET_WEBHOOK_URL";

#[derive(Debug, Deserialize)]
struct AnalyzeDocument {
    document_id: String,
    #[serde(default)]
    pages: u32,
}

impl Task for AnalyzeDocument {
    const NAME: &'static str = TaskName::DOCUMENT_ANALYSIS;
}

/// 最初の n 回は失敗する handler（リトライの様子を見るため）
struct AnalyzeHandler {
    remaining_failures: AtomicU32,
}

impl AnalyzeHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<AnalyzeDocument> for AnalyzeHandler {
    async fn handle(&self, task: AnalyzeDocument, call: &JobCall) -> HandlerResult {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(JobError::handler(format!(
                "ocr backend unavailable (left={left}, attempt={})",
                call.retry_count + 1
            )));
        }

        sleep(Duration::from_millis(200)).await;
        Ok(json!({
            "document_id": task.document_id,
            "pages": task.pages,
            "entities": ["Acme Corp", "J. Doe"],
        }))
    }
}

async fn export(call: JobCall) -> HandlerResult {
    let case_id = call.kwargs.get("case_id").cloned().unwrap_or_default();
    sleep(Duration::from_millis(100)).await;
    Ok(json!({ "case_id": case_id, "file": "export.zip" }))
}

/// 全ジョブが終端状態になるまでポーリング
async fn wait_all(app: &App, ids: &[JobId]) {
    loop {
        let mut done = 0;
        for id in ids {
            if let Some(job) = app.scheduler.get_job_status(*id).await
                && job.is_terminal()
            {
                done += 1;
            }
        }
        if done == ids.len() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    observability::init();

    // (A) 設定と handler を組み立てて起動
    let config = DocketConfig::from_env()?;
    let app = AppBuilder::new()
        .with_config(config)
        .register::<AnalyzeDocument, _>(AnalyzeHandler::new(2))?
        .register_fn(TaskName::EXPORT_GENERATION, export)?
        .expect_tasks(&[TaskName::DOCUMENT_ANALYSIS, TaskName::EXPORT_GENERATION])
        .build()?;
    println!("registered tasks: {:?}", app.scheduler.registered_tasks());

    // (B) Webhook エンドポイント（任意）
    if let Ok(url) = std::env::var(ENV_WEBHOOK_URL) {
        let endpoint = app
            .webhooks
            .create_endpoint(NewEndpoint::new(
                "demo",
                url,
                &["job.completed", "case.created"],
            ))
            .await?;
        info!(endpoint_id = %endpoint.id, url = %endpoint.url, "demo endpoint registered");
    } else {
        info!("{ENV_WEBHOOK_URL} not set; webhook deliveries will have no targets");
    }

    // (C) ジョブ投入
    let mut ids = Vec::new();
    ids.push(
        app.scheduler
            .submit_job(
                JobRequest::new(TaskName::DOCUMENT_ANALYSIS)
                    .with_kwarg("document_id", json!("doc-123"))
                    .with_kwarg("pages", json!(12))
                    .with_max_retries(2)
                    .with_retry_delay_seconds(1),
            )
            .await?,
    );
    ids.push(
        app.scheduler
            .submit_job(
                JobRequest::new(TaskName::EXPORT_GENERATION)
                    .with_kwarg("case_id", json!(42))
                    .with_priority(JobPriority::High),
            )
            .await?,
    );
    for id in &ids {
        println!("submitted: {id}");
    }

    // (D) 終端状態まで待つ
    wait_all(&app, &ids).await;
    for id in &ids {
        if let Some(job) = app.scheduler.get_job_status(*id).await {
            println!(
                "final status: {} task={} status={} retries={} result={}",
                job.job_id,
                job.task_name,
                job.status.as_str(),
                job.retry_count,
                serde_json::to_string(&job.result)?
            );
        }
    }

    // (E) Webhook 通知（登録済みエンドポイントへ fan-out）
    let job_ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let deliveries = app
        .webhooks
        .send_webhook("job.completed", json!({ "job_ids": job_ids }), None)
        .await?;
    println!("webhook deliveries queued: {}", deliveries.len());
    sleep(Duration::from_millis(500)).await;

    // (F) 統計
    let stats = app.scheduler.get_job_statistics(24).await;
    println!("job statistics: {}", serde_json::to_string_pretty(&stats)?);
    let delivery_stats = app.webhooks.get_delivery_statistics(None, 24).await?;
    println!(
        "delivery statistics: {}",
        serde_json::to_string_pretty(&delivery_stats)?
    );
    println!("counts: {:?}", app.scheduler.queue_counts().await);

    app.shutdown().await;
    Ok(())
}
