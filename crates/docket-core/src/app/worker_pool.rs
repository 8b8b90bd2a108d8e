use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{HandlerResult, JobError, JobEvent, JobRecord};
use crate::ports::EventSink;
use crate::queue::JobQueue;
use crate::typed::{HandlerRegistry, JobCall};

/// Worker pool handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn JobQueue>,
        registry: Arc<HandlerRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                registry: Arc::clone(&registry),
                events: Arc::clone(&events),
            };
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker.run(&mut rx).await;
            });
            joins.push(join);
        }
        info!(workers = n, "worker pool started");

        Self { shutdown_tx, joins }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    /// Request shutdown for all workers.
    /// In-flight handlers are not cancelled; workers just stop taking new leases.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    registry: Arc<HandlerRegistry>,
    events: Arc<dyn EventSink>,
}

impl Worker {
    async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        loop {
            // shutdown が来ていたら抜ける
            if *shutdown_rx.borrow() {
                break;
            }

            // lease は「待つ」可能性があるので select で shutdown と競合させる
            let lease = tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender が drop されたら終了、変更なら次のループで判定
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                lease = self.queue.lease() => lease,
            };

            // Queue が閉じられた
            let Some(lease) = lease else {
                break;
            };

            // ここから先は handler 実行（await がある）
            // Queue 内部ロックは lease() の中で完結している（ロック跨ぎ await しない）
            let job = lease.job().clone();
            debug!(
                worker = self.id,
                job_id = %job.job_id,
                task_name = %job.task_name,
                retry_count = job.retry_count,
                "job leased"
            );

            let started = Instant::now();
            let outcome = self.execute(&job).await;
            let elapsed = started.elapsed();

            let event = match outcome {
                Ok(value) => lease.complete(value, elapsed).await,
                Err(err) => lease.fail(err, elapsed).await,
            };
            self.log_event(&event, elapsed);
            self.events.emit(&event).await;
        }
        debug!(worker = self.id, "worker stopped");
    }

    /// Run the handler in its own task, racing the job timeout.
    /// A timed-out task is detached; its eventual result is ignored.
    async fn execute(&self, job: &JobRecord) -> HandlerResult {
        let Some(handler) = self.registry.get(job.task_name.as_str()) else {
            return Err(JobError::handler(format!(
                "no handler registered for task_name={}",
                job.task_name
            )));
        };

        let call = JobCall::from_record(job);
        let handle = tokio::spawn(async move { handler.handle_dyn(call).await });

        match tokio::time::timeout(job.timeout(), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(join_failure(join_err)),
            Err(_) => Err(JobError::timeout(job.timeout_seconds)),
        }
    }

    fn log_event(&self, event: &JobEvent, elapsed: Duration) {
        let job = event.job();
        let elapsed_ms = elapsed.as_millis() as u64;
        match event {
            JobEvent::Completed(_) => info!(
                worker = self.id,
                job_id = %job.job_id,
                task_name = %job.task_name,
                elapsed_ms,
                "job completed"
            ),
            JobEvent::RetryScheduled { error, .. } => warn!(
                worker = self.id,
                job_id = %job.job_id,
                task_name = %job.task_name,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                error = %error,
                "job attempt failed, retry scheduled"
            ),
            JobEvent::Failed(_) => error!(
                worker = self.id,
                job_id = %job.job_id,
                task_name = %job.task_name,
                retry_count = job.retry_count,
                error = job.result.as_ref().and_then(|r| r.error.as_deref()).unwrap_or_default(),
                "job failed"
            ),
            JobEvent::Cancelled(_) => info!(
                worker = self.id,
                job_id = %job.job_id,
                task_name = %job.task_name,
                "job cancelled after its attempt returned"
            ),
            JobEvent::Requeued(_) => debug!(
                worker = self.id,
                job_id = %job.job_id,
                "job requeued"
            ),
        }
    }
}

fn join_failure(err: JoinError) -> JobError {
    if err.is_panic() {
        JobError::handler(format!("handler panicked: {}", panic_message(err.into_panic())))
    } else {
        JobError::handler(format!("handler task aborted: {err}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
