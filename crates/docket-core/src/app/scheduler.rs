//! JobScheduler - ジョブ投入・照会・取消の表面
//!
//! 検証（task_name と数値の範囲）はここで同期的に行い、不正な投入は
//! キューに入りません。状態遷移そのものは queue と worker が担当します。

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{JobEvent, JobId, JobRecord, JobRequest, JobStatistics};
use crate::error::ValidationError;
use crate::observability::QueueCounts;
use crate::ports::{Clock, EventSink, IdGenerator};
use crate::queue::{CancelOutcome, JobQueue};
use crate::typed::HandlerRegistry;

pub struct JobScheduler {
    queue: Arc<dyn JobQueue>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

impl JobScheduler {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            queue,
            registry,
            clock,
            ids,
            events,
        }
    }

    /// Validate `request` and build its PENDING record without enqueueing it.
    pub(crate) fn prepare(&self, request: JobRequest) -> Result<JobRecord, ValidationError> {
        let task_name = self
            .registry
            .resolve(&request.task_name)
            .ok_or_else(|| ValidationError::UnknownTask(request.task_name.clone()))?;
        request.validate()?;
        Ok(JobRecord::new(
            self.ids.generate_job_id(),
            task_name,
            request,
            self.clock.now(),
        ))
    }

    pub(crate) async fn enqueue(&self, job: JobRecord) -> JobId {
        let job_id = job.job_id;
        info!(
            %job_id,
            task_name = %job.task_name,
            priority = job.priority.as_str(),
            "job submitted"
        );
        self.queue.enqueue(job).await;
        job_id
    }

    /// Validate and enqueue; returns as soon as the job is PENDING.
    pub async fn submit_job(&self, request: JobRequest) -> Result<JobId, ValidationError> {
        let job = self.prepare(request)?;
        Ok(self.enqueue(job).await)
    }

    pub async fn get_job_status(&self, job_id: JobId) -> Option<JobRecord> {
        self.queue.get(job_id).await
    }

    /// `true` for PENDING (cancelled now) and RUNNING (cancelled when the
    /// attempt returns); `false` for terminal or unknown jobs.
    pub async fn cancel_job(&self, job_id: JobId) -> bool {
        match self.queue.cancel(job_id).await {
            CancelOutcome::Cancelled(job) => {
                info!(%job_id, task_name = %job.task_name, "pending job cancelled");
                self.events.emit(&JobEvent::Cancelled(job)).await;
                true
            }
            CancelOutcome::Requested => {
                info!(%job_id, "cancellation requested for running job");
                true
            }
            CancelOutcome::Rejected => {
                debug!(%job_id, "cancel rejected");
                false
            }
        }
    }

    /// Re-run a FAILED job once, immediately.
    pub async fn retry_job(&self, job_id: JobId) -> bool {
        match self.queue.retry_failed(job_id).await {
            Some(job) => {
                info!(%job_id, retry_count = job.retry_count, "manual retry enqueued");
                self.events.emit(&JobEvent::Requeued(job)).await;
                true
            }
            None => false,
        }
    }

    pub async fn get_job_statistics(&self, hours: u32) -> JobStatistics {
        let records = self.queue.snapshot().await;
        JobStatistics::compute(&records, self.clock.now(), hours)
    }

    pub async fn queue_counts(&self) -> QueueCounts {
        self.queue.counts().await
    }

    pub fn registered_tasks(&self) -> Vec<String> {
        self.registry.registered_names()
    }
}
