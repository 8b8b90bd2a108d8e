//! Events - ジョブの状態遷移イベント
//!
//! Worker と scheduler が発行し、EventSink（DeliveryTracker など）が購読します。
//! 各イベントは遷移直後の JobRecord のスナップショットを持ちます。

use super::errors::JobError;
use super::job::JobRecord;

#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The handler returned successfully.
    Completed(JobRecord),

    /// The attempt failed and the job went back to PENDING with a not-before time.
    RetryScheduled { job: JobRecord, error: JobError },

    /// The attempt failed with no retries left.
    Failed(JobRecord),

    /// The job was cancelled (while pending, or after its attempt returned).
    Cancelled(JobRecord),

    /// A FAILED job was manually put back to PENDING.
    Requeued(JobRecord),
}

impl JobEvent {
    pub fn job(&self) -> &JobRecord {
        match self {
            JobEvent::Completed(job)
            | JobEvent::Failed(job)
            | JobEvent::Cancelled(job)
            | JobEvent::Requeued(job)
            | JobEvent::RetryScheduled { job, .. } => job,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Completed(_) => "completed",
            JobEvent::RetryScheduled { .. } => "retry_scheduled",
            JobEvent::Failed(_) => "failed",
            JobEvent::Cancelled(_) => "cancelled",
            JobEvent::Requeued(_) => "requeued",
        }
    }
}
