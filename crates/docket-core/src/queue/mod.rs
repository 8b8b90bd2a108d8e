//! Queue module: retry backoff, the queue port, and the in-memory implementation.

mod memory;
mod retry;

pub use memory::InMemoryJobQueue;
pub use retry::RetryPolicy;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{JobError, JobEvent, JobId, JobRecord};
use crate::observability::QueueCounts;

/// A leased job for processing.
/// The worker owns this lease and must either `complete` or `fail` it.
///
/// Design intent:
/// - Queue manages state transitions (Pending -> Running -> ...).
/// - Worker executes the handler and reports the result.
/// - The returned `JobEvent` is the transition that actually happened; a
///   cancellation requested mid-flight turns either call into `Cancelled`.
#[async_trait]
pub trait JobLease: Send {
    /// Snapshot of the record taken when the lease started.
    fn job(&self) -> &JobRecord;

    async fn complete(self: Box<Self>, value: Value, elapsed: Duration) -> JobEvent;

    /// Mark failure; the queue's decider picks retry or terminal failure.
    async fn fail(self: Box<Self>, error: JobError, elapsed: Duration) -> JobEvent;
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The job was PENDING and is now CANCELLED.
    Cancelled(JobRecord),
    /// The job is RUNNING; it becomes CANCELLED when its attempt returns.
    Requested,
    /// Unknown or already terminal.
    Rejected,
}

impl CancelOutcome {
    pub fn accepted(&self) -> bool {
        !matches!(self, CancelOutcome::Rejected)
    }
}

/// Queue port (interface). Also the job registry: every record stays
/// queryable by id after it leaves the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a new PENDING record, runnable immediately.
    async fn enqueue(&self, job: JobRecord);

    /// Lease the best ready job, waiting until one is available.
    /// Returns `None` once the queue is closed.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn get(&self, job_id: JobId) -> Option<JobRecord>;

    async fn cancel(&self, job_id: JobId) -> CancelOutcome;

    /// FAILED -> PENDING for one manual attempt; `None` unless the job is FAILED.
    async fn retry_failed(&self, job_id: JobId) -> Option<JobRecord>;

    /// Copy of every record, in no particular order.
    async fn snapshot(&self) -> Vec<JobRecord>;

    async fn counts(&self) -> QueueCounts;

    /// Wake all waiting `lease` calls and make them return `None`.
    fn close(&self);
}
