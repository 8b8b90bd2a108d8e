//! Job record and status management.

use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ErrorKind, JobError};
use super::ids::JobId;
use super::task::TaskName;
use crate::error::ValidationError;

pub const MAX_RETRIES_RANGE: RangeInclusive<u32> = 0..=10;
pub const RETRY_DELAY_RANGE: RangeInclusive<u64> = 1..=3600;
pub const TIMEOUT_RANGE: RangeInclusive<u64> = 10..=7200;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Queue priority band. Declaration order is the ordering: `Low < Normal < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl JobPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
        }
    }
}

/// Job status.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Pending (retry scheduled, until max_retries)
/// - Pending -> Running -> Failed (no retries left)
/// - Pending -> Cancelled, Running -> Cancelled (after the attempt returns)
/// - Failed -> Pending (manual retry only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `Failed` is only ever stored once retries are exhausted, so it is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Final outcome of a job, set once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub execution_time_secs: f64,
    pub retry_count: u32,
}

/// Submission request for one job.
///
/// Bounds are checked by [`JobRequest::validate`]; the task name is checked
/// against the handler registry by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub task_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECONDS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl JobRequest {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            priority: JobPriority::Normal,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            metadata: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Check the numeric bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("max_retries", self.max_retries.into(), &widen(&MAX_RETRIES_RANGE))?;
        check_range(
            "retry_delay_seconds",
            self.retry_delay_seconds,
            &RETRY_DELAY_RANGE,
        )?;
        check_range("timeout_seconds", self.timeout_seconds, &TIMEOUT_RANGE)?;
        Ok(())
    }
}

fn widen(range: &RangeInclusive<u32>) -> RangeInclusive<u64> {
    u64::from(*range.start())..=u64::from(*range.end())
}

pub(crate) fn check_range(
    field: &'static str,
    value: u64,
    range: &RangeInclusive<u64>,
) -> Result<(), ValidationError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfBounds {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Job record: the single source of truth for one job.
///
/// State transitions go through methods, never direct field writes, so the
/// invariants (`retry_count` bounds, `completed_at` only after a run) hold in
/// one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub task_name: TaskName,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub metadata: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Not-before time of a scheduled retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Cancellation was requested while the job was running.
    #[serde(default)]
    pub cancel_requested: bool,

    /// Error of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,

    pub result: Option<JobResult>,
}

impl JobRecord {
    pub fn new(
        job_id: JobId,
        task_name: TaskName,
        request: JobRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            task_name,
            args: request.args,
            kwargs: request.kwargs,
            priority: request.priority,
            status: JobStatus::Pending,
            max_retries: request.max_retries,
            retry_delay_seconds: request.retry_delay_seconds,
            timeout_seconds: request.timeout_seconds,
            retry_count: 0,
            metadata: request.metadata,
            created_at,
            started_at: None,
            completed_at: None,
            scheduled_for: None,
            cancel_requested: false,
            last_error: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Duration of the last attempt, when it ran to an end.
    pub fn execution_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) if completed >= started => Some(completed - started),
            _ => None,
        }
    }

    /// Pending -> Running.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.scheduled_for = None;
    }

    /// Running -> Completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>, value: Value, elapsed: Duration) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(JobResult {
            success: true,
            value: Some(value),
            error: None,
            error_kind: None,
            execution_time_secs: elapsed.as_secs_f64(),
            retry_count: self.retry_count,
        });
    }

    /// Running -> Pending with a not-before time.
    pub fn schedule_retry(&mut self, next_run_at: DateTime<Utc>, error: JobError) {
        self.status = JobStatus::Pending;
        self.retry_count += 1;
        self.scheduled_for = Some(next_run_at);
        self.last_error = Some(error);
    }

    /// Running -> Failed (no retries left).
    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: JobError, elapsed: Duration) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.result = Some(JobResult {
            success: false,
            value: None,
            error: Some(error.message.clone()),
            error_kind: Some(error.kind),
            execution_time_secs: elapsed.as_secs_f64(),
            retry_count: self.retry_count,
        });
        self.last_error = Some(error);
    }

    /// Pending -> Cancelled. The job never ran, so `completed_at` stays empty.
    pub fn cancel_pending(&mut self) {
        self.status = JobStatus::Cancelled;
        self.scheduled_for = None;
        self.result = Some(cancelled_result(0.0, self.retry_count));
    }

    /// Flag a running job; the worker discards its result when the attempt ends.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Running -> Cancelled once the in-flight attempt has returned.
    pub fn finish_cancelled(&mut self, now: DateTime<Utc>, elapsed: Duration) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        self.result = Some(cancelled_result(elapsed.as_secs_f64(), self.retry_count));
    }

    /// Failed -> Pending for one manual attempt beyond the automatic budget.
    pub fn reset_for_manual_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.retry_count += 1;
        self.scheduled_for = None;
        self.completed_at = None;
        self.result = None;
        self.cancel_requested = false;
    }
}

fn cancelled_result(execution_time_secs: f64, retry_count: u32) -> JobResult {
    JobResult {
        success: false,
        value: None,
        error: Some("job cancelled".to_string()),
        error_kind: None,
        execution_time_secs,
        retry_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn record(request: JobRequest) -> JobRecord {
        JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            TaskName::parse(request.task_name.clone()).unwrap(),
            request,
            Utc::now(),
        )
    }

    #[test]
    fn new_job_starts_pending_with_defaults() {
        let job = record(JobRequest::new("document_analysis"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retry_delay_seconds, 60);
        assert_eq!(job.timeout_seconds, 300);
        assert_eq!(job.retry_count, 0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(JobPriority::Low < JobPriority::Normal);
        assert!(JobPriority::Normal < JobPriority::High);
    }

    #[rstest]
    #[case::retries_too_high(JobRequest::new("x").with_max_retries(11), "max_retries")]
    #[case::delay_zero(JobRequest::new("x").with_retry_delay_seconds(0), "retry_delay_seconds")]
    #[case::delay_too_high(JobRequest::new("x").with_retry_delay_seconds(3601), "retry_delay_seconds")]
    #[case::timeout_too_low(JobRequest::new("x").with_timeout_seconds(9), "timeout_seconds")]
    #[case::timeout_too_high(JobRequest::new("x").with_timeout_seconds(7201), "timeout_seconds")]
    fn out_of_bound_requests_are_rejected(#[case] request: JobRequest, #[case] expected: &str) {
        match request.validate() {
            Err(ValidationError::OutOfBounds { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn boundary_values_are_accepted() {
        let request = JobRequest::new("x")
            .with_max_retries(0)
            .with_retry_delay_seconds(3600)
            .with_timeout_seconds(10);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn completed_job_has_success_result_and_no_error() {
        let mut job = record(JobRequest::new("export_generation"));
        job.start_attempt(Utc::now());
        job.mark_completed(Utc::now(), serde_json::json!({"ok": true}), Duration::from_millis(5));

        let result = job.result.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn failed_job_keeps_error_and_retry_count() {
        let mut job = record(JobRequest::new("export_generation").with_max_retries(1));
        job.start_attempt(Utc::now());
        job.schedule_retry(Utc::now(), JobError::handler("boom"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);

        job.start_attempt(Utc::now());
        job.mark_failed(Utc::now(), JobError::handler("boom again"), Duration::ZERO);

        let result = job.result.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom again"));
        assert_eq!(result.retry_count, 1);
    }

    #[test]
    fn cancelling_pending_job_leaves_completed_at_empty() {
        let mut job = record(JobRequest::new("data_cleanup"));
        job.cancel_pending();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn manual_retry_grants_one_extra_attempt() {
        let mut job = record(JobRequest::new("data_cleanup").with_max_retries(0));
        job.start_attempt(Utc::now());
        job.mark_failed(Utc::now(), JobError::handler("nope"), Duration::ZERO);

        job.reset_for_manual_retry();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.result.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: JobRequest =
            serde_json::from_str(r#"{ "task_name": "backup_creation" }"#).unwrap();
        assert_eq!(request.max_retries, 3);
        assert_eq!(request.retry_delay_seconds, 60);
        assert_eq!(request.timeout_seconds, 300);
        assert_eq!(request.priority, JobPriority::Normal);
    }
}
