//! Decision model: what happens to a job after a failed attempt.

use std::time::Duration;

use super::errors::JobError;
use super::job::JobRecord;
use crate::queue::RetryPolicy;

/// The next action to take for a failed job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Re-enqueue after `delay`.
    Retry { delay: Duration, reason: String },

    /// Give up: terminal FAILED.
    Fail { reason: String },
}

/// Trait for deciding the next action based on job state and the attempt error.
///
/// Deciders are pure functions: no side effects, no state mutation. Applying
/// the decision (bumping `retry_count`, scheduling) is the queue's job.
pub trait Decider: Send + Sync {
    /// `job` is the record as it was while the failed attempt ran.
    fn decide(&self, job: &JobRecord, error: &JobError) -> Decision;
}

/// Retry while `retry_count < max_retries`, with exponential backoff over the
/// job's `retry_delay_seconds`.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, job: &JobRecord, error: &JobError) -> Decision {
        if job.retry_count >= job.max_retries {
            Decision::Fail {
                reason: format!(
                    "max retries reached ({}/{}): {}",
                    job.retry_count, job.max_retries, error.message
                ),
            }
        } else {
            let next_retry = job.retry_count + 1;
            let delay = self
                .retry_policy
                .next_delay(Duration::from_secs(job.retry_delay_seconds), next_retry);
            Decision::Retry {
                delay,
                reason: format!(
                    "retry {}/{} after {:?}: {}",
                    next_retry, job.max_retries, delay, error.message
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::JobId;
    use crate::domain::job::JobRequest;
    use crate::domain::task::TaskName;
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    fn job(max_retries: u32, retry_count: u32) -> JobRecord {
        let mut record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            TaskName::parse("document_analysis").unwrap(),
            JobRequest::new("document_analysis")
                .with_max_retries(max_retries)
                .with_retry_delay_seconds(1),
            Utc::now(),
        );
        record.retry_count = retry_count;
        record
    }

    #[rstest]
    #[case::first_failure(2, 0, Some(1))]
    #[case::second_failure(2, 1, Some(2))]
    #[case::budget_exhausted(2, 2, None)]
    #[case::no_retries(0, 0, None)]
    #[case::after_manual_retry(2, 3, None)]
    fn decide_follows_retry_budget(
        #[case] max_retries: u32,
        #[case] retry_count: u32,
        #[case] expected_delay_secs: Option<u64>,
    ) {
        let decider = DefaultDecider::default();
        let decision = decider.decide(&job(max_retries, retry_count), &JobError::handler("boom"));

        match (decision, expected_delay_secs) {
            (Decision::Retry { delay, .. }, Some(secs)) => {
                assert_eq!(delay, Duration::from_secs(secs))
            }
            (Decision::Fail { reason }, None) => assert!(reason.contains("boom")),
            (other, expected) => panic!("unexpected {other:?} for {expected:?}"),
        }
    }

    #[test]
    fn timeouts_are_retried_like_handler_errors() {
        let decider = DefaultDecider::default();
        let decision = decider.decide(&job(1, 0), &JobError::timeout(10));
        assert!(matches!(decision, Decision::Retry { .. }));
    }

    #[test]
    fn late_retries_of_hourly_jobs_exceed_a_day() {
        let mut record = job(10, 5);
        record.retry_delay_seconds = 3600;
        let decision = DefaultDecider::default().decide(&record, &JobError::handler("boom"));
        assert!(matches!(
            decision,
            Decision::Retry { delay, .. } if delay == Duration::from_secs(115_200)
        ));
    }
}
