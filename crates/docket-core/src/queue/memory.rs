//! In-memory queue implementation.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{CancelOutcome, JobLease, JobQueue};
use crate::domain::{
    Decider, Decision, JobError, JobEvent, JobId, JobPriority, JobRecord, JobStatus,
};
use crate::observability::QueueCounts;
use crate::ports::Clock;

/// Ready heap entry. `BinaryHeap` is a max-heap, so "greater" means "runs first":
/// higher priority, then earlier `created_at`, then earlier submission.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyJob {
    priority: JobPriority,
    created_at: DateTime<Utc>,
    seq: u64,
    job_id: JobId,
}

impl PartialOrd for ReadyJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Scheduled retry entry.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    run_at: Instant,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.run_at.cmp(&self.run_at)
    }
}

struct Slot {
    record: JobRecord,
    /// Submission order, kept across retries.
    seq: u64,
}

struct QueueState {
    /// All job records (single source of truth).
    jobs: HashMap<JobId, Slot>,

    /// Runnable now. Entries whose record is no longer PENDING are skipped on pop.
    ready: BinaryHeap<ReadyJob>,

    /// Waiting for a retry backoff to elapse.
    scheduled: BinaryHeap<ScheduledJob>,

    next_seq: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            ready: BinaryHeap::new(),
            scheduled: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn push_ready(&mut self, job_id: JobId) {
        if let Some(slot) = self.jobs.get(&job_id) {
            self.ready.push(ReadyJob {
                priority: slot.record.priority,
                created_at: slot.record.created_at,
                seq: slot.seq,
                job_id,
            });
        }
    }

    /// Move jobs from scheduled to ready if their time has come.
    fn promote_scheduled(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.run_at > now {
                break; // Heap is sorted, so we can stop
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            let pending = self
                .jobs
                .get(&entry.job_id)
                .is_some_and(|slot| slot.record.status == JobStatus::Pending);
            if pending {
                self.push_ready(entry.job_id);
            }
        }
    }

    /// Pop the best PENDING job, discarding stale entries.
    fn pop_ready(&mut self) -> Option<JobId> {
        while let Some(entry) = self.ready.pop() {
            let pending = self
                .jobs
                .get(&entry.job_id)
                .is_some_and(|slot| slot.record.status == JobStatus::Pending);
            if pending {
                return Some(entry.job_id);
            }
        }
        None
    }

    fn has_ready(&self) -> bool {
        self.ready.iter().any(|entry| {
            self.jobs
                .get(&entry.job_id)
                .is_some_and(|slot| slot.record.status == JobStatus::Pending)
        })
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for slot in self.jobs.values() {
            match slot.record.status {
                JobStatus::Pending if slot.record.scheduled_for.is_some() => {
                    counts.retry_scheduled += 1
                }
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
    clock: Arc<dyn Clock>,
    decider: Arc<dyn Decider>,
}

/// In-memory queue implementation.
///
/// One async mutex guards the records and both heaps; it is only held for
/// short bookkeeping sections, never across a handler call.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    shared: Arc<Shared>,
}

impl InMemoryJobQueue {
    pub fn new(clock: Arc<dyn Clock>, decider: Arc<dyn Decider>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                clock,
                decider,
            }),
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: JobRecord) {
        {
            let mut state = self.shared.state.lock().await;
            let seq = state.next_seq;
            state.next_seq += 1;
            let job_id = job.job_id;
            state.jobs.insert(job_id, Slot { record: job, seq });
            state.push_ready(job_id);
        }
        self.shared.notify.notify_one();
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            // Register before inspecting state so a notify between the check
            // and the wait is not lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }

            let next_wake = {
                let mut state = self.shared.state.lock().await;
                state.promote_scheduled(Instant::now());

                if let Some(job_id) = state.pop_ready() {
                    let now = self.shared.clock.now();
                    let more_ready = state.has_ready();
                    let Some(slot) = state.jobs.get_mut(&job_id) else {
                        continue;
                    };
                    slot.record.start_attempt(now);
                    let snapshot = slot.record.clone();
                    drop(state);

                    // Another worker may be idle while jobs are still waiting.
                    if more_ready {
                        self.shared.notify.notify_one();
                    }

                    return Some(Box::new(InMemoryLease {
                        job: snapshot,
                        shared: Arc::clone(&self.shared),
                    }));
                }

                // No ready jobs - check if we have scheduled retries
                state.scheduled.peek().map(|entry| entry.run_at)
            };

            // Wait for notification OR next scheduled retry time
            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = &mut notified => {},
                    _ = tokio::time::sleep_until(wake_time) => {},
                }
            } else {
                notified.await;
            }
        }
    }

    async fn get(&self, job_id: JobId) -> Option<JobRecord> {
        let state = self.shared.state.lock().await;
        state.jobs.get(&job_id).map(|slot| slot.record.clone())
    }

    async fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let mut state = self.shared.state.lock().await;
        let Some(slot) = state.jobs.get_mut(&job_id) else {
            return CancelOutcome::Rejected;
        };
        match slot.record.status {
            JobStatus::Pending => {
                // The heap entry stays behind and is skipped when popped.
                slot.record.cancel_pending();
                CancelOutcome::Cancelled(slot.record.clone())
            }
            JobStatus::Running => {
                slot.record.request_cancel();
                CancelOutcome::Requested
            }
            _ => CancelOutcome::Rejected,
        }
    }

    async fn retry_failed(&self, job_id: JobId) -> Option<JobRecord> {
        let record = {
            let mut state = self.shared.state.lock().await;
            let slot = state.jobs.get_mut(&job_id)?;
            if slot.record.status != JobStatus::Failed {
                return None;
            }
            slot.record.reset_for_manual_retry();
            let record = slot.record.clone();
            state.push_ready(job_id);
            record
        };
        self.shared.notify.notify_one();
        Some(record)
    }

    async fn snapshot(&self) -> Vec<JobRecord> {
        let state = self.shared.state.lock().await;
        state.jobs.values().map(|slot| slot.record.clone()).collect()
    }

    async fn counts(&self) -> QueueCounts {
        let state = self.shared.state.lock().await;
        state.counts()
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

/// Lease implementation for InMemoryJobQueue.
struct InMemoryLease {
    job: JobRecord,
    shared: Arc<Shared>,
}

impl InMemoryLease {
    /// Apply `transition` to the live record and return the resulting event.
    /// A cancellation requested mid-flight wins over any outcome.
    async fn finish<F>(self, elapsed: Duration, transition: F) -> JobEvent
    where
        F: FnOnce(&mut JobRecord, DateTime<Utc>, &Shared) -> Transition,
    {
        let (event, notify) = {
            let mut state = self.shared.state.lock().await;
            let now = self.shared.clock.now();
            let Some(slot) = state.jobs.get_mut(&self.job.job_id) else {
                return JobEvent::Failed(self.job);
            };

            if slot.record.cancel_requested {
                slot.record.finish_cancelled(now, elapsed);
                (JobEvent::Cancelled(slot.record.clone()), None)
            } else {
                match transition(&mut slot.record, now, &self.shared) {
                    Transition::Completed => (JobEvent::Completed(slot.record.clone()), None),
                    Transition::Failed => (JobEvent::Failed(slot.record.clone()), None),
                    Transition::Retry { delay, error } => {
                        let event = JobEvent::RetryScheduled {
                            job: slot.record.clone(),
                            error,
                        };
                        state.scheduled.push(ScheduledJob {
                            run_at: run_at_after(delay),
                            job_id: self.job.job_id,
                        });
                        (event, Some(()))
                    }
                }
            }
        }; // Lock released here

        // A waiting worker must recompute its wake-up time.
        if notify.is_some() {
            self.shared.notify.notify_one();
        }
        event
    }
}

/// 表現できないほど遠い予定は約 30 年後に丸める
fn run_at_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(30 * 365 * 24 * 60 * 60))
}

enum Transition {
    Completed,
    Failed,
    Retry { delay: Duration, error: JobError },
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &JobRecord {
        &self.job
    }

    async fn complete(self: Box<Self>, value: Value, elapsed: Duration) -> JobEvent {
        (*self)
            .finish(elapsed, move |record, now, _| {
                record.mark_completed(now, value, elapsed);
                Transition::Completed
            })
            .await
    }

    async fn fail(self: Box<Self>, error: JobError, elapsed: Duration) -> JobEvent {
        (*self)
            .finish(elapsed, move |record, now, shared| {
                match shared.decider.decide(record, &error) {
                    Decision::Retry { delay, reason } => {
                        tracing::debug!(job_id = %record.job_id, %reason, "retry decided");
                        let next_run_at = chrono::Duration::from_std(delay)
                            .ok()
                            .and_then(|delay| now.checked_add_signed(delay))
                            .unwrap_or(DateTime::<Utc>::MAX_UTC);
                        record.schedule_retry(next_run_at, error.clone());
                        Transition::Retry { delay, error }
                    }
                    Decision::Fail { reason } => {
                        tracing::debug!(job_id = %record.job_id, %reason, "failure decided");
                        record.mark_failed(now, error, elapsed);
                        Transition::Failed
                    }
                }
            })
            .await
    }
}
