//! Windowed statistics over job and delivery records.
//!
//! Computed from snapshots, so a job finishing mid-query may be counted in
//! either bucket. Records missing timestamps are skipped rather than failing.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EndpointId;
use super::job::{JobRecord, JobStatus};
use super::webhook::{DeliveryStatus, WebhookDelivery, WebhookEndpoint};

/// Lower edge of a window ending at `now`. Records created exactly at the
/// edge are inside. Windows reaching past chrono's range start at its minimum.
pub fn window_start(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    Duration::try_hours(i64::from(hours))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub window_hours: u32,
    pub total_jobs: usize,
    /// COMPLETED / terminal jobs in the window, in percent.
    pub success_rate: f64,
    pub by_status: BTreeMap<String, usize>,
    pub by_task: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Mean `completed_at - started_at` over COMPLETED jobs, in seconds.
    pub average_execution_time_secs: Option<f64>,
    /// PENDING jobs right now, regardless of window.
    pub queue_length: usize,
    /// RUNNING jobs right now, regardless of window.
    pub running_jobs: usize,
}

impl JobStatistics {
    pub fn compute(records: &[JobRecord], now: DateTime<Utc>, hours: u32) -> Self {
        let since = window_start(now, hours);
        let mut stats = JobStatistics {
            window_hours: hours,
            ..Default::default()
        };

        let mut terminal = 0usize;
        let mut completed = 0usize;
        let mut durations = Vec::new();

        for record in records {
            match record.status {
                JobStatus::Pending => stats.queue_length += 1,
                JobStatus::Running => stats.running_jobs += 1,
                _ => {}
            }

            if record.created_at < since {
                continue;
            }

            stats.total_jobs += 1;
            *stats
                .by_status
                .entry(record.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_task
                .entry(record.task_name.to_string())
                .or_default() += 1;
            *stats
                .by_priority
                .entry(record.priority.as_str().to_string())
                .or_default() += 1;

            if record.status.is_terminal() {
                terminal += 1;
            }
            if record.status == JobStatus::Completed {
                completed += 1;
                if let Some(elapsed) = record.execution_time() {
                    durations.push(elapsed.num_milliseconds() as f64 / 1000.0);
                }
            }
        }

        stats.success_rate = percent(completed, terminal);
        if !durations.is_empty() {
            stats.average_execution_time_secs =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatistics {
    pub window_hours: u32,
    pub total_deliveries: usize,
    /// DELIVERED / (DELIVERED + FAILED), in percent.
    pub success_rate: f64,
    pub by_status: BTreeMap<String, usize>,
    pub by_event: BTreeMap<String, usize>,
    pub by_endpoint: BTreeMap<String, usize>,
    pub average_retries: f64,
    pub total_endpoints: usize,
    pub active_endpoints: usize,
}

impl DeliveryStatistics {
    pub fn compute(
        deliveries: &[WebhookDelivery],
        endpoints: &[WebhookEndpoint],
        endpoint_id: Option<EndpointId>,
        now: DateTime<Utc>,
        hours: u32,
    ) -> Self {
        let since = window_start(now, hours);
        let mut stats = DeliveryStatistics {
            window_hours: hours,
            total_endpoints: endpoints.len(),
            active_endpoints: endpoints.iter().filter(|e| e.active).count(),
            ..Default::default()
        };

        let mut delivered = 0usize;
        let mut failed = 0usize;
        let mut retries = 0u64;

        let in_scope = deliveries.iter().filter(|d| {
            d.created_at >= since && endpoint_id.is_none_or(|id| d.endpoint_id == id)
        });
        for delivery in in_scope {
            stats.total_deliveries += 1;
            retries += u64::from(delivery.retry_count);
            match delivery.status {
                DeliveryStatus::Delivered => delivered += 1,
                DeliveryStatus::Failed => failed += 1,
                DeliveryStatus::Pending => {}
            }
            *stats
                .by_status
                .entry(delivery.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_event
                .entry(delivery.event_type.to_string())
                .or_default() += 1;
            *stats
                .by_endpoint
                .entry(delivery.endpoint_id.to_string())
                .or_default() += 1;
        }

        stats.success_rate = percent(delivered, delivered + failed);
        if stats.total_deliveries > 0 {
            stats.average_retries = retries as f64 / stats.total_deliveries as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{DeliveryId, EventId, JobId};
    use crate::domain::job::JobRequest;
    use crate::domain::task::TaskName;
    use crate::domain::webhook::{EventType, WebhookEnvelope};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn job(created_at: DateTime<Utc>, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            TaskName::parse("document_analysis").unwrap(),
            JobRequest::new("document_analysis"),
            created_at,
        );
        record.status = status;
        record
    }

    #[test]
    fn window_lower_edge_is_inclusive() {
        let records = vec![
            job(now() - Duration::hours(24), JobStatus::Completed),
            job(now() - Duration::hours(24) - Duration::seconds(1), JobStatus::Completed),
        ];

        let stats = JobStatistics::compute(&records, now(), 24);
        assert_eq!(stats.total_jobs, 1);
    }

    #[test]
    fn queue_length_and_running_ignore_the_window() {
        let records = vec![
            job(now() - Duration::hours(100), JobStatus::Pending),
            job(now() - Duration::hours(100), JobStatus::Running),
            job(now(), JobStatus::Pending),
        ];

        let stats = JobStatistics::compute(&records, now(), 1);
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.queue_length, 2);
        assert_eq!(stats.running_jobs, 1);
    }

    #[test]
    fn success_rate_counts_only_terminal_jobs() {
        let mut done = job(now(), JobStatus::Completed);
        done.started_at = Some(now() - Duration::seconds(4));
        done.completed_at = Some(now());
        let records = vec![
            done,
            job(now(), JobStatus::Failed),
            job(now(), JobStatus::Cancelled),
            job(now(), JobStatus::Running),
        ];

        let stats = JobStatistics::compute(&records, now(), 24);
        assert!((stats.success_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.by_status["completed"], 1);
        assert_eq!(stats.by_task["document_analysis"], 4);
        assert_eq!(stats.by_priority["normal"], 4);
        assert_eq!(stats.average_execution_time_secs, Some(4.0));
    }

    #[test]
    fn completed_job_without_timestamps_is_tolerated() {
        let records = vec![job(now(), JobStatus::Completed)];
        let stats = JobStatistics::compute(&records, now(), 24);
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.average_execution_time_secs, None);
    }

    #[test]
    fn empty_registry_yields_zeroes() {
        let stats = JobStatistics::compute(&[], now(), 24);
        assert_eq!(stats.total_jobs, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    fn delivery(endpoint_id: EndpointId, status: DeliveryStatus, retries: u32) -> WebhookDelivery {
        let envelope = WebhookEnvelope {
            id: EventId::from_ulid(Ulid::new()),
            event: EventType::parse("case.created").unwrap(),
            timestamp: now(),
            data: serde_json::json!({}),
        };
        let mut d = WebhookDelivery::pending(
            DeliveryId::from_ulid(Ulid::new()),
            endpoint_id,
            JobId::from_ulid(Ulid::new()),
            envelope,
            now(),
        );
        d.status = status;
        d.retry_count = retries;
        d
    }

    #[test]
    fn delivery_statistics_filter_by_endpoint() {
        let a = EndpointId::from_ulid(Ulid::new());
        let b = EndpointId::from_ulid(Ulid::new());
        let deliveries = vec![
            delivery(a, DeliveryStatus::Delivered, 0),
            delivery(a, DeliveryStatus::Failed, 3),
            delivery(a, DeliveryStatus::Pending, 1),
            delivery(b, DeliveryStatus::Delivered, 0),
        ];

        let stats = DeliveryStatistics::compute(&deliveries, &[], Some(a), now(), 24);
        assert_eq!(stats.total_deliveries, 3);
        assert_eq!(stats.success_rate, 50.0);
        assert!((stats.average_retries - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.by_event["case.created"], 3);
        assert_eq!(stats.by_endpoint.len(), 1);

        let all = DeliveryStatistics::compute(&deliveries, &[], None, now(), 24);
        assert_eq!(all.total_deliveries, 4);
        assert_eq!(all.by_endpoint.len(), 2);
    }

    #[test]
    fn oversized_windows_cover_everything() {
        let ancient = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(window_start(now(), u32::MAX), DateTime::<Utc>::MIN_UTC);

        let stats = JobStatistics::compute(&[job(ancient, JobStatus::Completed)], now(), u32::MAX);
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.window_hours, u32::MAX);

        let mut old = delivery(EndpointId::from_ulid(Ulid::new()), DeliveryStatus::Delivered, 0);
        old.created_at = ancient;
        let stats = DeliveryStatistics::compute(&[old], &[], None, now(), u32::MAX);
        assert_eq!(stats.total_deliveries, 1);
    }
}
