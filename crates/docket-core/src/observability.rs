//! Observability - queue gauges and log setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Point-in-time count of jobs per state.
///
/// `pending` counts jobs runnable now; `retry_scheduled` counts PENDING jobs
/// still waiting out a retry delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub retry_scheduled: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending
            + self.retry_scheduled
            + self.running
            + self.completed
            + self.failed
            + self.cancelled
    }
}

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Calling it again is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
