//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Exponential backoff over a per-job base delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Optional upper clamp for a single delay. `None` keeps the plain formula.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_count` (1-indexed).
    ///
    /// delay = base * multiplier^(retry_count - 1)
    ///
    /// Example with base=60s, multiplier=2.0:
    /// - retry 1: 60s
    /// - retry 2: 120s
    /// - retry 3: 240s
    ///
    /// 表現できない値は `Duration::MAX` に丸める。
    pub fn next_delay(&self, base: Duration, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = if delay_secs.is_finite() {
            Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}
