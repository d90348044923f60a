//! Transport-level retry policy for Feishu API calls.
//!
//! This retry is nested inside a single wake-up and is orthogonal to the
//! app-level escalation backoff: it smooths over transient network failures,
//! while the escalation chain's own schedule handles everything else.

use std::time::Duration;

use lark_common::config::AppConfig;

/// Retry count plus a linearly increasing delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Additional delay added per subsequent retry.
    pub increase: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        let base = Duration::from_millis(config.request_retry_delay_ms);
        Self {
            retries: config.request_retry_times,
            delay: base,
            increase: base,
        }
    }

    /// Delay preceding the given retry attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay + self.increase * attempt.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_increases_linearly() {
        let policy = RetryPolicy {
            retries: 3,
            delay: Duration::from_millis(1000),
            increase: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }
}
