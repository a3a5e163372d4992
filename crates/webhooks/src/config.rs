//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry behaviour for a single subscription's deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub backoff_ms: u64,
    /// Per-attempt growth factor applied to the base delay.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Delay before retrying after the failed zero-based `attempt_index`:
    /// `backoff_ms * multiplier^attempt_index`.
    pub fn delay_after(&self, attempt_index: u32) -> Duration {
        let millis = self.backoff_ms as f64 * self.backoff_multiplier.powi(attempt_index as i32);
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Tunables for the webhook dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Retry policy applied when a subscription registers without one.
    pub default_retry: RetryPolicy,
    /// Delivery records retained per subscription, oldest evicted first.
    pub history_limit: usize,
    /// Maximum simultaneous in-flight deliveries during fan-out.
    pub max_in_flight: usize,
    /// Deadline for a single delivery attempt. Elapsing counts as a
    /// transport failure; retry timing is unaffected.
    pub attempt_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicy::default(),
            history_limit: 100,
            max_in_flight: 16,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Recognised: `HOOKRELAY_HISTORY_LIMIT`, `HOOKRELAY_MAX_IN_FLIGHT`,
    /// `HOOKRELAY_ATTEMPT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(limit) = read_env_usize("HOOKRELAY_HISTORY_LIMIT") {
            config.history_limit = limit;
        }
        if let Some(max) = read_env_usize("HOOKRELAY_MAX_IN_FLIGHT") {
            config.max_in_flight = max.max(1);
        }
        if let Some(secs) = read_env_usize("HOOKRELAY_ATTEMPT_TIMEOUT_SECS") {
            config.attempt_timeout = Duration::from_secs(secs as u64);
        }

        config
    }
}

fn read_env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable env var");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_ms, 1000);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn delay_grows_by_multiplier() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(0), Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }
}
