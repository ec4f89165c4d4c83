//! Dispatch configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded-retry policy for a single quorum slot whose send fails
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum send attempts per replica before falling back to a
    /// replacement (1 = no retry).
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier applied per attempt (e.g. 2.0 for doubling).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff delay before `attempt_number` (1-based).
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exp = attempt_number.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis((delay_ms as u64).min(self.max_delay_ms))
    }
}

/// Configuration of the quorum dispatch engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Retry policy for immediate send failures on the add path.
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 2,
            max_delay_ms: 60,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(4));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(8));
        assert_eq!(config.backoff_delay(10), Duration::from_millis(60));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = DispatchConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: DispatchConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.retry.max_attempts, config.retry.max_attempts);
        assert_eq!(back.retry.base_delay_ms, config.retry.base_delay_ms);
    }
}
