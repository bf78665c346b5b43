//! Reconnection back-off.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnection policy, defaulting to the socket.io client's behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Whether to reconnect after the connection is lost.
    pub enabled: bool,
    /// First delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 applied around the delay.
    pub jitter_factor: f64,
    /// Give up after this many consecutive failed attempts (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter_factor: 0.5,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms_with_random(attempt, rand::random::<f64>()))
    }

    /// Delay in milliseconds with explicit randomness in `[0.0, 1.0)`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_ms_with_random(&self, attempt: u32, random: f64) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
        let capped = exponential.min(self.max_delay_ms);

        // Maps random [0,1) to [-jitter, +jitter]
        let jitter = 1.0 + (random * 2.0 - 1.0) * self.jitter_factor;
        let with_jitter = (capped as f64 * jitter).round().max(0.0) as u64;

        with_jitter.min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_socket_io_client() {
        let cfg = ReconnectConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.base_delay_ms, 1000);
        assert_eq!(cfg.max_delay_ms, 5000);
        assert_eq!(cfg.max_attempts, None);
    }

    #[test]
    fn exponential_without_jitter() {
        let cfg = ReconnectConfig::default();
        // random 0.5 → no jitter
        assert_eq!(cfg.delay_ms_with_random(0, 0.5), 1000);
        assert_eq!(cfg.delay_ms_with_random(1, 0.5), 2000);
        assert_eq!(cfg.delay_ms_with_random(2, 0.5), 4000);
        assert_eq!(cfg.delay_ms_with_random(3, 0.5), 5000);
        assert_eq!(cfg.delay_ms_with_random(40, 0.5), 5000);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_ms_with_random(0, 0.0), 500);
        assert!(cfg.delay_ms_with_random(0, 0.999) <= 1500);
        assert!(cfg.delay_ms_with_random(5, 0.999) <= cfg.max_delay_ms);
    }

    #[test]
    fn attempt_limits() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.allows(10_000));

        let limited = ReconnectConfig {
            max_attempts: Some(2),
            ..ReconnectConfig::default()
        };
        assert!(limited.allows(0));
        assert!(limited.allows(1));
        assert!(!limited.allows(2));

        assert!(!ReconnectConfig::disabled().allows(0));
    }

    #[test]
    fn random_delay_is_bounded() {
        let cfg = ReconnectConfig::default();
        for attempt in 0..6 {
            assert!(cfg.delay(attempt) <= Duration::from_millis(cfg.max_delay_ms));
        }
    }
}
