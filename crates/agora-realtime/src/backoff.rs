// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect delay policies.

use std::time::Duration;

use agora_config::RealtimeConfig;
use rand::Rng;

/// Shortest delay ever returned by [`JitterBackoff`].
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Produces the delay before each reconnect attempt.
pub trait Backoff: Send + Sync {
    fn next_delay(&mut self) -> Duration;

    /// Called once a connection opens.
    fn reset(&mut self);
}

/// `base + uniform(0..=jitter)`, clamped to `[1s, max]`.
#[derive(Debug, Clone)]
pub struct JitterBackoff {
    base: Duration,
    jitter: Duration,
    max: Duration,
    attempts: u32,
}

impl JitterBackoff {
    pub fn new(base: Duration, jitter: Duration, max: Duration) -> Self {
        Self {
            base,
            jitter,
            max,
            attempts: 0,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_jitter_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Consecutive attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Backoff for JitterBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        let delay = self.base + Duration::from_millis(extra);
        delay.min(self.max).max(MIN_RECONNECT_DELAY)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Always the same delay. For tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.0
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let mut backoff = JitterBackoff::from_config(&RealtimeConfig::default());
        for _ in 0..200 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(1200), "{delay:?}");
            assert!(delay <= Duration::from_secs(5), "{delay:?}");
        }
        assert_eq!(backoff.attempts(), 200);
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
    }

    #[test]
    fn cap_and_floor_apply() {
        let mut capped = JitterBackoff::new(
            Duration::from_secs(10),
            Duration::ZERO,
            Duration::from_secs(5),
        );
        assert_eq!(capped.next_delay(), Duration::from_secs(5));

        let mut floored =
            JitterBackoff::new(Duration::from_millis(10), Duration::ZERO, Duration::from_secs(5));
        assert_eq!(floored.next_delay(), MIN_RECONNECT_DELAY);
    }
}
