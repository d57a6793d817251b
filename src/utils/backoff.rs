//! Exponential backoff for idle worker polling and job retries

use std::time::Duration;

use super::jitter::with_jitter;
use crate::config::WorkerConfig;

/// Exponential poll backoff: grows on every empty poll, resets on a claim
#[derive(Debug, Clone)]
pub struct PollBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter_percent: u8,
    current: Duration,
}

impl PollBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter_percent: u8) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            jitter_percent,
            current: initial,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.poll_interval,
            config.max_poll_interval,
            config.backoff_multiplier,
            config.jitter_percent,
        )
    }

    /// Delay to sleep now; advances the backoff for the next call
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = scale(self.current, self.multiplier).min(self.max);
        with_jitter(delay, self.jitter_percent)
    }

    /// Back to the initial interval, called after a successful claim
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The un-jittered delay the next call will be based on
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
pub fn retry_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    base.saturating_mul(1u32 << exponent).min(cap)
}

fn scale(duration: Duration, multiplier: f64) -> Duration {
    let nanos = (duration.as_nanos() as f64 * multiplier).round();
    if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
