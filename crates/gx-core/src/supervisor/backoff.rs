//! Exponential backoff for start confirmation polling

use std::time::Duration;

use crate::config::BackoffConfig;

/// Exponential backoff with optional jitter and a bounded attempt count
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    remaining: u32,
}

impl ExponentialBackoff {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.initial,
            config.max,
            config.multiplier,
            config.jitter,
            config.attempts,
        )
    }

    /// A multiplier below 1 (or NaN) is treated as 1 and jitter is clamped
    /// to `0.0..=1.0`
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64, attempts: u32) -> Self {
        Self {
            current: initial,
            max,
            multiplier: if multiplier >= 1.0 { multiplier } else { 1.0 },
            jitter: if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) },
            remaining: attempts,
        }
    }

    /// The next delay, or `None` once every attempt is used
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = std::cmp::min(self.current, self.max);
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        Some(delay.saturating_add(Duration::try_from_secs_f64(jitter_amount).unwrap_or_default()))
    }
}
