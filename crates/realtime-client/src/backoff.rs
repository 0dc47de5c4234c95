//! Capped exponential reconnection delay with jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnection delay sequence: `initial * 2^(attempt-1)`, jittered, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Advance to the next attempt and return its delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let base = self.initial.as_millis() as f64 * 2f64.powi(self.attempt as i32 - 1);

        let jittered = if self.jitter > 0.0 {
            let deviation = base * self.jitter;
            base + rand::thread_rng().gen_range(-deviation..=deviation)
        } else {
            base
        };

        let capped = jittered.min(self.max.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
