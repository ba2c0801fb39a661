//! Linear backoff with jitter, a ready-made `RetryPolicy`.

use crate::prelude::*;
use crate::task::RetryPolicy;

use rand::Rng;

/// Waits `failures * interval`, capped at `max_interval`, plus a uniform jitter in `[0, jitter)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinearBackoff {
    interval: Duration,
    max_interval: Duration,
    jitter: Duration,
    max_attempts: Option<u32>,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        LinearBackoff {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            jitter: Duration::from_millis(0),
            max_attempts: None,
        }
    }
}

impl LinearBackoff {
    pub fn new(interval: Duration, max_interval: Duration) -> Self {
        LinearBackoff {
            interval,
            max_interval,
            ..LinearBackoff::default()
        }
    }

    pub fn set_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Give up once `max_attempts` attempts have failed.
    pub fn set_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn base_delay(&self, failures: u32) -> Duration {
        self.interval
            .checked_mul(failures)
            .map_or(self.max_interval, |delay| delay.min(self.max_interval))
    }

    fn random_jitter(&self) -> Duration {
        let jitter = self.jitter.as_millis() as u64;
        if jitter == 0 {
            return Duration::from_millis(0);
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter))
    }
}

impl RetryPolicy for LinearBackoff {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if failures >= max_attempts {
                return None;
            }
        }

        Some(self.base_delay(failures) + self.random_jitter())
    }
}
