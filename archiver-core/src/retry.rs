use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delays to wait between write attempts. Yields one delay less than the number of attempts:
/// the first attempt runs immediately, and there is no wait after the last one.
///
/// The n-th delay is `initial_interval * factor^(n - 1)`, randomized by `jitter` and capped by
/// `max_interval`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_interval: Duration,
    max_interval: Duration,
    factor: f64,
    jitter: f64,
    remaining: u16,
    attempt: u16,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_in_ms as u64),
            max_interval: Duration::from_millis(config.max_interval_in_ms as u64),
            factor: config.factor,
            jitter: config.jitter.clamp(0.0, 1.0),
            remaining: config.max_attempts.saturating_sub(1),
            attempt: 0,
        }
    }

    fn delay(&self, attempt: u16) -> Duration {
        let exponent = i32::from(attempt.max(1) - 1);
        let base_ms = self.initial_interval.as_millis() as f64 * self.factor.powi(exponent);

        let delay_ms = if self.jitter == 0.0 {
            base_ms
        } else {
            base_ms * rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter)
        };

        Duration::from_millis(delay_ms as u64).min(self.max_interval)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.attempt += 1;
        Some(self.delay(self.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u16, jitter: f64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_interval_in_ms: 100,
            max_interval_in_ms: 300,
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let delays: Vec<Duration> = Backoff::new(&config(5, 0.0)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn test_single_attempt_never_waits() {
        assert_eq!(Backoff::new(&config(1, 0.0)).next(), None);
        assert_eq!(Backoff::new(&config(0, 0.0)).next(), None);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut backoff = Backoff::new(&config(2, 0.5));
        let delay = backoff.next().unwrap();
        assert!(delay >= Duration::from_millis(50));
        assert!(delay <= Duration::from_millis(150));
        assert_eq!(backoff.next(), None);
    }
}
