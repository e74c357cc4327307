//! Bounded retry with linear backoff for device writes.
//!
//! A failed attempt `n` (1-based) waits `n * base_delay` before attempt
//! `n + 1`. After the last attempt the final error is returned to the adapter,
//! which logs it and reports failure.

use std::time::Duration;

use super::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Clamped to at least one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, the attempts are exhausted, or it fails
    /// with a non-retryable error.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T>(&self, label: &str, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts || !e.is_retryable() => {
                    log::warn!("{label}: giving up after {attempt} attempt(s): {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    log::warn!("{label}: attempt {attempt}/{attempts} failed: {e}, retrying in {delay:?}");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;

    #[test]
    fn default_matches_blinkstick_timing() {
        let p = RetryPolicy::default();
        assert_eq!(p.attempts, 5);
        assert_eq!(p.base_delay, Duration::from_millis(300));
    }

    #[test]
    fn delay_is_linear() {
        let p = RetryPolicy::new(5, Duration::from_millis(300));
        assert_eq!(p.delay_for(1), Duration::from_millis(300));
        assert_eq!(p.delay_for(2), Duration::from_millis(600));
        assert_eq!(p.delay_for(4), Duration::from_millis(1200));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[test]
    fn succeeds_first_try() {
        let mut calls = 0;
        let r = RetryPolicy::new(3, Duration::ZERO).run("t", |_| {
            calls += 1;
            Ok(7)
        });
        assert_eq!(r.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut seen = Vec::new();
        let r = RetryPolicy::new(5, Duration::ZERO).run("t", |attempt| {
            seen.push(attempt);
            if attempt < 3 {
                Err(DeviceError::WriteFailed("busy".into()))
            } else {
                Ok(())
            }
        });
        assert!(r.is_ok());
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn exhausted_returns_last_error() {
        let mut calls = 0;
        let r: Result<()> = RetryPolicy::new(4, Duration::ZERO).run("t", |attempt| {
            calls += 1;
            Err(DeviceError::WriteFailed(format!("attempt {attempt}")))
        });
        assert_eq!(calls, 4);
        match r {
            Err(DeviceError::WriteFailed(msg)) => assert_eq!(msg, "attempt 4"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn not_found_stops_immediately() {
        let mut calls = 0;
        let r = RetryPolicy::new(5, Duration::ZERO).run::<()>("t", |_| {
            calls += 1;
            Err(DeviceError::NotFound)
        });
        assert!(matches!(r, Err(DeviceError::NotFound)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn once_never_retries() {
        let mut calls = 0;
        let _ = RetryPolicy::once().run::<()>("t", |_| {
            calls += 1;
            Err(DeviceError::NotFound)
        });
        assert_eq!(calls, 1);
    }
}
