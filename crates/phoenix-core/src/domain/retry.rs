//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

/// Retry policy for transient failures.
///
/// delay = min(base_delay * multiplier^(attempts - 1), max_delay), then
/// spread by up to `jitter` (a fraction of the delay) in either direction so
/// jobs that failed together do not come back together.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Jitter as a fraction of the delay (0.0 disables it).
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn exponential(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Deterministic delay for the given number of charged attempts (1-indexed).
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// `next_delay` with jitter applied.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let delay = self.next_delay(attempts);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2), 2.0, Duration::from_secs(300)).with_jitter(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::exponential(Duration::from_secs(2), 2.0, Duration::from_secs(60))
    }

    #[rstest]
    #[case(0, 2)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn exponential_backoff(#[case] attempts: u32, #[case] expected_secs: u64) {
        assert_eq!(
            no_jitter().next_delay(attempts),
            Duration::from_secs(expected_secs)
        );
    }

    #[rstest]
    #[case(6)]
    #[case(40)]
    #[case(u32::MAX)]
    fn delay_is_capped(#[case] attempts: u32) {
        assert_eq!(no_jitter().next_delay(attempts), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = no_jitter().with_jitter(0.25);
        for _ in 0..100 {
            let d = policy.backoff(3);
            assert!(d >= Duration::from_secs(6), "{d:?}");
            assert!(d <= Duration::from_secs(10), "{d:?}");
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(2), policy.next_delay(2));
    }
}
