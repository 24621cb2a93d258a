//! WorkerConfig - worker プロセスの設定値

use std::time::Duration;

use crate::domain::RetryPolicy;
use crate::ports::DEFAULT_LEASE_TTL;

/// Upper bound for every configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Delay between scheduler cycles.
    pub scheduler_interval: Duration,

    /// Delay between recovery sweeps.
    pub recovery_interval: Duration,

    /// Minimum time a job may stay Running before it is presumed abandoned.
    pub staleness_threshold: Duration,

    pub lease_ttl: Duration,

    /// Hard limit for one execution attempt.
    pub execution_timeout: Duration,

    /// Maximum candidates listed per scheduler cycle.
    pub batch_size: usize,

    /// Maximum zombies handled per sweep.
    pub sweep_batch_size: usize,

    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(1),
            recovery_interval: Duration::from_secs(60),
            staleness_threshold: Duration::from_secs(5 * 60),
            lease_ttl: DEFAULT_LEASE_TTL,
            execution_timeout: Duration::from_secs(30),
            batch_size: 10,
            sweep_batch_size: 100,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error(
        "staleness threshold {staleness:?} must exceed execution timeout + lease ttl ({minimum:?})"
    )]
    StalenessTooShort {
        staleness: Duration,
        minimum: Duration,
    },

    #[error("{name} {value:?} exceeds the maximum of {max:?}")]
    TooLarge {
        name: &'static str,
        value: Duration,
        max: Duration,
    },
}

impl WorkerConfig {
    /// Fail-fast validation before any loop is started.
    ///
    /// A threshold at or below execution timeout + lease TTL would let the
    /// recovery sweep reclaim a job that is still legitimately running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("scheduler_interval", self.scheduler_interval),
            ("recovery_interval", self.recovery_interval),
            ("lease_ttl", self.lease_ttl),
            ("execution_timeout", self.execution_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }
        let bounded = [
            ("scheduler_interval", self.scheduler_interval),
            ("recovery_interval", self.recovery_interval),
            ("staleness_threshold", self.staleness_threshold),
            ("lease_ttl", self.lease_ttl),
            ("execution_timeout", self.execution_timeout),
            ("retry_policy.max_delay", self.retry_policy.max_delay),
        ];
        for (name, value) in bounded {
            if value > MAX_DURATION {
                return Err(ConfigError::TooLarge {
                    name,
                    value,
                    max: MAX_DURATION,
                });
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Zero("sweep_batch_size"));
        }

        let minimum = self.execution_timeout.saturating_add(self.lease_ttl);
        if self.staleness_threshold <= minimum {
            return Err(ConfigError::StalenessTooShort {
                staleness: self.staleness_threshold,
                minimum,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WorkerConfig::default();
        assert_eq!(config.staleness_threshold, Duration::from_secs(300));
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.recovery_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn staleness_must_exceed_timeout_plus_ttl() {
        let config = WorkerConfig {
            staleness_threshold: Duration::from_secs(60),
            ..WorkerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::StalenessTooShort {
                staleness: Duration::from_secs(60),
                minimum: Duration::from_secs(60),
            })
        );
    }

    #[test]
    fn zero_batch_is_rejected() {
        let config = WorkerConfig {
            batch_size: 0,
            ..WorkerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("batch_size")));
    }

    #[test]
    fn huge_staleness_is_rejected() {
        let config = WorkerConfig {
            staleness_threshold: Duration::from_secs(10_000_000_000_000),
            ..WorkerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooLarge {
                name: "staleness_threshold",
                value: Duration::from_secs(10_000_000_000_000),
                max: MAX_DURATION,
            })
        );
    }

    #[test]
    fn ten_years_is_still_accepted() {
        let config = WorkerConfig {
            staleness_threshold: MAX_DURATION,
            recovery_interval: MAX_DURATION,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
