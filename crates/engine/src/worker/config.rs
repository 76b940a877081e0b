//! Worker pool configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{TtlConfig, MAX_TTL};
use crate::reliability::RetryPolicy;

/// Lower bound of the default worker count
pub const MIN_WORKERS: usize = 2;

/// Upper bound of the default worker count
pub const MAX_WORKERS: usize = 10;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid worker pool configuration: {0}")]
    Invalid(String),
}

/// Worker count for a host with `cpus` processing units
pub fn default_worker_count(cpus: usize) -> usize {
    cpus.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Worker pool configuration
///
/// # Example
///
/// ```
/// use lol_analytics_engine::WorkerPoolConfig;
/// use std::time::Duration;
///
/// let config = WorkerPoolConfig::default()
///     .with_worker_count(4)
///     .with_submit_timeout(Duration::from_secs(1));
///
/// assert_eq!(config.queue_capacity(), 400);
/// assert_eq!(config.result_capacity(), 40);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks
    pub worker_count: usize,

    /// Queued tasks allowed per worker
    pub queue_capacity_per_worker: usize,

    /// Result channel holds `queue_capacity / result_capacity_divisor`
    pub result_capacity_divisor: usize,

    /// How long a submission may wait for queue capacity
    #[serde(with = "duration_millis")]
    pub submit_timeout: Duration,

    /// Period of the average-duration refresh
    #[serde(with = "duration_millis")]
    pub stats_interval: Duration,

    /// Retries granted to tasks that don't set their own
    pub default_max_retries: u32,

    /// Backoff between retries
    pub retry: RetryPolicy,

    /// Cache lifetimes per class
    pub ttl: TtlConfig,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(num_cpus::get()),
            queue_capacity_per_worker: 100,
            result_capacity_divisor: 10,
            submit_timeout: Duration::from_secs(5),
            stats_interval: Duration::from_secs(10),
            default_max_retries: 3,
            retry: RetryPolicy::default(),
            ttl: TtlConfig::default(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables (unset or unparsable values keep the default):
    /// - `ANALYTICS_WORKER_COUNT`: Number of workers
    /// - `ANALYTICS_QUEUE_PER_WORKER`: Queue slots per worker
    /// - `ANALYTICS_SUBMIT_TIMEOUT_MS`: Max wait for queue capacity
    /// - `ANALYTICS_STATS_INTERVAL_SECS`: Average refresh period
    /// - `ANALYTICS_MAX_RETRIES`: Default retries per task
    /// - `ANALYTICS_RETRY_INITIAL_MS` / `ANALYTICS_RETRY_MAX_MS`: Backoff bounds
    /// - `CACHE_TTL_SHORT_SECS`, `CACHE_TTL_MEDIUM_SECS`,
    ///   `CACHE_TTL_LONG_SECS`, `CACHE_TTL_VERY_LONG_SECS`: TTL classes
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retry = RetryPolicy {
            initial_interval: env_parse("ANALYTICS_RETRY_INITIAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_interval),
            max_interval: env_parse("ANALYTICS_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_interval),
            ..defaults.retry.clone()
        };

        let ttl = TtlConfig {
            short: env_secs("CACHE_TTL_SHORT_SECS").unwrap_or(defaults.ttl.short),
            medium: env_secs("CACHE_TTL_MEDIUM_SECS").unwrap_or(defaults.ttl.medium),
            long: env_secs("CACHE_TTL_LONG_SECS").unwrap_or(defaults.ttl.long),
            very_long: env_secs("CACHE_TTL_VERY_LONG_SECS").unwrap_or(defaults.ttl.very_long),
        };

        Self {
            worker_count: env_parse("ANALYTICS_WORKER_COUNT").unwrap_or(defaults.worker_count),
            queue_capacity_per_worker: env_parse("ANALYTICS_QUEUE_PER_WORKER")
                .unwrap_or(defaults.queue_capacity_per_worker),
            result_capacity_divisor: defaults.result_capacity_divisor,
            submit_timeout: env_parse("ANALYTICS_SUBMIT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.submit_timeout),
            stats_interval: env_secs("ANALYTICS_STATS_INTERVAL_SECS")
                .unwrap_or(defaults.stats_interval),
            default_max_retries: env_parse("ANALYTICS_MAX_RETRIES")
                .unwrap_or(defaults.default_max_retries),
            retry,
            ttl,
        }
    }

    /// Set the number of workers
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the queue slots per worker
    pub fn with_queue_capacity_per_worker(mut self, capacity: usize) -> Self {
        self.queue_capacity_per_worker = capacity;
        self
    }

    /// Set the submission timeout
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Set the average-duration refresh period
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the default retries per task
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Set the retry backoff
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cache TTL classes
    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    /// Total queue capacity across priority tiers
    pub fn queue_capacity(&self) -> usize {
        self.worker_count.saturating_mul(self.queue_capacity_per_worker)
    }

    /// Capacity of the worker-to-aggregator result channel
    pub fn result_capacity(&self) -> usize {
        (self.queue_capacity() / self.result_capacity_divisor.max(1)).max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        if self.queue_capacity_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity_per_worker must be at least 1".into(),
            ));
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::Invalid("stats_interval must be non-zero".into()));
        }
        if !self.ttl.is_ordered() {
            return Err(ConfigError::Invalid(
                "ttl classes must be non-zero and ordered short <= medium <= long <= very_long"
                    .into(),
            ));
        }
        if !self.ttl.is_bounded() {
            return Err(ConfigError::Invalid(format!(
                "ttl classes must not exceed {:?}",
                MAX_TTL
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse(name).map(Duration::from_secs)
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
