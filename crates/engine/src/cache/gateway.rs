//! CacheGateway trait and TTL classes

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for cache operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    /// Cache is switched off or not connected
    #[error("cache not enabled")]
    Disabled,

    /// Backend unreachable or command failed
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// TTL-backed JSON key/value store
///
/// A miss is `Ok(None)`; `Err` means the lookup itself failed.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Whether the cache is usable at all
    fn is_enabled(&self) -> bool;

    /// Look up a JSON value
    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a JSON value for `ttl`
    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    /// Delete all keys matching a glob pattern, returning how many were removed
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Coarse lifetime of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// Frequently changing data
    Short,
    /// Analytics over a time window
    Medium,
    /// Slow-moving or expensive results (trajectories, recommendations)
    Long,
    /// Historical data and meta information
    VeryLong,
}

impl std::fmt::Display for TtlClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Medium => write!(f, "medium"),
            Self::Long => write!(f, "long"),
            Self::VeryLong => write!(f, "very_long"),
        }
    }
}

/// Durations behind each [`TtlClass`]
///
/// # Example
///
/// ```
/// use lol_analytics_engine::cache::{TtlClass, TtlConfig};
/// use std::time::Duration;
///
/// let ttl = TtlConfig::default().with_short(Duration::from_secs(60));
/// assert_eq!(ttl.duration(TtlClass::Short), Duration::from_secs(60));
/// ```
/// Longest lifetime a TTL class may be configured with
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtlConfig {
    #[serde(with = "duration_millis")]
    pub short: Duration,

    #[serde(with = "duration_millis")]
    pub medium: Duration,

    #[serde(with = "duration_millis")]
    pub long: Duration,

    #[serde(with = "duration_millis")]
    pub very_long: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5 * 60),
            medium: Duration::from_secs(60 * 60),
            long: Duration::from_secs(24 * 60 * 60),
            very_long: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl TtlConfig {
    /// Resolve a class to its duration
    pub fn duration(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Short => self.short,
            TtlClass::Medium => self.medium,
            TtlClass::Long => self.long,
            TtlClass::VeryLong => self.very_long,
        }
    }

    pub fn with_short(mut self, ttl: Duration) -> Self {
        self.short = ttl;
        self
    }

    pub fn with_medium(mut self, ttl: Duration) -> Self {
        self.medium = ttl;
        self
    }

    pub fn with_long(mut self, ttl: Duration) -> Self {
        self.long = ttl;
        self
    }

    pub fn with_very_long(mut self, ttl: Duration) -> Self {
        self.very_long = ttl;
        self
    }

    /// Classes must be non-zero and ordered short <= medium <= long <= very long
    pub fn is_ordered(&self) -> bool {
        !self.short.is_zero()
            && self.short <= self.medium
            && self.medium <= self.long
            && self.long <= self.very_long
    }

    /// No class may exceed [`MAX_TTL`]
    pub fn is_bounded(&self) -> bool {
        [self.short, self.medium, self.long, self.very_long]
            .iter()
            .all(|ttl| *ttl <= MAX_TTL)
    }
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
