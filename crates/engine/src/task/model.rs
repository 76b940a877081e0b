//! Task and result types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::AnalyticsError;
use crate::cache::CacheError;

/// Identifier of the player an analytics task is computed for
pub type UserId = i64;

/// Task-specific arguments (time window, champion, ...)
pub type TaskParams = serde_json::Map<String, Value>;

/// Kind of analytics work a task asks for
///
/// The set is closed. Anything else arriving from a caller is kept as
/// [`TaskType::Unknown`] and fails when processed instead of being rejected
/// at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Aggregate statistics over a time window
    PeriodStats,
    /// Estimated matchmaking rating over the last N days
    MmrTrajectory,
    /// Improvement recommendations
    Recommendations,
    /// Performance on a single champion
    ChampionAnalysis,
    /// Queue the common computations for a user
    CacheWarmup,
    /// Drop every cached entry of a user
    CacheInvalidate,
    /// Unrecognized type name
    Unknown(String),
}

impl TaskType {
    /// Wire name of the task type
    pub fn as_str(&self) -> &str {
        match self {
            Self::PeriodStats => "period_stats",
            Self::MmrTrajectory => "mmr_trajectory",
            Self::Recommendations => "recommendations",
            Self::ChampionAnalysis => "champion_analysis",
            Self::CacheWarmup => "cache_warmup",
            Self::CacheInvalidate => "cache_invalidate",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        match value {
            "period_stats" => Self::PeriodStats,
            "mmr_trajectory" => Self::MmrTrajectory,
            "recommendations" => Self::Recommendations,
            "champion_analysis" => Self::ChampionAnalysis,
            "cache_warmup" => Self::CacheWarmup,
            "cache_invalidate" => Self::CacheInvalidate,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// Scheduling priority, lower value is served first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub enum Priority {
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// Numeric value (1 = high, 3 = low)
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl From<u8> for Priority {
    /// Out-of-range values are clamped to the nearest tier.
    fn from(value: u8) -> Self {
        match value {
            0 | 1 => Self::High,
            2 => Self::Normal,
            _ => Self::Low,
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.value()
    }
}

/// A unit of analytics work as handed to the pool
///
/// `id`, `created_at` and `max_retries` are filled in at submission when
/// left empty.
///
/// # Example
///
/// ```
/// use lol_analytics_engine::{Priority, Task, TaskType};
/// use serde_json::json;
///
/// let task = Task::new(TaskType::PeriodStats, 42)
///     .with_param("period", json!("month"))
///     .with_priority(Priority::High);
/// assert_eq!(task.user_id, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub task_type: TaskType,

    pub user_id: UserId,

    #[serde(default)]
    pub params: TaskParams,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Task {
    /// Create a task with no parameters and normal priority
    pub fn new(task_type: TaskType, user_id: UserId) -> Self {
        Self {
            id: None,
            task_type,
            user_id,
            params: TaskParams::new(),
            priority: Priority::Normal,
            created_at: None,
            max_retries: None,
        }
    }

    /// Set an explicit task ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a single parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Replace all parameters
    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the maximum number of automatic retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Resolve the optional fields into a queueable task
    ///
    /// A missing ID is derived from the type, user and submission time.
    pub(crate) fn into_queued(self, now: DateTime<Utc>, default_max_retries: u32) -> QueuedTask {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => generate_task_id(&self.task_type, self.user_id, now),
        };

        QueuedTask {
            id,
            task_type: self.task_type,
            user_id: self.user_id,
            params: self.params,
            priority: self.priority,
            created_at: self.created_at.unwrap_or(now),
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
        }
    }
}

/// `{type}_{user}_{unix nanos}`
pub(crate) fn generate_task_id(task_type: &TaskType, user_id: UserId, now: DateTime<Utc>) -> String {
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));
    format!("{}_{}_{}", task_type, user_id, nanos)
}

/// A task accepted by the pool
///
/// Immutable once enqueued; a retry produces a copy with a bumped
/// `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub user_id: UserId,
    pub params: TaskParams,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl QueuedTask {
    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    /// Whether another attempt is allowed after this one
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub(crate) fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// Why a task failed
///
/// Recorded in [`TaskResult::error`]; never propagated out of a worker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("{0} required for this task type")]
    MissingParameter(&'static str),

    #[error("invalid parameter {name}: expected {expected}")]
    InvalidParameter {
        name: &'static str,
        expected: &'static str,
    },

    #[error("analytics service error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl TaskError {
    /// Whether a later attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Analytics(err) => err.is_transient(),
            Self::Cache(_) => true,
            Self::UnknownTaskType(_) | Self::MissingParameter(_) | Self::InvalidParameter { .. } => {
                false
            }
        }
    }
}

/// Outcome of processing one task attempt
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub task_type: TaskType,
    pub user_id: UserId,
    pub success: bool,
    /// Present iff `success` is false
    pub error: Option<TaskError>,
    /// Type-specific payload
    pub data: Option<Value>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub worker_id: usize,
}
