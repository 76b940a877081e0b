//! # Analytics Task Engine
//!
//! An in-process engine that computes derived player statistics on a pool of
//! workers and caches the results.
//!
//! ## Features
//!
//! - **Bounded worker pool**: sized to the host, clamped to 2..=10 workers
//! - **Priority queue with backpressure**: submissions wait up to a timeout for capacity
//! - **Cache-aside processing**: results cached per task type with class-based TTLs
//! - **Automatic retries**: transient failures retried with exponential backoff
//! - **Statistics**: processed/succeeded/failed counters, average duration, queue gauges
//!
//! ## Example
//!
//! ```ignore
//! use lol_analytics_engine::prelude::*;
//!
//! let pool = WorkerPool::new(analytics, Arc::new(InMemoryCacheGateway::new()));
//! pool.start().await?;
//!
//! pool.submit_task(
//!     Task::new(TaskType::PeriodStats, 42).with_param("period", json!("month")),
//! )
//! .await?;
//!
//! let stats = pool.stats();
//! pool.stop().await?;
//! ```

pub mod analytics;
pub mod cache;
pub mod reliability;
pub mod task;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::analytics::{AnalyticsError, AnalyticsService};
    pub use crate::cache::{CacheError, CacheGateway, InMemoryCacheGateway, TtlClass, TtlConfig};
    pub use crate::reliability::RetryPolicy;
    pub use crate::task::{Priority, Task, TaskError, TaskParams, TaskResult, TaskType, UserId};
    pub use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStats};
}

// Re-export key types at crate root
pub use analytics::{AnalyticsError, AnalyticsService};
pub use cache::{CacheError, CacheGateway, CacheStats, InMemoryCacheGateway, TtlClass, TtlConfig};
pub use reliability::RetryPolicy;
pub use task::{Priority, QueuedTask, Task, TaskError, TaskParams, TaskResult, TaskType, UserId};
pub use worker::{ConfigError, WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStats};
