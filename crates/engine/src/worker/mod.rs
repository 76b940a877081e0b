//! Worker pool for analytics tasks
//!
//! This module provides:
//! - [`WorkerPool`] - Fixed set of workers draining a bounded priority queue
//! - [`WorkerPoolConfig`] - Sizing, backpressure, retry and TTL settings
//! - [`WorkerPoolStats`] - Aggregated counters and live gauges
//!
//! # Architecture
//!
//! ```text
//! submit ──▶ ┌──────────────────────────────┐
//!            │  TaskQueue (high/normal/low) │  bounded, 5s backpressure
//!            └──────────────┬───────────────┘
//!                           ▼
//!            [Worker 1] [Worker 2] ... [Worker N] ──▶ cache-aside processors
//!                           │
//!                           ▼ results (mpsc)
//!            ┌──────────────────────────────┐
//!            │  Aggregator ──▶ stats        │
//!            │             └─▶ subscribers  │
//!            └──────────────────────────────┘
//! ```

mod config;
mod pool;
mod processor;
mod queue;
mod stats;
#[allow(clippy::module_inception)]
mod worker;

pub use config::{default_worker_count, ConfigError, WorkerPoolConfig, MAX_WORKERS, MIN_WORKERS};
pub use pool::{WorkerPool, WorkerPoolError};
pub use stats::WorkerPoolStats;
