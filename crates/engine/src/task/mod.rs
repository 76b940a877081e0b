//! Task model
//!
//! This module provides:
//! - [`Task`] - A unit of work as submitted by callers
//! - [`QueuedTask`] - The immutable form a task takes once accepted
//! - [`TaskResult`] - Per-attempt outcome emitted by workers
//! - Typed parameter extraction with defaults

mod model;
pub mod params;

pub use model::{
    Priority, QueuedTask, Task, TaskError, TaskParams, TaskResult, TaskType, UserId,
};
