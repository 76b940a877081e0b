//! Cache layer
//!
//! This module provides:
//! - [`CacheGateway`] trait the engine reads and writes through
//! - [`TtlClass`] / [`TtlConfig`] - configurable lifetime classes
//! - [`InMemoryCacheGateway`] - process-local implementation
//! - [`keys`] - deterministic, user-scoped key builders

mod gateway;
pub mod keys;
mod memory;

pub use gateway::{CacheError, CacheGateway, TtlClass, TtlConfig, MAX_TTL};
pub use memory::{CacheStats, InMemoryCacheGateway};
