//! Reliability patterns
//!
//! This module provides:
//! - [`RetryPolicy`] - Exponential backoff between automatic task retries

mod retry;

pub use retry::RetryPolicy;
