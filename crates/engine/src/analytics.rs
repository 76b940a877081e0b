//! Analytics service boundary
//!
//! The engine never computes statistics itself; it delegates to an
//! [`AnalyticsService`] and caches what comes back.

use async_trait::async_trait;
use serde_json::Value;

use crate::task::UserId;

/// Errors reported by the analytics service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyticsError {
    /// Nothing to compute for this user (no matches in range, unknown user)
    #[error("no analytics data for user {user_id}")]
    NoData { user_id: UserId },

    /// Backing store or upstream temporarily unavailable
    #[error("analytics backend unavailable: {0}")]
    Unavailable(String),

    /// Computation failed
    #[error("analytics computation failed: {0}")]
    Computation(String),
}

impl AnalyticsError {
    /// Whether the same request may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Computes derived player statistics
///
/// Results are opaque JSON to the engine; they are returned to callers and
/// written to the cache as-is.
#[async_trait]
pub trait AnalyticsService: Send + Sync {
    /// Aggregate statistics over a time window ("week", "month", ...)
    async fn period_stats(&self, user_id: UserId, period: &str) -> Result<Value, AnalyticsError>;

    /// Estimated matchmaking rating over the last `days` days
    async fn mmr_trajectory(&self, user_id: UserId, days: u32) -> Result<Value, AnalyticsError>;

    /// Improvement recommendations
    async fn recommendations(&self, user_id: UserId) -> Result<Value, AnalyticsError>;

    /// Performance on one champion over a time window
    async fn champion_analysis(
        &self,
        user_id: UserId,
        champion_id: i64,
        period: &str,
    ) -> Result<Value, AnalyticsError>;
}
