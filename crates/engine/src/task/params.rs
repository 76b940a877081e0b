//! Typed access to task parameters
//!
//! Absent parameters fall back to documented defaults; present ones with the
//! wrong shape are rejected.

use serde_json::Value;

use super::model::{TaskError, TaskParams};

/// Time window used when `period` is absent
pub const DEFAULT_PERIOD: &str = "week";

/// Trajectory window used when `days` is absent
pub const DEFAULT_TRAJECTORY_DAYS: u32 = 30;

/// `period` parameter (e.g. "week", "month")
pub fn period(params: &TaskParams) -> Result<String, TaskError> {
    match params.get("period") {
        None | Some(Value::Null) => Ok(DEFAULT_PERIOD.to_string()),
        Some(Value::String(period)) if !period.is_empty() => Ok(period.clone()),
        Some(_) => Err(TaskError::InvalidParameter {
            name: "period",
            expected: "non-empty string",
        }),
    }
}

/// `days` parameter of a rating trajectory
pub fn trajectory_days(params: &TaskParams) -> Result<u32, TaskError> {
    match params.get("days") {
        None | Some(Value::Null) => Ok(DEFAULT_TRAJECTORY_DAYS),
        Some(value) => value
            .as_u64()
            .filter(|days| *days > 0)
            .and_then(|days| u32::try_from(days).ok())
            .ok_or(TaskError::InvalidParameter {
                name: "days",
                expected: "positive integer",
            }),
    }
}

/// Required `champion_id` parameter
pub fn champion_id(params: &TaskParams) -> Result<i64, TaskError> {
    match params.get("champion_id") {
        None | Some(Value::Null) => Err(TaskError::MissingParameter("champion_id")),
        Some(value) => value.as_i64().ok_or(TaskError::InvalidParameter {
            name: "champion_id",
            expected: "integer",
        }),
    }
}
