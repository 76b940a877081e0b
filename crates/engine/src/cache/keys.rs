//! Cache key builders
//!
//! Every key is prefixed by its feature and scoped by user so that a user's
//! entries can be dropped with a handful of glob patterns.

use crate::task::UserId;

/// `user:{id}:{kind}`
pub fn user_key(user_id: UserId, kind: &str) -> String {
    format!("user:{}:{}", user_id, kind)
}

/// `analytics:{id}:{period}:{kind}`
pub fn analytics_key(user_id: UserId, period: &str, kind: &str) -> String {
    format!("analytics:{}:{}:{}", user_id, period, kind)
}

/// `mmr:{id}:{days}`
pub fn mmr_key(user_id: UserId, days: u32) -> String {
    format!("mmr:{}:{}", user_id, days)
}

/// `recommendations:{id}`
pub fn recommendation_key(user_id: UserId) -> String {
    format!("recommendations:{}", user_id)
}

/// `champion:{id}:{champion}:{period}`
pub fn champion_key(user_id: UserId, champion_id: i64, period: &str) -> String {
    format!("champion:{}:{}:{}", user_id, champion_id, period)
}

/// `global:{kind}`, shared across users
pub fn global_key(kind: &str) -> String {
    format!("global:{}", kind)
}

/// Patterns covering every per-user key above
pub fn user_patterns(user_id: UserId) -> Vec<String> {
    vec![
        format!("user:{}:*", user_id),
        format!("analytics:{}:*", user_id),
        format!("mmr:{}:*", user_id),
        recommendation_key(user_id),
        format!("champion:{}:*", user_id),
    ]
}
