//! Per-type task processors
//!
//! Data-producing tasks follow cache-aside: look up the user-scoped key,
//! return a hit as-is, otherwise call the analytics service and write the
//! result back with the type's TTL class. Cache failures on that path only
//! cost a recomputation.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::analytics::{AnalyticsError, AnalyticsService};
use crate::cache::{keys, CacheGateway, CacheError, TtlClass, TtlConfig};
use crate::task::{params, QueuedTask, Task, TaskError, TaskType, UserId};

#[derive(Clone)]
pub(crate) struct TaskProcessor {
    analytics: Arc<dyn AnalyticsService>,
    cache: Arc<dyn CacheGateway>,
    ttl: TtlConfig,
}

impl TaskProcessor {
    pub(crate) fn new(
        analytics: Arc<dyn AnalyticsService>,
        cache: Arc<dyn CacheGateway>,
        ttl: TtlConfig,
    ) -> Self {
        Self {
            analytics,
            cache,
            ttl,
        }
    }

    pub(crate) async fn period_stats(&self, task: &QueuedTask) -> Result<Value, TaskError> {
        let period = params::period(&task.params)?;
        let key = keys::analytics_key(task.user_id, &period, TaskType::PeriodStats.as_str());

        self.cache_aside(&key, TtlClass::Medium, || {
            self.analytics.period_stats(task.user_id, &period)
        })
        .await
    }

    pub(crate) async fn mmr_trajectory(&self, task: &QueuedTask) -> Result<Value, TaskError> {
        let days = params::trajectory_days(&task.params)?;
        let key = keys::mmr_key(task.user_id, days);

        self.cache_aside(&key, TtlClass::Long, || {
            self.analytics.mmr_trajectory(task.user_id, days)
        })
        .await
    }

    pub(crate) async fn recommendations(&self, task: &QueuedTask) -> Result<Value, TaskError> {
        let key = keys::recommendation_key(task.user_id);

        self.cache_aside(&key, TtlClass::Long, || {
            self.analytics.recommendations(task.user_id)
        })
        .await
    }

    pub(crate) async fn champion_analysis(&self, task: &QueuedTask) -> Result<Value, TaskError> {
        let champion_id = params::champion_id(&task.params)?;
        let period = params::period(&task.params)?;
        let key = keys::champion_key(task.user_id, champion_id, &period);

        self.cache_aside(&key, TtlClass::Medium, || {
            self.analytics
                .champion_analysis(task.user_id, champion_id, &period)
        })
        .await
    }

    /// Delete every cache entry belonging to the task's user
    ///
    /// All patterns are attempted; the first failure is reported.
    pub(crate) async fn invalidate(&self, task: &QueuedTask) -> Result<(), TaskError> {
        if !self.cache.is_enabled() {
            debug!(user_id = task.user_id, "Cache disabled, nothing to invalidate");
            return Ok(());
        }

        let mut first_error: Option<CacheError> = None;
        let mut removed = 0;

        for pattern in keys::user_patterns(task.user_id) {
            match self.cache.delete_pattern(&pattern).await {
                Ok(count) => removed += count,
                Err(e) => {
                    warn!(%pattern, error = %e, "Failed to delete cache pattern");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(user_id = task.user_id, removed, "Invalidated user cache");

        match first_error {
            Some(e) => Err(TaskError::Cache(e)),
            None => Ok(()),
        }
    }

    async fn cache_aside<F, Fut>(
        &self,
        key: &str,
        class: TtlClass,
        compute: F,
    ) -> Result<Value, TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AnalyticsError>>,
    {
        let enabled = self.cache.is_enabled();

        if enabled {
            match self.cache.get_json(key).await {
                Ok(Some(cached)) => {
                    debug!(%key, "Cache hit");
                    return Ok(cached);
                }
                Ok(None) => debug!(%key, "Cache miss"),
                Err(e) => warn!(%key, error = %e, "Cache read failed, computing"),
            }
        }

        let value = compute().await?;

        if enabled {
            let ttl = self.ttl.duration(class);
            if let Err(e) = self.cache.set_json(key, &value, ttl).await {
                warn!(%key, ttl_class = %class, error = %e, "Cache write failed");
            }
        }

        Ok(value)
    }
}

/// Tasks queued by a cache warmup for `user_id`
pub(crate) fn warmup_tasks(user_id: UserId) -> Vec<Task> {
    vec![
        Task::new(TaskType::PeriodStats, user_id).with_param("period", json!("week")),
        Task::new(TaskType::PeriodStats, user_id).with_param("period", json!("month")),
        Task::new(TaskType::MmrTrajectory, user_id).with_param("days", json!(30)),
        Task::new(TaskType::Recommendations, user_id),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheGateway;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingAnalytics {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingAnalytics {
        fn record(&self, call: String) -> Result<Value, AnalyticsError> {
            self.calls.lock().push(call.clone());
            if self.fail {
                Err(AnalyticsError::Unavailable("db down".into()))
            } else {
                Ok(json!({ "call": call }))
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AnalyticsService for RecordingAnalytics {
        async fn period_stats(&self, user_id: UserId, period: &str) -> Result<Value, AnalyticsError> {
            self.record(format!("period_stats:{user_id}:{period}"))
        }

        async fn mmr_trajectory(&self, user_id: UserId, days: u32) -> Result<Value, AnalyticsError> {
            self.record(format!("mmr_trajectory:{user_id}:{days}"))
        }

        async fn recommendations(&self, user_id: UserId) -> Result<Value, AnalyticsError> {
            self.record(format!("recommendations:{user_id}"))
        }

        async fn champion_analysis(
            &self,
            user_id: UserId,
            champion_id: i64,
            period: &str,
        ) -> Result<Value, AnalyticsError> {
            self.record(format!("champion_analysis:{user_id}:{champion_id}:{period}"))
        }
    }

    /// Cache whose every operation fails
    struct BrokenCache;

    #[async_trait]
    impl CacheGateway for BrokenCache {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn get_json(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set_json(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn queued(task: Task) -> QueuedTask {
        task.into_queued(Utc::now(), 0)
    }

    fn processor(
        analytics: Arc<RecordingAnalytics>,
        cache: Arc<dyn CacheGateway>,
    ) -> TaskProcessor {
        TaskProcessor::new(analytics, cache, TtlConfig::default())
    }

    #[tokio::test]
    async fn test_period_stats_cache_aside() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let cache = Arc::new(InMemoryCacheGateway::new());
        let processor = processor(analytics.clone(), cache.clone());
        let task = queued(Task::new(TaskType::PeriodStats, 42).with_param("period", json!("week")));

        let first = processor.period_stats(&task).await.unwrap();
        let second = processor.period_stats(&task).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(analytics.calls(), ["period_stats:42:week"]);
        assert!(cache.exists("analytics:42:week:period_stats"));
        assert_eq!(
            cache.ttl("analytics:42:week:period_stats").map(|t| t <= Duration::from_secs(3600)),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let cache = Arc::new(InMemoryCacheGateway::new());
        let processor = processor(analytics.clone(), cache.clone());

        processor
            .period_stats(&queued(Task::new(TaskType::PeriodStats, 1)))
            .await
            .unwrap();
        processor
            .mmr_trajectory(&queued(Task::new(TaskType::MmrTrajectory, 1)))
            .await
            .unwrap();

        assert_eq!(analytics.calls(), ["period_stats:1:week", "mmr_trajectory:1:30"]);
        assert!(cache.exists("mmr:1:30"));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let cache = Arc::new(InMemoryCacheGateway::disabled());
        let processor = processor(analytics.clone(), cache.clone());
        let task = queued(Task::new(TaskType::Recommendations, 9));

        processor.recommendations(&task).await.unwrap();
        processor.recommendations(&task).await.unwrap();

        assert_eq!(analytics.calls().len(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_compute() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let processor = processor(analytics.clone(), Arc::new(BrokenCache));
        let task = queued(Task::new(TaskType::MmrTrajectory, 3).with_param("days", json!(7)));

        let value = processor.mmr_trajectory(&task).await.unwrap();
        assert_eq!(value, json!({"call": "mmr_trajectory:3:7"}));
    }

    #[tokio::test]
    async fn test_champion_analysis_requires_champion() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let processor = processor(analytics.clone(), Arc::new(InMemoryCacheGateway::new()));

        let err = processor
            .champion_analysis(&queued(Task::new(TaskType::ChampionAnalysis, 1)))
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::MissingParameter("champion_id"));
        assert!(analytics.calls().is_empty());

        let task = queued(
            Task::new(TaskType::ChampionAnalysis, 1).with_param("champion_id", json!(157)),
        );
        processor.champion_analysis(&task).await.unwrap();
        assert_eq!(analytics.calls(), ["champion_analysis:1:157:week"]);
    }

    #[tokio::test]
    async fn test_analytics_failure_is_not_cached() {
        let analytics = Arc::new(RecordingAnalytics {
            fail: true,
            ..Default::default()
        });
        let cache = Arc::new(InMemoryCacheGateway::new());
        let processor = processor(analytics.clone(), cache.clone());

        let err = processor
            .recommendations(&queued(Task::new(TaskType::Recommendations, 5)))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Analytics(AnalyticsError::Unavailable(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_removes_only_user_entries() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let cache = Arc::new(InMemoryCacheGateway::new());
        let processor = processor(analytics.clone(), cache.clone());
        let ttl = Duration::from_secs(60);

        for key in [
            keys::analytics_key(7, "week", "period_stats"),
            keys::mmr_key(7, 30),
            keys::recommendation_key(7),
            keys::champion_key(7, 157, "week"),
            keys::user_key(7, "profile"),
            keys::recommendation_key(8),
        ] {
            cache.set_json(&key, &json!(1), ttl).await.unwrap();
        }

        processor
            .invalidate(&queued(Task::new(TaskType::CacheInvalidate, 7)))
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.exists(&keys::recommendation_key(8)));
    }

    #[tokio::test]
    async fn test_invalidate_reports_cache_failure() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let processor = processor(analytics, Arc::new(BrokenCache));

        let err = processor
            .invalidate(&queued(Task::new(TaskType::CacheInvalidate, 7)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Cache(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_invalidate_with_disabled_cache() {
        let analytics = Arc::new(RecordingAnalytics::default());
        let processor = processor(analytics, Arc::new(InMemoryCacheGateway::disabled()));

        processor
            .invalidate(&queued(Task::new(TaskType::CacheInvalidate, 7)))
            .await
            .unwrap();
    }

    #[test]
    fn test_warmup_bundle() {
        let tasks = warmup_tasks(11);
        let types: Vec<_> = tasks.iter().map(|t| t.task_type.clone()).collect();

        assert_eq!(
            types,
            [
                TaskType::PeriodStats,
                TaskType::PeriodStats,
                TaskType::MmrTrajectory,
                TaskType::Recommendations
            ]
        );
        assert!(tasks.iter().all(|t| t.user_id == 11));
        assert_eq!(tasks[1].params["period"], json!("month"));
    }
}
