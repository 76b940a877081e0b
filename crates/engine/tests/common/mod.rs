// Shared fixtures for worker pool integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lol_analytics_engine::{
    AnalyticsError, AnalyticsService, CacheGateway, RetryPolicy, TaskResult, UserId, WorkerPool,
    WorkerPoolConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

/// Analytics service that records calls and can hold or fail them
pub struct MockAnalytics {
    calls: Mutex<Vec<String>>,
    started: AtomicUsize,
    gate: watch::Sender<bool>,
    failures: Mutex<VecDeque<AnalyticsError>>,
}

impl MockAnalytics {
    /// Calls complete immediately
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_gate(true))
    }

    /// Calls block until [`MockAnalytics::open_gate`]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::with_gate(false))
    }

    fn with_gate(open: bool) -> Self {
        let (gate, _) = watch::channel(open);
        Self {
            calls: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            gate,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// The next call fails with `error`; queued failures are consumed in order
    pub fn fail_next(&self, error: AnalyticsError) {
        self.failures.lock().push_back(error);
    }

    /// Calls that have entered the service, including held ones
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Completed calls as `method:args`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    async fn call(&self, call: String, value: Value) -> Result<Value, AnalyticsError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        self.calls.lock().push(call);
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }
}

#[async_trait]
impl AnalyticsService for MockAnalytics {
    async fn period_stats(&self, user_id: UserId, period: &str) -> Result<Value, AnalyticsError> {
        self.call(
            format!("period_stats:{user_id}:{period}"),
            json!({ "user_id": user_id, "period": period, "games": 12, "win_rate": 0.58 }),
        )
        .await
    }

    async fn mmr_trajectory(&self, user_id: UserId, days: u32) -> Result<Value, AnalyticsError> {
        self.call(
            format!("mmr_trajectory:{user_id}:{days}"),
            json!({ "user_id": user_id, "days": days, "points": [1480, 1495, 1510] }),
        )
        .await
    }

    async fn recommendations(&self, user_id: UserId) -> Result<Value, AnalyticsError> {
        self.call(
            format!("recommendations:{user_id}"),
            json!([{ "type": "vision", "message": "Buy more control wards" }]),
        )
        .await
    }

    async fn champion_analysis(
        &self,
        user_id: UserId,
        champion_id: i64,
        period: &str,
    ) -> Result<Value, AnalyticsError> {
        self.call(
            format!("champion_analysis:{user_id}:{champion_id}:{period}"),
            json!({ "user_id": user_id, "champion_id": champion_id, "period": period }),
        )
        .await
    }
}

/// Small, fast configuration for tests
pub fn test_config(worker_count: usize) -> WorkerPoolConfig {
    WorkerPoolConfig::default()
        .with_worker_count(worker_count)
        .with_queue_capacity_per_worker(16)
        .with_submit_timeout(Duration::from_millis(500))
        .with_stats_interval(Duration::from_millis(50))
        .with_retry(RetryPolicy::fixed(Duration::from_millis(10)))
}

pub fn pool(
    analytics: Arc<MockAnalytics>,
    cache: Arc<dyn CacheGateway>,
    config: WorkerPoolConfig,
) -> WorkerPool {
    WorkerPool::with_config(analytics, cache, config).expect("valid test config")
}

/// Receive `count` results, failing the test if they take too long
pub async fn collect_results(
    results: &mut broadcast::Receiver<TaskResult>,
    count: usize,
) -> Vec<TaskResult> {
    let mut collected = Vec::with_capacity(count);
    while collected.len() < count {
        let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .expect("timed out waiting for task results")
            .expect("result channel closed");
        collected.push(result);
    }
    collected
}

/// Poll `condition` until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
