//! Worker pool for analytics tasks
//!
//! Owns the queue, the workers, the result aggregator and the stats refresher
//! for one start/stop cycle. A stopped pool can be started again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use super::config::{ConfigError, WorkerPoolConfig};
use super::processor::TaskProcessor;
use super::queue::{QueueError, TaskQueue};
use super::stats::{Gauges, StatsRecorder, WorkerPoolStats};
use super::worker::{Worker, WorkerContext, WorkerSlot};
use crate::analytics::AnalyticsService;
use crate::cache::CacheGateway;
use crate::task::{Priority, QueuedTask, Task, TaskParams, TaskResult, TaskType, UserId};

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("worker pool is not running")]
    NotRunning,

    #[error("task queue is full, submission timed out after {timeout:?}")]
    QueueFull { timeout: Duration },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// State reachable from workers and background tasks
pub(crate) struct PoolShared {
    pub config: WorkerPoolConfig,
    pub processor: TaskProcessor,
    pub stats: StatsRecorder,
    queue: RwLock<Option<Arc<TaskQueue>>>,
    workers: RwLock<Vec<Arc<WorkerSlot>>>,
    results: broadcast::Sender<TaskResult>,
}

impl PoolShared {
    pub(crate) fn new(config: WorkerPoolConfig, processor: TaskProcessor) -> Self {
        let (results, _) = broadcast::channel(config.queue_capacity().max(1));
        Self {
            config,
            processor,
            stats: StatsRecorder::default(),
            queue: RwLock::new(None),
            workers: RwLock::new(Vec::new()),
            results,
        }
    }

    fn current_queue(&self) -> Option<Arc<TaskQueue>> {
        self.queue.read().clone()
    }

    /// Accept a new task into the running pool
    pub(crate) async fn submit(&self, task: Task) -> Result<String, WorkerPoolError> {
        let queue = self.current_queue().ok_or(WorkerPoolError::NotRunning)?;
        let queued = task.into_queued(Utc::now(), self.config.default_max_retries);
        let task_id = queued.id.clone();
        self.enqueue(&queue, queued).await?;
        Ok(task_id)
    }

    /// Push onto `queue`, waiting at most `submit_timeout` for a slot
    pub(crate) async fn enqueue(
        &self,
        queue: &TaskQueue,
        task: QueuedTask,
    ) -> Result<(), WorkerPoolError> {
        let task_id = task.id.clone();
        let task_type = task.task_type.clone();
        let priority = task.priority;

        match queue.push(task, self.config.submit_timeout).await {
            Ok(()) => {
                self.stats.record_enqueued();
                debug!(%task_id, %task_type, priority = priority.value(), "Task enqueued");
                Ok(())
            }
            Err(QueueError::Full(timeout)) => {
                warn!(%task_id, %task_type, ?timeout, "Task queue full, rejecting task");
                Err(WorkerPoolError::QueueFull { timeout })
            }
            Err(QueueError::Closed) => Err(WorkerPoolError::NotRunning),
        }
    }
}

/// Handles owned by one start/stop cycle
struct RunningPool {
    queue: Arc<TaskQueue>,
    cancel: CancellationToken,
    retries: TaskTracker,
    workers: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

/// Worker pool executing analytics tasks against a cache-aside backend
///
/// # Example
///
/// ```ignore
/// use lol_analytics_engine::{InMemoryCacheGateway, TaskType, WorkerPool};
///
/// let pool = WorkerPool::new(analytics, Arc::new(InMemoryCacheGateway::new()));
/// pool.start().await?;
///
/// pool.submit_high_priority_task(TaskType::PeriodStats, 42, TaskParams::new())
///     .await?;
///
/// println!("{:?}", pool.stats());
/// pool.stop().await?;
/// ```
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    lifecycle: tokio::sync::Mutex<Option<RunningPool>>,
}

impl WorkerPool {
    /// Create a pool with the default configuration
    pub fn new(analytics: Arc<dyn AnalyticsService>, cache: Arc<dyn CacheGateway>) -> Self {
        Self::build(analytics, cache, WorkerPoolConfig::default())
    }

    /// Create a pool with an explicit configuration
    pub fn with_config(
        analytics: Arc<dyn AnalyticsService>,
        cache: Arc<dyn CacheGateway>,
        config: WorkerPoolConfig,
    ) -> Result<Self, WorkerPoolError> {
        config.validate()?;
        Ok(Self::build(analytics, cache, config))
    }

    fn build(
        analytics: Arc<dyn AnalyticsService>,
        cache: Arc<dyn CacheGateway>,
        config: WorkerPoolConfig,
    ) -> Self {
        let processor = TaskProcessor::new(analytics, cache, config.ttl.clone());

        Self {
            shared: Arc::new(PoolShared::new(config, processor)),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Start workers, the result aggregator and the stats refresher
    #[instrument(skip(self), fields(worker_count = self.shared.config.worker_count))]
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        let config = &self.shared.config;
        info!(
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity(),
            result_capacity = config.result_capacity(),
            "Starting analytics worker pool"
        );

        let queue = Arc::new(TaskQueue::new(config.queue_capacity()));
        let (result_tx, result_rx) = mpsc::channel(config.result_capacity());
        let cancel = CancellationToken::new();
        let retries = TaskTracker::new();

        let mut slots = Vec::with_capacity(config.worker_count);
        let mut workers = Vec::with_capacity(config.worker_count);
        for id in 1..=config.worker_count {
            let slot = Arc::new(WorkerSlot::new(id));
            let ctx = WorkerContext {
                shared: Arc::clone(&self.shared),
                queue: Arc::clone(&queue),
                results: result_tx.clone(),
                cancel: cancel.clone(),
                retries: retries.clone(),
            };
            workers.push(tokio::spawn(Worker::new(Arc::clone(&slot), ctx).run()));
            slots.push(slot);
        }
        // Workers hold the only senders; the channel closes when they exit
        drop(result_tx);

        let aggregator = tokio::spawn(aggregate_results(Arc::clone(&self.shared), result_rx));
        let refresher = tokio::spawn(refresh_average(
            Arc::clone(&self.shared),
            config.stats_interval,
            cancel.clone(),
        ));

        *self.shared.workers.write() = slots;
        *self.shared.queue.write() = Some(Arc::clone(&queue));

        *lifecycle = Some(RunningPool {
            queue,
            cancel,
            retries,
            workers,
            aggregator,
            refresher,
        });

        info!("Analytics worker pool started");
        Ok(())
    }

    /// Stop the pool
    ///
    /// Intake stops at once. Workers drain every task already queued and exit
    /// before pending retries are abandoned. Abandoned retries are counted in
    /// `tasks_discarded`.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), WorkerPoolError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = lifecycle.take().ok_or(WorkerPoolError::NotRunning)?;

        *self.shared.queue.write() = None;
        let pending = running.queue.close();
        info!(pending, "Stopping analytics worker pool, draining queued tasks");

        for handle in running.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Analytics worker panicked");
            }
        }

        running.cancel.cancel();
        running.retries.close();
        running.retries.wait().await;

        if let Err(e) = running.aggregator.await {
            error!(error = %e, "Result aggregator panicked");
        }
        if let Err(e) = running.refresher.await {
            error!(error = %e, "Stats refresher panicked");
        }

        self.shared.stats.refresh_average();
        self.shared.workers.write().clear();

        info!("Analytics worker pool stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.read().is_some()
    }

    /// Submit a task, waiting up to `submit_timeout` for queue capacity
    ///
    /// Returns the task ID, generated when the task has none.
    pub async fn submit_task(&self, task: Task) -> Result<String, WorkerPoolError> {
        self.shared.submit(task).await
    }

    pub async fn submit_high_priority_task(
        &self,
        task_type: TaskType,
        user_id: UserId,
        params: TaskParams,
    ) -> Result<String, WorkerPoolError> {
        self.submit_task(
            Task::new(task_type, user_id)
                .with_params(params)
                .with_priority(Priority::High),
        )
        .await
    }

    pub async fn submit_low_priority_task(
        &self,
        task_type: TaskType,
        user_id: UserId,
        params: TaskParams,
    ) -> Result<String, WorkerPoolError> {
        self.submit_task(
            Task::new(task_type, user_id)
                .with_params(params)
                .with_priority(Priority::Low),
        )
        .await
    }

    /// Current counters plus live queue and worker gauges
    pub fn stats(&self) -> WorkerPoolStats {
        let (queue_length, queue_capacity) = match self.shared.current_queue() {
            Some(queue) => (queue.len(), queue.capacity()),
            None => (0, self.shared.config.queue_capacity()),
        };
        let workers_active = self
            .shared
            .workers
            .read()
            .iter()
            .filter(|w| w.is_active())
            .count();

        self.shared.stats.snapshot(Gauges {
            queue_length,
            queue_capacity,
            worker_count: self.shared.config.worker_count,
            workers_active,
        })
    }

    /// Receive every task result processed after this call
    ///
    /// Slow receivers may observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskResult> {
        self.shared.results.subscribe()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            running.queue.close();
            running.cancel.cancel();
        }
    }
}

async fn aggregate_results(shared: Arc<PoolShared>, mut results: mpsc::Receiver<TaskResult>) {
    while let Some(result) = results.recv().await {
        shared.stats.record_result(&result);
        // No subscribers is fine
        let _ = shared.results.send(result);
    }
    debug!("Result aggregator exited");
}

async fn refresh_average(shared: Arc<PoolShared>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => shared.stats.refresh_average(),
        }
    }
    debug!("Stats refresher exited");
}
