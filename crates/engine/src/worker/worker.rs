//! Worker loop
//!
//! Each worker pulls one task at a time from the shared queue, runs it to
//! completion and forwards the result to the aggregator. A failing task never
//! takes the worker down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::pool::PoolShared;
use super::processor::warmup_tasks;
use super::queue::TaskQueue;
use crate::task::{Priority, QueuedTask, TaskError, TaskResult, TaskType};

/// Externally visible state of one worker
pub(crate) struct WorkerSlot {
    id: usize,
    active: AtomicBool,
}

impl WorkerSlot {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }
}

/// Marks a slot active until dropped, including on unwind
struct ActiveGuard<'a>(&'a WorkerSlot);

impl<'a> ActiveGuard<'a> {
    fn new(slot: &'a WorkerSlot) -> Self {
        slot.set_active(true);
        Self(slot)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.set_active(false);
    }
}

/// Everything a worker shares with its siblings for one run of the pool
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub shared: Arc<PoolShared>,
    pub queue: Arc<TaskQueue>,
    pub results: mpsc::Sender<TaskResult>,
    pub cancel: CancellationToken,
    pub retries: TaskTracker,
}

pub(crate) struct Worker {
    slot: Arc<WorkerSlot>,
    ctx: WorkerContext,
}

impl Worker {
    pub(crate) fn new(slot: Arc<WorkerSlot>, ctx: WorkerContext) -> Self {
        Self { slot, ctx }
    }

    pub(crate) async fn run(self) {
        let worker_id = self.slot.id;
        debug!(worker_id, "Analytics worker started");

        loop {
            // Queued tasks win over cancellation so a closed queue is drained
            let task = tokio::select! {
                biased;
                next = self.ctx.queue.pop() => match next {
                    Some(task) => task,
                    None => {
                        debug!(worker_id, "Analytics worker stopping (queue closed)");
                        break;
                    }
                },
                _ = self.ctx.cancel.cancelled() => {
                    debug!(worker_id, "Analytics worker stopping (cancelled)");
                    break;
                }
            };

            let result = {
                let _active = ActiveGuard::new(&self.slot);
                self.process(&task).await
            };

            if let Some(error) = &result.error {
                if error.is_retryable() && task.can_retry() {
                    self.schedule_retry(&task);
                }
            }

            tokio::select! {
                biased;
                sent = self.ctx.results.send(result) => {
                    if sent.is_err() {
                        debug!(worker_id, "Result channel closed");
                        break;
                    }
                }
                _ = self.ctx.cancel.cancelled() => {
                    debug!(worker_id, task_id = %task.id, "Dropping result, pool stopping");
                    break;
                }
            }
        }
    }

    async fn process(&self, task: &QueuedTask) -> TaskResult {
        let worker_id = self.slot.id;
        let timestamp = Utc::now();
        let started = Instant::now();

        debug!(
            worker_id,
            task_id = %task.id,
            task_type = %task.task_type,
            user_id = task.user_id,
            attempt = task.attempt(),
            "Processing task"
        );

        let processor = &self.ctx.shared.processor;
        let outcome: Result<Option<Value>, TaskError> = match &task.task_type {
            TaskType::PeriodStats => processor.period_stats(task).await.map(Some),
            TaskType::MmrTrajectory => processor.mmr_trajectory(task).await.map(Some),
            TaskType::Recommendations => processor.recommendations(task).await.map(Some),
            TaskType::ChampionAnalysis => processor.champion_analysis(task).await.map(Some),
            TaskType::CacheWarmup => Ok(Some(self.warmup(task).await)),
            TaskType::CacheInvalidate => processor.invalidate(task).await.map(|_| None),
            TaskType::Unknown(name) => Err(TaskError::UnknownTaskType(name.clone())),
        };

        let duration = started.elapsed();
        let (success, data, error) = match outcome {
            Ok(data) => (true, data, None),
            Err(e) => (false, None, Some(e)),
        };

        match &error {
            None => debug!(
                worker_id,
                task_id = %task.id,
                duration_ms = duration.as_millis() as u64,
                "Task completed"
            ),
            Some(e) => warn!(
                worker_id,
                task_id = %task.id,
                task_type = %task.task_type,
                error = %e,
                "Task failed"
            ),
        }

        TaskResult {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            user_id: task.user_id,
            success,
            error,
            data,
            duration,
            timestamp,
            attempt: task.attempt(),
            worker_id,
        }
    }

    /// Queue the warmup bundle at low priority; returns the queued IDs
    async fn warmup(&self, task: &QueuedTask) -> Value {
        debug!(user_id = task.user_id, "Warming up cache");

        let mut queued = Vec::new();
        for warmup in warmup_tasks(task.user_id) {
            let warmup_type = warmup.task_type.clone();
            match self
                .ctx
                .shared
                .submit(warmup.with_priority(Priority::Low))
                .await
            {
                Ok(id) => queued.push(id),
                Err(e) => warn!(
                    user_id = task.user_id,
                    task_type = %warmup_type,
                    error = %e,
                    "Failed to queue warmup task"
                ),
            }
        }

        json!({ "queued": queued })
    }

    fn schedule_retry(&self, task: &QueuedTask) {
        let next = task.next_attempt();
        let delay = self.ctx.shared.config.retry.delay_for_retry(next.retry_count);
        self.ctx.shared.stats.record_retry();

        debug!(
            task_id = %task.id,
            retry = next.retry_count,
            max_retries = next.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        let shared = Arc::clone(&self.ctx.shared);
        let queue = Arc::clone(&self.ctx.queue);
        let cancel = self.ctx.cancel.clone();

        self.ctx.retries.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    shared.stats.record_discarded(1);
                    warn!(task_id = %next.id, retry = next.retry_count, "Retry abandoned, pool stopping");
                }
                _ = tokio::time::sleep(delay) => {
                    let task_id = next.id.clone();
                    if let Err(e) = shared.enqueue(&queue, next).await {
                        warn!(%task_id, error = %e, "Failed to re-enqueue task");
                    }
                }
            }
        });
    }
}
