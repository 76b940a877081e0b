//! Pool statistics
//!
//! Counters are bumped per result by the aggregation task; the average task
//! duration is recomputed separately on a timer.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::task::TaskResult;

/// Point-in-time view of the pool
///
/// Counter fields are monotonic for the life of the pool. Queue and worker
/// gauges are sampled at the moment of the call and are not read under the
/// same lock as the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerPoolStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_enqueued: u64,
    /// Retries scheduled after a failed attempt
    pub tasks_retried: u64,
    /// Scheduled retries abandoned by `stop`
    pub tasks_discarded: u64,

    #[serde(with = "duration_millis")]
    pub average_task_time: Duration,
    #[serde(with = "duration_millis")]
    pub total_process_time: Duration,

    pub queue_length: usize,
    pub queue_capacity: usize,
    /// `queue_length / queue_capacity`
    pub queue_utilization: f64,

    pub worker_count: usize,
    pub workers_active: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: u64,
    succeeded: u64,
    failed: u64,
    enqueued: u64,
    retried: u64,
    discarded: u64,
    total_process_time: Duration,
    average_task_time: Duration,
}

/// Gauges sampled by the pool when a snapshot is taken
pub(crate) struct Gauges {
    pub queue_length: usize,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub workers_active: usize,
}

#[derive(Default)]
pub(crate) struct StatsRecorder {
    counters: Mutex<Counters>,
}

impl StatsRecorder {
    pub(crate) fn record_enqueued(&self) {
        self.counters.lock().enqueued += 1;
    }

    pub(crate) fn record_retry(&self) {
        self.counters.lock().retried += 1;
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.counters.lock().discarded += count as u64;
    }

    pub(crate) fn record_result(&self, result: &TaskResult) {
        let mut counters = self.counters.lock();
        counters.processed += 1;
        counters.total_process_time += result.duration;
        if result.success {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
    }

    /// Recompute the average from the running total
    pub(crate) fn refresh_average(&self) {
        let mut counters = self.counters.lock();
        if counters.processed > 0 {
            let processed = u32::try_from(counters.processed).unwrap_or(u32::MAX);
            counters.average_task_time = counters.total_process_time / processed;
        }
    }

    pub(crate) fn snapshot(&self, gauges: Gauges) -> WorkerPoolStats {
        let counters = self.counters.lock();

        let queue_utilization = if gauges.queue_capacity > 0 {
            gauges.queue_length as f64 / gauges.queue_capacity as f64
        } else {
            0.0
        };

        WorkerPoolStats {
            tasks_processed: counters.processed,
            tasks_succeeded: counters.succeeded,
            tasks_failed: counters.failed,
            tasks_enqueued: counters.enqueued,
            tasks_retried: counters.retried,
            tasks_discarded: counters.discarded,
            average_task_time: counters.average_task_time,
            total_process_time: counters.total_process_time,
            queue_length: gauges.queue_length,
            queue_capacity: gauges.queue_capacity,
            queue_utilization,
            worker_count: gauges.worker_count,
            workers_active: gauges.workers_active,
        }
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }
}
