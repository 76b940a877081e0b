//! Bounded, priority-tiered task queue
//!
//! Three FIFO tiers share one capacity. Workers always take from the highest
//! non-empty tier; producers wait a bounded time for a free slot. Closing
//! stops intake only: tasks already queued are still handed out.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::task::{Priority, QueuedTask};

/// Why a task could not be enqueued
#[derive(Debug, thiserror::Error)]
pub(crate) enum QueueError {
    /// No slot freed up within the timeout
    #[error("queue full after waiting {0:?}")]
    Full(Duration),

    /// Queue no longer accepts tasks
    #[error("queue closed")]
    Closed,
}

#[derive(Default)]
struct Tiers {
    high: VecDeque<QueuedTask>,
    normal: VecDeque<QueuedTask>,
    low: VecDeque<QueuedTask>,
    closed: bool,
}

impl Tiers {
    fn tier_mut(&mut self, priority: Priority) -> &mut VecDeque<QueuedTask> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    fn pop_highest(&mut self) -> Option<QueuedTask> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

pub(crate) struct TaskQueue {
    tiers: Mutex<Tiers>,
    /// One permit per free slot
    slots: Semaphore,
    available: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            tiers: Mutex::new(Tiers::default()),
            slots: Semaphore::new(capacity),
            available: Notify::new(),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.tiers.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tiers.lock().closed
    }

    /// Enqueue, waiting up to `timeout` for a free slot
    pub(crate) async fn push(&self, task: QueuedTask, timeout: Duration) -> Result<(), QueueError> {
        let permit = match self.slots.try_acquire() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::Closed) => return Err(QueueError::Closed),
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                match tokio::time::timeout(timeout, self.slots.acquire()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(QueueError::Closed),
                    Err(_) => return Err(QueueError::Full(timeout)),
                }
            }
        };

        {
            let mut tiers = self.tiers.lock();
            if tiers.closed {
                return Err(QueueError::Closed);
            }
            tiers.tier_mut(task.priority).push_back(task);
        }

        // The slot is returned by `pop`
        permit.forget();
        self.available.notify_one();
        Ok(())
    }

    /// Dequeue the highest-priority task, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and empty. Cancel-safe: a
    /// task is only removed in the same poll that returns it.
    pub(crate) async fn pop(&self) -> Option<QueuedTask> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (task, closed) = {
                let mut tiers = self.tiers.lock();
                (tiers.pop_highest(), tiers.closed)
            };

            if let Some(task) = task {
                self.slots.add_permits(1);
                return Some(task);
            }
            if closed {
                return None;
            }

            notified.await;
        }
    }

    /// Stop accepting tasks and wake every waiting worker
    ///
    /// Queued tasks stay in place; returns how many are left to drain.
    pub(crate) fn close(&self) -> usize {
        let pending = {
            let mut tiers = self.tiers.lock();
            tiers.closed = true;
            tiers.len()
        };

        self.slots.close();
        self.available.notify_waiters();
        pending
    }
}
