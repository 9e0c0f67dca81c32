//! Bounded buffer for task updates produced while disconnected

use std::collections::VecDeque;
use tracing::warn;

use plexfarm_core::domain::TaskUpdate;

/// FIFO of undelivered updates; the oldest entry is dropped when full.
///
/// Capacity 0 disables buffering.
#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<TaskUpdate>,
    capacity: usize,
    dropped: u64,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Hold an update for the next connection
    pub fn push(&mut self, update: TaskUpdate) {
        if self.capacity == 0 {
            self.record_drop(&update);
            return;
        }
        if self.queue.len() == self.capacity {
            if let Some(evicted) = self.queue.pop_front() {
                self.record_drop(&evicted);
            }
        }
        self.queue.push_back(update);
    }

    /// Put back an update whose delivery failed, ahead of everything else
    pub fn requeue(&mut self, update: TaskUpdate) {
        if self.capacity == 0 {
            self.record_drop(&update);
            return;
        }
        self.queue.push_front(update);
        if self.queue.len() > self.capacity {
            if let Some(evicted) = self.queue.pop_back() {
                self.record_drop(&evicted);
            }
        }
    }

    pub fn pop(&mut self) -> Option<TaskUpdate> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Updates lost since startup
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_drop(&mut self, update: &TaskUpdate) {
        self.dropped += 1;
        warn!(
            task_id = %update.task_id,
            status = ?update.status,
            dropped_total = self.dropped,
            "Task update dropped while disconnected"
        );
    }
}
