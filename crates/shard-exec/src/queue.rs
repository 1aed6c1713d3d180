//! Tick-ordered task queues.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;
use shard_sched::{Job, NativeTask, Ticks};
use shard_world::Entity;

use crate::task::TaskState;

/// One scheduled task waiting in a tick queue.
///
/// The job sits behind a mutex because a repeating task's body (`FnMut`)
/// survives across executions; the lock also serializes a repeating task's
/// executions relative to each other.
#[derive(Clone)]
pub struct QueueItem {
    /// Tick at which the item becomes due.
    pub due: u64,
    /// Submission sequence number; ties on `due` preserve submission order.
    pub seq: u64,
    /// Re-enqueue period for repeating tasks, in ticks.
    pub period: Option<Ticks>,
    /// Entity-affine subject, if any. Used by the sharded entity router.
    pub entity: Option<Entity>,
    pub job: Arc<Mutex<Job>>,
    pub state: Arc<TaskState>,
}

impl QueueItem {
    /// Run the body once, unless cancelled.
    pub fn run(&self) {
        if self.state.is_cancelled() {
            return;
        }
        let native: Arc<dyn NativeTask> = self.state.clone();
        self.job.lock().run(&native);
    }

    /// The item re-enqueued for its next period, or `None` for one-shots
    /// and cancelled tasks.
    #[must_use]
    pub fn next_period(&self, now: u64) -> Option<QueueItem> {
        let period = self.period?;
        if self.state.is_cancelled() {
            return None;
        }
        let mut next = self.clone();
        next.due = now + period;
        Some(next)
    }
}

struct Entry(QueueItem);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.due == other.0.due && self.0.seq == other.0.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, we want the earliest item on top.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.0.due, other.0.seq).cmp(&(self.0.due, self.0.seq))
    }
}

/// Min-heap of scheduled items keyed by (due tick, submission order).
#[derive(Default)]
pub struct TickQueue {
    heap: BinaryHeap<Entry>,
}

impl TickQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: QueueItem) {
        self.heap.push(Entry(item));
    }

    /// Remove and return everything due at or before `now`, in
    /// (due, submission) order.
    pub fn pop_due(&mut self, now: u64) -> Vec<QueueItem> {
        let mut due = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.0.due > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                due.push(entry.0);
            }
        }
        due
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
