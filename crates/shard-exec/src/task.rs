//! Native task state and the per-owner registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;
use shard_sched::{NativeTask, OwnerId};
use tracing::debug;

/// The cancellation state one execution context keeps per task.
pub struct TaskState {
    owner: OwnerId,
    cancelled: AtomicBool,
}

impl TaskState {
    #[must_use]
    pub fn new(owner: OwnerId) -> Arc<Self> {
        Arc::new(Self {
            owner,
            cancelled: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

impl NativeTask for TaskState {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Weak index of every live task by owner, for bulk cancellation.
///
/// Holding `Weak` means completed tasks fall out on their own; the registry
/// prunes dead entries whenever it touches an owner's list.
#[derive(Default)]
pub struct OwnerRegistry {
    tasks: Mutex<HashMap<OwnerId, Vec<Weak<TaskState>>>>,
}

impl OwnerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task under its owner.
    pub fn register(&self, state: &Arc<TaskState>) {
        let mut tasks = self.tasks.lock();
        let list = tasks.entry(state.owner()).or_default();
        list.retain(|w| w.strong_count() > 0);
        list.push(Arc::downgrade(state));
    }

    /// Cancel every live task registered under `owner`.
    pub fn cancel_all(&self, owner: OwnerId) {
        let list = self.tasks.lock().remove(&owner).unwrap_or_default();
        let mut cancelled = 0usize;
        for weak in &list {
            if let Some(state) = weak.upgrade() {
                state.cancel();
                cancelled += 1;
            }
        }
        debug!(%owner, cancelled, "bulk-cancelled tasks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let state = TaskState::new(OwnerId(1));
        assert!(!state.is_cancelled());
        state.cancel();
        state.cancel();
        assert!(state.is_cancelled());
    }

    #[test]
    fn test_cancel_all_only_hits_one_owner() {
        let registry = OwnerRegistry::new();
        let a = TaskState::new(OwnerId(1));
        let b = TaskState::new(OwnerId(2));
        registry.register(&a);
        registry.register(&b);

        registry.cancel_all(OwnerId(1));
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
