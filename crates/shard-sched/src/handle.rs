//! Task handles.

use std::fmt;
use std::sync::Arc;

use crate::{NativeTask, OwnerId};

/// Opaque result of scheduling a task.
///
/// A pure accessor surface over the native state the execution context
/// produced. Identity is fixed at creation; a handle never changes which
/// context it belongs to.
#[derive(Clone)]
pub struct TaskHandle {
    native: Arc<dyn NativeTask>,
    owner: OwnerId,
    repeating: bool,
    synchronized: bool,
}

impl TaskHandle {
    /// Wrap a native task with its classification bits.
    #[must_use]
    pub fn from_parts(
        native: Arc<dyn NativeTask>,
        owner: OwnerId,
        repeating: bool,
        synchronized: bool,
    ) -> Self {
        Self {
            native,
            owner,
            repeating,
            synchronized,
        }
    }

    /// Cancel the task. Idempotent; cancelling an already-cancelled or
    /// already-completed task is a no-op, never an error. An in-flight
    /// execution is not interrupted.
    pub fn cancel(&self) {
        self.native.cancel();
    }

    /// Whether the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.native.is_cancelled()
    }

    /// The owner that submitted the task.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Whether this task executes on a fixed period, as opposed to once.
    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    /// Whether the task runs under a main-thread-equivalent context.
    ///
    /// Entity, region and global contexts are synchronized; the detached
    /// worker pool is not.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("owner", &self.owner)
            .field("repeating", &self.repeating)
            .field("synchronized", &self.synchronized)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
