//! Execution-context contracts.
//!
//! The scheduler builder never talks to threads directly; it selects a
//! [`ContextSelector`], asks the [`SchedulerHost`] for the matching
//! [`ExecutionContext`], and submits one [`Job`]. The host is the seam
//! between the scheduling surface and whichever machinery actually runs
//! tasks.

use std::fmt;
use std::sync::Arc;

use shard_world::{Entity, Pose, RealmId};

use crate::{Regime, Schedule, SubmitError, TaskHandle};

/// Identifies the system that submitted a task, for bulk cancellation and
/// ownership queries on handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner{}", self.0)
    }
}

/// The cancellation state an execution context keeps for one task.
///
/// `cancel` is idempotent and safe from any thread. A task cancelled while
/// its body is running is not interrupted; only future executions are
/// prevented.
pub trait NativeTask: Send + Sync {
    /// Prevent any future execution. No-op if already cancelled or done.
    fn cancel(&self);

    /// Whether the task has been cancelled.
    fn is_cancelled(&self) -> bool;
}

/// The two body forms a task can take, mutually exclusive.
pub enum TaskBody {
    /// A plain body.
    Plain(Box<dyn FnMut() + Send>),
    /// A body handed the handle of the task it runs under, so a repeating
    /// task can cancel itself.
    WithHandle(Box<dyn FnMut(&TaskHandle) + Send>),
}

impl TaskBody {
    /// Whether this is the handle-parameterized form.
    #[must_use]
    pub fn wants_handle(&self) -> bool {
        matches!(self, TaskBody::WithHandle(_))
    }
}

/// Everything an execution context needs to run one task.
///
/// Built by the scheduler builder with timing already normalized for the
/// target context and the handle classification bits precomputed.
pub struct Job {
    pub owner: OwnerId,
    pub schedule: Schedule,
    /// Whether the task runs under a main-thread-equivalent context.
    pub synchronized: bool,
    pub repeating: bool,
    body: TaskBody,
    retired: Option<Box<dyn FnOnce() + Send>>,
}

impl Job {
    /// Pack a body with its normalized schedule and classification bits.
    #[must_use]
    pub fn new(owner: OwnerId, schedule: Schedule, synchronized: bool, body: TaskBody) -> Self {
        Self {
            owner,
            schedule,
            synchronized,
            repeating: schedule.is_repeating(),
            body,
            retired: None,
        }
    }

    /// Attach a callback run instead of the body when an entity-affine
    /// task's subject has been retired. Ignored by non-entity contexts.
    #[must_use]
    pub fn on_retired(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.retired = Some(Box::new(f));
        self
    }

    /// Boxed form of [`Job::on_retired`].
    pub fn set_retired(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.retired = Some(f);
    }

    /// Execute the body once. `native` is the context's cancellation state
    /// for this task, handed to handle-parameterized bodies.
    pub fn run(&mut self, native: &Arc<dyn NativeTask>) {
        match &mut self.body {
            TaskBody::Plain(f) => f(),
            TaskBody::WithHandle(f) => {
                let handle = TaskHandle::from_parts(
                    native.clone(),
                    self.owner,
                    self.repeating,
                    self.synchronized,
                );
                f(&handle);
            }
        }
    }

    /// Take the retired-callback, if one was attached.
    pub fn take_retired(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        self.retired.take()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("owner", &self.owner)
            .field("schedule", &self.schedule)
            .field("synchronized", &self.synchronized)
            .field("repeating", &self.repeating)
            .finish()
    }
}

/// Which execution-context family a task belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ContextSelector {
    /// The global coordinator (region-sharded) or the single main thread
    /// (cooperative).
    Global,
    /// The thread owning the region containing a location.
    Region { realm: RealmId, pose: Pose },
    /// The thread owning whatever region currently contains an entity.
    /// Tasks follow the entity across ownership migration.
    Entity(Entity),
    /// The detached worker pool. No simulation-state access.
    Worker,
}

/// One execution context: accepts jobs, returns their cancellation state.
pub trait ExecutionContext: Send + Sync {
    /// Submit a job. Never blocks waiting for the work itself.
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError>;
}

/// The execution machinery for one regime.
///
/// A host's regime is fixed at construction and never re-checked mid-task.
pub trait SchedulerHost: Send + Sync {
    /// The concurrency regime this host implements.
    fn regime(&self) -> Regime;

    /// Resolve the context that currently owns the given affinity target.
    fn context(&self, selector: &ContextSelector) -> Arc<dyn ExecutionContext>;

    /// Cancel every pending task registered under `owner`, across all
    /// contexts. Safe concurrently with new submissions by the same owner;
    /// a racing submission may or may not be included.
    fn cancel_all(&self, owner: OwnerId);
}
