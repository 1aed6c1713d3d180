//! The single-threaded cooperative executor.
//!
//! One logical main thread owns all simulation state and drives the tick
//! loop by calling [`CooperativeExecutor::tick`]. Synchronous tasks run
//! inline on that thread in submission order; detached tasks are handed to
//! the worker pool when their (tick-counted) delay elapses, mirroring the
//! legacy scheduler where even detached delays were counted by the main
//! loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use shard_sched::{
    ContextSelector, ExecutionContext, Job, NativeTask, OwnerId, Regime, Schedule, SchedulerHost,
    SubmitError,
};
use tracing::trace;

use crate::queue::{QueueItem, TickQueue};
use crate::task::{OwnerRegistry, TaskState};
use crate::worker::{WorkerPool, WorkerPoolConfig};

/// Cooperative executor sizing.
#[derive(Clone, Copy, Debug, Default)]
pub struct CooperativeConfig {
    /// Worker pool for detached tasks.
    pub pool: WorkerPoolConfig,
}

struct CoopInner {
    queue: Mutex<TickQueue>,
    now: AtomicU64,
    seq: AtomicU64,
    pool: WorkerPool,
    registry: OwnerRegistry,
    shutdown: AtomicBool,
}

/// Execution machinery for the cooperative regime.
///
/// The embedding loop calls [`CooperativeExecutor::tick`] once per
/// simulation tick from the thread that owns the simulation; that call is
/// where all synchronous bodies run.
pub struct CooperativeExecutor {
    inner: Arc<CoopInner>,
}

impl CooperativeExecutor {
    #[must_use]
    pub fn new(config: CooperativeConfig) -> Self {
        Self {
            inner: Arc::new(CoopInner {
                queue: Mutex::new(TickQueue::new()),
                now: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                pool: WorkerPool::new(config.pool),
                registry: OwnerRegistry::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// The current simulation tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.inner.now.load(Ordering::SeqCst)
    }

    /// Advance one tick and run everything that came due.
    ///
    /// Must be called from the single thread that owns simulation state;
    /// synchronous bodies run inline here.
    pub fn tick(&self) {
        let inner = &self.inner;
        let now = inner.now.fetch_add(1, Ordering::SeqCst) + 1;
        let due = inner.queue.lock().pop_due(now);
        trace!(tick = now, due = due.len(), "cooperative tick");
        for item in due {
            if item.state.is_cancelled() {
                continue;
            }
            let synchronized = item.job.lock().synchronized;
            if synchronized {
                item.run();
            } else {
                let detached = item.clone();
                let _ = inner.pool.execute(Box::new(move || detached.run()));
            }
            if let Some(next) = item.next_period(now) {
                inner.queue.lock().push(next);
            }
        }
    }

    /// Stop accepting work and join the worker pool. Pending queue entries
    /// are dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.pool.shutdown();
    }
}

impl SchedulerHost for CooperativeExecutor {
    fn regime(&self) -> Regime {
        Regime::Cooperative
    }

    // Every selector funnels into the one tick queue: the cooperative
    // regime has a single simulation thread, and detached work is
    // distinguished per-job rather than per-context.
    fn context(&self, _selector: &ContextSelector) -> Arc<dyn ExecutionContext> {
        Arc::new(CoopContext {
            inner: self.inner.clone(),
        })
    }

    fn cancel_all(&self, owner: OwnerId) {
        self.inner.registry.cancel_all(owner);
    }
}

struct CoopContext {
    inner: Arc<CoopInner>,
}

impl ExecutionContext for CoopContext {
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let state = TaskState::new(job.owner);
        inner.registry.register(&state);

        // Immediate detached work does not wait for the next tick.
        if matches!(job.schedule, Schedule::Immediate) && !job.synchronized {
            inner.pool.submit(job, state.clone())?;
            return Ok(state);
        }

        let now = inner.now.load(Ordering::SeqCst);
        let (due, period) = match job.schedule {
            Schedule::Immediate => (now, None),
            Schedule::Once(delay) => (now + delay.as_ticks(), None),
            Schedule::FixedRate { initial, period } => {
                (now + initial.as_ticks(), Some(period.as_ticks()))
            }
        };
        inner.queue.lock().push(QueueItem {
            due,
            seq: inner.seq.fetch_add(1, Ordering::SeqCst),
            period,
            entity: None,
            job: Arc::new(Mutex::new(job)),
            state: state.clone(),
        });
        Ok(state)
    }
}
