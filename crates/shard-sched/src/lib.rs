//! Shard Sched
//!
//! One task-scheduling surface that behaves correctly under two mutually
//! incompatible server concurrency models:
//!
//! - **Cooperative**: one thread owns all simulation state and drives a
//!   tick loop; a detached worker pool exists for non-simulation work.
//! - **Region-sharded**: simulation space is partitioned into regions, each
//!   owned by its own thread, plus a global coordinator thread and a
//!   detached worker pool.
//!
//! Callers describe a task once through [`SchedulerBuilder`] — body,
//! affinity, synchronous-or-detached, optional delay and period — and the
//! builder resolves the correct execution context for the active regime,
//! normalizes timing units, and returns a [`TaskHandle`] for cancellation.
//!
//! The execution machinery itself sits behind the [`SchedulerHost`] and
//! [`ExecutionContext`] traits; `shard-exec` provides in-process
//! implementations of both regimes.
//!
//! # Example
//!
//! ```ignore
//! let handle = SchedulerBuilder::new(owner, host)
//!     .with_entity(creeper)
//!     .delay_ticks(20)
//!     .task(|| explode())
//!     .run()?;
//! ```

mod builder;
mod context;
mod error;
mod handle;
pub mod regime;
mod time;

pub use builder::{Affinity, SchedulerBuilder};
pub use context::{
    ContextSelector, ExecutionContext, Job, NativeTask, OwnerId, SchedulerHost, TaskBody,
};
pub use error::{SchedulerError, SubmitError};
pub use handle::TaskHandle;
pub use regime::Regime;
pub use time::{Delay, Schedule, TICK_MILLIS, Ticks};
