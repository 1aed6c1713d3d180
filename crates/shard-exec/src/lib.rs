//! Shard Exec
//!
//! In-process implementations of the execution-context contracts from
//! `shard-sched`, one per regime:
//!
//! - [`CooperativeExecutor`]: a single tick queue drained on whichever
//!   thread calls [`CooperativeExecutor::tick`] (the embedding main loop),
//!   plus a detached worker pool for non-simulation work.
//! - [`RegionShardedExecutor`]: a global coordinator thread and lazily
//!   spawned per-region threads, each owning its own tick queue; an
//!   entity-affine router that delivers tasks to whichever thread owns the
//!   subject's current region; and a wall-clock worker pool.
//!
//! Both implement [`shard_sched::SchedulerHost`], so a
//! [`shard_sched::SchedulerBuilder`] bound to either behaves identically
//! apart from the regime-specific timing rules the builder applies.
//!
//! Tick advancement is explicit: the embedder calls `tick()` /
//! `advance_tick()` from its loop (or spawns the wall-clock driver). This
//! keeps execution deterministic under test.

mod cooperative;
mod queue;
mod sharded;
mod task;
mod worker;

pub use cooperative::{CooperativeConfig, CooperativeExecutor};
pub use sharded::{RegionShardedConfig, RegionShardedExecutor};
pub use worker::{WorkerPool, WorkerPoolConfig};
