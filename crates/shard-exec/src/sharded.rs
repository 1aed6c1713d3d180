//! The region-sharded executor.
//!
//! Simulation space is partitioned into regions; each region's tasks run on
//! a thread of their own, spawned lazily the first time something targets
//! that region. A global coordinator thread owns everything not tied to a
//! region. Entity-affine tasks are routed each tick to whichever thread
//! owns the subject's current region, so tasks follow entities across
//! ownership migration; a retired subject triggers the job's
//! retired-callback instead, exactly once.
//!
//! Tick advancement is explicit: [`RegionShardedExecutor::advance_tick`]
//! broadcasts the new tick to every context thread and blocks until each
//! has drained its due work, which keeps cross-thread tests deterministic.
//! [`RegionShardedExecutor::spawn_driver`] provides the wall-clock loop for
//! real deployments.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use hashbrown::HashMap;
use parking_lot::Mutex;
use shard_sched::{
    ContextSelector, ExecutionContext, Job, NativeTask, OwnerId, Regime, Schedule, SchedulerHost,
    SubmitError,
};
use shard_world::{Entity, Pose, RealmId, RegionPos, SharedWorld};
use tracing::{debug, trace};

use crate::queue::{QueueItem, TickQueue};
use crate::task::{OwnerRegistry, TaskState};
use crate::worker::{WorkerPool, WorkerPoolConfig};

/// Region-sharded executor sizing.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegionShardedConfig {
    /// Worker pool for detached tasks.
    pub pool: WorkerPoolConfig,
}

type RegionKey = (RealmId, RegionPos);

enum Command {
    /// Enqueue into the thread's tick queue.
    Submit(QueueItem),
    /// Run an already-due entity-affine item now.
    RunEntity(QueueItem),
    /// Drain everything due at or before the tick, then ack.
    Tick(u64, Sender<()>),
    Shutdown,
}

struct ContextThread {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl ContextThread {
    fn spawn(name: String) -> Self {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || context_loop(&rx))
            .expect("failed to spawn context thread");
        Self {
            tx,
            handle: Some(handle),
        }
    }

    fn join(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn context_loop(rx: &Receiver<Command>) {
    let mut queue = TickQueue::new();
    while let Ok(command) = rx.recv() {
        match command {
            Command::Submit(item) => queue.push(item),
            Command::RunEntity(item) => item.run(),
            Command::Tick(now, ack) => {
                for item in queue.pop_due(now) {
                    if item.state.is_cancelled() {
                        continue;
                    }
                    item.run();
                    if let Some(next) = item.next_period(now) {
                        queue.push(next);
                    }
                }
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }
}

struct ShardedInner {
    world: SharedWorld,
    tick: AtomicU64,
    seq: AtomicU64,
    global: Mutex<ContextThread>,
    regions: Mutex<HashMap<RegionKey, ContextThread>>,
    /// Entity-affine items waiting for their due tick, routed on advance.
    entity_tasks: Mutex<TickQueue>,
    pool: WorkerPool,
    registry: OwnerRegistry,
    shutdown: AtomicBool,
}

impl ShardedInner {
    fn region_sender(&self, key: RegionKey) -> Sender<Command> {
        let mut regions = self.regions.lock();
        regions
            .entry(key)
            .or_insert_with(|| {
                debug!(realm = %key.0, x = key.1.x, z = key.1.z, "spawning region thread");
                ContextThread::spawn(format!(
                    "shard-region-{}-{}x{}",
                    key.0.0, key.1.x, key.1.z
                ))
            })
            .tx
            .clone()
    }

    fn make_item(&self, job: Job, entity: Option<Entity>) -> (QueueItem, Arc<TaskState>) {
        let state = TaskState::new(job.owner);
        self.registry.register(&state);
        let now = self.tick.load(Ordering::SeqCst);
        let (due, period) = match job.schedule {
            Schedule::Immediate => (now, None),
            Schedule::Once(delay) => (now + delay.as_ticks(), None),
            Schedule::FixedRate { initial, period } => {
                (now + initial.as_ticks(), Some(period.as_ticks()))
            }
        };
        let item = QueueItem {
            due,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            period,
            entity,
            job: Arc::new(Mutex::new(job)),
            state: state.clone(),
        };
        (item, state)
    }

    /// Advance one tick: route due entity tasks to their owning region
    /// threads, then broadcast the tick and wait for every context thread
    /// to drain.
    fn advance(&self) {
        let now = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(tick = now, "advancing sharded tick");

        let due = self.entity_tasks.lock().pop_due(now);
        for item in due {
            if item.state.is_cancelled() {
                continue;
            }
            let Some(entity) = item.entity else { continue };
            let owner = {
                let world = self.world.read();
                world.realm_of(entity).zip(world.pose(entity))
            };
            match owner {
                None => {
                    // Subject retired before the task came due. The
                    // retired-callback fires here, on the driver thread,
                    // and the item is dropped outright (periodic included).
                    if let Some(retired) = item.job.lock().take_retired() {
                        retired();
                    }
                }
                Some((realm, pose)) => {
                    let key = (realm, RegionPos::of(pose));
                    let _ = self.region_sender(key).send(Command::RunEntity(item.clone()));
                    if let Some(next) = item.next_period(now) {
                        self.entity_tasks.lock().push(next);
                    }
                }
            }
        }

        let mut targets: Vec<Sender<Command>> = vec![self.global.lock().tx.clone()];
        targets.extend(self.regions.lock().values().map(|ct| ct.tx.clone()));

        let (ack_tx, ack_rx) = unbounded();
        let mut expected = 0usize;
        for tx in &targets {
            if tx.send(Command::Tick(now, ack_tx.clone())).is_ok() {
                expected += 1;
            }
        }
        drop(ack_tx);
        for _ in 0..expected {
            // A context thread that died drops its ack sender; recv then
            // errors instead of hanging the driver.
            if ack_rx.recv().is_err() {
                break;
            }
        }
    }

    fn stop(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("sharded executor shutting down");
        self.global.lock().join();
        for context in self.regions.lock().values_mut() {
            context.join();
        }
        self.pool.shutdown();
    }
}

impl Drop for ShardedInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Execution machinery for the region-sharded regime.
pub struct RegionShardedExecutor {
    inner: Arc<ShardedInner>,
}

impl RegionShardedExecutor {
    #[must_use]
    pub fn new(world: SharedWorld, config: RegionShardedConfig) -> Self {
        Self {
            inner: Arc::new(ShardedInner {
                world,
                tick: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                global: Mutex::new(ContextThread::spawn("shard-global".to_string())),
                regions: Mutex::new(HashMap::new()),
                entity_tasks: Mutex::new(TickQueue::new()),
                pool: WorkerPool::new(config.pool),
                registry: OwnerRegistry::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// The current simulation tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::SeqCst)
    }

    /// Advance one tick across every context thread, blocking until all of
    /// them have drained their due work.
    pub fn advance_tick(&self) {
        self.inner.advance();
    }

    /// Advance several ticks back to back.
    pub fn advance_ticks(&self, count: u64) {
        for _ in 0..count {
            self.advance_tick();
        }
    }

    /// Spawn the wall-clock tick driver (one tick per `tick_length`).
    /// Runs until [`RegionShardedExecutor::shutdown`].
    #[must_use]
    pub fn spawn_driver(&self, tick_length: Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        thread::Builder::new()
            .name("shard-driver".to_string())
            .spawn(move || {
                while !inner.shutdown.load(Ordering::SeqCst) {
                    thread::sleep(tick_length);
                    if inner.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    inner.advance();
                }
            })
            .expect("failed to spawn tick driver")
    }

    /// Stop accepting work and join every context thread. Idempotent.
    pub fn shutdown(&self) {
        self.inner.stop();
    }
}

impl SchedulerHost for RegionShardedExecutor {
    fn regime(&self) -> Regime {
        Regime::RegionSharded
    }

    fn context(&self, selector: &ContextSelector) -> Arc<dyn ExecutionContext> {
        match *selector {
            ContextSelector::Global => Arc::new(GlobalContext {
                inner: self.inner.clone(),
            }),
            ContextSelector::Region { realm, pose } => Arc::new(RegionContext {
                inner: self.inner.clone(),
                realm,
                pose,
            }),
            ContextSelector::Entity(entity) => Arc::new(EntityContext {
                inner: self.inner.clone(),
                entity,
            }),
            ContextSelector::Worker => Arc::new(PoolContext {
                inner: self.inner.clone(),
            }),
        }
    }

    fn cancel_all(&self, owner: OwnerId) {
        self.inner.registry.cancel_all(owner);
    }
}

struct GlobalContext {
    inner: Arc<ShardedInner>,
}

impl ExecutionContext for GlobalContext {
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let (item, state) = self.inner.make_item(job, None);
        self.inner
            .global
            .lock()
            .tx
            .send(Command::Submit(item))
            .map_err(|_| SubmitError::Shutdown)?;
        Ok(state)
    }
}

struct RegionContext {
    inner: Arc<ShardedInner>,
    realm: RealmId,
    pose: Pose,
}

impl ExecutionContext for RegionContext {
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let (item, state) = self.inner.make_item(job, None);
        let key = (self.realm, RegionPos::of(self.pose));
        self.inner
            .region_sender(key)
            .send(Command::Submit(item))
            .map_err(|_| SubmitError::Shutdown)?;
        Ok(state)
    }
}

struct EntityContext {
    inner: Arc<ShardedInner>,
    entity: Entity,
}

impl ExecutionContext for EntityContext {
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let (item, state) = self.inner.make_item(job, Some(self.entity));
        self.inner.entity_tasks.lock().push(item);
        Ok(state)
    }
}

struct PoolContext {
    inner: Arc<ShardedInner>,
}

impl ExecutionContext for PoolContext {
    fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
        let state = TaskState::new(job.owner);
        self.inner.registry.register(&state);
        self.inner.pool.submit(job, state.clone())?;
        Ok(state)
    }
}
