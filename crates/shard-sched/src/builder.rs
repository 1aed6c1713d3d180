//! The scheduler builder.

use std::sync::Arc;

use shard_world::{Entity, Pose, RealmId};
use tracing::debug;

use crate::{
    ContextSelector, Delay, Job, OwnerId, Regime, Schedule, SchedulerError, SchedulerHost,
    TICK_MILLIS, TaskBody, TaskHandle, Ticks,
};

/// The affinity target a synchronous task executes relative to.
///
/// At most one target is set; setting one clears the others, and switching
/// to detached execution clears affinity entirely, so the mutual-exclusivity
/// invariant holds by construction.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Affinity {
    /// No affinity: the global coordinator (or the cooperative main thread).
    #[default]
    None,
    /// A spatial location; the owning region's thread.
    Location { realm: RealmId, pose: Pose },
    /// A live entity; the thread owning whatever region contains it.
    Entity(Entity),
}

/// Fluent configuration for one task submission.
///
/// Accumulates a body, an affinity target, a synchronous-or-detached flag
/// and optional delay/period, then `run()` resolves the execution context
/// for the host's regime, normalizes timing units and submits.
///
/// A builder is consumed exactly once by [`SchedulerBuilder::run`].
pub struct SchedulerBuilder {
    owner: OwnerId,
    host: Arc<dyn SchedulerHost>,
    synchronous: bool,
    affinity: Affinity,
    delay: Option<Ticks>,
    period: Option<Ticks>,
    body: Option<TaskBody>,
    retired: Option<Box<dyn FnOnce() + Send>>,
}

impl SchedulerBuilder {
    /// Start configuring a task owned by `owner` against `host`.
    ///
    /// Tasks default to synchronous execution with no affinity.
    #[must_use]
    pub fn new(owner: OwnerId, host: Arc<dyn SchedulerHost>) -> Self {
        Self {
            owner,
            host,
            synchronous: true,
            affinity: Affinity::None,
            delay: None,
            period: None,
            body: None,
            retired: None,
        }
    }

    /// Run under the main-thread-equivalent context for no particular
    /// target (global coordinator / cooperative main thread).
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    /// Run synchronously on the thread owning the region containing the
    /// given location.
    #[must_use]
    pub fn at_location(mut self, realm: RealmId, pose: Pose) -> Self {
        self.synchronous = true;
        self.affinity = Affinity::Location { realm, pose };
        self
    }

    /// Run synchronously on the thread owning the given entity. The task
    /// follows the entity across ownership migration.
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.synchronous = true;
        self.affinity = Affinity::Entity(entity);
        self
    }

    /// Run on the detached worker pool.
    ///
    /// Detached tasks have no access to live simulation state; affinity is
    /// cleared, since a detached task cannot combine with a spatial or
    /// entity target.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.synchronous = false;
        self.affinity = Affinity::None;
        self
    }

    /// Set the task body.
    #[must_use]
    pub fn task(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.body = Some(TaskBody::Plain(Box::new(f)));
        self
    }

    /// Set a task body that receives its own [`TaskHandle`], so a repeating
    /// task can cancel itself.
    ///
    /// Under the cooperative regime this form exposes the handle only to
    /// the body itself: `run()` returns `Ok(None)`, mirroring the legacy
    /// scheduler surface. Callers needing external cancellation should use
    /// [`SchedulerBuilder::task`].
    #[must_use]
    pub fn task_with_handle(mut self, f: impl FnMut(&TaskHandle) + Send + 'static) -> Self {
        self.body = Some(TaskBody::WithHandle(Box::new(f)));
        self
    }

    /// Initial delay in ticks before the first execution. Absent means
    /// "immediate", which is distinct from a delay of zero.
    #[must_use]
    pub fn delay_ticks(mut self, delay: Ticks) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Period in ticks between consecutive executions.
    #[must_use]
    pub fn period_ticks(mut self, period: Ticks) -> Self {
        self.period = Some(period);
        self
    }

    /// Callback run instead of the body if an entity-affine task's subject
    /// is retired before execution. Meaningful only with
    /// [`SchedulerBuilder::with_entity`]; ignored by other contexts.
    #[must_use]
    pub fn when_retired(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.retired = Some(Box::new(f));
        self
    }

    /// Cancel every pending task this builder's owner has submitted to the
    /// host, across all contexts.
    pub fn cancel_owned(&self) {
        self.host.cancel_all(self.owner);
    }

    /// Build and submit the task.
    ///
    /// Returns `Ok(None)` for the cooperative handle-parameterized path
    /// (see [`SchedulerBuilder::task_with_handle`]); otherwise a
    /// [`TaskHandle`]. Fails eagerly with [`SchedulerError::MissingBody`]
    /// when no body was set; submission failures propagate unchanged.
    pub fn run(mut self) -> Result<Option<TaskHandle>, SchedulerError> {
        let body = self.body.take().ok_or(SchedulerError::MissingBody)?;
        let regime = self.host.regime();
        let (selector, synchronized) = self.select(regime);
        let schedule = self.normalized(regime, selector);
        let repeating = schedule.is_repeating();
        let handleless = regime == Regime::Cooperative && body.wants_handle();

        let mut job = Job::new(self.owner, schedule, synchronized, body);
        if let Some(retired) = self.retired.take() {
            job.set_retired(retired);
        }

        debug!(owner = %self.owner, ?selector, ?schedule, "submitting task");
        let native = self.host.context(&selector).submit(job)?;

        if handleless {
            return Ok(None);
        }
        Ok(Some(TaskHandle::from_parts(
            native,
            self.owner,
            repeating,
            synchronized,
        )))
    }

    /// Context family from (regime, synchronous, affinity), plus the
    /// `synchronized` classification bit it implies.
    fn select(&self, regime: Regime) -> (ContextSelector, bool) {
        match regime {
            // The cooperative regime has exactly one simulation thread;
            // affinity adds nothing there.
            Regime::Cooperative => {
                if self.synchronous {
                    (ContextSelector::Global, true)
                } else {
                    (ContextSelector::Worker, false)
                }
            }
            Regime::RegionSharded => {
                if !self.synchronous {
                    (ContextSelector::Worker, false)
                } else {
                    match self.affinity {
                        Affinity::Entity(entity) => (ContextSelector::Entity(entity), true),
                        Affinity::Location { realm, pose } => {
                            (ContextSelector::Region { realm, pose }, true)
                        }
                        Affinity::None => (ContextSelector::Global, true),
                    }
                }
            }
        }
    }

    /// Normalize delay/period for the target context.
    ///
    /// Region-sharded contexts cannot schedule below one tick, so anything
    /// smaller clamps up to exactly one; the cooperative regime preserves
    /// zero as "run as soon as possible". The region-sharded worker pool is
    /// not tick-driven, so its delays convert to wall-clock milliseconds.
    fn normalized(&self, regime: Regime, selector: ContextSelector) -> Schedule {
        let clamp = |t: Ticks| {
            if regime == Regime::RegionSharded && t < 1 {
                1
            } else {
                t
            }
        };
        let wall_clock =
            regime == Regime::RegionSharded && matches!(selector, ContextSelector::Worker);
        let delay = |t: Ticks| {
            if wall_clock {
                Delay::Millis(t * TICK_MILLIS)
            } else {
                Delay::Ticks(t)
            }
        };

        match (self.delay, self.period) {
            (None, None) => Schedule::Immediate,
            (Some(d), None) => Schedule::Once(delay(clamp(d))),
            (Some(d), Some(p)) => Schedule::FixedRate {
                initial: delay(clamp(d)),
                period: delay(clamp(p)),
            },
            // Period without an initial delay: first run after one period.
            (None, Some(p)) => {
                let p = clamp(p);
                Schedule::FixedRate {
                    initial: delay(p),
                    period: delay(p),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{ExecutionContext, NativeTask, SubmitError};

    const OWNER: OwnerId = OwnerId(7);
    const REALM: RealmId = RealmId(0);

    #[derive(Default)]
    struct StubNative {
        cancelled: AtomicBool,
    }

    impl NativeTask for StubNative {
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    struct Recorded {
        selector: ContextSelector,
        schedule: Schedule,
        synchronized: bool,
        repeating: bool,
    }

    struct MockHost {
        regime: Regime,
        recorded: Arc<Mutex<Vec<Recorded>>>,
        cancelled_owners: Arc<Mutex<Vec<OwnerId>>>,
    }

    struct MockContext {
        selector: ContextSelector,
        recorded: Arc<Mutex<Vec<Recorded>>>,
    }

    impl ExecutionContext for MockContext {
        fn submit(&self, job: Job) -> Result<Arc<dyn NativeTask>, SubmitError> {
            self.recorded.lock().push(Recorded {
                selector: self.selector,
                schedule: job.schedule,
                synchronized: job.synchronized,
                repeating: job.repeating,
            });
            Ok(Arc::new(StubNative::default()))
        }
    }

    impl SchedulerHost for MockHost {
        fn regime(&self) -> Regime {
            self.regime
        }

        fn context(&self, selector: &ContextSelector) -> Arc<dyn ExecutionContext> {
            Arc::new(MockContext {
                selector: *selector,
                recorded: self.recorded.clone(),
            })
        }

        fn cancel_all(&self, owner: OwnerId) {
            self.cancelled_owners.lock().push(owner);
        }
    }

    fn host(regime: Regime) -> Arc<MockHost> {
        Arc::new(MockHost {
            regime,
            recorded: Arc::new(Mutex::new(Vec::new())),
            cancelled_owners: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn builder(host: &Arc<MockHost>) -> SchedulerBuilder {
        let dyn_host: Arc<dyn SchedulerHost> = host.clone();
        SchedulerBuilder::new(OWNER, dyn_host)
    }

    #[test]
    fn test_missing_body_fails_eagerly() {
        let host = host(Regime::RegionSharded);
        let result = builder(&host).delay_ticks(5).run();
        assert!(matches!(result, Err(SchedulerError::MissingBody)));
        assert!(host.recorded.lock().is_empty(), "nothing may be scheduled");
    }

    #[test]
    fn test_cooperative_preserves_zero_delay() {
        let host = host(Regime::Cooperative);
        builder(&host).delay_ticks(0).task(|| {}).run().unwrap();
        let recorded = host.recorded.lock();
        assert_eq!(recorded[0].schedule, Schedule::Once(Delay::Ticks(0)));
        assert_eq!(recorded[0].selector, ContextSelector::Global);
    }

    #[test]
    fn test_sharded_clamps_subtick_delay() {
        let host = host(Regime::RegionSharded);
        let handle = builder(&host)
            .at_location(REALM, Pose::at(100.0, 64.0, 100.0))
            .delay_ticks(0)
            .task(|| {})
            .run()
            .unwrap()
            .unwrap();
        let recorded = host.recorded.lock();
        assert_eq!(recorded[0].schedule, Schedule::Once(Delay::Ticks(1)));
        assert!(matches!(recorded[0].selector, ContextSelector::Region { .. }));
        assert!(!handle.is_repeating());
        assert!(handle.is_synchronized());
    }

    #[test]
    fn test_sharded_clamps_subtick_period() {
        let host = host(Regime::RegionSharded);
        builder(&host)
            .delay_ticks(0)
            .period_ticks(0)
            .task(|| {})
            .run()
            .unwrap();
        assert_eq!(
            host.recorded.lock()[0].schedule,
            Schedule::FixedRate {
                initial: Delay::Ticks(1),
                period: Delay::Ticks(1),
            }
        );
    }

    #[test]
    fn test_sharded_detached_uses_wall_clock() {
        let host = host(Regime::RegionSharded);
        let handle = builder(&host)
            .detached()
            .delay_ticks(20)
            .task(|| {})
            .run()
            .unwrap()
            .unwrap();
        let recorded = host.recorded.lock();
        assert_eq!(recorded[0].selector, ContextSelector::Worker);
        assert_eq!(recorded[0].schedule, Schedule::Once(Delay::Millis(1000)));
        assert!(!recorded[0].synchronized);
        assert!(!handle.is_synchronized());
        assert_eq!(handle.owner(), OWNER);
    }

    #[test]
    fn test_cooperative_detached_stays_tick_counted() {
        let host = host(Regime::Cooperative);
        builder(&host).detached().delay_ticks(20).task(|| {}).run().unwrap();
        assert_eq!(
            host.recorded.lock()[0].schedule,
            Schedule::Once(Delay::Ticks(20))
        );
    }

    #[test]
    fn test_entity_affinity_selects_entity_context() {
        let host = host(Regime::RegionSharded);
        let entity = shard_world::Entity::from_bits(42);
        builder(&host).with_entity(entity).task(|| {}).run().unwrap();
        assert_eq!(host.recorded.lock()[0].selector, ContextSelector::Entity(entity));
    }

    #[test]
    fn test_detached_clears_affinity() {
        let host = host(Regime::RegionSharded);
        let entity = shard_world::Entity::from_bits(42);
        builder(&host)
            .with_entity(entity)
            .detached()
            .task(|| {})
            .run()
            .unwrap();
        assert_eq!(host.recorded.lock()[0].selector, ContextSelector::Worker);
    }

    #[test]
    fn test_cooperative_affinity_collapses_to_main_thread() {
        let host = host(Regime::Cooperative);
        let entity = shard_world::Entity::from_bits(9);
        builder(&host).with_entity(entity).task(|| {}).run().unwrap();
        assert_eq!(host.recorded.lock()[0].selector, ContextSelector::Global);
    }

    #[test]
    fn test_cooperative_consumer_body_returns_no_handle() {
        let host = host(Regime::Cooperative);
        let result = builder(&host).task_with_handle(|_| {}).run().unwrap();
        assert!(result.is_none());
        assert_eq!(host.recorded.lock().len(), 1, "task is still submitted");

        let host = host_sharded_consumer();
        let result = builder(&host).task_with_handle(|_| {}).run().unwrap();
        assert!(result.is_some(), "region-sharded consumer form keeps its handle");
    }

    fn host_sharded_consumer() -> Arc<MockHost> {
        host(Regime::RegionSharded)
    }

    #[test]
    fn test_period_without_delay_repeats() {
        let host = host(Regime::Cooperative);
        let handle = builder(&host).period_ticks(3).task(|| {}).run().unwrap().unwrap();
        assert!(handle.is_repeating());
        assert_eq!(
            host.recorded.lock()[0].schedule,
            Schedule::FixedRate {
                initial: Delay::Ticks(3),
                period: Delay::Ticks(3),
            }
        );
    }

    #[test]
    fn test_cancel_owned_reaches_host() {
        let host = host(Regime::RegionSharded);
        builder(&host).cancel_owned();
        assert_eq!(host.cancelled_owners.lock().as_slice(), &[OWNER]);
    }
}
