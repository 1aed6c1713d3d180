//! The detached worker pool.
//!
//! Work submitted here has no access to live simulation state. Delayed and
//! periodic submissions go through a wall-clock timer thread; the pool
//! itself is a plain crossbeam channel drained by a fixed set of threads.

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use shard_sched::{Job, NativeTask, Schedule, SubmitError};
use tracing::debug;

use crate::task::TaskState;

type PoolFn = Box<dyn FnOnce() + Send>;

/// Worker pool sizing.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

struct TimerEntry {
    at: Instant,
    seq: u64,
    period: Option<Duration>,
    job: Arc<Mutex<Job>>,
    state: Arc<TaskState>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed for a min-heap on (due instant, submission order).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

struct TimerShared {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// Fixed pool of detached worker threads plus a wall-clock timer.
pub struct WorkerPool {
    tx: Mutex<Option<Sender<PoolFn>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    timer_shared: Arc<TimerShared>,
    seq: AtomicU64,
}

impl WorkerPool {
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (tx, rx) = unbounded::<PoolFn>();

        let workers = (0..config.workers.max(1))
            .map(|i| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("shard-worker-{i}"))
                    .spawn(move || worker_loop(&rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let timer_shared = Arc::new(TimerShared {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let timer = {
            let shared = timer_shared.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name("shard-timer".to_string())
                .spawn(move || timer_loop(&shared, &tx))
                .expect("failed to spawn timer thread")
        };

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            timer: Mutex::new(Some(timer)),
            timer_shared,
            seq: AtomicU64::new(0),
        }
    }

    /// Hand one closure to the pool immediately.
    pub fn execute(&self, f: PoolFn) -> Result<(), SubmitError> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(f).map_err(|_| SubmitError::Shutdown),
            None => Err(SubmitError::Shutdown),
        }
    }

    /// Submit a job whose schedule is interpreted in wall-clock time.
    ///
    /// Immediate jobs go straight to the pool; delayed and periodic jobs go
    /// through the timer thread.
    pub fn submit(&self, job: Job, state: Arc<TaskState>) -> Result<(), SubmitError> {
        if self.timer_shared.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let schedule = job.schedule;
        let job = Arc::new(Mutex::new(job));
        match schedule {
            Schedule::Immediate => self.execute(dispatch(&job, &state)),
            Schedule::Once(delay) => {
                self.arm(Instant::now() + Duration::from_millis(delay.as_millis()), None, job, state);
                Ok(())
            }
            Schedule::FixedRate { initial, period } => {
                self.arm(
                    Instant::now() + Duration::from_millis(initial.as_millis()),
                    Some(Duration::from_millis(period.as_millis())),
                    job,
                    state,
                );
                Ok(())
            }
        }
    }

    fn arm(&self, at: Instant, period: Option<Duration>, job: Arc<Mutex<Job>>, state: Arc<TaskState>) {
        let entry = TimerEntry {
            at,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            period,
            job,
            state,
        };
        self.timer_shared.heap.lock().push(entry);
        self.timer_shared.wakeup.notify_one();
    }

    /// Stop accepting work and join every thread. Idempotent.
    pub fn shutdown(&self) {
        if self.timer_shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("worker pool shutting down");
        self.timer_shared.wakeup.notify_all();
        if let Some(handle) = self.timer.lock().take() {
            let _ = handle.join();
        }
        // Dropping the sender lets the workers drain and exit.
        self.tx.lock().take();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: &Receiver<PoolFn>) {
    while let Ok(f) = rx.recv() {
        f();
    }
}

fn dispatch(job: &Arc<Mutex<Job>>, state: &Arc<TaskState>) -> PoolFn {
    let job = job.clone();
    let state = state.clone();
    Box::new(move || {
        if state.is_cancelled() {
            return;
        }
        let native: Arc<dyn NativeTask> = state.clone();
        job.lock().run(&native);
    })
}

fn timer_loop(shared: &TimerShared, tx: &Sender<PoolFn>) {
    let mut heap = shared.heap.lock();
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        match heap.peek() {
            None => {
                shared.wakeup.wait(&mut heap);
            }
            Some(entry) if entry.at > now => {
                let at = entry.at;
                let _ = shared.wakeup.wait_until(&mut heap, at);
            }
            Some(_) => {
                let Some(entry) = heap.pop() else { continue };
                if entry.state.is_cancelled() {
                    continue;
                }
                if tx.send(dispatch(&entry.job, &entry.state)).is_err() {
                    return;
                }
                if let Some(period) = entry.period {
                    heap.push(TimerEntry {
                        at: entry.at + period,
                        seq: entry.seq,
                        period: entry.period,
                        job: entry.job,
                        state: entry.state,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use shard_sched::{Delay, OwnerId, TaskBody};

    use super::*;

    fn plain_job(schedule: Schedule, f: impl FnMut() + Send + 'static) -> Job {
        Job::new(OwnerId(0), schedule, false, TaskBody::Plain(Box::new(f)))
    }

    #[test]
    fn test_immediate_job_runs() {
        let pool = WorkerPool::new(WorkerPoolConfig { workers: 2 });
        let (done_tx, done_rx) = unbounded();
        let state = TaskState::new(OwnerId(0));
        pool.submit(
            plain_job(Schedule::Immediate, move || {
                let _ = done_tx.send(());
            }),
            state,
        )
        .unwrap();
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_delayed_job_waits() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let (done_tx, done_rx) = unbounded();
        let state = TaskState::new(OwnerId(0));
        let started = Instant::now();
        pool.submit(
            plain_job(Schedule::Once(Delay::Millis(50)), move || {
                let _ = done_tx.send(Instant::now());
            }),
            state,
        )
        .unwrap();
        let fired = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired.duration_since(started) >= Duration::from_millis(50));
    }

    #[test]
    fn test_periodic_job_stops_after_cancel() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let runs = Arc::new(AtomicU32::new(0));
        let state = TaskState::new(OwnerId(0));
        let (hit_tx, hit_rx) = unbounded();
        {
            let runs = runs.clone();
            pool.submit(
                plain_job(
                    Schedule::FixedRate {
                        initial: Delay::Millis(5),
                        period: Delay::Millis(5),
                    },
                    move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = hit_tx.send(());
                    },
                ),
                state.clone(),
            )
            .unwrap();
        }
        // Let it fire a few times, then cancel and ensure it settles.
        for _ in 0..3 {
            let _ = hit_rx.recv_timeout(Duration::from_secs(2));
        }
        state.cancel();
        thread::sleep(Duration::from_millis(50));
        let settled = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        pool.shutdown();
        let state = TaskState::new(OwnerId(0));
        let result = pool.submit(plain_job(Schedule::Immediate, || {}), state);
        assert!(matches!(result, Err(SubmitError::Shutdown)));
    }
}
