//! # Task Scheduling
//!
//! The limiter never sleeps. It hands "run this tick in N ms" to a
//! [`Scheduler`] and returns. Two implementations ship with the crate:
//!
//! ```text
//!     ThreadScheduler                         ClockedExecutor
//!     ┌───────────────────────────┐           ┌───────────────────────────┐
//!     │ min-heap of (due, seq)    │           │ min-heap of (due, seq)    │
//!     │ one "pacer-scheduler"     │           │ no thread: run_for(ms)    │
//!     │ thread waits on a Condvar │           │ advances its own clock    │
//!     │ until the head is due     │           │ and runs what became due  │
//!     └───────────────────────────┘           └───────────────────────────┘
//! ```
//!
//! Tasks that share a due time run in submission order on both.

use super::utils::Clock;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// A unit of work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks now or after a delay.
///
/// Implementations run tasks one at a time, in due order.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once `delay_ms` milliseconds have passed.
    fn schedule(&self, delay_ms: u64, task: Task);

    /// Runs `task` as soon as possible.
    fn execute(&self, task: Task) {
        self.schedule(0, task);
    }
}

/// Shared scheduler handle.
pub type SharedScheduler = Arc<dyn Scheduler>;

struct TimedTask<D> {
    due: D,
    seq: u64,
    task: Task,
}

// BinaryHeap is a max-heap; reverse so the earliest (due, seq) sits on top.
impl<D: Ord> Ord for TimedTask<D> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<D: Ord> PartialOrd for TimedTask<D> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<D: Ord> PartialEq for TimedTask<D> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<D: Ord> Eq for TimedTask<D> {}

fn run_task(task: Task) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Scheduled task panicked: {}", message);
    }
}

struct SchedulerQueue {
    tasks: BinaryHeap<TimedTask<Instant>>,
    next_seq: u64,
    shutdown: bool,
}

struct SchedulerShared {
    queue: Mutex<SchedulerQueue>,
    ready: Condvar,
}

/// A scheduler backed by one named background thread.
///
/// The thread is joined when the scheduler is dropped; tasks still queued at
/// that point are discarded. A task that panics is logged and the thread
/// keeps going.
///
/// # Example
///
/// ```rust
/// use pacer::{Scheduler, ThreadScheduler};
/// use std::sync::mpsc;
///
/// let scheduler = ThreadScheduler::new("example").unwrap();
/// let (tx, rx) = mpsc::channel();
/// scheduler.schedule(5, Box::new(move || tx.send(42).unwrap()));
/// assert_eq!(rx.recv().unwrap(), 42);
/// ```
pub struct ThreadScheduler {
    shared: Arc<SchedulerShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ThreadScheduler {
    /// Spawns the scheduler thread, named `pacer-scheduler-{name}`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn new(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(SchedulerShared {
            queue: Mutex::new(SchedulerQueue {
                tasks: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            ready: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("pacer-scheduler-{}", name))
            .spawn(move || Self::run(worker_shared))?;

        debug!("Started scheduler thread for {}", name);

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn run(shared: Arc<SchedulerShared>) {
        let mut queue = shared.queue.lock();
        loop {
            if queue.shutdown {
                break;
            }

            let now = Instant::now();
            match queue.tasks.peek().map(|head| head.due) {
                None => {
                    shared.ready.wait(&mut queue);
                }
                Some(due) if due > now => {
                    shared.ready.wait_for(&mut queue, due - now);
                }
                Some(_) => {
                    if let Some(timed) = queue.tasks.pop() {
                        drop(queue);
                        run_task(timed.task);
                        queue = shared.queue.lock();
                    }
                }
            }
        }
    }

    /// Number of tasks waiting to run.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let due = Instant::now() + Duration::from_millis(delay_ms);
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.tasks.push(TimedTask { due, seq, task });
        drop(queue);
        self.shared.ready.notify_one();
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.tasks.clear();
        }
        self.shared.ready.notify_all();

        if let Some(worker) = self.worker.take() {
            // The last owner may be a task running on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("queued", &self.queued())
            .finish()
    }
}

struct ClockedState {
    now_ms: u64,
    next_seq: u64,
    tasks: BinaryHeap<TimedTask<u64>>,
}

/// A deterministic clock and scheduler in one.
///
/// Nothing runs until [`run_for`](Self::run_for) is called; time then jumps
/// from task to task, so a test can replay minutes of limiter activity
/// instantly and exactly.
///
/// # Example
///
/// ```rust
/// use pacer::{Clock, ClockedExecutor, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let executor = ClockedExecutor::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// executor.schedule(10, Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// executor.run_for(9);
/// assert!(!fired.load(Ordering::SeqCst));
/// executor.run_for(1);
/// assert!(fired.load(Ordering::SeqCst));
/// assert_eq!(executor.now_ms(), 10);
/// ```
#[derive(Clone)]
pub struct ClockedExecutor {
    state: Arc<Mutex<ClockedState>>,
    executed: Arc<AtomicU64>,
}

impl ClockedExecutor {
    /// Creates an executor whose clock reads zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates an executor whose clock reads `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockedState {
                now_ms,
                next_seq: 0,
                tasks: BinaryHeap::new(),
            })),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advances the clock by `duration_ms`, running every task that falls due
    /// on the way (including tasks those tasks schedule), in due order.
    pub fn run_for(&self, duration_ms: u64) {
        let target = self.state.lock().now_ms.saturating_add(duration_ms);

        loop {
            let task = {
                let mut state = self.state.lock();
                match state.tasks.peek() {
                    Some(head) if head.due <= target => {
                        let due = head.due;
                        state.now_ms = state.now_ms.max(due);
                        state.tasks.pop().map(|timed| timed.task)
                    }
                    _ => {
                        state.now_ms = state.now_ms.max(target);
                        None
                    }
                }
            };

            match task {
                Some(task) => {
                    run_task(task);
                    self.executed.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Tasks run so far.
    pub fn executed_task_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Tasks waiting for their due time.
    pub fn pending_task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

impl Default for ClockedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ClockedExecutor {
    fn now_ms(&self) -> u64 {
        self.state.lock().now_ms
    }
}

impl Scheduler for ClockedExecutor {
    fn schedule(&self, delay_ms: u64, task: Task) {
        let mut state = self.state.lock();
        let due = state.now_ms.saturating_add(delay_ms);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.push(TimedTask { due, seq, task });
    }
}

impl fmt::Debug for ClockedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ClockedExecutor")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.tasks.len())
            .field("executed", &self.executed_task_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |id: u32| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.lock().push(id))
        };
        (log, make)
    }

    #[test]
    fn test_clocked_executor_orders_by_due_then_submission() {
        let executor = ClockedExecutor::new();
        let (log, task) = recorder();

        executor.schedule(5, task(1));
        executor.schedule(1, task(2));
        executor.schedule(5, task(3));
        executor.execute(task(4));

        executor.run_for(0);
        assert_eq!(*log.lock(), vec![4]);

        executor.run_for(10);
        assert_eq!(*log.lock(), vec![4, 2, 1, 3]);
        assert_eq!(executor.executed_task_count(), 4);
        assert_eq!(executor.now_ms(), 10);
    }

    #[test]
    fn test_clocked_executor_runs_nested_tasks_within_window() {
        let executor = ClockedExecutor::new();
        let (log, task) = recorder();

        let inner = executor.clone();
        let nested = task(2);
        executor.schedule(
            2,
            Box::new(move || {
                inner.schedule(3, nested);
            }),
        );
        executor.schedule(10, task(3));

        executor.run_for(5);
        assert_eq!(*log.lock(), vec![2]);
        assert_eq!(executor.pending_task_count(), 1);

        executor.run_for(5);
        assert_eq!(*log.lock(), vec![2, 3]);
    }

    #[test]
    fn test_clocked_executor_survives_panicking_task() {
        let executor = ClockedExecutor::new();
        let (log, task) = recorder();

        executor.execute(Box::new(|| panic!("boom")));
        executor.execute(task(1));
        executor.run_for(0);

        assert_eq!(*log.lock(), vec![1]);
        assert_eq!(executor.executed_task_count(), 2);
    }

    #[test]
    fn test_thread_scheduler_runs_in_due_order() {
        let scheduler = ThreadScheduler::new("test").unwrap();
        let (tx, rx) = mpsc::channel();

        let late = tx.clone();
        scheduler.schedule(40, Box::new(move || late.send(2).unwrap()));
        let early = tx.clone();
        scheduler.schedule(5, Box::new(move || early.send(1).unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }

    #[test]
    fn test_thread_scheduler_keeps_running_after_panic() {
        let scheduler = ThreadScheduler::new("panic").unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.execute(Box::new(|| panic!("boom")));
        scheduler.execute(Box::new(move || tx.send(()).unwrap()));

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_thread_scheduler_drop_discards_pending() {
        let scheduler = ThreadScheduler::new("drop").unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        scheduler.schedule(60_000, Box::new(move || tx.send(()).unwrap()));
        assert_eq!(scheduler.queued(), 1);

        drop(scheduler);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
