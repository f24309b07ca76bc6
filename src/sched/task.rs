//! Stored tasks, the drive outcome, and the per-task scheduler context.

use super::Scheduler;
use crate::error::{Error, Result};
use crate::types::{TaskId, Time, WaitKey};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Wake;
use std::time::Duration;

/// The type-erased future stored for each task.
///
/// Deliberately not `Send`: the scheduling model is strictly
/// single-threaded cooperative multitasking.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Result<Vec<Value>>>>>;

/// Bookkeeping for one stored task.
pub(crate) struct TaskSlot {
    /// Optional diagnostic name; logs render it next to the task counter.
    pub(crate) name: Option<String>,
    /// The stored future. Taken out while the task is being polled, so a
    /// reentrant drive can detect "already running" and defer.
    pub(crate) future: Option<TaskFuture>,
    /// Values published by `yield_values` for the current drive cycle.
    pub(crate) yielded: Option<Vec<Value>>,
    /// Set by the halt primitive; the scheduler discards the task.
    pub(crate) halted: bool,
    /// A wake arrived while the task was being polled.
    pub(crate) wake_pending: bool,
}

impl TaskSlot {
    pub(crate) fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(ToOwned::to_owned),
            future: None,
            yielded: None,
            halted: false,
            wake_pending: false,
        }
    }
}

/// What one drive cycle of a task produced.
///
/// The spawning caller sees this synchronously: async functions start
/// executing eagerly and only become suspended at their first blocking
/// primitive.
#[derive(Debug)]
pub enum Drive {
    /// The task ran to completion; these are its final results.
    Done(Vec<Value>),
    /// The task published intermediate values with `yield_values` and is
    /// rescheduled for the next tick.
    Yielded(Vec<Value>),
    /// The task parked on a blocking primitive.
    Suspended,
    /// The task halted itself; it has been discarded.
    Halted,
    /// The task panicked or returned an error; it has been discarded.
    Faulted(Error),
}

/// The ready queue shared between the scheduler and task wakers.
///
/// Wakers must be `Send + Sync`, so this is the one piece of scheduler
/// state behind a lock even though all scheduling happens on one thread.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    pub(crate) fn push(&self, task: TaskId) {
        let mut queue = self.queue.lock();
        if !queue.contains(&task) {
            queue.push_back(task);
        }
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }
}

/// Wakes a task by pushing it onto the ready queue.
pub(crate) struct TaskWaker {
    pub(crate) task: TaskId,
    pub(crate) ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.task);
    }
}

/// The scheduler context handed to every task body.
///
/// All blocking primitives flow through this handle; ordinary function
/// calls never suspend. Cloning is cheap and clones refer to the same
/// task.
#[derive(Clone)]
pub struct TaskCx {
    sched: Scheduler,
    task: TaskId,
}

impl TaskCx {
    pub(crate) const fn new(sched: Scheduler, task: TaskId) -> Self {
        Self { sched, task }
    }

    /// Returns the task's own identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task
    }

    /// Returns the scheduler driving this task.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// Returns the current time from the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.sched.now()
    }

    /// Parks the task until at least `duration` has elapsed; resumption
    /// happens on the first tick at or after the deadline.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> super::Sleep {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.sleep_until(self.sched.now().saturating_add_millis(millis))
    }

    /// Parks the task until the clock reads at least `deadline`.
    #[must_use]
    pub fn sleep_until(&self, deadline: Time) -> super::Sleep {
        super::Sleep::new(self.sched.clone(), self.task, deadline)
    }

    /// Parks the task until `resume` delivers under `key`, or until
    /// `timeout` elapses. Resolves to `Some(args)` on delivery and `None`
    /// on timeout. Without a timeout the wait is unbounded.
    #[must_use]
    pub fn wait(&self, key: WaitKey, timeout: Option<Duration>) -> super::Wait {
        super::Wait::new(self.sched.clone(), self.task, key, timeout)
    }

    /// Declares intent to wait on `key` before actually suspending.
    ///
    /// If `resume(key, args)` fires before the task reaches its `wait`,
    /// the delivery is parked in the prewaited map and the later `wait`
    /// returns it immediately instead of losing it.
    pub fn prewait(&self, key: WaitKey) {
        self.sched.prewait(self.task, key);
    }

    /// Parks the task until at least `n + 1` further scheduler ticks have
    /// elapsed.
    #[must_use]
    pub fn cycle(&self, n: u64) -> super::Cycle {
        super::Cycle::new(self.sched.clone(), self.task, n)
    }

    /// Publishes `values` to the caller of the current drive cycle and
    /// reschedules the task for the next tick.
    #[must_use]
    pub fn yield_values(&self, values: Vec<Value>) -> super::YieldNow {
        super::YieldNow::new(self.sched.clone(), self.task, values)
    }

    /// Parks the task permanently; the scheduler discards it.
    #[must_use]
    pub fn halt(&self) -> super::Halt {
        super::Halt::new(self.sched.clone(), self.task)
    }

    /// Delivers `args` to every callback registered under `key`; see
    /// [`Scheduler::resume`].
    pub fn resume(&self, key: &WaitKey, args: Vec<Value>) -> usize {
        self.sched.resume(key, args)
    }
}

impl core::fmt::Debug for TaskCx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TaskCx({})", self.task)
    }
}
