//! The cooperative task scheduler.
//!
//! One scheduler drives all tasks of one instance on one thread. A task
//! runs until it suspends on a blocking primitive; between suspension
//! points its code is atomic with respect to every other task. The
//! scheduler owns four registries — stored tasks, pollables, callback
//! registrations, and the prewait/prewaited maps — all of them fields of
//! this object so that independent schedulers stay test-isolable.
//!
//! The drive loop polls a stored future once per wake. A panic or error is
//! fatal to that task only: it is logged and the task dropped, with no
//! restart policy and no propagation to other tasks.

use super::config::{SchedulerConfig, SchedulerStats};
use super::task::{Drive, ReadyQueue, TaskCx, TaskFuture, TaskSlot, TaskWaker};
use super::wait::{CallbackId, CallbackReg, PollId, Pollable, SlotState, WakeRule};
use crate::error::Error;
use crate::host::Clock;
use crate::types::{TaskId, Time, WaitKey};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{debug, trace, warn};

#[derive(Default)]
struct StatCells {
    spawned: Cell<u64>,
    completed: Cell<u64>,
    faulted: Cell<u64>,
    ticks: Cell<u64>,
    pollables_fired: Cell<u64>,
    callbacks_fired: Cell<u64>,
}

fn bump(cell: &Cell<u64>) {
    cell.set(cell.get() + 1);
}

struct Inner {
    clock: Rc<dyn Clock>,
    config: SchedulerConfig,
    next_task: Cell<u64>,
    next_poll: Cell<u64>,
    next_callback: Cell<u64>,
    tasks: RefCell<HashMap<TaskId, TaskSlot>>,
    ready: Arc<ReadyQueue>,
    pollables: RefCell<Vec<Pollable>>,
    callbacks: RefCell<HashMap<WaitKey, Vec<CallbackReg>>>,
    prewait: RefCell<HashMap<WaitKey, Vec<TaskId>>>,
    prewaited: RefCell<HashMap<(TaskId, WaitKey), Vec<Value>>>,
    ticks: Cell<u64>,
    poller_live: Cell<bool>,
    draining: Cell<bool>,
    stats: StatCells,
}

/// A single-threaded cooperative scheduler.
///
/// Cheap to clone; clones share the same state. Deliberately `!Send` — the
/// single-threaded assumption is load-bearing for every ordering guarantee
/// this type makes.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler over the given clock with default configuration.
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    /// Creates a scheduler over the given clock and configuration.
    #[must_use]
    pub fn with_config(clock: Rc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                clock,
                config,
                next_task: Cell::new(1),
                next_poll: Cell::new(1),
                next_callback: Cell::new(1),
                tasks: RefCell::new(HashMap::new()),
                ready: Arc::new(ReadyQueue::default()),
                pollables: RefCell::new(Vec::new()),
                callbacks: RefCell::new(HashMap::new()),
                prewait: RefCell::new(HashMap::new()),
                prewaited: RefCell::new(HashMap::new()),
                ticks: Cell::new(0),
                poller_live: Cell::new(false),
                draining: Cell::new(false),
                stats: StatCells::default(),
            }),
        }
    }

    /// Returns the current time from the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.clock.now()
    }

    /// Returns the number of ticks processed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }

    /// Returns true while the poller has live pollable entries to scan.
    ///
    /// The poller starts lazily on the first registration and stops itself
    /// once a pass leaves the registry empty.
    #[must_use]
    pub fn poller_active(&self) -> bool {
        self.inner.poller_live.get()
    }

    /// Returns the number of stored (live) tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Returns the number of live pollable entries.
    #[must_use]
    pub fn pollable_count(&self) -> usize {
        self.inner.pollables.borrow().len()
    }

    /// Returns the number of live callback registrations across all keys.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.borrow().values().map(Vec::len).sum()
    }

    /// Returns true when nothing is ready to run and nothing is being
    /// polled for. Tasks parked on bare callback registrations do not
    /// count: they cost nothing until someone resumes their key.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.ready.is_empty() && self.inner.pollables.borrow().is_empty()
    }

    /// Returns a snapshot of the scheduler's counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let s = &self.inner.stats;
        SchedulerStats {
            spawned: s.spawned.get(),
            completed: s.completed.get(),
            faulted: s.faulted.get(),
            ticks: s.ticks.get(),
            pollables_fired: s.pollables_fired.get(),
            callbacks_fired: s.callbacks_fired.get(),
        }
    }

    /// Spawns `f` as a task and drives it synchronously to its first
    /// suspension point or completion.
    ///
    /// The returned [`Drive`] tells the caller how far the task got:
    /// `Done` with its results, `Yielded` with intermediate values, or
    /// `Suspended`. A task that suspends delivers any eventual result only
    /// through a correlation key — there is no future object to hold on
    /// to.
    pub fn spawn<F, Fut>(&self, name: Option<&str>, f: F) -> (TaskId, Drive)
    where
        F: FnOnce(TaskCx) -> Fut,
        Fut: Future<Output = crate::error::Result<Vec<Value>>> + 'static,
    {
        let id = TaskId::new(self.inner.next_task.get());
        self.inner.next_task.set(id.raw() + 1);

        if let Some(limit) = self.inner.config.task_soft_limit() {
            let live = self.inner.tasks.borrow().len();
            if live >= limit {
                warn!(live, limit, "task soft limit exceeded; possible leak");
            }
        }

        let cx = TaskCx::new(self.clone(), id);
        let future: TaskFuture = Box::pin(f(cx));
        let mut slot = TaskSlot::new(name);
        slot.future = Some(future);
        self.inner.tasks.borrow_mut().insert(id, slot);
        bump(&self.inner.stats.spawned);
        trace!(task = %id, name = name.unwrap_or(""), "task spawned");

        let outcome = self.drive(id);
        self.drain_ready();
        (id, outcome)
    }

    /// Delivers `args` to every callback registered under `key`, in
    /// registration order, removing each registration as it fires. Sibling
    /// timeout pollables are cancelled. Returns the number of callbacks
    /// fired.
    ///
    /// If nothing fired but tasks declared prewait interest in `key`, the
    /// delivery is stored for each still-alive declarer so its later wait
    /// returns immediately; prewait deliveries do not count toward the
    /// return value. Callers use the zero return to detect "nobody was
    /// listening yet".
    pub fn resume(&self, key: &WaitKey, args: Vec<Value>) -> usize {
        let regs = self.inner.callbacks.borrow_mut().remove(key).unwrap_or_default();
        let mut fired = 0usize;
        for reg in regs {
            let delivered = {
                let mut slot = reg.slot.borrow_mut();
                if matches!(*slot, SlotState::Waiting) {
                    *slot = SlotState::Delivered(args.clone());
                    true
                } else {
                    false
                }
            };
            if delivered {
                if let Some(sibling) = reg.sibling {
                    self.remove_pollable(sibling);
                }
                self.inner.ready.push(reg.task);
                bump(&self.inner.stats.callbacks_fired);
                fired += 1;
            }
        }

        if fired == 0 {
            if let Some(declared) = self.inner.prewait.borrow_mut().remove(key) {
                for task in declared {
                    // Skip tasks that already finished, to bound memory.
                    if self.task_alive(task) {
                        trace!(%key, %task, "delivery parked for prewaiting task");
                        self.inner
                            .prewaited
                            .borrow_mut()
                            .insert((task, key.clone()), args.clone());
                    }
                }
            }
        } else {
            debug!(%key, fired, "resumed waiters");
        }

        self.drain_ready();
        fired
    }

    /// Processes one host tick: drains the ready queue, then runs the
    /// poller pass if any pollables are live.
    pub fn tick(&self) {
        let tick = self.inner.ticks.get() + 1;
        self.inner.ticks.set(tick);
        bump(&self.inner.stats.ticks);
        self.drain_ready();
        if self.inner.poller_live.get() {
            self.poll_pass();
        }
    }

    /// Tears the scheduler down: every stored task is dropped and all
    /// registries are cleared. Pending tasks are lost, matching the
    /// host-reload semantics this models.
    pub fn shutdown(&self) {
        // Drop futures first: their Drop impls deregister waits and need
        // the registries intact while they run.
        let futures: Vec<TaskFuture> = {
            let mut tasks = self.inner.tasks.borrow_mut();
            tasks.drain().filter_map(|(_, slot)| slot.future).collect()
        };
        drop(futures);
        self.inner.pollables.borrow_mut().clear();
        self.inner.callbacks.borrow_mut().clear();
        self.inner.prewait.borrow_mut().clear();
        self.inner.prewaited.borrow_mut().clear();
        self.inner.ready.clear();
        self.inner.poller_live.set(false);
        debug!("scheduler shut down");
    }

    // ------------------------------------------------------------------
    // Drive loop
    // ------------------------------------------------------------------

    pub(crate) fn drive(&self, task: TaskId) -> Drive {
        let (mut future, name) = {
            let mut tasks = self.inner.tasks.borrow_mut();
            match tasks.get_mut(&task) {
                // Stale wake for a finished task.
                None => return Drive::Suspended,
                Some(slot) => match slot.future.take() {
                    // Already being polled higher on the stack; re-queue
                    // once that poll returns.
                    None => {
                        slot.wake_pending = true;
                        return Drive::Suspended;
                    }
                    Some(future) => (future, slot.name.clone()),
                },
            }
        };
        let name = name.as_deref().unwrap_or("");

        let waker = Waker::from(Arc::new(TaskWaker {
            task,
            ready: self.inner.ready_handle(),
        }));
        let mut cx = Context::from_waker(&waker);
        let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

        match polled {
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%task, name, %message, "task panicked; dropping it");
                self.inner.tasks.borrow_mut().remove(&task);
                bump(&self.inner.stats.faulted);
                Drive::Faulted(Error::TaskFault { task, message })
            }
            Ok(Poll::Ready(Ok(values))) => {
                trace!(%task, name, "task completed");
                self.inner.tasks.borrow_mut().remove(&task);
                bump(&self.inner.stats.completed);
                Drive::Done(values)
            }
            Ok(Poll::Ready(Err(error))) => {
                warn!(%task, name, %error, "task failed; dropping it");
                self.inner.tasks.borrow_mut().remove(&task);
                bump(&self.inner.stats.faulted);
                Drive::Faulted(error)
            }
            Ok(Poll::Pending) => {
                let (halted, yielded, wake) = {
                    let mut tasks = self.inner.tasks.borrow_mut();
                    let Some(slot) = tasks.get_mut(&task) else {
                        return Drive::Suspended;
                    };
                    if slot.halted {
                        (true, None, false)
                    } else {
                        let yielded = slot.yielded.take();
                        let wake = std::mem::take(&mut slot.wake_pending);
                        slot.future = Some(future);
                        (false, yielded, wake)
                    }
                };
                if halted {
                    self.inner.tasks.borrow_mut().remove(&task);
                    // `future` still holds the halted body; it drops after
                    // the table borrow is released, which runs any wait
                    // deregistration its primitives carry.
                    trace!(%task, "task halted");
                    return Drive::Halted;
                }
                if wake {
                    self.inner.ready.push(task);
                }
                match yielded {
                    Some(values) => {
                        trace!(%task, "task yielded values");
                        Drive::Yielded(values)
                    }
                    None => Drive::Suspended,
                }
            }
        }
    }

    pub(crate) fn drain_ready(&self) {
        if self.inner.draining.get() {
            return;
        }
        self.inner.draining.set(true);
        while let Some(task) = self.inner.ready.pop() {
            // Intermediate yields have no synchronous caller here; they
            // only matter to the spawning drive.
            let _ = self.drive(task);
        }
        self.inner.draining.set(false);
    }

    // ------------------------------------------------------------------
    // Poller
    // ------------------------------------------------------------------

    fn poll_pass(&self) {
        let now = self.now();
        let tick = self.inner.ticks.get();
        let mut rounds = 0usize;
        loop {
            let drained: Vec<Pollable> = self.inner.pollables.borrow_mut().drain(..).collect();
            if drained.is_empty() {
                break;
            }
            let mut fired = Vec::new();
            let mut keep = Vec::new();
            for entry in drained {
                if entry.rule.is_ready(now, tick) {
                    fired.push(entry);
                } else {
                    keep.push(entry);
                }
            }
            // Survivors go back before continuations run, so entries
            // registered by this round's firings are only seen by the
            // next round's snapshot.
            self.inner.pollables.borrow_mut().extend(keep);
            if fired.is_empty() {
                break;
            }
            for entry in fired {
                bump(&self.inner.stats.pollables_fired);
                match entry.continuation {
                    Some(continuation) => continuation(self),
                    None => self.inner.ready.push(entry.task),
                }
            }
            self.drain_ready();
            rounds += 1;
            if rounds >= self.inner.config.max_poll_rounds() {
                warn!(rounds, "poller round cap hit; deferring to next tick");
                break;
            }
        }
        if self.inner.pollables.borrow().is_empty() {
            self.inner.poller_live.set(false);
            trace!("poller idle");
        }
    }

    // ------------------------------------------------------------------
    // Registry plumbing used by the suspension primitives
    // ------------------------------------------------------------------

    pub(crate) fn register_pollable(
        &self,
        task: TaskId,
        rule: WakeRule,
        continuation: Option<super::wait::Continuation>,
    ) -> PollId {
        let id = PollId(self.inner.next_poll.get());
        self.inner.next_poll.set(id.0 + 1);
        self.inner.pollables.borrow_mut().push(Pollable {
            id,
            task,
            rule,
            continuation,
        });
        if !self.inner.poller_live.get() {
            self.inner.poller_live.set(true);
            trace!("poller started");
        }
        id
    }

    pub(crate) fn remove_pollable(&self, id: PollId) {
        self.inner.pollables.borrow_mut().retain(|entry| entry.id != id);
    }

    pub(crate) fn register_callback(&self, key: WaitKey, reg: CallbackReg) {
        self.inner.callbacks.borrow_mut().entry(key).or_default().push(reg);
    }

    pub(crate) fn remove_callback(&self, key: &WaitKey, id: CallbackId) {
        let mut callbacks = self.inner.callbacks.borrow_mut();
        if let Some(regs) = callbacks.get_mut(key) {
            regs.retain(|reg| reg.id != id);
            if regs.is_empty() {
                callbacks.remove(key);
            }
        }
    }

    pub(crate) fn next_callback_id(&self) -> CallbackId {
        let id = CallbackId(self.inner.next_callback.get());
        self.inner.next_callback.set(id.0 + 1);
        id
    }

    pub(crate) fn prewait(&self, task: TaskId, key: WaitKey) {
        let mut prewait = self.inner.prewait.borrow_mut();
        let declared = prewait.entry(key).or_default();
        if !declared.contains(&task) {
            declared.push(task);
        }
    }

    pub(crate) fn clear_prewait(&self, task: TaskId, key: &WaitKey) {
        let mut prewait = self.inner.prewait.borrow_mut();
        if let Some(declared) = prewait.get_mut(key) {
            declared.retain(|t| *t != task);
            if declared.is_empty() {
                prewait.remove(key);
            }
        }
    }

    pub(crate) fn take_prewaited(&self, task: TaskId, key: &WaitKey) -> Option<Vec<Value>> {
        self.inner.prewaited.borrow_mut().remove(&(task, key.clone()))
    }

    pub(crate) fn set_yielded(&self, task: TaskId, values: Vec<Value>) {
        if let Some(slot) = self.inner.tasks.borrow_mut().get_mut(&task) {
            slot.yielded = Some(values);
        }
    }

    pub(crate) fn mark_halted(&self, task: TaskId) {
        if let Some(slot) = self.inner.tasks.borrow_mut().get_mut(&task) {
            slot.halted = true;
        }
    }

    pub(crate) fn ready_push(&self, task: TaskId) {
        self.inner.ready.push(task);
    }

    pub(crate) fn task_alive(&self, task: TaskId) -> bool {
        self.inner.tasks.borrow().contains_key(&task)
    }
}

impl Inner {
    fn ready_handle(&self) -> Arc<ReadyQueue> {
        Arc::clone(&self.ready)
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.task_count())
            .field("pollables", &self.pollable_count())
            .field("callbacks", &self.callback_count())
            .field("ticks", &self.ticks())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "unknown panic payload".to_owned())
        },
        |s| (*s).to_owned(),
    )
}
