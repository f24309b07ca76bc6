//! The blocking-style suspension primitives.
//!
//! Each primitive is a future constructed from a [`TaskCx`] method. All of
//! them park at least once — even a zero-length sleep or timeout goes
//! through the poller, preserving "checked once per tick" observable
//! behavior. Every primitive deregisters whatever it registered when
//! dropped, so a task that faults or halts leaves no dangling entries
//! behind.
//!
//! [`TaskCx`]: super::TaskCx

use super::scheduler::Scheduler;
use super::wait::{new_slot, CallbackId, CallbackReg, PollId, SlotState, WaitSlot, WakeRule};
use crate::types::{TaskId, Time, WaitKey};
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::trace;

/// Parks a task until a deadline; see [`super::TaskCx::sleep`].
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    sched: Scheduler,
    task: TaskId,
    deadline: Time,
    registered: Option<PollId>,
    parked: bool,
}

impl Sleep {
    pub(crate) const fn new(sched: Scheduler, task: TaskId, deadline: Time) -> Self {
        Self {
            sched,
            task,
            deadline,
            registered: None,
            parked: false,
        }
    }

    /// Returns the absolute deadline.
    #[must_use]
    pub const fn deadline(&self) -> Time {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if !this.parked {
            this.parked = true;
            this.registered =
                Some(this.sched.register_pollable(this.task, WakeRule::At(this.deadline), None));
            trace!(task = %this.task, deadline = %this.deadline, "parked on sleep");
            return Poll::Pending;
        }
        if this.sched.now() >= this.deadline {
            if let Some(id) = this.registered.take() {
                this.sched.remove_pollable(id);
            }
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.registered.take() {
            self.sched.remove_pollable(id);
        }
    }
}

/// Parks a task for a fixed number of further ticks; see
/// [`super::TaskCx::cycle`].
#[must_use = "futures do nothing unless awaited"]
pub struct Cycle {
    sched: Scheduler,
    task: TaskId,
    fire_tick: u64,
    registered: Option<PollId>,
    parked: bool,
}

impl Cycle {
    pub(crate) fn new(sched: Scheduler, task: TaskId, n: u64) -> Self {
        // Counting whole completed ticks gives the documented behavior in
        // both contexts: registered from inside a tick's poller pass, the
        // partially-run tick does not count toward the n+1.
        let fire_tick = sched.ticks().saturating_add(n).saturating_add(1);
        Self {
            sched,
            task,
            fire_tick,
            registered: None,
            parked: false,
        }
    }
}

impl Future for Cycle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if !this.parked {
            this.parked = true;
            this.registered =
                Some(this.sched.register_pollable(this.task, WakeRule::Tick(this.fire_tick), None));
            trace!(task = %this.task, fire_tick = this.fire_tick, "parked on cycle");
            return Poll::Pending;
        }
        if this.sched.ticks() >= this.fire_tick {
            if let Some(id) = this.registered.take() {
                this.sched.remove_pollable(id);
            }
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Cycle {
    fn drop(&mut self) {
        if let Some(id) = self.registered.take() {
            self.sched.remove_pollable(id);
        }
    }
}

/// Publishes intermediate values and reschedules for the next tick; see
/// [`super::TaskCx::yield_values`].
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    sched: Scheduler,
    task: TaskId,
    values: Option<Vec<Value>>,
    fire_tick: u64,
    registered: Option<PollId>,
    parked: bool,
}

impl YieldNow {
    pub(crate) fn new(sched: Scheduler, task: TaskId, values: Vec<Value>) -> Self {
        let fire_tick = sched.ticks().saturating_add(1);
        Self {
            sched,
            task,
            values: Some(values),
            fire_tick,
            registered: None,
            parked: false,
        }
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if !this.parked {
            this.parked = true;
            if let Some(values) = this.values.take() {
                this.sched.set_yielded(this.task, values);
            }
            this.registered =
                Some(this.sched.register_pollable(this.task, WakeRule::Tick(this.fire_tick), None));
            return Poll::Pending;
        }
        if this.sched.ticks() >= this.fire_tick {
            if let Some(id) = this.registered.take() {
                this.sched.remove_pollable(id);
            }
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for YieldNow {
    fn drop(&mut self) {
        if let Some(id) = self.registered.take() {
            self.sched.remove_pollable(id);
        }
    }
}

/// Parks a task permanently; see [`super::TaskCx::halt`].
///
/// The scheduler discards a halted task at the end of the drive cycle; no
/// registry entry remembers it.
#[must_use = "futures do nothing unless awaited"]
pub struct Halt {
    sched: Scheduler,
    task: TaskId,
    parked: bool,
}

impl Halt {
    pub(crate) const fn new(sched: Scheduler, task: TaskId) -> Self {
        Self {
            sched,
            task,
            parked: false,
        }
    }
}

impl Future for Halt {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        if !this.parked {
            this.parked = true;
            this.sched.mark_halted(this.task);
        }
        Poll::Pending
    }
}

enum WaitState {
    Start,
    Parked {
        slot: WaitSlot,
        callback: CallbackId,
        timeout: Option<PollId>,
    },
    Finished,
}

/// Parks a task until a key is resumed or a timeout fires; see
/// [`super::TaskCx::wait`].
///
/// Resolves to `Some(args)` when `resume` delivers, `None` when the
/// timeout wins. With both registered, whichever fires first cancels the
/// other exactly once; a delivery and a timeout becoming ready in the same
/// tick resolves in the delivery's favor.
#[must_use = "futures do nothing unless awaited"]
pub struct Wait {
    sched: Scheduler,
    task: TaskId,
    key: WaitKey,
    timeout: Option<Duration>,
    state: WaitState,
}

impl Wait {
    pub(crate) const fn new(
        sched: Scheduler,
        task: TaskId,
        key: WaitKey,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            sched,
            task,
            key,
            timeout,
            state: WaitState::Start,
        }
    }

    /// Returns the key this wait is (or will be) registered under.
    #[must_use]
    pub const fn key(&self) -> &WaitKey {
        &self.key
    }

    fn park(&mut self) {
        let slot = new_slot();
        let callback = self.sched.next_callback_id();

        let timeout = self.timeout.map(|duration| {
            let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            let deadline = self.sched.now().saturating_add_millis(millis);
            let timeout_slot = slot.clone();
            let key = self.key.clone();
            let task = self.task;
            self.sched.register_pollable(
                self.task,
                WakeRule::At(deadline),
                Some(Box::new(move |sched: &Scheduler| {
                    let won = {
                        let mut state = timeout_slot.borrow_mut();
                        if matches!(*state, SlotState::Waiting) {
                            *state = SlotState::TimedOut;
                            true
                        } else {
                            false
                        }
                    };
                    // A delivery that landed earlier this tick already
                    // consumed the wait; the timeout backs off.
                    if won {
                        sched.remove_callback(&key, callback);
                        sched.ready_push(task);
                    }
                })),
            )
        });

        self.sched.register_callback(
            self.key.clone(),
            CallbackReg {
                id: callback,
                task: self.task,
                slot: slot.clone(),
                sibling: timeout,
            },
        );
        trace!(task = %self.task, key = %self.key, timed = timeout.is_some(), "parked on wait");
        self.state = WaitState::Parked {
            slot,
            callback,
            timeout,
        };
    }
}

impl Future for Wait {
    type Output = Option<Vec<Value>>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match &this.state {
            WaitState::Start => {
                // A delivery that raced ahead of this wait was parked by a
                // prewait declaration; consume it without suspending.
                if let Some(args) = this.sched.take_prewaited(this.task, &this.key) {
                    this.state = WaitState::Finished;
                    return Poll::Ready(Some(args));
                }
                // Reaching the wait supersedes any outstanding declaration.
                this.sched.clear_prewait(this.task, &this.key);
                this.park();
                Poll::Pending
            }
            WaitState::Parked { slot, .. } => {
                let outcome = {
                    let mut state = slot.borrow_mut();
                    match std::mem::replace(&mut *state, SlotState::Consumed) {
                        SlotState::Waiting => {
                            *state = SlotState::Waiting;
                            None
                        }
                        SlotState::Delivered(args) => Some(Some(args)),
                        SlotState::TimedOut => Some(None),
                        SlotState::Consumed => None,
                    }
                };
                match outcome {
                    Some(result) => {
                        this.state = WaitState::Finished;
                        Poll::Ready(result)
                    }
                    None => Poll::Pending,
                }
            }
            WaitState::Finished => Poll::Pending,
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        if let WaitState::Parked {
            callback, timeout, ..
        } = &self.state
        {
            self.sched.remove_callback(&self.key, *callback);
            if let Some(id) = timeout {
                self.sched.remove_pollable(*id);
            }
        }
    }
}
