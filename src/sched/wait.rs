//! Wait registries: pollable entries, callback registrations, wait slots.
//!
//! A *pollable* is a wake rule checked once per poller pass; a *callback
//! registration* is keyed by a [`crate::types::WaitKey`] and fired by
//! [`super::Scheduler::resume`]. A timed wait registers one of each, wired
//! together through a shared [`WaitSlot`] so that whichever side fires
//! first wins and the loser backs off — the slot's first writer decides,
//! which is also what makes "delivery wins ties" hold within a tick:
//! deliveries write the slot inline in `resume`, while timeouts only write
//! it when the poller pass reaches them.

use crate::types::{TaskId, Time};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Identifies one pollable entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollId(pub(crate) u64);

/// Identifies one callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallbackId(pub(crate) u64);

/// When a pollable entry becomes ready.
pub(crate) enum WakeRule {
    /// Ready on the first tick at or after the deadline.
    At(Time),
    /// Ready once the scheduler's tick counter reaches the given value.
    Tick(u64),
}

impl WakeRule {
    pub(crate) fn is_ready(&self, now: Time, tick: u64) -> bool {
        match self {
            Self::At(deadline) => now >= *deadline,
            Self::Tick(fire) => tick >= *fire,
        }
    }
}

/// Runs when a pollable fires, instead of waking the owning task directly.
pub(crate) type Continuation = Box<dyn FnOnce(&super::Scheduler)>;

/// One entry in the pollable registry.
///
/// Removed from the registry in the same pass it becomes ready; never
/// evaluated again after firing.
pub(crate) struct Pollable {
    pub(crate) id: PollId,
    pub(crate) task: TaskId,
    pub(crate) rule: WakeRule,
    /// Completion callback; when absent the owning task is woken directly.
    pub(crate) continuation: Option<Continuation>,
}

/// The delivery slot shared between a parked wait future and its
/// registrations.
pub(crate) type WaitSlot = Rc<RefCell<SlotState>>;

/// State machine for one wait. The first writer (delivery or timeout) wins;
/// later writers observe a non-`Waiting` state and back off.
pub(crate) enum SlotState {
    /// Nothing has fired yet.
    Waiting,
    /// `resume` delivered these arguments.
    Delivered(Vec<Value>),
    /// The timeout pollable fired first.
    TimedOut,
    /// The owning future already consumed the outcome.
    Consumed,
}

/// One callback registration under a wait key.
///
/// Fires at most once: `resume` removes every registration for the key it
/// delivers to.
pub(crate) struct CallbackReg {
    pub(crate) id: CallbackId,
    pub(crate) task: TaskId,
    pub(crate) slot: WaitSlot,
    /// Timeout pollable to cancel when this registration fires first.
    pub(crate) sibling: Option<PollId>,
}

pub(crate) fn new_slot() -> WaitSlot {
    Rc::new(RefCell::new(SlotState::Waiting))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_rules() {
        assert!(WakeRule::At(Time::from_millis(10)).is_ready(Time::from_millis(10), 0));
        assert!(!WakeRule::At(Time::from_millis(10)).is_ready(Time::from_millis(9), 0));
        assert!(WakeRule::Tick(3).is_ready(Time::ZERO, 3));
        assert!(!WakeRule::Tick(3).is_ready(Time::ZERO, 2));
    }
}
