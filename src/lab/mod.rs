//! Deterministic in-process harness for testing.
//!
//! The lab provides:
//!
//! - [`VirtualClock`]: manually advanced time, no wall-clock dependencies
//! - [`Router`]: an in-process [`Host`] over a set of instances sharing
//!   one virtual clock, with synchronized ticking and a host-call counter
//!   tests use to assert round-trip counts
//!
//! Everything runs on the calling thread; a scenario is fully determined
//! by the order of spawns, resumes, and ticks.

use crate::error::{Error, Result};
use crate::host::{Clock, Host};
use crate::instance::Instance;
use crate::types::{InstanceId, Time};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::trace;

/// A manually advanced clock shared by every instance in a lab.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Time>,
}

impl VirtualClock {
    /// Creates a clock at [`Time::ZERO`].
    #[must_use]
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Advances the clock by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add_millis(millis));
    }

    /// Sets the clock to an absolute time; never moves backwards.
    pub fn advance_to(&self, time: Time) {
        if time > self.now.get() {
            self.now.set(time);
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Time {
        self.now.get()
    }
}

struct RouterInner {
    clock: Rc<VirtualClock>,
    instances: RefCell<BTreeMap<InstanceId, Instance>>,
    next_id: Cell<u64>,
    calls: Cell<u64>,
}

impl Host for RouterInner {
    fn call(&self, target: InstanceId, function: &str, args: Vec<Value>) -> Result<Value> {
        self.calls.set(self.calls.get() + 1);
        trace!(%target, function, "router call");
        // Clone the handle out so the instance map is not borrowed while
        // the handler runs; handlers re-enter the router for deliveries.
        let Some(inst) = self.instances.borrow().get(&target).cloned() else {
            return Err(Error::Unreachable(target));
        };
        inst.invoke(function, args)
    }
}

/// An in-process host wiring instances together for deterministic tests.
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    /// Creates an empty router with a fresh virtual clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RouterInner {
                clock: VirtualClock::shared(),
                instances: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(1),
                calls: Cell::new(0),
            }),
        }
    }

    /// Returns the shared clock.
    #[must_use]
    pub fn clock(&self) -> Rc<VirtualClock> {
        Rc::clone(&self.inner.clock)
    }

    /// Creates a new instance on this router's clock and attaches it.
    #[must_use]
    pub fn add_instance(&self) -> Instance {
        let id = InstanceId::new(self.inner.next_id.get());
        self.inner.next_id.set(id.raw() + 1);
        let inst = Instance::new(id, self.inner.clock.clone());
        let host: Rc<dyn Host> = Rc::clone(&self.inner) as Rc<dyn Host>;
        inst.attach_host(Rc::downgrade(&host));
        self.inner.instances.borrow_mut().insert(id, inst.clone());
        inst
    }

    /// Returns the instance registered under `id`, if any.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        self.inner.instances.borrow().get(&id).cloned()
    }

    /// Returns how many host calls have been routed so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.inner.calls.get()
    }

    /// Advances the clock by `millis` and ticks every instance once.
    pub fn tick_all(&self, millis: u64) {
        self.inner.clock.advance(millis);
        let instances: Vec<Instance> = self.inner.instances.borrow().values().cloned().collect();
        for inst in instances {
            inst.tick();
        }
    }

    /// Ticks until every scheduler is idle or `max_ticks` is hit, `millis`
    /// of virtual time per tick. Returns the number of ticks run.
    pub fn run_until_settled(&self, max_ticks: u64, millis: u64) -> u64 {
        for tick in 0..max_ticks {
            let idle = self
                .inner
                .instances
                .borrow()
                .values()
                .all(|inst| inst.scheduler().is_idle());
            if idle {
                return tick;
            }
            self.tick_all(millis);
        }
        max_ticks
    }

    /// Shuts down every instance's scheduler, dropping pending tasks.
    pub fn shutdown(&self) {
        let instances: Vec<Instance> = self.inner.instances.borrow().values().cloned().collect();
        for inst in instances {
            inst.shutdown();
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Router {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Router")
            .field("instances", &self.inner.instances.borrow().len())
            .field("calls", &self.inner.calls.get())
            .finish()
    }
}
