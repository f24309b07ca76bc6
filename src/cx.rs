//! The per-task context: scheduler primitives plus instance powers.
//!
//! Every task body receives a [`Cx`]. All effects flow through it — the
//! blocking primitives, cross-instance calls, and proxy binding. There is
//! no ambient authority: a function without a `Cx` cannot suspend and
//! cannot leave the instance.

use crate::error::Result;
use crate::instance::Instance;
use crate::proxy::RemoteRef;
use crate::remote::desync;
use crate::sched::{Cycle, Halt, Sleep, TaskCx, Wait, YieldNow};
use crate::types::{InstanceId, TaskId, Time, WaitKey};
use crate::value::{ProxyHandle, Value};
use std::time::Duration;

/// The context handed to every task body spawned through an
/// [`Instance`].
///
/// Cloning is cheap; clones refer to the same task on the same instance.
#[derive(Clone)]
pub struct Cx {
    inst: Instance,
    task: TaskCx,
}

impl Cx {
    pub(crate) const fn new(inst: Instance, task: TaskCx) -> Self {
        Self { inst, task }
    }

    /// Returns the instance this task runs on.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.inst
    }

    /// Returns the identity of the instance this task runs on.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.inst.id()
    }

    /// Returns the task's own identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task.task_id()
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.task.now()
    }

    /// Parks the task for at least `duration`; see
    /// [`crate::sched::TaskCx::sleep`].
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.task.sleep(duration)
    }

    /// Parks the task until `deadline`; see
    /// [`crate::sched::TaskCx::sleep_until`].
    #[must_use]
    pub fn sleep_until(&self, deadline: Time) -> Sleep {
        self.task.sleep_until(deadline)
    }

    /// Parks the task until `key` is resumed or `timeout` elapses; see
    /// [`crate::sched::TaskCx::wait`].
    #[must_use]
    pub fn wait(&self, key: WaitKey, timeout: Option<Duration>) -> Wait {
        self.task.wait(key, timeout)
    }

    /// Declares intent to wait on `key` before suspending; see
    /// [`crate::sched::TaskCx::prewait`].
    pub fn prewait(&self, key: WaitKey) {
        self.task.prewait(key);
    }

    /// Parks the task for `n + 1` further ticks; see
    /// [`crate::sched::TaskCx::cycle`].
    #[must_use]
    pub fn cycle(&self, n: u64) -> Cycle {
        self.task.cycle(n)
    }

    /// Publishes intermediate values and reschedules; see
    /// [`crate::sched::TaskCx::yield_values`].
    #[must_use]
    pub fn yield_values(&self, values: Vec<Value>) -> YieldNow {
        self.task.yield_values(values)
    }

    /// Parks the task permanently; see [`crate::sched::TaskCx::halt`].
    #[must_use]
    pub fn halt(&self) -> Halt {
        self.task.halt()
    }

    /// Delivers `args` to local waiters of `key`; see
    /// [`crate::sched::Scheduler::resume`].
    pub fn resume(&self, key: &WaitKey, args: Vec<Value>) -> usize {
        self.task.resume(key, args)
    }

    /// Performs a desynchronized call: invokes `function` on `target`,
    /// then parks until the result is delivered. A failure on the far side
    /// is re-raised here as [`crate::Error::Remote`].
    pub async fn desync_call(
        &self,
        target: InstanceId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        desync::call(self, target, function, args).await
    }

    /// Binds a proxy handle to this task so operations can be applied.
    #[must_use]
    pub fn bind(&self, handle: ProxyHandle) -> RemoteRef {
        RemoteRef::new(self.clone(), handle)
    }

    /// Creates and binds a handle for variable `key` on `owner`.
    #[must_use]
    pub fn proxy(&self, owner: InstanceId, key: impl Into<String>) -> RemoteRef {
        self.bind(ProxyHandle::new(owner, key))
    }

    /// Collapses own handles to local values, re-wraps foreign ones; see
    /// [`Instance::resolve`].
    #[must_use]
    pub fn resolve(&self, value: Value) -> Value {
        self.inst.resolve(value)
    }
}

impl core::fmt::Debug for Cx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Cx({} on {})", self.task_id(), self.instance_id())
    }
}
