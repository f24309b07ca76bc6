//! One running instance: isolated globals, a scheduler, a function
//! registry, and an optional host attachment.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::host::{Clock, Host};
use crate::proxy::{self, APPLY_FN};
use crate::remote::desync::{self, DELIVER_FN};
use crate::remote::registry::{FunctionRegistry, Handler};
use crate::sched::{Drive, Scheduler, SchedulerConfig};
use crate::types::{InstanceId, TaskId, WaitKey};
use crate::value::{FuncRef, ProxyHandle, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::{Rc, Weak};
use tracing::trace;

struct InstanceInner {
    id: InstanceId,
    sched: Scheduler,
    globals: RefCell<BTreeMap<String, Value>>,
    functions: FunctionRegistry,
    host: RefCell<Option<Weak<dyn Host>>>,
    desync_seq: Cell<u64>,
}

/// One independently running copy of the scripted environment.
///
/// Instances own isolated global state and can only reach each other
/// through the attached [`Host`]'s call primitive. Cheap to clone; clones
/// share the same state.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    /// Creates an instance with its own scheduler over `clock`.
    #[must_use]
    pub fn new(id: InstanceId, clock: Rc<dyn Clock>) -> Self {
        Self::with_config(id, clock, SchedulerConfig::default())
    }

    /// Creates an instance with an explicit scheduler configuration.
    #[must_use]
    pub fn with_config(id: InstanceId, clock: Rc<dyn Clock>, config: SchedulerConfig) -> Self {
        let inst = Self {
            inner: Rc::new(InstanceInner {
                id,
                sched: Scheduler::with_config(clock, config),
                globals: RefCell::new(BTreeMap::new()),
                functions: FunctionRegistry::default(),
                host: RefCell::new(None),
                desync_seq: Cell::new(0),
            }),
        };
        inst.register(DELIVER_FN, desync::deliver);
        inst.register_desync(APPLY_FN, proxy::apply::handler);
        inst
    }

    /// Returns this instance's identity.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    /// Returns this instance's scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.sched
    }

    /// Processes one host tick; see [`Scheduler::tick`].
    pub fn tick(&self) {
        self.inner.sched.tick();
    }

    /// Tears down the scheduler, dropping all pending tasks; see
    /// [`Scheduler::shutdown`].
    pub fn shutdown(&self) {
        self.inner.sched.shutdown();
    }

    /// Attaches the host this instance reaches other instances through.
    ///
    /// Held weakly: the host owns the instances, not the other way around.
    pub fn attach_host(&self, host: Weak<dyn Host>) {
        *self.inner.host.borrow_mut() = Some(host);
    }

    /// The wrapped remote invoker: one synchronous host round trip.
    pub fn host_call(&self, target: InstanceId, function: &str, args: Vec<Value>) -> Result<Value> {
        let host = self.inner.host.borrow().as_ref().and_then(Weak::upgrade);
        let Some(host) = host else {
            return Err(Error::Detached(self.id()));
        };
        trace!(from = %self.id(), %target, function, "host call");
        host.call(target, function, args)
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Writes global variable `key`.
    pub fn set_global(&self, key: &str, value: Value) {
        self.inner.globals.borrow_mut().insert(key.to_owned(), value);
    }

    /// Reads global variable `key`.
    #[must_use]
    pub fn global(&self, key: &str) -> Option<Value> {
        self.inner.globals.borrow().get(key).cloned()
    }

    /// Removes global variable `key`, returning its previous value.
    pub fn remove_global(&self, key: &str) -> Option<Value> {
        self.inner.globals.borrow_mut().remove(key)
    }

    pub(crate) fn resolve_handle(&self, handle: &ProxyHandle) -> Value {
        self.global(&handle.key).unwrap_or(Value::Null)
    }

    pub(crate) fn set_field(&self, key: &str, field: &Value, value: Value) -> Result<()> {
        let mut globals = self.inner.globals.borrow_mut();
        let Some(current) = globals.get_mut(key) else {
            return Err(Error::unsupported("set", "null"));
        };
        match (current, field) {
            (Value::Map(map), Value::Str(name)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (Value::List(items), Value::Int(index)) => {
                let slot = usize::try_from(*index)
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| {
                        Error::unsupported("set", format!("index {index} out of bounds"))
                    })?;
                *slot = value;
                Ok(())
            }
            (other, _) => Err(Error::unsupported("set", other.type_name())),
        }
    }

    /// Collapses an own handle to the true current local value (a missing
    /// variable reads as `Null`); re-wraps a foreign handle freshly so the
    /// next remote lookup uses a current reference; returns anything else
    /// unchanged.
    #[must_use]
    pub fn resolve(&self, value: Value) -> Value {
        match value {
            Value::Handle(handle) if handle.owner == self.id() => self.resolve_handle(&handle),
            Value::Handle(handle) => Value::Handle(ProxyHandle::new(handle.owner, handle.key)),
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Function registry
    // ------------------------------------------------------------------

    /// Registers a plain synchronous function under `name`.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Self, Vec<Value>) -> Result<Value> + 'static,
    {
        let handler: Rc<Handler> = Rc::new(handler);
        self.inner.functions.insert(name, handler, false);
    }

    /// Registers a desynchronized function under `name`: callers must go
    /// through [`Cx::desync_call`], and the body runs in its own task on
    /// this instance.
    pub fn register_desync<F, Fut>(&self, name: &str, body: F)
    where
        F: Fn(Cx, Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value>> + 'static,
    {
        let handler: Rc<Handler> = Rc::new(desync::wrap(name.to_owned(), body));
        self.inner.functions.insert(name, handler, true);
    }

    /// Returns a value-level reference to a function registered here.
    #[must_use]
    pub fn func(&self, name: &str) -> FuncRef {
        FuncRef::new(self.id(), name)
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.inner.functions.contains(name)
    }

    pub(crate) fn is_desync_fn(&self, name: &str) -> bool {
        self.inner.functions.is_desync(name)
    }

    /// Dispatches a named function, as the host does when another instance
    /// calls in.
    pub fn invoke(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        let Some(handler) = self.inner.functions.get(function) else {
            return Err(Error::UnknownFunction {
                instance: self.id(),
                name: function.to_owned(),
            });
        };
        (*handler)(self, args)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Spawns `f` as a task on this instance's scheduler, driving it
    /// synchronously to its first suspension point; see
    /// [`Scheduler::spawn`].
    pub fn spawn<F, Fut>(&self, name: Option<&str>, f: F) -> (TaskId, Drive)
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<Vec<Value>>> + 'static,
    {
        let inst = self.clone();
        self.inner.sched.spawn(name, move |task| f(Cx::new(inst, task)))
    }

    pub(crate) fn mint_key(&self) -> WaitKey {
        let seq = self.inner.desync_seq.get();
        self.inner.desync_seq.set(seq + 1);
        WaitKey::correlation(self.id(), seq)
    }
}

impl core::fmt::Debug for Instance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("globals", &self.inner.globals.borrow().len())
            .field("functions", &self.inner.functions.len())
            .finish()
    }
}
