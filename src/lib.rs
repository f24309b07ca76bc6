//! Weft: cooperative multitasking and transparent cross-instance proxies
//! for embedded scripting hosts.
//!
//! # Overview
//!
//! Weft targets environments where each running instance has isolated
//! global state and one way to reach its peers: a host-provided call
//! primitive ("invoke a named function on instance X, get one
//! serializable result back"). On top of that it layers the two things
//! such hosts do not provide:
//!
//! - **Cooperative multitasking** over one execution thread: blocking-style
//!   primitives (sleep, wait-with-timeout, multi-tick cycles, intermediate
//!   yields) on top of stored resumable futures, driven by a per-instance
//!   scheduler with pollable and callback-keyed wait registries.
//! - **A desynchronization and proxy layer**: one logical remote call
//!   becomes an immediate correlation-key acknowledgement plus a later
//!   delivery, and a variable owned by another instance can be read,
//!   written, called, and computed with through a local stand-in that
//!   forwards every operation to its owner.
//!
//! # Core Guarantees
//!
//! - **Single-threaded by construction**: between suspension points a task
//!   runs atomically with respect to every other task; nothing here is
//!   `Send`, and the ordering guarantees rely on that.
//! - **Faults stay local**: a panicking task is logged and dropped; other
//!   tasks and the scheduler are untouched. Cross-instance failures travel
//!   as tagged values and are re-raised at exactly one point.
//! - **No lost deliveries**: a result produced before its waiter suspends
//!   is parked by the prewait machinery instead of discarded.
//!
//! # Module Structure
//!
//! - [`types`]: identifier and time types
//! - [`value`]: the serializable cross-instance value model
//! - [`sched`]: the task scheduler and suspension primitives
//! - [`host`]: the clock and call-primitive traits an embedding supplies
//! - [`instance`]: per-instance wiring (globals, registry, spawning)
//! - [`cx`]: the per-task context
//! - [`remote`]: the two-phase desynchronized call protocol
//! - [`proxy`]: operation forwarding over remote variable handles
//! - [`lab`]: deterministic in-process harness for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod cx;
pub mod error;
pub mod host;
pub mod instance;
pub mod lab;
pub mod proxy;
pub mod remote;
pub mod sched;
pub mod types;
pub mod value;

pub use cx::Cx;
pub use error::{Error, Result};
pub use host::{Clock, Host, SystemClock};
pub use instance::Instance;
pub use proxy::{proxy, Op, RemoteRef, APPLY_FN};
pub use remote::DELIVER_FN;
pub use sched::{Drive, Scheduler, SchedulerConfig, SchedulerStats, TaskCx};
pub use types::{InstanceId, TaskId, Time, WaitKey};
pub use value::{FuncRef, ProxyHandle, Value};
