//! Cooperative multitasking over one execution thread.
//!
//! The scheduler owns all pending tasks and two wait registries
//! (pollables, callback registrations), and exposes blocking-style
//! primitives — sleep, wait-with-timeout, multi-tick cycles, intermediate
//! yields — on top of stored resumable futures:
//!
//! - [`Scheduler`]: the task table, registries, drive loop, and poller
//! - [`TaskCx`]: the per-task handle the primitives are built from
//! - [`Drive`]: what one synchronous drive cycle produced
//! - [`Sleep`], [`Wait`], [`Cycle`], [`YieldNow`], [`Halt`]: the
//!   suspension primitives
//! - [`SchedulerConfig`], [`SchedulerStats`]: tuning and counters

mod config;
mod primitives;
mod scheduler;
mod task;
mod wait;

pub use config::{SchedulerConfig, SchedulerStats};
pub use primitives::{Cycle, Halt, Sleep, Wait, YieldNow};
pub use scheduler::Scheduler;
pub use task::{Drive, TaskCx};
