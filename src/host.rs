//! The narrow interfaces the core consumes from its environment.
//!
//! The scheduler and remote layer are host-agnostic. An embedding supplies:
//!
//! - a [`Clock`] for sleep/timeout deadlines,
//! - a [`Host`] implementing the one-shot cross-instance call primitive,
//! - a recurring tick, by calling [`crate::instance::Instance::tick`] every
//!   frame.
//!
//! The in-process [`crate::lab::Router`] implements both `Clock` (through
//! [`crate::lab::VirtualClock`]) and `Host` for deterministic tests.

use crate::error::Result;
use crate::types::{InstanceId, Time};
use crate::value::Value;

/// A monotonic time source.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Wall-clock time, measured from the moment the clock was created.
#[derive(Debug)]
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Time {
        Time::from_millis(u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX))
    }
}

/// The host's one-shot cross-instance call primitive.
///
/// Synchronous from the caller's point of view, at most one logical round
/// trip, no built-in retry. Everything asynchronous in this crate is built
/// on top of this single primitive by the desynchronization layer.
pub trait Host {
    /// Invokes `function` on `target` with `args`, returning its single
    /// result value.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Unreachable`] if `target` is unknown to the host;
    /// otherwise whatever the invoked function raised.
    fn call(&self, target: InstanceId, function: &str, args: Vec<Value>) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
