//! Identifier types for instances, tasks, and wait keys.
//!
//! These wrap raw integers and strings with type safety so an instance id
//! can never be confused with a task id, and so correlation keys have one
//! canonical representation on the wire.

use core::fmt;
use serde::{Deserialize, Serialize};

/// A unique identifier for one independently running script instance.
///
/// Instances have isolated global state and can only reach each other
/// through the host call primitive (see [`crate::host::Host`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates an instance id from a raw value assigned by the host.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst-{}", self.0)
    }
}

/// A unique identifier for a task within one scheduler.
///
/// Assigned monotonically; never reused within a scheduler's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value (diagnostics only).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A correlation key for callback-keyed wakeups.
///
/// Keys are arbitrary strings: user code may wait on well-known names
/// (`"ready"`), while the desynchronization layer mints unique keys from
/// the serving instance's identity plus a counter.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitKey(String);

impl WaitKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Mints a correlation key unique to `origin`'s pending call `seq`.
    #[must_use]
    pub fn correlation(origin: InstanceId, seq: u64) -> Self {
        Self(format!("{origin}#{seq}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WaitKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for WaitKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Debug for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaitKey({:?})", self.0)
    }
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in time, in milliseconds from the clock's origin.
///
/// Whether the origin is process start or an epoch is up to the
/// [`crate::host::Clock`] implementation; only ordering and differences
/// matter to the scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(u64);

impl Time {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Creates a time from milliseconds since the origin.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the origin.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns this time advanced by `millis`, saturating on overflow.
    #[must_use]
    pub const fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the duration from `earlier` to `self`, or zero if `earlier`
    /// is later.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ms)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_saturating_arithmetic() {
        let t = Time::from_millis(u64::MAX);
        assert_eq!(t.saturating_add_millis(10), Time::from_millis(u64::MAX));
        assert_eq!(Time::ZERO.saturating_since(Time::from_millis(5)), 0);
        assert_eq!(Time::from_millis(7).saturating_since(Time::from_millis(5)), 2);
    }

    #[test]
    fn correlation_keys_are_distinct_per_origin_and_seq() {
        let a = WaitKey::correlation(InstanceId::new(1), 0);
        let b = WaitKey::correlation(InstanceId::new(1), 1);
        let c = WaitKey::correlation(InstanceId::new(2), 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn display_formats() {
        assert_eq!(InstanceId::new(3).to_string(), "inst-3");
        assert_eq!(TaskId::new(12).to_string(), "task-12");
        assert_eq!(Time::from_millis(250).to_string(), "250ms");
    }
}
