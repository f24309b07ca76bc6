//! Scheduler configuration and runtime counters.

/// Configuration for a [`super::Scheduler`].
///
/// # Example
///
/// ```
/// use weft::sched::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_max_poll_rounds(16)
///     .with_task_soft_limit(512);
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    max_poll_rounds: usize,
    task_soft_limit: Option<usize>,
}

impl SchedulerConfig {
    /// Sets how many firing rounds one poller pass may run before bailing
    /// out. Each round re-snapshots the registry, so continuations that
    /// keep registering instantly-ready pollables would otherwise spin
    /// forever inside a single tick.
    #[must_use]
    pub const fn with_max_poll_rounds(mut self, rounds: usize) -> Self {
        self.max_poll_rounds = rounds;
        self
    }

    /// Sets a soft ceiling on concurrently stored tasks. Exceeding it only
    /// logs a warning — it is a leak diagnostic, not admission control.
    #[must_use]
    pub const fn with_task_soft_limit(mut self, limit: usize) -> Self {
        self.task_soft_limit = Some(limit);
        self
    }

    /// Returns the poller round cap.
    #[must_use]
    pub const fn max_poll_rounds(&self) -> usize {
        self.max_poll_rounds
    }

    /// Returns the task soft limit, if any.
    #[must_use]
    pub const fn task_soft_limit(&self) -> Option<usize> {
        self.task_soft_limit
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_poll_rounds: 64,
            task_soft_limit: None,
        }
    }
}

/// A snapshot of scheduler counters.
///
/// Counters only ever increase; tests diff snapshots across a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks ever spawned.
    pub spawned: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks dropped after a panic or error.
    pub faulted: u64,
    /// Ticks processed.
    pub ticks: u64,
    /// Pollable entries fired.
    pub pollables_fired: u64,
    /// Callback registrations fired by `resume`.
    pub callbacks_fired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SchedulerConfig::default()
            .with_max_poll_rounds(5)
            .with_task_soft_limit(10);
        assert_eq!(config.max_poll_rounds(), 5);
        assert_eq!(config.task_soft_limit(), Some(10));
    }
}
