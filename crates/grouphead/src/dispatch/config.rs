use core::time::Duration;

/// Tuning for [`DispatcherRegistry`](crate::DispatcherRegistry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Mailbox capacity per group, also the largest batch one worker drains.
    pub requests_per_group: usize,
    /// Stop a group's worker after its mailbox stayed empty this long.
    /// `None` keeps workers until shutdown.
    pub idle_timeout: Option<Duration>,
    /// How long [`shutdown`](crate::DispatcherRegistry::shutdown) waits for
    /// each worker to acknowledge.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            requests_per_group: 128,
            idle_timeout: Some(Duration::from_secs(60)),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}
