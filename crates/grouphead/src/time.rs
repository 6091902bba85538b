use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{SystemTime, UNIX_EPOCH};

/// One day, the default coarse expiry window for live-count counters.
pub const DAY_SECS: u64 = 86_400;

/// A wall-clock source in whole seconds since the Unix epoch.
///
/// Expiry decisions (article retention, counter windows, row visibility) are
/// made against this trait so tests can pin or step time.
///
/// # Example
///
/// ```
/// use grouphead::Clock;
///
/// struct FixedTime;
/// impl Clock for FixedTime {
///     fn unix_secs(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.unix_secs(), 1234);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time in seconds since 1970-01-01 UTC.
    fn unix_secs(&self) -> u64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_secs(&self) -> u64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A manually driven clock. Clones share the same instant.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(secs)),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn unix_secs(&self) -> u64 {
        self.secs.load(Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn unix_secs(&self) -> u64 {
        (**self).unix_secs()
    }
}
