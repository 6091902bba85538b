use crate::{Clock, DAY_SECS, SystemClock};
use bytes::Bytes;
use std::sync::Arc;

/// Decides how long a new article is kept.
pub trait PostingPolicy: Send + Sync {
    /// Expiry of an article posted to `groups`, as unix seconds. `0` keeps it
    /// forever.
    fn decide(&self, groups: &[Bytes], lines: i64, bytes: i64) -> u64;
}

impl<P: PostingPolicy + ?Sized> PostingPolicy for Arc<P> {
    fn decide(&self, groups: &[Bytes], lines: i64, bytes: i64) -> u64 {
        (**self).decide(groups, lines, bytes)
    }
}

/// Keeps every article for the same number of seconds.
#[derive(Clone)]
pub struct FixedRetention {
    retention_secs: u64,
    clock: Arc<dyn Clock>,
}

impl FixedRetention {
    /// A retention of `0` keeps articles forever.
    pub fn new(retention_secs: u64) -> Self {
        Self::with_clock(retention_secs, SystemClock)
    }

    pub fn days(days: u64) -> Self {
        Self::new(days.saturating_mul(DAY_SECS))
    }

    pub fn with_clock(retention_secs: u64, clock: impl Clock + 'static) -> Self {
        Self {
            retention_secs,
            clock: Arc::new(clock),
        }
    }
}

impl PostingPolicy for FixedRetention {
    fn decide(&self, _groups: &[Bytes], _lines: i64, _bytes: i64) -> u64 {
        if self.retention_secs == 0 {
            return 0;
        }
        self.clock.unix_secs().saturating_add(self.retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[test]
    fn fixed_retention_counts_from_now() {
        let clock = ManualClock::new(1_000);
        let policy = FixedRetention::with_clock(2 * DAY_SECS, clock.clone());
        assert_eq!(policy.decide(&[], 10, 100), 1_000 + 2 * DAY_SECS);
        clock.advance(5);
        assert_eq!(policy.decide(&[], 10, 100), 1_005 + 2 * DAY_SECS);
    }

    #[test]
    fn zero_retention_never_expires() {
        assert_eq!(FixedRetention::new(0).decide(&[], 0, 0), 0);
    }
}
