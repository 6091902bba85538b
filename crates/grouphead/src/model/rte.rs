use super::{HlStats, Record};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Single-range allocator state used by the sharded actor.
///
/// `high` is the last issued number and survives a full rollback, so a
/// number above it is never issued twice to successful posts. `lost` counts
/// rollbacks that hit neither edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRte {
    pub start: u64,
    pub high: u64,
    pub lost: u64,
}

impl Record for GroupRte {}

impl GroupRte {
    pub const fn new() -> Self {
        Self {
            start: 0,
            high: 0,
            lost: 0,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.start == 0
    }

    pub fn increment(&mut self) -> u64 {
        self.high += 1;
        if self.start == 0 {
            self.start = self.high;
        }
        self.high
    }

    pub fn rollback(&mut self, i: u64) {
        if self.is_empty() || i < self.start || i > self.high {
            return;
        }
        if i == self.high {
            self.high -= 1;
        } else if i == self.start {
            self.start += 1;
        } else {
            self.lost += 1;
        }
        if self.start > self.high {
            self.start = 0;
            self.lost = 0;
        }
    }

    pub fn hl_stats(&self) -> HlStats {
        if self.is_empty() {
            return (0, 0, 0);
        }
        let span = self.high - self.start + 1;
        (self.start, self.high, span.saturating_sub(self.lost))
    }
}

/// A cached [`GroupRte`] with a validity deadline.
#[derive(Clone, Copy, Debug)]
pub struct TimedGroupRte {
    pub rte: GroupRte,
    pub expires: Instant,
}

impl TimedGroupRte {
    pub const fn new(rte: GroupRte, expires: Instant) -> Self {
        Self { rte, expires }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn increments_from_one() {
        let mut r = GroupRte::new();
        assert_eq!(r.increment(), 1);
        assert_eq!(r.increment(), 2);
        assert_eq!(r.hl_stats(), (1, 2, 2));
    }

    #[test]
    fn top_rollback_restores_stats() {
        let mut r = GroupRte::new();
        r.increment();
        r.increment();
        let before = r.hl_stats();
        let n = r.increment();
        r.rollback(n);
        assert_eq!(r.hl_stats(), before);
    }

    #[test]
    fn full_rollback_keeps_high() {
        let mut r = GroupRte::new();
        let n = r.increment();
        r.rollback(n);
        assert_eq!(r.hl_stats(), (0, 0, 0));
        assert_eq!(r.increment(), 1);

        r.increment();
        r.rollback(1);
        // start moved past 1, high is 2
        assert_eq!(r.hl_stats(), (2, 2, 1));
        r.rollback(2);
        assert!(r.is_empty());
        assert_eq!(r.high, 1);
        assert_eq!(r.increment(), 2);
    }

    #[test]
    fn interior_rollback_counts_as_lost() {
        let mut r = GroupRte::new();
        for _ in 0..5 {
            r.increment();
        }
        r.rollback(3);
        assert_eq!(r.hl_stats(), (1, 5, 4));
        r.rollback(9);
        assert_eq!(r.hl_stats(), (1, 5, 4));
    }

    #[test]
    fn timed_entry_expires() {
        let now = Instant::now();
        let t = TimedGroupRte::new(GroupRte::new(), now + Duration::from_secs(1));
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + Duration::from_secs(1)));
    }

    #[test]
    fn record_roundtrip() {
        let mut r = GroupRte::new();
        r.increment();
        r.increment();
        let raw = r.encode().unwrap();
        assert_eq!(GroupRte::decode(&raw).unwrap(), r);
    }
}
