use super::{HlStats, Record};
use serde::{Deserialize, Serialize};

/// Two-generation number range of a single newsgroup.
///
/// Generation 1 (`low1..=high1`, `count1` articles) is the stable, settled
/// range. Generation 2 collects fresh allocations strictly above `high1`
/// until [`move_down`](Self::move_down) folds it into generation 1. A zero
/// `low` marks a generation as empty.
///
/// `count2` is approximate: a rollback of a number inside generation 2 (not
/// at one of its edges) only decrements the count, so the span may overstate
/// the number of live articles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupEntry {
    pub low1: u64,
    pub high1: u64,
    pub count1: u64,
    pub low2: u64,
    pub high2: u64,
    pub count2: u64,
}

impl Record for GroupEntry {}

impl GroupEntry {
    pub const fn new() -> Self {
        Self {
            low1: 0,
            high1: 0,
            count1: 0,
            low2: 0,
            high2: 0,
            count2: 0,
        }
    }

    /// Allocates the next article number and extends generation 2 to cover
    /// it. Never returns 0.
    pub fn increment(&mut self) -> u64 {
        let next = self.high1.max(self.high2) + 1;
        if self.low2 == 0 {
            self.low2 = next;
        }
        self.high2 = next;
        self.count2 += 1;
        next
    }

    /// Gives back a number previously returned by
    /// [`increment`](Self::increment).
    ///
    /// Rolling back the top edge lowers `high2`, the bottom edge raises
    /// `low2`, anything in between only lowers the count. Numbers outside
    /// generation 2 are ignored.
    pub fn rollback(&mut self, i: u64) {
        if self.low2 == 0 || i < self.low2 || i > self.high2 {
            return;
        }
        if i == self.high2 {
            self.high2 -= 1;
        } else if i == self.low2 {
            self.low2 += 1;
        }
        self.count2 = self.count2.saturating_sub(1);
        if self.count2 == 0 || self.low2 > self.high2 {
            self.clear_gen2();
        }
    }

    /// Folds generation 2 into generation 1 and returns the new `high1`.
    pub fn move_down(&mut self) -> u64 {
        if self.low2 != 0 {
            if self.low1 == 0 {
                self.low1 = self.low2;
            }
            self.high1 = self.high2;
            self.count1 += self.count2;
            self.clear_gen2();
        }
        self.high1
    }

    /// Replaces generation 1 if its `high` still equals `old_high`.
    ///
    /// Returns `false`, leaving the entry untouched, when another writer got
    /// there first.
    pub fn update_down(&mut self, old_high: u64, low: u64, high: u64, count: u64) -> bool {
        if self.high1 != old_high {
            return false;
        }
        self.low1 = low;
        self.high1 = high;
        self.count1 = count;
        true
    }

    /// Merged `(low, high, count)` over both generations.
    pub fn hl_stats(&self) -> HlStats {
        let (mut low, mut high, mut count) = (0, 0, 0);
        if self.low1 != 0 {
            (low, high, count) = (self.low1, self.high1, self.count1);
        }
        if self.low2 != 0 {
            if low == 0 {
                low = self.low2;
            }
            high = self.high2;
            count += self.count2;
        }
        (low, high, count)
    }

    const fn clear_gen2(&mut self) {
        self.low2 = 0;
        self.high2 = 0;
        self.count2 = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_counts_up_from_one() {
        let mut e = GroupEntry::new();
        let got: Vec<u64> = (0..5).map(|_| e.increment()).collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
        assert_eq!(e.hl_stats(), (1, 5, 5));
    }

    #[test]
    fn rollback_of_last_increment_restores_stats() {
        let mut e = GroupEntry::new();
        let before = e.hl_stats();
        let n = e.increment();
        e.rollback(n);
        assert_eq!(e.hl_stats(), before);

        for _ in 0..3 {
            e.increment();
        }
        let before = e.hl_stats();
        let n = e.increment();
        e.rollback(n);
        assert_eq!(e.hl_stats(), before);
    }

    #[test]
    fn rollback_on_top_of_settled_generation() {
        let mut e = GroupEntry {
            low1: 1,
            high1: 5,
            count1: 5,
            ..GroupEntry::new()
        };
        let n = e.increment();
        assert_eq!(n, 6);
        e.rollback(n);
        assert_eq!(e, GroupEntry {
            low1: 1,
            high1: 5,
            count1: 5,
            ..GroupEntry::new()
        });
    }

    #[test]
    fn bottom_edge_rollback_raises_low2() {
        let mut e = GroupEntry::new();
        for _ in 0..3 {
            e.increment();
        }
        e.rollback(1);
        assert_eq!((e.low2, e.high2, e.count2), (2, 3, 2));
        assert_eq!(e.hl_stats(), (2, 3, 2));
    }

    #[test]
    fn interior_rollback_only_lowers_count() {
        let mut e = GroupEntry::new();
        for _ in 0..3 {
            e.increment();
        }
        e.rollback(2);
        assert_eq!(e.hl_stats(), (1, 3, 2));
    }

    #[test]
    fn rollback_outside_generation_two_is_ignored() {
        let mut e = GroupEntry {
            low1: 1,
            high1: 10,
            count1: 10,
            ..GroupEntry::new()
        };
        e.rollback(4);
        assert_eq!(e.hl_stats(), (1, 10, 10));

        e.increment();
        e.rollback(99);
        e.rollback(3);
        assert_eq!(e.hl_stats(), (1, 11, 11));
    }

    #[test]
    fn two_element_generation_survives_single_rollback() {
        let mut e = GroupEntry::new();
        e.increment();
        e.increment();
        e.rollback(2);
        assert_eq!(e.hl_stats(), (1, 1, 1));
        let n = e.increment();
        assert_eq!(n, 2);
    }

    #[test]
    fn move_down_folds_generations() {
        let mut e = GroupEntry::new();
        for _ in 0..4 {
            e.increment();
        }
        assert_eq!(e.move_down(), 4);
        assert_eq!(e, GroupEntry {
            low1: 1,
            high1: 4,
            count1: 4,
            ..GroupEntry::new()
        });

        e.increment();
        e.increment();
        assert_eq!(e.move_down(), 6);
        assert_eq!(e.hl_stats(), (1, 6, 6));
        // Nothing left to fold.
        assert_eq!(e.move_down(), 6);
    }

    #[test]
    fn update_down_is_compare_and_swap() {
        let mut e = GroupEntry::new();
        for _ in 0..3 {
            e.increment();
        }
        e.move_down();

        assert!(!e.update_down(2, 2, 3, 2));
        assert_eq!(e.hl_stats(), (1, 3, 3));

        assert!(e.update_down(3, 2, 3, 2));
        assert_eq!(e.hl_stats(), (2, 3, 2));
    }

    #[test]
    fn record_roundtrips_as_array() {
        let mut e = GroupEntry::new();
        e.increment();
        e.move_down();
        e.increment();
        let raw = e.encode().unwrap();
        // fixarray of six positive fixints
        assert_eq!(&raw[..], &[0x96, 1, 1, 1, 2, 2, 1]);
        assert_eq!(GroupEntry::decode(&raw).unwrap(), e);
    }
}
