use crate::DAY_SECS;

/// Maps article expiry times onto coarse counter windows.
///
/// Live-count counters are kept per window rather than per article, so a
/// group has one counter cell per `window_secs` of expiry instead of one per
/// expiry second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Granularity {
    pub window_secs: u64,
}

impl Default for Granularity {
    fn default() -> Self {
        Self {
            window_secs: DAY_SECS,
        }
    }
}

impl Granularity {
    pub const fn new(window_secs: u64) -> Self {
        Self { window_secs }
    }

    /// Returns `(row expiry, counter window)` for an article expiring at
    /// `expires_at` (0 = never).
    ///
    /// The window is `expires_at` rounded up to a multiple of `window_secs`;
    /// articles that never expire are counted in the last window, which is
    /// never purged.
    pub const fn convert(&self, expires_at: u64) -> (u64, u64) {
        if expires_at == 0 {
            return (0, u64::MAX);
        }
        if self.window_secs <= 1 {
            return (expires_at, expires_at);
        }
        let window = match expires_at.div_ceil(self.window_secs).checked_mul(self.window_secs) {
            Some(window) => window,
            None => u64::MAX,
        };
        (expires_at, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_window() {
        let g = Granularity::new(100);
        assert_eq!(g.convert(1), (1, 100));
        assert_eq!(g.convert(100), (100, 100));
        assert_eq!(g.convert(101), (101, 200));
        assert_eq!(g.convert(0), (0, u64::MAX));
        assert_eq!(g.convert(u64::MAX - 1), (u64::MAX - 1, u64::MAX));
    }

    #[test]
    fn default_is_one_day() {
        assert_eq!(Granularity::default().convert(1), (1, 86_400));
    }
}
