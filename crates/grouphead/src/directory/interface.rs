use crate::{GroupStats, Order, Overview, Result};
use bytes::Bytes;
use core::future::Future;
use std::sync::Arc;

/// Most buckets [`ArticleGroupStore::step`] looks at before giving up.
pub const MAX_STEP_BUCKETS: usize = 128;

/// Per-group directory of `number -> overview` records.
///
/// Reads never see records whose expiry has passed. Queries on a group that
/// was never written to behave like queries on an empty group, except
/// [`realtime_query`](Self::realtime_query) which returns `None`.
pub trait ArticleGroupStore: Send + Sync {
    /// Writes one record per `(groups[i], numbers[i])`, all with the same
    /// overview and expiry.
    fn store_article_infos(
        &self,
        groups: &[Bytes],
        numbers: &[u64],
        expires_at: u64,
        overview: &Overview,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Message-id of the article at `number`.
    fn stat(&self, group: &[u8], number: u64) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    fn get(&self, group: &[u8], number: u64) -> impl Future<Output = Result<Option<Overview>>> + Send;

    /// Calls `f` for every record in `first..=last`, in `order`.
    fn overview<F>(
        &self,
        group: &[u8],
        first: u64,
        last: u64,
        order: Order,
        f: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(u64, &Overview) + Send;

    /// Calls `f` for every number in `first..=last`, ascending.
    fn list<F>(
        &self,
        group: &[u8],
        first: u64,
        last: u64,
        f: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(u64) + Send;

    /// The closest record strictly after (`Ascending`) or before
    /// (`Descending`) `i`.
    fn step(
        &self,
        group: &[u8],
        i: u64,
        direction: Order,
    ) -> impl Future<Output = Result<Option<(u64, Overview)>>> + Send;

    /// Approximate live count and number range.
    fn realtime_query(&self, group: &[u8]) -> impl Future<Output = Result<Option<GroupStats>>> + Send;
}

impl<G: ArticleGroupStore> ArticleGroupStore for Arc<G> {
    fn store_article_infos(
        &self,
        groups: &[Bytes],
        numbers: &[u64],
        expires_at: u64,
        overview: &Overview,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).store_article_infos(groups, numbers, expires_at, overview)
    }

    fn stat(&self, group: &[u8], number: u64) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        (**self).stat(group, number)
    }

    fn get(&self, group: &[u8], number: u64) -> impl Future<Output = Result<Option<Overview>>> + Send {
        (**self).get(group, number)
    }

    fn overview<F>(
        &self,
        group: &[u8],
        first: u64,
        last: u64,
        order: Order,
        f: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(u64, &Overview) + Send,
    {
        (**self).overview(group, first, last, order, f)
    }

    fn list<F>(
        &self,
        group: &[u8],
        first: u64,
        last: u64,
        f: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(u64) + Send,
    {
        (**self).list(group, first, last, f)
    }

    fn step(
        &self,
        group: &[u8],
        i: u64,
        direction: Order,
    ) -> impl Future<Output = Result<Option<(u64, Overview)>>> + Send {
        (**self).step(group, i, direction)
    }

    fn realtime_query(&self, group: &[u8]) -> impl Future<Output = Result<Option<GroupStats>>> + Send {
        (**self).realtime_query(group)
    }
}

/// Range strictly past `i` in `direction`, `None` when there is none.
pub(crate) fn beyond(i: u64, direction: Order) -> Option<core::ops::RangeInclusive<u64>> {
    match direction {
        Order::Ascending => i.checked_add(1).map(|from| from..=u64::MAX),
        Order::Descending => i.checked_sub(1).map(|to| 0..=to),
    }
}

/// Live count from counter cells, clamped to the span `low..=high`.
pub(crate) fn live_count(counted: Option<i64>, low: u64, high: u64) -> u64 {
    let span = high - low + 1;
    match counted {
        Some(n) => u64::try_from(n).unwrap_or(0).min(span),
        None => span,
    }
}
