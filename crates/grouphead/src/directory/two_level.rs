use super::{ArticleGroupStore, Granularity, MAX_STEP_BUCKETS, beyond, live_count};
use crate::{
    Clock, ClusteredStore, CounterStore, Error, GroupIdentifiers, GroupStats, Order, Overview,
    Record, Result, Row, SystemClock,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use uuid::Uuid;

const BUCKET_BITS: u32 = 24;

/// Bucket holding article `n`: `n` with its low 24 bits cleared.
pub const fn bucket_of(n: u64) -> u64 {
    n & !((1 << BUCKET_BITS) - 1)
}

/// Partition key of the bucket: group id followed by the bucket, big endian.
fn partition_key(id: &Uuid, bucket: u64) -> Bytes {
    let mut key = BytesMut::with_capacity(24);
    key.put_slice(id.as_bytes());
    key.put_u64(bucket);
    key.freeze()
}

/// Group directory split into buckets of 2^24 article numbers.
///
/// Each bucket is its own partition of `rows`, keyed by group id and bucket.
/// A per-group partition of `index` lists the live buckets (value: the
/// latest expiry of the bucket's records), so range scans and steps walk
/// buckets in order without probing empty ones.
pub struct TwoLevelGroupStore<S, C, I> {
    rows: S,
    index: S,
    counters: C,
    ids: I,
    granularity: Granularity,
    clock: Arc<dyn Clock>,
}

impl<S, C, I> TwoLevelGroupStore<S, C, I>
where
    S: ClusteredStore,
    C: CounterStore,
    I: GroupIdentifiers,
{
    pub fn new(rows: S, index: S, counters: C, ids: I) -> Self {
        Self {
            rows,
            index,
            counters,
            ids,
            granularity: Granularity::default(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub const fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Drops counter cells whose window has passed.
    pub async fn maintain(&self) -> Result<u64> {
        self.counters.purge_before(self.clock.unix_secs()).await
    }

    /// Records that `bucket` holds an article living until `expires_at`.
    ///
    /// The index value is the latest expiry of the bucket's records, big
    /// endian. Concurrent writers never shorten it.
    async fn touch_bucket(&self, id: &Uuid, bucket: u64, expires_at: u64) -> Result<()> {
        let value = Bytes::copy_from_slice(&expires_at.to_be_bytes());
        self.index
            .put_if_outlives(id.as_bytes(), bucket, value, expires_at)
            .await?;
        Ok(())
    }

    /// Best-effort removal of a partially stored article.
    async fn discard(&self, ids: &[Uuid], numbers: &[u64], counted: &[Uuid], window: u64) {
        for (id, number) in ids.iter().zip(numbers) {
            let partition = partition_key(id, bucket_of(*number));
            if let Err(_e) = self.rows.delete(&partition, *number).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to remove directory row {number}: {_e}");
            }
        }
        for id in counted {
            if let Err(_e) = self.counters.add(id.as_bytes(), window, -1).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to undo counter of group {id}: {_e}");
            }
        }
    }

    /// Live buckets in `range`, walking the index in `order`.
    async fn buckets(
        &self,
        id: &Uuid,
        range: core::ops::RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let rows = self.index.scan(id.as_bytes(), range, order, limit).await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    /// First record in `order` found within the next `MAX_STEP_BUCKETS`
    /// buckets of `range`.
    async fn first_row(
        &self,
        id: &Uuid,
        range: core::ops::RangeInclusive<u64>,
        order: Order,
    ) -> Result<Option<Row>> {
        let (start, end) = (*range.start(), *range.end());
        let buckets = self
            .buckets(id, bucket_of(start)..=bucket_of(end), order, MAX_STEP_BUCKETS)
            .await?;
        for bucket in buckets {
            let rows = self
                .rows
                .scan(&partition_key(id, bucket), start..=end, order, 1)
                .await?;
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn for_each_row(
        &self,
        id: &Uuid,
        first: u64,
        last: u64,
        order: Order,
        mut f: impl FnMut(Row) + Send,
    ) -> Result<()> {
        if first > last {
            return Ok(());
        }
        let buckets = self
            .buckets(id, bucket_of(first)..=bucket_of(last), order, usize::MAX)
            .await?;
        for bucket in buckets {
            let rows = self
                .rows
                .scan(&partition_key(id, bucket), first..=last, order, usize::MAX)
                .await?;
            rows.into_iter().for_each(&mut f);
        }
        Ok(())
    }
}

impl<S, C, I> ArticleGroupStore for TwoLevelGroupStore<S, C, I>
where
    S: ClusteredStore,
    C: CounterStore,
    I: GroupIdentifiers,
{
    async fn store_article_infos(
        &self,
        groups: &[Bytes],
        numbers: &[u64],
        expires_at: u64,
        overview: &Overview,
    ) -> Result<()> {
        if groups.len() != numbers.len() {
            return Err(Error::invalid(format!(
                "length mismatch {} != {}",
                groups.len(),
                numbers.len()
            )));
        }
        let value = overview.encode()?;
        let mut ids = Vec::with_capacity(groups.len());
        for group in groups {
            ids.push(self.ids.get_or_create(group).await?);
        }
        let (row_expiry, window) = self.granularity.convert(expires_at);

        let mut written = 0;
        let mut counted = 0;
        let res = async {
            for (id, number) in ids.iter().zip(numbers) {
                let bucket = bucket_of(*number);
                self.rows
                    .put(&partition_key(id, bucket), *number, value.clone(), row_expiry)
                    .await?;
                written += 1;
            }
            for (id, number) in ids.iter().zip(numbers) {
                self.touch_bucket(id, bucket_of(*number), row_expiry).await?;
            }
            for id in &ids {
                self.counters.add(id.as_bytes(), window, 1).await?;
                counted += 1;
            }
            Ok::<(), Error>(())
        }
        .await;
        if res.is_err() {
            self.discard(&ids[..written], &numbers[..written], &ids[..counted], window)
                .await;
        }
        res
    }

    async fn stat(&self, group: &[u8], number: u64) -> Result<Option<Bytes>> {
        Ok(self.get(group, number).await?.map(|ov| ov.message_id))
    }

    async fn get(&self, group: &[u8], number: u64) -> Result<Option<Overview>> {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(None);
        };
        let partition = partition_key(&id, bucket_of(number));
        match self.rows.get(&partition, number).await? {
            Some(row) => Ok(Some(Overview::decode(&row.value)?)),
            None => Ok(None),
        }
    }

    async fn overview<F>(&self, group: &[u8], first: u64, last: u64, order: Order, mut f: F) -> Result<()>
    where
        F: FnMut(u64, &Overview) + Send,
    {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(());
        };
        self.for_each_row(&id, first, last, order, |row| match Overview::decode(&row.value) {
            Ok(ov) => f(row.key, &ov),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Skipping undecodable overview of article {}: {_e}", row.key);
            }
        })
        .await
    }

    async fn list<F>(&self, group: &[u8], first: u64, last: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64) + Send,
    {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(());
        };
        self.for_each_row(&id, first, last, Order::Ascending, |row| f(row.key))
            .await
    }

    async fn step(&self, group: &[u8], i: u64, direction: Order) -> Result<Option<(u64, Overview)>> {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(None);
        };
        let Some(range) = beyond(i, direction) else {
            return Ok(None);
        };
        match self.first_row(&id, range, direction).await? {
            Some(row) => Ok(Some((row.key, Overview::decode(&row.value)?))),
            None => Ok(None),
        }
    }

    async fn realtime_query(&self, group: &[u8]) -> Result<Option<GroupStats>> {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(None);
        };
        let (Some(low), Some(high)) = (
            self.first_row(&id, 0..=u64::MAX, Order::Ascending).await?,
            self.first_row(&id, 0..=u64::MAX, Order::Descending).await?,
        ) else {
            return Ok(Some(GroupStats::default()));
        };
        let (low, high) = (low.key, high.key);
        let counted = self
            .counters
            .sum(id.as_bytes(), self.clock.unix_secs())
            .await?;
        Ok(Some(GroupStats {
            number: live_count(counted, low, high),
            low,
            high,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_clear_low_bits() {
        assert_eq!(bucket_of(1), 0);
        assert_eq!(bucket_of(0xFF_FFFF), 0);
        assert_eq!(bucket_of(0x100_0000), 0x100_0000);
        assert_eq!(bucket_of(0x1234_5678_9ABC), 0x1234_5700_0000);
    }

    #[test]
    fn partition_key_layout() {
        let id = Uuid::from_u128(1);
        let key = partition_key(&id, 0x100_0000);
        assert_eq!(key.len(), 24);
        assert_eq!(&key[..16], id.as_bytes());
        assert_eq!(&key[16..], &[0, 0, 0, 0, 1, 0, 0, 0]);
    }
}
