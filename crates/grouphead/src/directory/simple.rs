use super::{ArticleGroupStore, Granularity, beyond, live_count};
use crate::{
    Clock, ClusteredStore, CounterStore, Error, GroupIdentifiers, GroupStats, Order, Overview,
    Record, Result, SystemClock,
};
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

/// One partition per group, article numbers as clustering keys.
///
/// Few moving parts, but every record of a group lands on the same
/// partition, which skews storage for very large groups. See
/// [`TwoLevelGroupStore`](crate::TwoLevelGroupStore) for the bucketed
/// layout.
pub struct SimpleGroupStore<S, C, I> {
    rows: S,
    counters: C,
    ids: I,
    granularity: Granularity,
    clock: Arc<dyn Clock>,
}

impl<S, C, I> SimpleGroupStore<S, C, I>
where
    S: ClusteredStore,
    C: CounterStore,
    I: GroupIdentifiers,
{
    pub fn new(rows: S, counters: C, ids: I) -> Self {
        Self {
            rows,
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

    /// Best-effort removal of a partially stored article.
    async fn discard(&self, ids: &[Uuid], numbers: &[u64], counted: &[Uuid], window: u64) {
        for (id, number) in ids.iter().zip(numbers) {
            if let Err(_e) = self.rows.delete(id.as_bytes(), *number).await {
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

    async fn edge(&self, partition: &[u8], order: Order) -> Result<Option<u64>> {
        let rows = self.rows.scan(partition, 0..=u64::MAX, order, 1).await?;
        Ok(rows.first().map(|row| row.key))
    }
}

impl<S, C, I> ArticleGroupStore for SimpleGroupStore<S, C, I>
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
                self.rows
                    .put(id.as_bytes(), *number, value.clone(), row_expiry)
                    .await?;
                written += 1;
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
        match self.rows.get(id.as_bytes(), number).await? {
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
        if first > last {
            return Ok(());
        }
        for row in self
            .rows
            .scan(id.as_bytes(), first..=last, order, usize::MAX)
            .await?
        {
            match Overview::decode(&row.value) {
                Ok(ov) => f(row.key, &ov),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Skipping undecodable overview of article {}: {_e}", row.key);
                }
            }
        }
        Ok(())
    }

    async fn list<F>(&self, group: &[u8], first: u64, last: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64) + Send,
    {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(());
        };
        if first > last {
            return Ok(());
        }
        for row in self
            .rows
            .scan(id.as_bytes(), first..=last, Order::Ascending, usize::MAX)
            .await?
        {
            f(row.key);
        }
        Ok(())
    }

    async fn step(&self, group: &[u8], i: u64, direction: Order) -> Result<Option<(u64, Overview)>> {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(None);
        };
        let Some(range) = beyond(i, direction) else {
            return Ok(None);
        };
        let rows = self.rows.scan(id.as_bytes(), range, direction, 1).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some((row.key, Overview::decode(&row.value)?))),
            None => Ok(None),
        }
    }

    async fn realtime_query(&self, group: &[u8]) -> Result<Option<GroupStats>> {
        let Some(id) = self.ids.peek(group).await? else {
            return Ok(None);
        };
        let partition = id.as_bytes();
        let (Some(low), Some(high)) = (
            self.edge(partition, Order::Ascending).await?,
            self.edge(partition, Order::Descending).await?,
        ) else {
            return Ok(Some(GroupStats::default()));
        };
        let counted = self
            .counters
            .sum(partition, self.clock.unix_secs())
            .await?;
        Ok(Some(GroupStats {
            number: live_count(counted, low, high),
            low,
            high,
        }))
    }
}
