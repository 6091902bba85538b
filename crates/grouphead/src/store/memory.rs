//! In-process implementations of every store contract.
//!
//! Each store keeps its rows behind a `parking_lot` lock and never holds the
//! lock across an await point. Rows carrying an expiry are checked against
//! the store's [`Clock`], standing in for a driver-side TTL.

use super::{
    Article, ArticleDirectStore, BackendTable, ClusteredStore, CounterRowStore, CounterStore,
    GroupIdentifiers, GroupList, GroupListing, Order, Row, TablePair, outlives,
};
use crate::{AuthRank, Clock, Overview, Result, SystemClock};
use bytes::Bytes;
use core::ops::RangeInclusive;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use uuid::Uuid;

const fn is_live(expires_at: u64, now: u64) -> bool {
    expires_at == 0 || expires_at > now
}

/// [`BackendTable`] over a hash map.
#[derive(Debug, Default)]
pub struct MemoryBackendTable {
    rows: RwLock<HashMap<Bytes, Bytes>>,
}

impl MemoryBackendTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value stored for `group`.
    pub fn value(&self, group: &[u8]) -> Option<Bytes> {
        self.rows.read().get(group).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl BackendTable for MemoryBackendTable {
    async fn get_pairs(&self, groups: &[Bytes]) -> Result<Vec<TablePair>> {
        let rows = self.rows.read();
        Ok(groups
            .iter()
            .filter_map(|g| {
                rows.get(g)
                    .map(|v| TablePair::new(g.clone(), v.clone()))
            })
            .collect())
    }

    async fn set_pairs(&self, pairs: &[TablePair]) -> Result<()> {
        let mut rows = self.rows.write();
        for pair in pairs {
            rows.insert(pair.group.clone(), pair.value.clone());
        }
        Ok(())
    }
}

type Partition = BTreeMap<u64, (Bytes, u64)>;

/// [`ClusteredStore`] over ordered maps.
pub struct MemoryClusteredStore {
    clock: Arc<dyn Clock>,
    partitions: RwLock<HashMap<Bytes, Partition>>,
}

impl Default for MemoryClusteredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClusteredStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            partitions: RwLock::default(),
        }
    }

    /// Number of partitions holding at least one row, live or not.
    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }
}

impl ClusteredStore for MemoryClusteredStore {
    async fn put(&self, partition: &[u8], key: u64, value: Bytes, expires_at: u64) -> Result<()> {
        self.partitions
            .write()
            .entry(Bytes::copy_from_slice(partition))
            .or_default()
            .insert(key, (value, expires_at));
        Ok(())
    }

    async fn put_if_outlives(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> Result<bool> {
        let now = self.clock.unix_secs();
        let mut partitions = self.partitions.write();
        let rows = partitions
            .entry(Bytes::copy_from_slice(partition))
            .or_default();
        let kept = rows
            .get(&key)
            .is_some_and(|(_, current)| is_live(*current, now) && !outlives(expires_at, *current));
        if kept {
            return Ok(false);
        }
        rows.insert(key, (value, expires_at));
        Ok(true)
    }

    async fn get(&self, partition: &[u8], key: u64) -> Result<Option<Row>> {
        let now = self.clock.unix_secs();
        let partitions = self.partitions.read();
        Ok(partitions
            .get(partition)
            .and_then(|p| p.get(&key))
            .filter(|(_, exp)| is_live(*exp, now))
            .map(|(value, exp)| Row {
                key,
                value: value.clone(),
                expires_at: *exp,
            }))
    }

    async fn scan(
        &self,
        partition: &[u8],
        range: RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let now = self.clock.unix_secs();
        let partitions = self.partitions.read();
        let Some(p) = partitions.get(partition) else {
            return Ok(Vec::new());
        };
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let to_row = |(key, (value, exp)): (&u64, &(Bytes, u64))| Row {
            key: *key,
            value: value.clone(),
            expires_at: *exp,
        };
        let live = |(_, (_, exp)): &(&u64, &(Bytes, u64))| is_live(*exp, now);
        let rows = p.range(range);
        Ok(match order {
            Order::Ascending => rows.filter(live).take(limit).map(to_row).collect(),
            Order::Descending => rows.rev().filter(live).take(limit).map(to_row).collect(),
        })
    }

    async fn delete(&self, partition: &[u8], key: u64) -> Result<()> {
        let mut partitions = self.partitions.write();
        if let Some(rows) = partitions.get_mut(partition) {
            rows.remove(&key);
            if rows.is_empty() {
                partitions.remove(partition);
            }
        }
        Ok(())
    }
}

/// [`CounterStore`] over ordered maps.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    cells: Mutex<HashMap<Bytes, BTreeMap<u64, i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.lock().values().map(BTreeMap::len).sum()
    }
}

impl CounterStore for MemoryCounterStore {
    async fn add(&self, partition: &[u8], cell: u64, delta: i64) -> Result<i64> {
        let mut cells = self.cells.lock();
        let value = cells
            .entry(Bytes::copy_from_slice(partition))
            .or_default()
            .entry(cell)
            .or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn sum(&self, partition: &[u8], from: u64) -> Result<Option<i64>> {
        let cells = self.cells.lock();
        Ok(cells.get(partition).and_then(|p| {
            let mut live = p.range(from..).map(|(_, v)| *v).peekable();
            live.peek()?;
            Some(live.sum())
        }))
    }

    async fn purge_before(&self, now: u64) -> Result<u64> {
        let mut cells = self.cells.lock();
        let mut purged = 0;
        cells.retain(|_, p| {
            let live = p.split_off(&now);
            purged += p.len() as u64;
            *p = live;
            !p.is_empty()
        });
        Ok(purged)
    }
}

/// [`GroupIdentifiers`] handing out random v4 UUIDs.
#[derive(Debug, Default)]
pub struct MemoryIdentifiers {
    ids: RwLock<HashMap<Bytes, Uuid>>,
}

impl MemoryIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupIdentifiers for MemoryIdentifiers {
    async fn peek(&self, group: &[u8]) -> Result<Option<Uuid>> {
        Ok(self.ids.read().get(group).copied())
    }

    async fn get_or_create(&self, group: &[u8]) -> Result<Uuid> {
        if let Some(id) = self.ids.read().get(group) {
            return Ok(*id);
        }
        Ok(*self
            .ids
            .write()
            .entry(Bytes::copy_from_slice(group))
            .or_insert_with(Uuid::new_v4))
    }
}

#[derive(Debug, Default)]
struct CounterRow {
    counter: u64,
    free: Vec<u64>,
}

/// [`CounterRowStore`] over a hash map.
#[derive(Debug, Default)]
pub struct MemoryCounterRows {
    rows: Mutex<HashMap<Bytes, CounterRow>>,
}

impl MemoryCounterRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(counter, free list)` of a group.
    pub fn row(&self, group: &[u8]) -> Option<(u64, Vec<u64>)> {
        self.rows
            .lock()
            .get(group)
            .map(|r| (r.counter, r.free.clone()))
    }
}

impl CounterRowStore for MemoryCounterRows {
    async fn increment_if_no_free(&self, group: &[u8], count: u64) -> Result<Option<u64>> {
        let mut rows = self.rows.lock();
        Ok(rows
            .get_mut(group)
            .filter(|r| r.free.is_empty())
            .map(|r| {
                r.counter += count;
                r.counter
            }))
    }

    async fn take_free(&self, group: &[u8], count: usize) -> Result<Option<Vec<u64>>> {
        let mut rows = self.rows.lock();
        Ok(rows.get_mut(group).map(|r| {
            let n = count.min(r.free.len());
            r.free.drain(..n).collect()
        }))
    }

    async fn insert_row(&self, group: &[u8], counter: u64) -> Result<bool> {
        let mut rows = self.rows.lock();
        if rows.contains_key(group) {
            return Ok(false);
        }
        rows.insert(
            Bytes::copy_from_slice(group),
            CounterRow {
                counter,
                free: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn merge_free(&self, group: &[u8], ids: &[u64]) -> Result<()> {
        let mut rows = self.rows.lock();
        if let Some(r) = rows.get_mut(group) {
            r.free.extend_from_slice(ids);
            r.free.sort_unstable();
            r.free.dedup();
        }
        Ok(())
    }
}

struct StoredArticle {
    overview: Overview,
    head: Bytes,
    body: Bytes,
    expires_at: u64,
}

/// [`ArticleDirectStore`] over a hash map.
pub struct MemoryArticleDirect {
    clock: Arc<dyn Clock>,
    articles: RwLock<HashMap<Bytes, StoredArticle>>,
}

impl Default for MemoryArticleDirect {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryArticleDirect {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            articles: RwLock::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.articles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.read().is_empty()
    }

    fn with_live<R>(&self, id: &[u8], f: impl FnOnce(&StoredArticle) -> R) -> Option<R> {
        let now = self.clock.unix_secs();
        self.articles
            .read()
            .get(id)
            .filter(|a| is_live(a.expires_at, now))
            .map(f)
    }
}

impl ArticleDirectStore for MemoryArticleDirect {
    async fn stat(&self, id: &[u8]) -> Result<bool> {
        Ok(self.with_live(id, |_| ()).is_some())
    }

    async fn get(&self, id: &[u8], head: bool, body: bool) -> Result<Option<Article>> {
        Ok(self.with_live(id, |a| Article {
            head: head.then(|| a.head.clone()),
            body: body.then(|| a.body.clone()),
        }))
    }

    async fn overview(&self, id: &[u8]) -> Result<Option<Overview>> {
        Ok(self.with_live(id, |a| a.overview.clone()))
    }

    async fn store(&self, expires_at: u64, overview: &Overview, head: Bytes, body: Bytes) -> Result<()> {
        self.articles.write().insert(
            overview.message_id.clone(),
            StoredArticle {
                overview: overview.clone(),
                head,
                body,
                expires_at,
            },
        );
        Ok(())
    }

    async fn rollback(&self, id: &[u8]) -> Result<()> {
        self.articles.write().remove(id);
        Ok(())
    }
}

/// [`GroupList`] over an ordered map.
#[derive(Debug, Default)]
pub struct MemoryGroupList {
    groups: RwLock<BTreeMap<Bytes, (u8, Bytes)>>,
}

impl MemoryGroupList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupList for MemoryGroupList {
    async fn add_group_status(&self, group: &[u8], status: u8) -> Result<()> {
        self.groups
            .write()
            .entry(Bytes::copy_from_slice(group))
            .or_default()
            .0 = status;
        Ok(())
    }

    async fn add_group_descr(&self, group: &[u8], descr: &[u8]) -> Result<()> {
        self.groups
            .write()
            .entry(Bytes::copy_from_slice(group))
            .or_default()
            .1 = Bytes::copy_from_slice(descr);
        Ok(())
    }

    async fn filter_with_auth(&self, rank: AuthRank, groups: Vec<Bytes>) -> Result<Vec<Bytes>> {
        if rank == AuthRank::Reader {
            return Ok(Vec::new());
        }
        let known = self.groups.read();
        Ok(groups
            .into_iter()
            .filter(|g| {
                known
                    .get(g)
                    .is_some_and(|(status, _)| *status != 0 && rank.test_status(*status))
            })
            .collect())
    }

    async fn base_list(&self) -> Result<Vec<GroupListing>> {
        Ok(self
            .groups
            .read()
            .iter()
            .filter(|(_, (status, _))| *status != 0)
            .map(|(group, (status, descr))| GroupListing {
                group: group.clone(),
                status: *status,
                descr: descr.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[tokio::test]
    async fn clustered_scan_skips_expired_rows() {
        let clock = ManualClock::new(100);
        let store = MemoryClusteredStore::with_clock(clock.clone());
        for key in 1..=5u64 {
            let exp = if key == 3 { 150 } else { 0 };
            store
                .put(b"p", key, Bytes::from(vec![key as u8]), exp)
                .await
                .unwrap();
        }

        let keys = |rows: Vec<Row>| rows.into_iter().map(|r| r.key).collect::<Vec<_>>();
        let asc = store.scan(b"p", 1..=5, Order::Ascending, 10).await.unwrap();
        assert_eq!(keys(asc), vec![1, 2, 3, 4, 5]);

        clock.set(150);
        let asc = store.scan(b"p", 2..=5, Order::Ascending, 2).await.unwrap();
        assert_eq!(keys(asc), vec![2, 4]);
        let desc = store.scan(b"p", 1..=4, Order::Descending, 10).await.unwrap();
        assert_eq!(keys(desc), vec![4, 2, 1]);
        assert!(store.get(b"p", 3).await.unwrap().is_none());
    }

    #[test]
    fn expiry_zero_outlives_everything() {
        assert!(outlives(0, 10));
        assert!(!outlives(10, 0));
        assert!(!outlives(0, 0));
        assert!(outlives(11, 10));
        assert!(!outlives(10, 10));
    }

    #[tokio::test]
    async fn conditional_put_keeps_the_later_expiry() {
        let clock = ManualClock::new(100);
        let store = MemoryClusteredStore::with_clock(clock.clone());
        let expiry = |row: Option<Row>| row.map(|r| r.expires_at);

        assert!(store.put_if_outlives(b"p", 1, Bytes::new(), 500).await.unwrap());
        assert!(!store.put_if_outlives(b"p", 1, Bytes::new(), 200).await.unwrap());
        assert!(!store.put_if_outlives(b"p", 1, Bytes::new(), 500).await.unwrap());
        assert_eq!(expiry(store.get(b"p", 1).await.unwrap()), Some(500));

        assert!(store.put_if_outlives(b"p", 1, Bytes::new(), 0).await.unwrap());
        assert!(!store.put_if_outlives(b"p", 1, Bytes::new(), 900).await.unwrap());
        assert_eq!(expiry(store.get(b"p", 1).await.unwrap()), Some(0));

        // An expired row no longer blocks the write.
        store.put(b"p", 2, Bytes::new(), 150).await.unwrap();
        clock.set(150);
        assert!(store.put_if_outlives(b"p", 2, Bytes::new(), 120).await.unwrap());
    }

    #[tokio::test]
    async fn clustered_delete_removes_rows() {
        let store = MemoryClusteredStore::new();
        store.put(b"p", 1, Bytes::new(), 0).await.unwrap();
        store.put(b"p", 2, Bytes::new(), 0).await.unwrap();
        store.delete(b"p", 1).await.unwrap();
        store.delete(b"p", 7).await.unwrap();
        store.delete(b"q", 1).await.unwrap();
        assert!(store.get(b"p", 1).await.unwrap().is_none());
        assert_eq!(store.partition_count(), 1);
        store.delete(b"p", 2).await.unwrap();
        assert_eq!(store.partition_count(), 0);
    }

    #[tokio::test]
    async fn counter_sum_and_purge() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.sum(b"g", 0).await.unwrap(), None);
        store.add(b"g", 10, 2).await.unwrap();
        store.add(b"g", 20, 3).await.unwrap();
        assert_eq!(store.add(b"g", 20, -1).await.unwrap(), 2);

        assert_eq!(store.sum(b"g", 0).await.unwrap(), Some(4));
        assert_eq!(store.sum(b"g", 11).await.unwrap(), Some(2));
        assert_eq!(store.sum(b"g", 21).await.unwrap(), None);

        assert_eq!(store.purge_before(15).await.unwrap(), 1);
        assert_eq!(store.cell_count(), 1);
        assert_eq!(store.purge_before(100).await.unwrap(), 1);
        assert_eq!(store.cell_count(), 0);
    }

    #[tokio::test]
    async fn identifiers_are_stable() {
        let ids = MemoryIdentifiers::new();
        assert_eq!(ids.peek(b"alt.test").await.unwrap(), None);
        let a = ids.get_or_create(b"alt.test").await.unwrap();
        let b = ids.get_or_create(b"alt.test").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(ids.peek(b"alt.test").await.unwrap(), Some(a));
        assert_ne!(ids.get_or_create(b"misc.test").await.unwrap(), a);
    }

    #[tokio::test]
    async fn counter_rows_keep_free_list_sorted() {
        let rows = MemoryCounterRows::new();
        assert_eq!(rows.increment_if_no_free(b"g", 3).await.unwrap(), None);
        assert!(rows.insert_row(b"g", 3).await.unwrap());
        assert!(!rows.insert_row(b"g", 3).await.unwrap());

        rows.merge_free(b"g", &[3, 1]).await.unwrap();
        rows.merge_free(b"g", &[2, 3]).await.unwrap();
        assert_eq!(rows.row(b"g"), Some((3, vec![1, 2, 3])));
        assert_eq!(rows.increment_if_no_free(b"g", 1).await.unwrap(), None);
        assert_eq!(rows.take_free(b"g", 2).await.unwrap(), Some(vec![1, 2]));
        assert_eq!(rows.take_free(b"g", 2).await.unwrap(), Some(vec![3]));
        assert_eq!(rows.increment_if_no_free(b"g", 2).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn group_list_filters_by_rank() {
        let list = MemoryGroupList::new();
        list.add_group_status(b"alt.test", b'y').await.unwrap();
        list.add_group_status(b"comp.mod", b'm').await.unwrap();
        list.add_group_status(b"control", b'n').await.unwrap();
        list.add_group_descr(b"alt.test", b"Testing").await.unwrap();
        list.add_group_descr(b"misc.nostatus", b"no status").await.unwrap();

        let all: Vec<Bytes> = ["alt.test", "comp.mod", "control", "misc.nostatus", "nope"]
            .into_iter()
            .map(|s| Bytes::from_static(s.as_bytes()))
            .collect();
        assert!(
            list.filter_with_auth(AuthRank::Reader, all.clone())
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            list.filter_with_auth(AuthRank::User, all.clone()).await.unwrap(),
            vec![Bytes::from_static(b"alt.test")]
        );
        assert_eq!(
            list.filter_with_auth(AuthRank::Moderator, all.clone())
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            list.filter_with_auth(AuthRank::Feeder, all).await.unwrap().len(),
            3
        );

        let listed = list.base_list().await.unwrap();
        let names: Vec<&[u8]> = listed.iter().map(|l| &l.group[..]).collect();
        assert_eq!(names, vec![&b"alt.test"[..], &b"comp.mod"[..], &b"control"[..]]);
        assert_eq!(listed[0].descr, Bytes::from_static(b"Testing"));
    }
}
