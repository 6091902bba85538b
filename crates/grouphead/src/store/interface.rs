use crate::{AuthRank, Overview, Result};
use bytes::Bytes;
use core::{future::Future, ops::RangeInclusive};
use std::sync::Arc;
use uuid::Uuid;

/// One row of a [`BackendTable`]: a group name and the encoded
/// [`Record`](crate::Record) stored for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePair {
    pub group: Bytes,
    pub value: Bytes,
}

impl TablePair {
    pub fn new(group: Bytes, value: Bytes) -> Self {
        Self { group, value }
    }
}

/// Key/value table persisting the allocator state of the local actors.
pub trait BackendTable: Send + Sync {
    /// Fetches the rows that exist for `groups`. Missing groups are simply
    /// absent from the result, in no particular order.
    fn get_pairs(&self, groups: &[Bytes]) -> impl Future<Output = Result<Vec<TablePair>>> + Send;

    /// Upserts every pair. Either all pairs are written or an error is
    /// returned.
    fn set_pairs(&self, pairs: &[TablePair]) -> impl Future<Output = Result<()>> + Send;
}

/// Direction of a range scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub const fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// A row of a [`ClusteredStore`] partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: u64,
    pub value: Bytes,
    /// Unix seconds after which the row disappears; 0 never expires.
    pub expires_at: u64,
}

/// Wide-row store: partitions of rows ordered by a `u64` clustering key.
///
/// Expired rows must be invisible to `get` and `scan`.
pub trait ClusteredStore: Send + Sync {
    fn put(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Writes the row unless a live row at `key` already expires no earlier
    /// than `expires_at`. The check and the write are one atomic step.
    /// Returns whether the row was written.
    fn put_if_outlives(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn get(&self, partition: &[u8], key: u64) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Returns up to `limit` live rows with keys in `range`, walking the
    /// partition in `order`.
    fn scan(
        &self,
        partition: &[u8],
        range: RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Removes the row, live or not. Removing a missing row is not an error.
    fn delete(&self, partition: &[u8], key: u64) -> impl Future<Output = Result<()>> + Send;
}

impl<S: ClusteredStore> ClusteredStore for Arc<S> {
    fn put(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).put(partition, key, value, expires_at)
    }

    fn put_if_outlives(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> impl Future<Output = Result<bool>> + Send {
        (**self).put_if_outlives(partition, key, value, expires_at)
    }

    fn get(&self, partition: &[u8], key: u64) -> impl Future<Output = Result<Option<Row>>> + Send {
        (**self).get(partition, key)
    }

    fn scan(
        &self,
        partition: &[u8],
        range: RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Row>>> + Send {
        (**self).scan(partition, range, order, limit)
    }

    fn delete(&self, partition: &[u8], key: u64) -> impl Future<Output = Result<()>> + Send {
        (**self).delete(partition, key)
    }
}

/// Whether an expiry of `candidate` outlives `current`, 0 meaning never
/// expires.
pub const fn outlives(candidate: u64, current: u64) -> bool {
    match (candidate, current) {
        (_, 0) => false,
        (0, _) => true,
        (a, b) => a > b,
    }
}

/// Distributed counter cells, addressed by partition and a `u64` cell key.
pub trait CounterStore: Send + Sync {
    /// Adds `delta` to the cell and returns its new value.
    fn add(
        &self,
        partition: &[u8],
        cell: u64,
        delta: i64,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Sums the cells of `partition` whose key is `>= from`. `None` when the
    /// partition has no such cell.
    fn sum(&self, partition: &[u8], from: u64) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Removes every cell whose key is below `now` and returns how many went.
    fn purge_before(&self, now: u64) -> impl Future<Output = Result<u64>> + Send;
}

/// Stable group name to UUID mapping.
pub trait GroupIdentifiers: Send + Sync {
    /// Looks up the UUID without creating one.
    fn peek(&self, group: &[u8]) -> impl Future<Output = Result<Option<Uuid>>> + Send;

    /// Returns the group's UUID, assigning a random one first if needed.
    /// Concurrent callers racing on a new group all observe the same UUID.
    fn get_or_create(&self, group: &[u8]) -> impl Future<Output = Result<Uuid>> + Send;
}

impl<I: GroupIdentifiers> GroupIdentifiers for Arc<I> {
    fn peek(&self, group: &[u8]) -> impl Future<Output = Result<Option<Uuid>>> + Send {
        (**self).peek(group)
    }

    fn get_or_create(&self, group: &[u8]) -> impl Future<Output = Result<Uuid>> + Send {
        (**self).get_or_create(group)
    }
}

/// Counter plus sorted free list per group, the row layout behind
/// [`FreeListAllocator`](crate::FreeListAllocator).
pub trait CounterRowStore: Send + Sync {
    /// Adds `count` to the counter if the free list is empty, returning the
    /// new counter. `None` if the row is missing or the free list is not
    /// empty.
    fn increment_if_no_free(
        &self,
        group: &[u8],
        count: u64,
    ) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Pops up to `count` ids off the front of the free list. `None` if the
    /// row is missing.
    fn take_free(
        &self,
        group: &[u8],
        count: usize,
    ) -> impl Future<Output = Result<Option<Vec<u64>>>> + Send;

    /// Creates the row with the given counter and an empty free list.
    /// Returns `false` if the row already existed.
    fn insert_row(&self, group: &[u8], counter: u64) -> impl Future<Output = Result<bool>> + Send;

    /// Merges `ids` into the free list, keeping it sorted and free of
    /// duplicates.
    fn merge_free(&self, group: &[u8], ids: &[u64]) -> impl Future<Output = Result<()>> + Send;
}

/// Head and body of a stored article. Fields not asked for are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Article {
    pub head: Option<Bytes>,
    pub body: Option<Bytes>,
}

/// Primary article store keyed by message-id.
pub trait ArticleDirectStore: Send + Sync {
    fn stat(&self, id: &[u8]) -> impl Future<Output = Result<bool>> + Send;

    fn get(
        &self,
        id: &[u8],
        head: bool,
        body: bool,
    ) -> impl Future<Output = Result<Option<Article>>> + Send;

    fn overview(&self, id: &[u8]) -> impl Future<Output = Result<Option<Overview>>> + Send;

    /// Stores the article under `overview.message_id`.
    fn store(
        &self,
        expires_at: u64,
        overview: &Overview,
        head: Bytes,
        body: Bytes,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Removes an article written by a post that failed later on.
    fn rollback(&self, id: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

impl<D: ArticleDirectStore> ArticleDirectStore for Arc<D> {
    fn stat(&self, id: &[u8]) -> impl Future<Output = Result<bool>> + Send {
        (**self).stat(id)
    }

    fn get(
        &self,
        id: &[u8],
        head: bool,
        body: bool,
    ) -> impl Future<Output = Result<Option<Article>>> + Send {
        (**self).get(id, head, body)
    }

    fn overview(&self, id: &[u8]) -> impl Future<Output = Result<Option<Overview>>> + Send {
        (**self).overview(id)
    }

    fn store(
        &self,
        expires_at: u64,
        overview: &Overview,
        head: Bytes,
        body: Bytes,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).store(expires_at, overview, head, body)
    }

    fn rollback(&self, id: &[u8]) -> impl Future<Output = Result<()>> + Send {
        (**self).rollback(id)
    }
}

/// Group status byte: posting allowed.
pub const STATUS_POST: u8 = b'y';
/// Group status byte: moderated.
pub const STATUS_MODERATED: u8 = b'm';
/// Group status byte: only feeders may post.
pub const STATUS_NO_POST: u8 = b'n';

/// An entry of [`GroupList::base_list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupListing {
    pub group: Bytes,
    pub status: u8,
    pub descr: Bytes,
}

/// The newsgroup catalogue.
pub trait GroupList: Send + Sync {
    fn add_group_status(&self, group: &[u8], status: u8) -> impl Future<Output = Result<()>> + Send;

    fn add_group_descr(&self, group: &[u8], descr: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Keeps the groups that exist (non-zero status) and that `rank` may post
    /// to, preserving input order.
    fn filter_with_auth(
        &self,
        rank: AuthRank,
        groups: Vec<Bytes>,
    ) -> impl Future<Output = Result<Vec<Bytes>>> + Send;

    /// All groups with a non-zero status, ordered by name.
    fn base_list(&self) -> impl Future<Output = Result<Vec<GroupListing>>> + Send;
}

impl<L: GroupList> GroupList for Arc<L> {
    fn add_group_status(&self, group: &[u8], status: u8) -> impl Future<Output = Result<()>> + Send {
        (**self).add_group_status(group, status)
    }

    fn add_group_descr(&self, group: &[u8], descr: &[u8]) -> impl Future<Output = Result<()>> + Send {
        (**self).add_group_descr(group, descr)
    }

    fn filter_with_auth(
        &self,
        rank: AuthRank,
        groups: Vec<Bytes>,
    ) -> impl Future<Output = Result<Vec<Bytes>>> + Send {
        (**self).filter_with_auth(rank, groups)
    }

    fn base_list(&self) -> impl Future<Output = Result<Vec<GroupListing>>> + Send {
        (**self).base_list()
    }
}
