//! Store doubles with call counters and failure switches.

use crate::{BackendTable, ClusteredStore, Error, MemoryBackendTable, Order, Result, Row, TablePair};
use bytes::Bytes;
use core::ops::RangeInclusive;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Shared failure switch and call counters.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    write_budget: Arc<Mutex<Option<usize>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl Faults {
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Lets `n` more writes through, then fails every write after them.
    pub fn fail_writes_after(&self, n: usize) {
        *self.write_budget.lock() = Some(n);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::backend("injected read failure"));
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::backend("injected write failure"));
        }
        match &mut *self.write_budget.lock() {
            Some(0) => Err(Error::backend("injected write failure")),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// [`MemoryBackendTable`] behind a [`Faults`] switch.
#[derive(Clone, Default)]
pub struct FlakyTable {
    pub inner: Arc<MemoryBackendTable>,
    pub faults: Faults,
}

impl BackendTable for FlakyTable {
    async fn get_pairs(&self, groups: &[Bytes]) -> Result<Vec<TablePair>> {
        self.faults.read()?;
        self.inner.get_pairs(groups).await
    }

    async fn set_pairs(&self, pairs: &[TablePair]) -> Result<()> {
        self.faults.write()?;
        self.inner.set_pairs(pairs).await
    }
}

/// A [`ClusteredStore`] wrapper behind a [`Faults`] switch.
pub struct FlakyClustered<S> {
    pub inner: S,
    pub faults: Faults,
}

impl<S> FlakyClustered<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Faults::default(),
        }
    }
}

impl<S: ClusteredStore> ClusteredStore for FlakyClustered<S> {
    async fn put(&self, partition: &[u8], key: u64, value: Bytes, expires_at: u64) -> Result<()> {
        self.faults.write()?;
        self.inner.put(partition, key, value, expires_at).await
    }

    async fn put_if_outlives(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> Result<bool> {
        self.faults.write()?;
        self.inner.put_if_outlives(partition, key, value, expires_at).await
    }

    async fn get(&self, partition: &[u8], key: u64) -> Result<Option<Row>> {
        self.faults.read()?;
        self.inner.get(partition, key).await
    }

    async fn scan(
        &self,
        partition: &[u8],
        range: RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.faults.read()?;
        self.inner.scan(partition, range, order, limit).await
    }

    /// Cleanup path; never fails.
    async fn delete(&self, partition: &[u8], key: u64) -> Result<()> {
        self.inner.delete(partition, key).await
    }
}

/// A [`ClusteredStore`] that yields to the scheduler before and after every
/// call, so concurrent writers interleave.
pub struct Yielding<S>(pub S);

impl<S: ClusteredStore> ClusteredStore for Yielding<S> {
    async fn put(&self, partition: &[u8], key: u64, value: Bytes, expires_at: u64) -> Result<()> {
        tokio::task::yield_now().await;
        let res = self.0.put(partition, key, value, expires_at).await;
        tokio::task::yield_now().await;
        res
    }

    async fn put_if_outlives(
        &self,
        partition: &[u8],
        key: u64,
        value: Bytes,
        expires_at: u64,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        let res = self.0.put_if_outlives(partition, key, value, expires_at).await;
        tokio::task::yield_now().await;
        res
    }

    async fn get(&self, partition: &[u8], key: u64) -> Result<Option<Row>> {
        tokio::task::yield_now().await;
        let res = self.0.get(partition, key).await;
        tokio::task::yield_now().await;
        res
    }

    async fn scan(
        &self,
        partition: &[u8],
        range: RangeInclusive<u64>,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Row>> {
        tokio::task::yield_now().await;
        self.0.scan(partition, range, order, limit).await
    }

    async fn delete(&self, partition: &[u8], key: u64) -> Result<()> {
        tokio::task::yield_now().await;
        self.0.delete(partition, key).await
    }
}

pub fn groups(names: &[&str]) -> Vec<Bytes> {
    names
        .iter()
        .map(|n| Bytes::copy_from_slice(n.as_bytes()))
        .collect()
}
