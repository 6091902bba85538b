use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use grouphead::{
    BatchingAllocator, DispatcherConfig, DispatcherRegistry, FreeListAllocator, GroupAllocator,
    GroupEntry, GroupHeadActor, MemoryBackendTable, MemoryCounterRows, ShardedGroupHeadActor,
};
use bytes::Bytes;
use std::{sync::Arc, time::Instant};
use tokio::runtime::{Builder, Runtime};

// Numbers allocated per benchmark iteration.
const TOTAL_IDS: usize = 4096;
// Concurrent posters in the contended benchmarks.
const TASKS: usize = 64;

fn runtime() -> Runtime {
    Builder::new_multi_thread().enable_all().build().unwrap()
}

fn groups(n: usize) -> Vec<Bytes> {
    (0..n).map(|i| Bytes::from(format!("alt.bench.{i}"))).collect()
}

/// Pure range model: increments with an occasional rollback.
fn bench_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("model/entry");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            let mut entry = GroupEntry::new();
            for i in 0..TOTAL_IDS {
                let n = entry.increment();
                if i % 64 == 0 {
                    entry.rollback(n);
                }
            }
            black_box(entry.hl_stats())
        });
    });
    group.finish();
}

/// One poster allocating for a fixed set of groups, one post at a time.
fn bench_sequential<A>(c: &mut Criterion, name: &str, fanout: usize, factory: impl Fn() -> A)
where
    A: GroupAllocator + 'static,
{
    let rt = runtime();
    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    group.bench_function(format!("fanout/{fanout}"), |b| {
        b.to_async(&rt).iter_custom(|iters| {
            let allocator = factory();
            let targets = groups(fanout);
            async move {
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..TOTAL_IDS / fanout {
                        black_box(allocator.insert(&targets).await.unwrap());
                    }
                }
                start.elapsed()
            }
        });
    });
    group.finish();
}

/// Many posters hitting the same groups at once.
fn bench_contended<A>(c: &mut Criterion, name: &str, factory: impl Fn() -> A)
where
    A: GroupAllocator + 'static,
{
    let rt = runtime();
    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    group.bench_function(format!("tasks/{TASKS}"), |b| {
        b.to_async(&rt).iter_custom(|iters| {
            let allocator = Arc::new(factory());
            let targets = Arc::new(groups(2));
            async move {
                let start = Instant::now();
                for _ in 0..iters {
                    let tasks = (0..TASKS).map(|_| {
                        let allocator = Arc::clone(&allocator);
                        let targets = Arc::clone(&targets);
                        tokio::spawn(async move {
                            for _ in 0..TOTAL_IDS / TASKS / 2 {
                                black_box(allocator.insert(&targets).await?);
                            }
                            grouphead::Result::Ok(())
                        })
                    });
                    for res in try_join_all(tasks).await.unwrap() {
                        res.unwrap();
                    }
                }
                start.elapsed()
            }
        });
    });
    group.finish();
}

fn local_actor() -> GroupHeadActor<MemoryBackendTable> {
    GroupHeadActor::new(MemoryBackendTable::new())
}

fn sharded_actor() -> ShardedGroupHeadActor<MemoryBackendTable> {
    ShardedGroupHeadActor::new(MemoryBackendTable::new())
}

fn dispatcher() -> BatchingAllocator<FreeListAllocator<MemoryCounterRows>> {
    BatchingAllocator::new(Arc::new(DispatcherRegistry::new(
        FreeListAllocator::new(MemoryCounterRows::new()),
        DispatcherConfig::default(),
    )))
}

fn benchmark_local_sequential(c: &mut Criterion) {
    bench_sequential(c, "actor/local/sequential", 1, local_actor);
    bench_sequential(c, "actor/local/sequential", 4, local_actor);
}

fn benchmark_sharded_sequential(c: &mut Criterion) {
    bench_sequential(c, "actor/sharded/sequential", 1, sharded_actor);
    bench_sequential(c, "actor/sharded/sequential", 4, sharded_actor);
}

fn benchmark_local_contended(c: &mut Criterion) {
    bench_contended(c, "actor/local/contended", local_actor);
}

fn benchmark_sharded_contended(c: &mut Criterion) {
    bench_contended(c, "actor/sharded/contended", sharded_actor);
}

fn benchmark_dispatcher_contended(c: &mut Criterion) {
    bench_contended(c, "dispatch/free_list/contended", dispatcher);
}

criterion_group!(
    benches,
    bench_entry,
    benchmark_local_sequential,
    benchmark_sharded_sequential,
    benchmark_local_contended,
    benchmark_sharded_contended,
    benchmark_dispatcher_contended,
);
criterion_main!(benches);
