use bytes::Bytes;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use grouphead_wire::{
    GroupHeadServer, RemoteAllocator,
    grouphead::{GroupAllocator, GroupHeadActor, MemoryBackendTable},
};
use std::{sync::Arc, time::Instant};
use tokio::{
    io::{DuplexStream, duplex},
    runtime::{Builder, Runtime},
};
use tokio_util::sync::CancellationToken;

// Numbers allocated per benchmark iteration.
const TOTAL_IDS: usize = 4096;
const BUF_SIZE: usize = 64 * 1024;

fn runtime() -> Runtime {
    Builder::new_multi_thread().enable_all().build().unwrap()
}

fn groups(n: usize) -> Vec<Bytes> {
    (0..n).map(|i| Bytes::from(format!("alt.bench.{i}"))).collect()
}

/// Serves one in-memory allocator and opens `clients` connections to it.
fn connect(
    clients: usize,
    shutdown: &CancellationToken,
) -> Vec<Arc<RemoteAllocator<DuplexStream>>> {
    let server = Arc::new(GroupHeadServer::new(GroupHeadActor::new(
        MemoryBackendTable::new(),
    )));
    (0..clients)
        .map(|_| {
            let (client, server_end) = duplex(BUF_SIZE);
            let server = Arc::clone(&server);
            let token = shutdown.clone();
            tokio::spawn(async move { server.serve(server_end, token).await });
            Arc::new(RemoteAllocator::new(client))
        })
        .collect()
}

/// Request round trips over one connection, one post at a time.
fn bench_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("wire/round_trip");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    for fanout in [1, 8] {
        group.bench_function(format!("fanout/{fanout}"), |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let shutdown = CancellationToken::new();
                let client = connect(1, &shutdown).remove(0);
                let targets = groups(fanout);
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..TOTAL_IDS / fanout {
                        black_box(client.insert(&targets).await.unwrap());
                    }
                }
                let elapsed = start.elapsed();
                shutdown.cancel();
                elapsed
            });
        });
    }
    group.finish();
}

/// Several connections allocating in the same group concurrently.
fn bench_connections(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("wire/connections");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    for clients in [4, 16] {
        group.bench_function(format!("clients/{clients}"), |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let shutdown = CancellationToken::new();
                let conns = connect(clients, &shutdown);
                let targets = groups(1);
                let start = Instant::now();
                for _ in 0..iters {
                    try_join_all(conns.iter().map(|client| {
                        let client = Arc::clone(client);
                        let targets = targets.clone();
                        tokio::spawn(async move {
                            for _ in 0..TOTAL_IDS / clients {
                                black_box(client.insert(&targets).await.unwrap());
                            }
                        })
                    }))
                    .await
                    .unwrap();
                }
                let elapsed = start.elapsed();
                shutdown.cancel();
                elapsed
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_connections);
criterion_main!(benches);
