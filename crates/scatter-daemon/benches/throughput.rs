//! Throughput Benchmarks
//!
//! Benchmarks for measuring:
//! - Payload transfer over the frame transport
//! - Passthrough relay through an intermediate hop
//! - Command line parsing and routing
//!
//! Run with: cargo bench --bench throughput -p scatter-daemon

use std::path::Path;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::io::duplex;
use tokio::runtime::Runtime;

use scatter_core::{route, GatewayRequest, LogicalPath};
use scatter_daemon::FrameStream;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Benchmark a sized payload moving across one in-memory hop
fn bench_payload_transfer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("payload_transfer");

    for (name, size) in [("64KB", 64 * 1024), ("1MB", 1024 * 1024), ("8MB", 8 * 1024 * 1024)] {
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("size", name), &data, |b, data| {
            b.iter(|| {
                rt.block_on(async {
                    let (a, z) = duplex(256 * 1024);
                    let mut tx = FrameStream::new(a, TIMEOUT);
                    let mut rx = FrameStream::new(z, TIMEOUT);

                    let payload = data.clone();
                    let writer = tokio::spawn(async move {
                        tx.send_size(payload.len() as u32).await.unwrap();
                        tx.send_all(&payload).await.unwrap();
                    });

                    let len = rx.recv_size().await.unwrap();
                    let received = rx.recv_all(len as usize).await.unwrap();
                    writer.await.unwrap();
                    black_box(received)
                })
            })
        });
    }

    group.finish();
}

/// Benchmark the gateway's passthrough: peer -> gateway -> client
fn bench_relay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("relay");
    let size = 4 * 1024 * 1024;
    let data: Vec<u8> = vec![0xA5; size];

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("4MB", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (peer_end, gw_in) = duplex(256 * 1024);
                let (gw_out, client_end) = duplex(256 * 1024);
                let mut peer = FrameStream::new(peer_end, TIMEOUT);
                let mut gw_from_peer = FrameStream::new(gw_in, TIMEOUT);
                let mut gw_to_client = FrameStream::new(gw_out, TIMEOUT);
                let mut client = FrameStream::new(client_end, TIMEOUT);

                let payload = data.clone();
                let source = tokio::spawn(async move { peer.send_all(&payload).await.unwrap() });
                let hop = tokio::spawn(async move {
                    gw_from_peer
                        .relay_to(&mut gw_to_client, size as u64)
                        .await
                        .unwrap()
                });

                let received = client.recv_all(size).await.unwrap();
                source.await.unwrap();
                hop.await.unwrap();
                black_box(received)
            })
        })
    });

    group.finish();
}

/// Benchmark command parsing plus placement of the resulting paths
fn bench_command_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_routing");
    let root = Path::new("/home/user");

    group.bench_function("parse_and_route_download", |b| {
        b.iter(|| {
            let request = GatewayRequest::parse(black_box("downlf ~S1/a/b/c.pdf ~S1/x/y.txt")).unwrap();
            if let GatewayRequest::Download { paths } = request {
                for raw in &paths {
                    let local = LogicalPath::parse(raw).unwrap().resolve(root);
                    black_box(route(&local).unwrap());
                }
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_payload_transfer,
    bench_relay,
    bench_command_routing
);
criterion_main!(benches);
