//! Criterion benchmarks for KCP engine throughput, admission cost and
//! loopback round trips.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kcp_gate::{KcpConfig, KcpConnection, KcpListener};
use kcp_gate_core::hashcash::{self, HashCash};
use kcp_gate_core::{KcpCoreConfig, KcpEngine, NodeDelayConfig};

/// Perfect transfer: all packets from src delivered to dst.
fn transfer(src: &mut KcpEngine, dst: &mut KcpEngine) {
    for packet in src.drain_output() {
        let _ = dst.input(&packet);
    }
}

/// Run bidirectional update/transfer rounds on a virtual clock, draining the
/// receiver each round to keep the receive window open.
fn run_rounds(kcp1: &mut KcpEngine, kcp2: &mut KcpEngine, rounds: usize) -> usize {
    let mut received = 0;
    let mut now = 0;
    for _ in 0..rounds {
        now += kcp1.interval();
        kcp1.update(now);
        transfer(kcp1, kcp2);

        while kcp2.recv().is_some() {
            received += 1;
        }

        kcp2.update(now);
        transfer(kcp2, kcp1);
    }
    received
}

fn engine_pair(conv: u32, window: u32) -> (KcpEngine, KcpEngine) {
    let config = KcpCoreConfig {
        nodelay: NodeDelayConfig::fast(),
        snd_wnd: window,
        rcv_wnd: window,
        ..Default::default()
    };
    let mut kcp1 = KcpEngine::new(conv, config.clone()).unwrap();
    let mut kcp2 = KcpEngine::new(conv, config).unwrap();
    kcp1.update(0);
    kcp2.update(0);
    (kcp1, kcp2)
}

fn engine_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_throughput");

    for &msg_count in &[10, 100, 500] {
        let msg_size = 1024;
        group.throughput(Throughput::Bytes((msg_count * msg_size) as u64));

        group.bench_with_input(
            BenchmarkId::new("1KB_messages", msg_count),
            &msg_count,
            |b, &count| {
                let payload = vec![0xABu8; msg_size];
                b.iter(|| {
                    let (mut kcp1, mut kcp2) = engine_pair(0xBEEF0001, 128);
                    for _ in 0..count {
                        kcp1.send(&payload).unwrap();
                    }

                    let received = run_rounds(&mut kcp1, &mut kcp2, count * 2);
                    assert_eq!(received, count);
                });
            },
        );
    }

    group.finish();
}

fn engine_small_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_small_messages");
    let msg_count = 1000;
    let payload = vec![0xCDu8; 64];
    group.throughput(Throughput::Elements(msg_count as u64));

    group.bench_function("64B_x_1000", |b| {
        b.iter(|| {
            let (mut kcp1, mut kcp2) = engine_pair(0xBEEF0002, 128);
            for _ in 0..msg_count {
                kcp1.send(&payload).unwrap();
            }

            let received = run_rounds(&mut kcp1, &mut kcp2, msg_count * 2);
            assert_eq!(received, msg_count);
        });
    });

    group.finish();
}

fn engine_large_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_large_message");

    for &size_kb in &[16, 64] {
        let size = size_kb * 1024;
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(
            BenchmarkId::new("single_message", format!("{}KB", size_kb)),
            &size,
            |b, &sz| {
                let payload: Vec<u8> = (0..sz).map(|i| (i % 256) as u8).collect();
                b.iter(|| {
                    let (mut kcp1, mut kcp2) = engine_pair(0xBEEF0003, 256);
                    kcp1.send(&payload).unwrap();

                    let received = run_rounds(&mut kcp1, &mut kcp2, 200);
                    assert_eq!(received, 1);
                });
            },
        );
    }

    group.finish();
}

fn admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    group.sample_size(20);

    for &bits in &[8u32, 12, 16] {
        group.bench_with_input(BenchmarkId::new("mine", bits), &bits, |b, &bits| {
            b.iter(|| HashCash::mine("bench", bits));
        });
    }

    let token = HashCash::mine("bench", 12);
    let now = hashcash::ticks_now();
    group.bench_function("validate", |b| {
        b.iter(|| assert!(token.validate("bench", 12, now)));
    });

    group.finish();
}

fn loopback_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = KcpConfig::gaming().resource("bench").difficulty(4);

    let client = runtime.block_on(async {
        let mut listener = KcpListener::bind("127.0.0.1:0".parse().unwrap(), config.clone())
            .await
            .unwrap();
        let addr = *listener.local_addr();
        tokio::spawn(async move {
            while let Ok((mut conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    while let Ok(msg) = conn.receive().await {
                        if conn.send(&msg).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        KcpConnection::connect(addr, config).await.unwrap()
    });
    let client = tokio::sync::Mutex::new(client);

    let mut group = c.benchmark_group("loopback");
    group.bench_function("echo_256B", |b| {
        let payload = vec![0x5Au8; 256];
        let (client, payload) = (&client, &payload);
        b.to_async(&runtime).iter(move || async move {
            let mut client = client.lock().await;
            client.send(&payload).await.unwrap();
            client.receive().await.unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    engine_throughput,
    engine_small_messages,
    engine_large_message,
    admission,
    loopback_round_trip
);
criterion_main!(benches);
