//! Benchmarks for the per-packet hot paths.
//!
//! These benchmarks measure:
//! - Frame extraction from a client byte ring
//! - Chunk queue write + read (event delivery)
//! - Event encoding under an arena checkpoint
//!
//! Run with: cargo bench -p sockhub-core --bench framing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sockhub_core::codec::{encode_packet, extract_packet};
use sockhub_core::{chunk_queue, Arena, ByteRing, ClientId, Event, Frame, EVENT_MAX_LEN, PACKET_MAX_LEN};

/// Fill a ring with back-to-back packets and extract them all.
fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_packet");

    for size in [4usize, 64, 510] {
        let payload = vec![0xA5u8; size];
        let mut packet = vec![0u8; PACKET_MAX_LEN];
        let n = encode_packet(&payload, &mut packet).unwrap();
        let per_ring = 4096 / n;

        group.throughput(Throughput::Bytes((n * per_ring) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut ring = ByteRing::with_capacity(4096);
            let mut view = [0u8; PACKET_MAX_LEN];
            b.iter(|| {
                for _ in 0..per_ring {
                    ring.write(&packet[..n]).unwrap();
                }
                let mut frames = 0;
                loop {
                    let len = ring.peek(&mut view);
                    match extract_packet(&view[..len]) {
                        Frame::Complete { payload, consumed } => {
                            black_box(payload);
                            ring.advance(consumed);
                            frames += 1;
                        }
                        _ => break,
                    }
                }
                frames
            })
        });
    }

    group.finish();
}

/// Encode a Message event in an arena scope and push it through a queue.
fn bench_event_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_delivery");
    group.throughput(Throughput::Elements(1));

    let (mut tx, mut rx) = chunk_queue(1024, 256 * 1024);
    let mut arena = Arena::new(16 * 1024);
    let mut scratch = vec![0u8; EVENT_MAX_LEN];
    let payload = [0x5Au8; 64];

    group.bench_function("message_64", |b| {
        b.iter(|| {
            {
                let scope = arena.checkpoint();
                let buf = scope.alloc(EVENT_MAX_LEN).unwrap();
                let event = Event::Message { client_id: ClientId::new(1), payload: &payload };
                let n = event.encode(buf).unwrap();
                tx.write(&buf[..n]).unwrap();
            }
            let n = rx.read_into(&mut scratch).unwrap();
            black_box(Event::decode(&scratch[..n]).unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_extract, bench_event_delivery);
criterion_main!(benches);
