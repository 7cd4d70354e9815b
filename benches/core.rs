use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netprobe_core::clock::Timestamp;
use netprobe_core::event::{ErrKind, PacketEvent};
use netprobe_core::ring::PacketRing;
use netprobe_core::stats::RunningStats;
use netprobe_core::wire::{TcpBurstHeader, UdpDatagramHeader};

fn bench_ring_single_threaded(c: &mut Criterion) {
    c.bench_function("ring_enqueue_dequeue_single_threaded", |b| {
        let ring = PacketRing::new(4096);
        let mut seq = 0i64;
        b.iter(|| {
            let mut ev = PacketEvent::blank(seq, Timestamp::ZERO);
            ev.err_kind = ErrKind::ReadSuccess;
            ring.enqueue(black_box(ev));
            black_box(ring.dequeue());
            seq += 1;
        });
    });
}

fn bench_ring_burst_drain(c: &mut Criterion) {
    const BURST_SIZE: i64 = 1000;

    c.bench_function("ring_burst_enqueue_then_drain", |b| {
        let ring = PacketRing::new(4096);
        b.iter(|| {
            for seq in 0..BURST_SIZE {
                let mut ev = PacketEvent::blank(seq, Timestamp::ZERO);
                ev.err_kind = ErrKind::ReadSuccess;
                ring.enqueue(ev);
            }
            let mut drained = 0;
            while ring.dequeue().is_some() {
                drained += 1;
            }
            black_box(drained)
        });
    });
}

fn bench_running_stats_update(c: &mut Criterion) {
    c.bench_function("running_stats_welford_update", |b| {
        let mut stats = RunningStats::new();
        let mut x = 0.0f64;
        b.iter(|| {
            stats.update(black_box(x));
            x += 1.0;
        });
    });
}

fn bench_wire_codec_roundtrip(c: &mut Criterion) {
    c.bench_function("udp_datagram_header_roundtrip", |b| {
        let hdr = UdpDatagramHeader {
            seq: 42,
            sent: Timestamp::now(),
        };
        b.iter(|| {
            let mut buf = Vec::with_capacity(netprobe_core::wire::UDP_DATAGRAM_WIRE_LEN);
            hdr.encode(&mut buf);
            let mut slice = &buf[..];
            black_box(UdpDatagramHeader::decode(&mut slice).unwrap());
        });
    });

    c.bench_function("tcp_burst_header_roundtrip", |b| {
        let hdr = TcpBurstHeader {
            flags: 0,
            burst_size: 8,
            burst_id: 1,
            burst_period_us: 16_666,
            seqno: 1,
            start: Timestamp::now(),
            write: Timestamp::now(),
        };
        b.iter(|| {
            let mut buf = Vec::with_capacity(netprobe_core::wire::TCP_BURST_WIRE_LEN);
            hdr.encode(&mut buf);
            let mut slice = &buf[..];
            black_box(TcpBurstHeader::decode(&mut slice).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_ring_single_threaded,
    bench_ring_burst_drain,
    bench_running_stats_update,
    bench_wire_codec_roundtrip
);
criterion_main!(benches);
