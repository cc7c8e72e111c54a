//! 분할/조립 벤치마크

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use vfp::{FragmentedFrame, Packet, DEFAULT_MAX_PAYLOAD};

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for size in [16 * 1024, 128 * 1024] {
        let frame = Bytes::from(vec![0x5Au8; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let split = FragmentedFrame::split(1, 1, 33, frame.clone(), DEFAULT_MAX_PAYLOAD);
                black_box(split.fragments().len())
            })
        });
    }

    group.finish();
}

fn bench_reassemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassemble");

    for size in [16 * 1024, 128 * 1024] {
        let sent = FragmentedFrame::split(1, 1, 33, Bytes::from(vec![0x5Au8; size]), DEFAULT_MAX_PAYLOAD);
        let datagrams: Vec<Bytes> = sent.fragments().iter().rev().map(|p| p.to_bytes()).collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &datagrams, |b, datagrams| {
            b.iter(|| {
                let mut packets = datagrams
                    .iter()
                    .map(|d| Packet::from_bytes(d.clone()).expect("valid datagram"));
                let first = packets.next().expect("at least one fragment");
                let mut frame = FragmentedFrame::from_first_packet(1, first).expect("first");
                for packet in packets {
                    frame.merge(packet).expect("merge");
                }
                black_box(frame.frame())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_reassemble);
criterion_main!(benches);
