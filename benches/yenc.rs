//! Benchmarks for yEnc part encoding
//!
//! Encoding sits on the posting hot path: every article body is encoded, and
//! with verification enabled decoded again, right before it is sent.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nntp_poster::yenc::{self, PartInfo};

/// Pseudo-random payload so escapes show up at a realistic rate
fn sample_data(size: usize) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    (0..size)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

fn part_info(len: usize) -> PartInfo<'static> {
    PartInfo {
        name: "bench.bin",
        part: 1,
        total: 1,
        offset: 0,
        file_size: len as u64,
        file_crc32: Some(0),
    }
}

fn bench_yenc_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("yenc_encode");

    for size in [10_240usize, 102_400, 768_000, 1_024_000] {
        group.throughput(Throughput::Bytes(size as u64));
        let data = sample_data(size);
        let info = part_info(size);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}KB", size / 1024)),
            &data,
            |b, data| {
                b.iter(|| yenc::encode_part(black_box(data), &info, 128));
            },
        );
    }

    group.finish();
}

fn bench_yenc_line_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("yenc_line_length");
    let data = sample_data(768_000);
    let info = part_info(data.len());
    group.throughput(Throughput::Bytes(data.len() as u64));

    for line_length in [64usize, 128, 256, 997] {
        group.bench_with_input(
            BenchmarkId::from_parameter(line_length),
            &line_length,
            |b, &line_length| {
                b.iter(|| yenc::encode_part(black_box(&data), &info, line_length));
            },
        );
    }

    group.finish();
}

fn bench_yenc_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("yenc_verify");

    for size in [102_400usize, 768_000] {
        let data = sample_data(size);
        let encoded = yenc::encode_part(&data, &part_info(size), 128).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}KB", size / 1024)),
            &encoded,
            |b, encoded| {
                b.iter(|| yenc::decode(black_box(encoded)).map(|d| d.data == data));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_yenc_encode,
    bench_yenc_line_length,
    bench_yenc_verify
);
criterion_main!(benches);
