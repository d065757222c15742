//! Скорость конвертации блоков FIFO между форматом линии и Complex32.
//!
//! Запуск: cargo bench -p iqs-benchmark --bench codec

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iqs_core::{decode_into, encode_into, WireBlock};
use iqs_types::{Complex32, WireFormat};
use rand::{rngs::StdRng, Rng, SeedableRng};

const FIFO_SIZE: usize = 16_384;
const FORMATS: [WireFormat; 3] = [WireFormat::Float32, WireFormat::Int16, WireFormat::Int12];

fn random_block(len: usize) -> Vec<Complex32> {
    let mut rng = StdRng::seed_from_u64(0x1b5);
    (0..len)
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(FIFO_SIZE as u64));

    let samples = random_block(FIFO_SIZE);

    for format in FORMATS {
        let mut bytes = Vec::new();
        encode_into(&samples, format, &mut bytes);
        let mut out = Vec::with_capacity(FIFO_SIZE);

        group.bench_with_input(BenchmarkId::from_parameter(format), &bytes, |b, bytes| {
            b.iter(|| decode_into(black_box(bytes), format, &mut out))
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(FIFO_SIZE as u64));

    let samples = random_block(FIFO_SIZE);

    for format in FORMATS {
        let mut out = Vec::with_capacity(FIFO_SIZE * format.sample_size());

        group.bench_with_input(
            BenchmarkId::from_parameter(format),
            &samples,
            |b, samples| b.iter(|| encode_into(black_box(samples), format, &mut out)),
        );
    }

    group.finish();
}

/// Путь воркеров: один и тот же блок на весь поток.
fn bench_wire_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_block");
    group.throughput(Throughput::Elements(FIFO_SIZE as u64));

    let samples = random_block(FIFO_SIZE);

    for format in FORMATS {
        let mut block = WireBlock::new(format, FIFO_SIZE);
        let mut out = Vec::with_capacity(FIFO_SIZE);

        group.bench_function(BenchmarkId::new("tx_then_rx", format), |b| {
            b.iter(|| {
                block.encode_from(black_box(&samples));
                block.decode_into(FIFO_SIZE, &mut out)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_wire_block);
criterion_main!(benches);
