use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use csrload::parse::{parse_float, parse_whole};
use csrload::scan::find_next_digit;
use csrload::simd::{parse_float_simd, parse_whole_simd};

/// A buffer of whitespace-separated numbers, the shape the edge-list readers
/// see after the header.
fn number_buffer(floats: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 << 20);
    let mut x = 88172645463325252u64;
    while buf.len() < 1 << 20 {
        // xorshift so the digit-run lengths vary
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        if floats {
            buf.extend_from_slice(format!("{}.{:04}\n", x % 1_000_000, x % 10_000).as_bytes());
        } else {
            buf.extend_from_slice(format!("{}\n", x % 10_000_000_000).as_bytes());
        }
    }
    buf
}

fn sum_wholes(data: &[u8], simd: bool) -> u64 {
    let end = data.len();
    let mut i = 0;
    let mut acc = 0u64;
    while i < end {
        i = find_next_digit(data, i, end);
        if i >= end {
            break;
        }
        let (a, ni) = if simd {
            parse_whole_simd(data, i, end)
        } else {
            parse_whole(data, i, end)
        };
        acc = acc.wrapping_add(a);
        i = ni;
    }
    acc
}

fn sum_floats(data: &[u8], simd: bool) -> f64 {
    let end = data.len();
    let mut i = 0;
    let mut acc = 0f64;
    while i < end {
        i = find_next_digit(data, i, end);
        if i >= end {
            break;
        }
        let (a, ni) = if simd {
            parse_float_simd(data, i, end)
        } else {
            parse_float(data, i, end)
        };
        acc += a;
        i = ni;
    }
    acc
}

fn bench_tokenizer(c: &mut Criterion) {
    let wholes = number_buffer(false);
    let floats = number_buffer(true);

    let mut group = c.benchmark_group("parse_whole");
    group.throughput(Throughput::Bytes(wholes.len() as u64));
    group.bench_function("scalar", |b| b.iter(|| sum_wholes(black_box(&wholes), false)));
    group.bench_function("simd", |b| b.iter(|| sum_wholes(black_box(&wholes), true)));
    group.finish();

    let mut group = c.benchmark_group("parse_float");
    group.throughput(Throughput::Bytes(floats.len() as u64));
    group.bench_function("scalar", |b| b.iter(|| sum_floats(black_box(&floats), false)));
    group.bench_function("simd", |b| b.iter(|| sum_floats(black_box(&floats), true)));
    group.finish();
}

criterion_group!(benches, bench_tokenizer);
criterion_main!(benches);
