use criterion::{Criterion, criterion_group, criterion_main};
use oxz_lzma::{LzmaParams, decode_lzma2, encode_lzma2};
use std::hint::black_box;

fn sample_text(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

fn bench_lzma2_encode(c: &mut Criterion) {
    let data = sample_text(256 * 1024);
    let params = LzmaParams::from_level(6);

    c.bench_function("lzma2_encode_256k", |b| {
        b.iter(|| encode_lzma2(black_box(&data), &params).unwrap())
    });
}

fn bench_lzma2_decode(c: &mut Criterion) {
    let data = sample_text(256 * 1024);
    let params = LzmaParams::from_level(6);
    let encoded = encode_lzma2(&data, &params).unwrap();

    c.bench_function("lzma2_decode_256k", |b| {
        b.iter(|| decode_lzma2(black_box(&encoded), params.dict_size).unwrap())
    });
}

criterion_group!(benches, bench_lzma2_encode, bench_lzma2_decode);
criterion_main!(benches);
