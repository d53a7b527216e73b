//! Throughput Benchmark for rsload
//!
//! This benchmark measures the codec and the statement splitter on
//! realistic bulk-load inputs.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rsload::protocol::{split, RespValue, ValueReader};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Builds `n` SET commands with values of `value_size` bytes.
fn set_commands(n: usize, value_size: usize) -> Vec<u8> {
    let value = Bytes::from(vec![b'x'; value_size]);
    let mut buf = Vec::new();
    for i in 0..n {
        RespValue::array(vec![
            RespValue::bulk_string("SET"),
            RespValue::bulk_string(format!("key:{}", i)),
            RespValue::BulkString(value.clone()),
        ])
        .serialize_into(&mut buf);
    }
    buf
}

/// Benchmark encoding commands
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let small = RespValue::command(["SET", "key:1", "small_value"]);
    group.bench_function("encode_small", |b| {
        let mut buf = Vec::with_capacity(64);
        b.iter(|| {
            buf.clear();
            black_box(&small).serialize_into(&mut buf);
        });
    });

    let large = RespValue::array(vec![
        RespValue::bulk_string("SET"),
        RespValue::bulk_string("key:1"),
        RespValue::bulk_string(Bytes::from(vec![b'x'; 64 * 1024])),
    ]);
    group.bench_function("encode_large", |b| {
        let mut buf = Vec::with_capacity(70 * 1024);
        b.iter(|| {
            buf.clear();
            black_box(&large).serialize_into(&mut buf);
        });
    });

    group.finish();
}

/// Benchmark decoding a whole input file
fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("decode");

    for (name, n, size) in [("decode_10k_small", 10_000, 16), ("decode_1k_4kb", 1_000, 4096)] {
        let input = set_commands(n, size);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let mut reader = ValueReader::new(&input[..]);
                    let mut count = 0;
                    while let Some(item) = reader.next().await {
                        black_box(item.unwrap());
                        count += 1;
                    }
                    assert_eq!(count, n);
                })
            });
        });
    }

    group.finish();
}

/// Benchmark splitting raw statements
fn bench_split(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let input = set_commands(10_000, 16);

    let mut group = c.benchmark_group("split");
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("split_10k_small", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (tx, mut rx) = mpsc::channel(1024);
                let data = input.clone();
                let splitter = tokio::spawn(async move { split(&data[..], tx).await });
                let mut count = 0;
                while let Some(statement) = rx.recv().await {
                    black_box(statement);
                    count += 1;
                }
                assert_eq!(splitter.await.unwrap().unwrap(), count);
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_split);
criterion_main!(benches);
