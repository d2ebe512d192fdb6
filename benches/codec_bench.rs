//! Performance benchmarks for the framer and wire codecs.
//!
//! Inventory replies from a busy reader can carry hundreds of tag lines,
//! so framing and decoding must keep up with continuous scanning.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use metra_protocol::{
    AsciiCodec, AtCodec, Command, FrameCodec, Framer, FramingMode, crc16, crc16_hex,
};
use std::hint::black_box;

/// ASCII inventory reply with `tags` checksummed tag lines and an `IVF` trailer.
fn ascii_inventory(tags: usize) -> String {
    let mut raw = String::new();
    for i in 0..tags {
        let line = format!("3000E2801160{i:012X} ");
        raw.push_str(&line);
        raw.push_str(&crc16_hex(line.as_bytes()));
        raw.push('\r');
    }
    let trailer = format!("IVF {tags:02X} ");
    raw.push_str(&trailer);
    raw.push_str(&crc16_hex(trailer.as_bytes()));
    raw.push('\r');
    raw
}

/// AT inventory reply with `tags` data lines.
fn at_inventory(tags: usize) -> String {
    let mut raw = String::from("AT+INV\r");
    for i in 0..tags {
        raw.push_str(&format!("+INV: E2801160{i:012X},1,-52\r"));
    }
    raw.push_str("OK\r");
    raw
}

/// Benchmark the CRC16 over typical line lengths.
fn bench_crc16(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc16");

    for len in [8usize, 32, 128].iter() {
        let data = vec![b'A'; *len];
        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &data, |b, data| {
            b.iter(|| black_box(crc16(black_box(data))));
        });
    }

    group.finish();
}

/// Benchmark encoding a parameterised command.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let ascii = FrameCodec::Ascii(AsciiCodec::with_checksum());
    let at = FrameCodec::At(AtCodec::new());
    let ascii_cmd = Command::new("RDT").param("SNR").param("E2801160").param(2);
    let at_cmd = Command::new("AT+READ").param("USR").param(0).param(4);

    group.bench_function("ascii_crc", |b| {
        b.iter(|| black_box(ascii.encode(black_box(&ascii_cmd)).unwrap()));
    });
    group.bench_function("at", |b| {
        b.iter(|| black_box(at.encode(black_box(&at_cmd)).unwrap()));
    });

    group.finish();
}

/// Benchmark decoding inventory replies of growing size.
fn bench_decode_inventory(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_inventory");

    let ascii = FrameCodec::Ascii(AsciiCodec::with_checksum());
    let at = FrameCodec::At(AtCodec::new());
    let ascii_cmd = Command::new("INV");
    let at_cmd = Command::new("AT+INV");

    for tags in [1usize, 50, 500].iter() {
        group.throughput(Throughput::Elements(*tags as u64));

        let raw = ascii_inventory(*tags);
        group.bench_with_input(BenchmarkId::new("ascii_crc", tags), &raw, |b, raw| {
            b.iter(|| black_box(ascii.decode(&ascii_cmd, black_box(raw)).unwrap()));
        });

        let raw = at_inventory(*tags);
        group.bench_with_input(BenchmarkId::new("at", tags), &raw, |b, raw| {
            b.iter(|| black_box(at.decode(&at_cmd, black_box(raw)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark framing a byte stream delivered in small chunks.
fn bench_framer_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer_streaming");

    let mut stream = ascii_inventory(100).into_bytes();
    stream.push(b'\n');
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in [1usize, 16, 256].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut framer = Framer::with_mode(FramingMode::EndOfFrame);
                    let mut count = 0;
                    for chunk in stream.chunks(size) {
                        framer.feed(black_box(chunk));
                        count += framer.drain_frames().count();
                    }
                    black_box(count);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_crc16,
    bench_encode,
    bench_decode_inventory,
    bench_framer_streaming,
);

criterion_main!(benches);
