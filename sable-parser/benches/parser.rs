use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use sable_parser::{parse, Params};

fn drain(input: &[u8]) -> usize {
    let mut params = Params::new();
    let mut offset = 0;
    let mut commands = 0;
    while offset < input.len() {
        let (consumed, command) = parse(&input[offset..], &mut params);
        if command.is_incomplete() {
            break;
        }
        offset += consumed;
        commands += 1;
    }
    commands
}

fn bench_plain_text(c: &mut Criterion) {
    let input: Vec<u8> = b"the quick brown fox jumps over the lazy dog "
        .iter()
        .cycle()
        .take(64 * 1024)
        .copied()
        .collect();
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("plain_text_64k", |b| b.iter(|| drain(black_box(&input))));
    group.finish();
}

fn bench_sgr_heavy(c: &mut Criterion) {
    let mut input = Vec::new();
    for i in 0..4096u32 {
        input.extend_from_slice(format!("\x1b[38;5;{}mX\x1b[0m", i % 256).as_bytes());
    }
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("sgr_heavy", |b| b.iter(|| drain(black_box(&input))));
    group.finish();
}

criterion_group!(benches, bench_plain_text, bench_sgr_heavy);
criterion_main!(benches);
