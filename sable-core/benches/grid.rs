use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sable_core::{Grid, Size};

fn bench_write_ascii(c: &mut Criterion) {
    c.bench_function("write_80x24_ascii", |b| {
        b.iter(|| {
            let mut grid = Grid::new(Size::new(80, 24, 1000));
            for _ in 0..24 {
                for ch in "the quick brown fox jumps over the lazy dog 0123456789".chars() {
                    grid.write(black_box(ch));
                }
                grid.carriage_return();
                grid.linefeed();
            }
            grid
        })
    });
}

fn bench_scroll(c: &mut Criterion) {
    c.bench_function("scroll_1000_lines", |b| {
        b.iter(|| {
            let mut grid = Grid::new(Size::new(80, 24, 1000));
            for _ in 0..1000 {
                grid.linefeed();
            }
            grid
        })
    });
}

fn bench_reflow(c: &mut Criterion) {
    let mut source = Grid::new(Size::new(80, 24, 200));
    for i in 0..200 {
        for ch in format!("line {} with some content that wraps around", i).chars() {
            source.write(ch);
        }
        source.carriage_return();
        source.linefeed();
    }
    c.bench_function("reflow_80_to_60", |b| {
        b.iter(|| {
            let mut target = Grid::new(Size::new(60, 24, 200));
            source.reflow_into(&mut target);
            target
        })
    });
}

criterion_group!(benches, bench_write_ascii, bench_scroll, bench_reflow);
criterion_main!(benches);
