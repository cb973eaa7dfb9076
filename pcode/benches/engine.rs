use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pcode::{Arch, Context, Options};

// MOVI, LD [r1 + 4], ADD, BNZ, JMP
const CODE: &[u8] = &[
    0x23, 0x10, 0x30, 0x14, 0x10, 0x20, 0x61, 0xfa, 0x5f, 0xf6,
];

fn load(c: &mut Criterion) {
    let sla = Arch::Toy.sla();
    c.bench_function("load", |b| {
        b.iter(|| Context::new(black_box(sla)).unwrap())
    });
}

fn lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    for trees in [true, false] {
        let opts = Options {
            decision_trees: trees,
            ..Options::default()
        };
        let context = Context::with_options(Arch::Toy.sla(), opts).unwrap();
        let name = if trees { "tree" } else { "linear" };
        group.bench_with_input(BenchmarkId::new("disassemble", name), &CODE, |b, code| {
            b.iter(|| context.disassemble(code, 0x1000, usize::MAX).count())
        });
    }
    group.finish();
}

criterion_group!(benches, load, lookup);
criterion_main!(benches);
