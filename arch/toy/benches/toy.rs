use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pcode::{Arch, Context, TranslateFlags};
use pcode_test::test::Parser;

const SOURCES: &[(&str, &str)] = &[
    (
        "mixed",
        concat!(
            include_str!("../tests/memory.test"),
            include_str!("../tests/branch.test"),
        ),
    ),
];

fn toy_bench(c: &mut Criterion) {
    let context = Context::from_arch(Arch::Toy).unwrap();
    for (name, source) in SOURCES {
        let (base, code) = Parser::parse_all(source).unwrap();

        let mut group = c.benchmark_group("toy");
        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_with_input(BenchmarkId::new("disassemble", name), &code, |b, code| {
            b.iter(|| context.disassemble(code, base, usize::MAX).count())
        });
        group.bench_with_input(BenchmarkId::new("translate", name), &code, |b, code| {
            b.iter(|| {
                context
                    .translate(code, base, usize::MAX, TranslateFlags::INSTRUCTION_MARKERS)
                    .count()
            })
        });
        group.finish();
    }
}

criterion_group!(benches, toy_bench);
criterion_main!(benches);
