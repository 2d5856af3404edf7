use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::thread_rng;

use fss_primitives::{dmpf, dpf, Block, Bytes, PrgContext};

fn criterion_benchmark(c: &mut Criterion) {
    static DOMAIN_BITS: [u8; 3] = [10, 14, 18];
    const PAYLOAD: usize = 16;

    let mut group = c.benchmark_group("point gen");
    for &n in DOMAIN_BITS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, &n| {
            let mut ctx = PrgContext::new(Block::random()).unwrap();
            let value = Bytes::random(PAYLOAD, &mut thread_rng());
            bench.iter(|| dpf::gen(&mut ctx, n, 1, &value).unwrap());
        });
    }
    group.finish();

    let mut group = c.benchmark_group("point eval");
    for &n in DOMAIN_BITS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, &n| {
            let mut ctx = PrgContext::new(Block::random()).unwrap();
            let value = Bytes::random(PAYLOAD, &mut thread_rng());
            let (k0, _) = dpf::gen(&mut ctx, n, 1, &value).unwrap();
            bench.iter(|| dpf::eval(&mut ctx, &k0, 3).unwrap());
        });
    }
    group.finish();

    let mut group = c.benchmark_group("point full domain");
    for &n in DOMAIN_BITS.iter().take(2) {
        group.throughput(Throughput::Bytes((1u64 << n) * PAYLOAD as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, &n| {
            let mut ctx = PrgContext::new(Block::random()).unwrap();
            let value = Bytes::random(PAYLOAD, &mut thread_rng());
            let (k0, _) = dpf::gen(&mut ctx, n, 1, &value).unwrap();
            bench.iter(|| dpf::eval_full(&mut ctx, &k0).unwrap());
        });
    }
    group.finish();

    let mut group = c.benchmark_group("multi-point eval");
    for &t in [2usize, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(t), &t, |bench, &t| {
            let mut ctx = PrgContext::new(Block::random()).unwrap();
            let points: Vec<u64> = (0..t as u64).map(|i| i * 3).collect();
            let values: Vec<Bytes> = (0..t)
                .map(|_| Bytes::random(PAYLOAD, &mut thread_rng()))
                .collect();
            let (k0, _) = dmpf::gen(&mut ctx, 10, &points, &values).unwrap();
            bench.iter(|| dmpf::eval(&mut ctx, &k0, 5).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
