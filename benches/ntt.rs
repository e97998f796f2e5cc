//! Transform and element-wise kernel benchmarks.

use core::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ntt_rs::arith::generate_primes;
use ntt_rs::{eltwise, NttTables};

fn bench_degree(c: &mut Criterion, degree: u64) {
    let modulus = generate_primes(1, 50, degree).expect("no 50-bit prime")[0];
    let tables = NttTables::new(degree, modulus).expect("table construction");
    let input: Vec<u64> = (0..degree).map(|i| i * 31 % modulus).collect();

    c.bench_function(&format!("forward/{degree}"), |b| {
        b.iter_batched(
            || input.clone(),
            |mut data| {
                tables.forward(&mut data, 2, 1);
                black_box(data)
            },
            BatchSize::SmallInput,
        );
    });

    let mut transformed = input.clone();
    tables.forward(&mut transformed, 2, 1);
    c.bench_function(&format!("inverse/{degree}"), |b| {
        b.iter_batched(
            || transformed.clone(),
            |mut data| {
                tables.inverse(&mut data, 1, 1);
                black_box(data)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_eltwise(c: &mut Criterion) {
    let length = 4096u64;
    let modulus = generate_primes(1, 50, length).expect("no 50-bit prime")[0];
    let a: Vec<u64> = (0..length).map(|i| i * 17 % modulus).collect();
    let b_op: Vec<u64> = (0..length).map(|i| (i * 13 + 5) % modulus).collect();

    c.bench_function("eltwise_multiply/4096", |b| {
        b.iter_batched(
            || a.clone(),
            |mut data| {
                eltwise::multiply_mod_in_place(&mut data, &b_op, modulus);
                black_box(data)
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("eltwise_fma/4096", |b| {
        b.iter_batched(
            || a.clone(),
            |mut data| {
                eltwise::fma_mod_in_place(&mut data, 12345 % modulus, Some(&b_op), modulus);
                black_box(data)
            },
            BatchSize::SmallInput,
        );
    });
}

fn transform_benches(c: &mut Criterion) {
    for degree in [4096, 16384] {
        bench_degree(c, degree);
    }
    bench_eltwise(c);
}

criterion_group!(benches, transform_benches);
criterion_main!(benches);
