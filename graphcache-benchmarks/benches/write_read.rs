use criterion::{criterion_group, criterion_main, Criterion};

include!("../src/shared.rs");

fn from_elem(c: &mut Criterion) {
    c.bench_function("write_responses", |b| {
        let mut store = setup();
        b.iter(|| write_payload(&mut store));
    });

    c.bench_function("read_operations", |b| {
        let mut store = setup();
        write_payload(&mut store);
        b.iter(|| read_payload(&mut store));
    });
}

criterion_group!(benches, from_elem);
criterion_main!(benches);
