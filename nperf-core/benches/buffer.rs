use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nperf_core::buffer::Buffer;

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");

    for msg_size in [64usize, 1024, 65536] {
        group.throughput(Throughput::Bytes(msg_size as u64));
        group.bench_function(BenchmarkId::new("alloc", msg_size), |b| {
            b.iter(|| Buffer::new(msg_size))
        });

        let mut buf = Buffer::new(msg_size);
        group.bench_function(BenchmarkId::new("message_mut", msg_size), |b| {
            b.iter(|| buf.message_mut(msg_size).len())
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
