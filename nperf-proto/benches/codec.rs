use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nperf_proto::messages::{ClientStart, ServerEnd, ServerStart, ThreadInfo};
use nperf_proto::{TestMode, XferStats};

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let client_start = ClientStart {
        test_id: 1,
        mode: TestMode::TcpStream,
        n_threads: 8,
        msg_size: 65536,
        tcp_nodelay: true,
    };
    group.throughput(Throughput::Bytes(ClientStart::WIRE_LEN as u64));
    group.bench_function(BenchmarkId::new("encode", "client_start"), |b| {
        b.iter(|| client_start.to_be_bytes())
    });
    let encoded = client_start.to_be_bytes();
    group.bench_function(BenchmarkId::new("decode", "client_start"), |b| {
        b.iter(|| ClientStart::from_be_bytes(&encoded).unwrap())
    });

    let server_start = ServerStart {
        test_id: 1,
        data_port: 54321,
    };
    group.bench_function(BenchmarkId::new("encode", "server_start"), |b| {
        b.iter(|| server_start.to_be_bytes())
    });

    let server_end = ServerEnd {
        test_id: 1,
        status: 0,
        thread_info_length: ThreadInfo::WIRE_LEN as u32,
        n_threads: 8,
    };
    group.bench_function(BenchmarkId::new("encode", "server_end"), |b| {
        b.iter(|| server_end.to_be_bytes())
    });

    let thread_info = ThreadInfo {
        stats: XferStats::default(),
        status: 0,
        client_port: 12345,
    };
    group.bench_function(BenchmarkId::new("encode", "thread_info"), |b| {
        b.iter(|| thread_info.to_be_bytes())
    });

    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
