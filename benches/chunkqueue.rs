use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use waypoint::chunkqueue::{ChunkQueue, CqLimit};

fn benchmark(c: &mut Criterion) {
    let sizes = [64usize, 1024, 16 * 1024, 256 * 1024];

    let mut group = c.benchmark_group("chunkqueue_append_steal");
    for size in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("append_then_steal_all", size), &size, |b, &size| {
            let payload = vec![0u8; size];
            b.iter(|| {
                let mut cq = ChunkQueue::new(CqLimit::new(0));
                cq.append(payload.clone());
                cq.steal_all()
            })
        });
    }
    group.finish();

    let mut group = c.benchmark_group("chunkqueue_steal_len_splits");
    for size in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("steal_half_twice", size), &size, |b, &size| {
            let payload = vec![0u8; size];
            b.iter(|| {
                let mut cq = ChunkQueue::new(CqLimit::new(0));
                cq.append(payload.clone());
                let half = size / 2;
                let first = cq.steal_len(half);
                let rest = cq.steal_len(size - half);
                (first, rest)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
