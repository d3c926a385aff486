use cc_queue::{DynamicQueue, QueueConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

const MSG_PER_PRODUCER: u64 = 200_000;

fn bench_spsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_queue");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    group.bench_function("single_producer_consumer", |b| {
        b.iter(|| {
            let queue = Arc::new(DynamicQueue::<u64>::new(QueueConfig::new(64, 4096)));
            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for i in 0..MSG_PER_PRODUCER {
                    producer_queue.put(i);
                }
            });
            let mut sum = 0u64;
            for _ in 0..MSG_PER_PRODUCER {
                sum += queue.get();
            }
            producer.join().unwrap();
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spsc);
criterion_main!(benches);
