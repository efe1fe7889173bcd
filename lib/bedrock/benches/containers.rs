use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Bencher, Criterion};

use bedrock::collections::{AtomicStack, TwoLockQueue};

fn queue_push_pop(bencher: &mut Bencher) {
    let queue = TwoLockQueue::new();

    bencher.iter(|| {
        queue.push(1u64);
        queue.pop().unwrap();
    });
}

fn queue_push_pop_with_producer(bencher: &mut Bencher) {
    let queue = Arc::new(TwoLockQueue::new());
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    // a background producer keeps the queue warm so push/pop mostly take
    // disjoint locks
    let producer = {
        let queue = Arc::clone(&queue);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                if !queue.is_empty() {
                    std::thread::yield_now();
                    continue;
                }
                for value in 0..64u64 {
                    queue.push(value);
                }
            }
        })
    };

    bencher.iter(|| {
        while queue.pop().is_none() {
            std::hint::spin_loop();
        }
    });

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    producer.join().unwrap();
    queue.flush();
}

fn stack_insert_flush(bencher: &mut Bencher) {
    let stack = AtomicStack::new();

    bencher.iter(|| {
        for value in 0..16u64 {
            stack.insert(value);
        }
        stack.flush()
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("two_lock_queue_push_pop", queue_push_pop);
    c.bench_function("two_lock_queue_consumer_side", queue_push_pop_with_producer);
    c.bench_function("atomic_stack_insert16_flush", stack_insert_flush);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
