//! Producer/consumer scenarios for the two-lock queue.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};

use bedrock::collections::TwoLockQueue;

#[test]
fn four_producers_one_consumer() {
    let queue = Arc::new(TwoLockQueue::new());

    // four producers each push 1..=10, with some timing jitter to vary the
    // interleavings across runs
    let producers: Vec<_> = (0..4u64)
        .map(|seed| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                for value in 1..=10 {
                    queue.push(value);
                    std::thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
                }
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || {
            let mut popped = Vec::with_capacity(40);
            while popped.len() < 40 {
                match queue.pop() {
                    Some(value) => popped.push(value),
                    None => std::thread::yield_now(),
                }
            }
            popped
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let mut popped = consumer.join().unwrap();

    // after all producers joined and 40 pops, the queue is empty
    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);

    // and the multiset of popped values is four copies of {1..10}
    popped.sort_unstable();
    let mut expected: Vec<i32> = (1..=10)
        .flat_map(|v| std::iter::repeat(v).take(4))
        .collect();
    expected.sort_unstable();
    assert_eq!(popped, expected);
}
