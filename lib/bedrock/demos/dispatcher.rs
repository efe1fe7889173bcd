//! A small end-to-end tour: work items fan out over the thread pool and
//! report their results through the event bus, with the work nodes and the
//! shared state living in the substrate's own allocators.
//!
//! Run with `cargo run --example dispatcher`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bedrock::events::{EventBus, EventListener};
use bedrock::mem::{split, AllocatorHandle, SharedBox};
use bedrock::pool::ThreadPool;

/// What a finished work item announces on the bus.
struct JobDone {
    job: u32,
    digits_of_work: u32,
}

struct Tally {
    jobs: AtomicU32,
    work: AtomicU32,
}

impl EventListener<JobDone> for Tally {
    fn on_event(&self, event: &JobDone, _bus: &EventBus<JobDone>) {
        self.jobs.fetch_add(1, Ordering::Relaxed);
        self.work.fetch_add(event.digits_of_work, Ordering::Relaxed);
        if event.job % 100 == 0 {
            println!("job {:>4} done ({} digits)", event.job, event.digits_of_work);
        }
    }
}

fn main() {
    let started = bedrock_platform::time::monotonic_time();

    split::initialize().expect("split allocator init");

    {
        let bus = Arc::new(EventBus::new().expect("event bus"));
        // the listener itself lives in split-allocator memory
        let tally = SharedBox::new_in(
            Tally {
                jobs: AtomicU32::new(0),
                work: AtomicU32::new(0),
            },
            AllocatorHandle::split_paged(),
        )
        .expect("listener allocation");
        bus.register(tally.clone()).expect("listener registration");

        let pool = ThreadPool::with_limits(2, 8).expect("thread pool");
        let dropped = Arc::new(AtomicU32::new(0));

        for job in 0..1_000u32 {
            let bus = Arc::clone(&bus);
            let dropped = Arc::clone(&dropped);
            pool.enqueue(
                move || {
                    // some token work: count the digits of job!-ish numbers
                    let digits = (1..=job % 97)
                        .map(|n| n.to_string().len() as u32)
                        .sum::<u32>();
                    let _ = bus.dispatch(&JobDone {
                        job,
                        digits_of_work: digits,
                    });
                },
                move || {
                    dropped.fetch_add(1, Ordering::Relaxed);
                },
            )
            .expect("enqueue");
        }

        pool.rundown();
        bus.rundown();

        println!(
            "{} jobs delivered, {} digits counted, {} dropped at shutdown",
            tally.jobs.load(Ordering::Relaxed),
            tally.work.load(Ordering::Relaxed),
            dropped.load(Ordering::Relaxed),
        );
    }

    split::deinitialize();

    let elapsed = bedrock_platform::time::monotonic_time() - started;
    println!("total runtime: {} ms", elapsed / 10_000);
}
