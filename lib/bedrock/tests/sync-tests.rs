//! Cross-thread scenarios for the rundown gate and the signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bedrock::sync::{RundownProtection, Signal};

#[test]
fn rundown_blocks_every_new_acquirer() {
    let rundown = Arc::new(RundownProtection::new());

    // eight threads loop acquire/release until the gate refuses them
    let loopers: Vec<_> = (0..8)
        .map(|_| {
            let rundown = Arc::clone(&rundown);
            std::thread::spawn(move || {
                let mut successes = 0u64;
                loop {
                    match rundown.acquire() {
                        Some(guard) => {
                            successes += 1;
                            drop(guard);
                        }
                        // the gate closed; it must refuse us forever now
                        None => break,
                    }
                }
                assert!(rundown.acquire().is_none());
                successes
            })
        })
        .collect();

    // let them churn, then close the gate once
    std::thread::sleep(Duration::from_millis(50));
    rundown.wait_for_release();

    // every thread observed the refusal and exited; no holder remains
    for looper in loopers {
        assert!(looper.join().unwrap() > 0);
    }
    assert!(rundown.acquire().is_none());
}

#[test]
fn auto_reset_set_releases_exactly_one_waiter() {
    let signal = Arc::new(Signal::new(false).unwrap());
    let released = Arc::new(AtomicU32::new(0));

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let signal = Arc::clone(&signal);
            let released = Arc::clone(&released);
            std::thread::spawn(move || {
                assert!(signal.wait_timeout(Duration::from_millis(1_000_000)));
                released.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    // give the waiters time to block, then release one
    std::thread::sleep(Duration::from_millis(100));
    signal.set();

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // the remaining four each need their own set
    for expected in 2..=5 {
        signal.set();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(released.load(Ordering::SeqCst), expected);
    }

    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn manual_reset_holds_waiters_after_a_reset() {
    let signal = Arc::new(Signal::new(true).unwrap());

    signal.set();
    signal.reset();

    // after set-then-reset the signal is observationally unsignaled
    let signal_clone = Arc::clone(&signal);
    let blocked = std::thread::spawn(move || signal_clone.wait_timeout(Duration::from_millis(150)));
    assert!(!blocked.join().unwrap());

    // a fresh set releases waiters again
    let signal_clone = Arc::clone(&signal);
    let released = std::thread::spawn(move || signal_clone.wait_timeout(Duration::from_secs(10)));
    std::thread::sleep(Duration::from_millis(50));
    signal.set();
    assert!(released.join().unwrap());
}
