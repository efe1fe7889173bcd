//! Copy-on-write snapshot semantics of the event bus, across threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bedrock::events::{EventBus, EventListener};
use bedrock::mem::SharedBox;

/// Counts deliveries, optionally dawdling inside the callback.
struct Recorder {
    seen: AtomicU32,
    dwell: Duration,
}

impl Recorder {
    fn new(dwell: Duration) -> Self {
        Self {
            seen: AtomicU32::new(0),
            dwell,
        }
    }
}

impl EventListener<&'static str> for Recorder {
    fn on_event(&self, _event: &&'static str, _bus: &EventBus<&'static str>) {
        std::thread::sleep(self.dwell);
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn in_flight_dispatch_still_delivers_to_an_unregistered_listener() {
    let bus = Arc::new(EventBus::new().unwrap());

    let first = SharedBox::new(Recorder::new(Duration::ZERO)).unwrap();
    // the slow one keeps the walk busy while the main thread unregisters
    let slow = SharedBox::new(Recorder::new(Duration::from_millis(400))).unwrap();
    let last = SharedBox::new(Recorder::new(Duration::ZERO)).unwrap();

    bus.register(first.clone()).unwrap();
    bus.register(slow.clone()).unwrap();
    let last_id = bus.register(last.clone()).unwrap();

    let background = {
        let bus = Arc::clone(&bus);
        std::thread::spawn(move || {
            bus.dispatch(&"round-one").unwrap();
        })
    };

    // wait until the background walk has started (the first listener is
    // instant, so once it has counted, the walk is pinned and inside the
    // slow listener)
    while first.seen.load(Ordering::SeqCst) == 0 {
        std::thread::yield_now();
    }

    // unregistering now blocks until the in-flight walk has delivered to
    // the last listener; that walk captured its snapshot before we got here
    bus.unregister(last_id).unwrap();
    assert_eq!(last.seen.load(Ordering::SeqCst), 1);

    background.join().unwrap();

    // a fresh dispatch walks the new snapshot, without the unregistered
    // listener
    bus.dispatch(&"round-two").unwrap();
    assert_eq!(first.seen.load(Ordering::SeqCst), 2);
    assert_eq!(slow.seen.load(Ordering::SeqCst), 2);
    assert_eq!(last.seen.load(Ordering::SeqCst), 1);

    bus.rundown();
}

#[test]
fn no_delivery_of_any_kind_after_rundown() {
    let bus = Arc::new(EventBus::new().unwrap());

    let listeners: Vec<_> = (0..3)
        .map(|_| {
            let listener = SharedBox::new(Recorder::new(Duration::ZERO)).unwrap();
            bus.register(listener.clone()).unwrap();
            listener
        })
        .collect();

    bus.dispatch(&"before").unwrap();
    bus.rundown();
    assert!(bus.dispatch(&"after").is_err());

    for listener in &listeners {
        assert_eq!(listener.seen.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn concurrent_dispatchers_all_complete() {
    let bus = Arc::new(EventBus::new().unwrap());

    let listener = SharedBox::new(Recorder::new(Duration::ZERO)).unwrap();
    bus.register(listener.clone()).unwrap();

    let dispatchers: Vec<_> = (0..8)
        .map(|_| {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    bus.dispatch(&"burst").unwrap();
                }
            })
        })
        .collect();

    for dispatcher in dispatchers {
        dispatcher.join().unwrap();
    }

    assert_eq!(listener.seen.load(Ordering::SeqCst), 800);
    bus.rundown();
}

#[test]
fn rundown_waits_for_inflight_deliveries() {
    let bus = Arc::new(EventBus::new().unwrap());

    let slow = SharedBox::new(Recorder::new(Duration::from_millis(300))).unwrap();
    bus.register(slow.clone()).unwrap();

    let background = {
        let bus = Arc::clone(&bus);
        std::thread::spawn(move || {
            bus.dispatch(&"slow-one").unwrap();
        })
    };

    // let the dispatch get going, then run the bus down under it
    std::thread::sleep(Duration::from_millis(50));
    bus.rundown();

    // rundown returned only after the delivery completed
    assert_eq!(slow.seen.load(Ordering::SeqCst), 1);
    background.join().unwrap();
}
