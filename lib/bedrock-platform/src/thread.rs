//! Thread primitives: spawn/join, sleep, and the processor yield.
//!
//! These wrappers are deliberately thin; they exist so the substrate's only
//! OS-facing thread code is in this crate.

use std::time::Duration;

/// An owned handle to a spawned thread.
pub type ThreadHandle = std::thread::JoinHandle<()>;

/// Spawns a named host thread running `entry`. Spawn failure (the host is
/// out of threads or memory) is reported, not panicked.
pub fn spawn<F>(name: &str, entry: F) -> std::io::Result<ThreadHandle>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(entry)
}

/// Blocks until the thread behind `handle` exits. A panicked thread is
/// propagated to the joiner.
pub fn join(handle: ThreadHandle) {
    handle.join().expect("joined thread panicked");
}

/// Blocks the calling thread for at least `millis` milliseconds.
pub fn sleep(millis: u64) {
    std::thread::sleep(Duration::from_millis(millis));
}

/// Relinquishes the processor briefly.
///
/// Used by spin loops in the substrate. We don't know if a pause instruction
/// is beneficial or not here, but it doesn't seem to hurt, and yielding to
/// the scheduler keeps single-core hosts live under contention.
pub fn yield_processor() {
    std::hint::spin_loop();
    std::thread::yield_now();
}
