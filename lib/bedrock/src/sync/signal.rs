//! A manual/auto-reset wait object.
//!
//! Thin status-bearing layer over the platform wait-event; the reset mode is
//! fixed at construction. Set/wait pairs have release/acquire semantics: a
//! satisfied wait observes everything the setter did before `set`.

use std::time::Duration;

use bedrock_platform::event::WaitEvent;

use crate::status::Status;

#[derive(Debug)]
pub struct Signal {
    event: WaitEvent,
}

impl Signal {
    /// Creates a signal in the unsignaled state. `manual_reset` selects
    /// whether a `set` releases every waiter until `reset` (manual) or
    /// exactly one waiter (auto).
    pub fn new(manual_reset: bool) -> Result<Self, Status> {
        Ok(Self {
            event: WaitEvent::new(manual_reset),
        })
    }

    pub fn is_manual_reset(&self) -> bool {
        self.event.is_manual_reset()
    }

    /// Signals the event. Manual-reset stays signaled until [`reset`]
    /// (releasing all current and future waiters); auto-reset releases at
    /// most one waiter and returns to unsignaled.
    ///
    /// [`reset`]: Self::reset
    pub fn set(&self) {
        self.event.set();
    }

    /// Forces the event to unsignaled.
    pub fn reset(&self) {
        self.event.reset();
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let satisfied = self.event.wait(None);
        debug_assert!(satisfied);
    }

    /// Blocks up to `timeout`; returns whether the event was acquired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.event.wait(Some(timeout))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn manual_reset_releases_everyone_until_reset() {
        let signal = Arc::new(Signal::new(true).unwrap());
        let released = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signal = Arc::clone(&signal);
                let released = Arc::clone(&released);
                std::thread::spawn(move || {
                    signal.wait();
                    released.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        signal.set();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 4);

        // still signaled until an explicit reset
        assert!(signal.wait_timeout(Duration::ZERO));
        signal.reset();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn set_then_reset_leaves_manual_signal_unsignaled() {
        let signal = Signal::new(true).unwrap();

        signal.set();
        signal.reset();

        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn auto_reset_consumed_by_one_wait() {
        let signal = Signal::new(false).unwrap();

        signal.set();
        assert!(signal.wait_timeout(Duration::ZERO));
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }
}
