//! The raw wait-event: the wait/signal primitive the substrate builds its
//! higher-level signal on.
//!
//! A mutex/condvar pair guarding a `signaled` flag, with the manual/auto
//! reset mode fixed at construction. Manual-reset stays signaled until an
//! explicit [`reset`](WaitEvent::reset) and releases every waiter;
//! auto-reset is consumed by the first satisfied wait and releases exactly
//! one.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct WaitEvent {
    manual_reset: bool,
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaitEvent {
    pub fn new(manual_reset: bool) -> Self {
        Self {
            manual_reset,
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Whether this event stays signaled until reset.
    pub fn is_manual_reset(&self) -> bool {
        self.manual_reset
    }

    /// Transitions the event to signaled.
    ///
    /// Manual-reset releases all current and future waiters until
    /// [`reset`](Self::reset); auto-reset releases at most one waiter, and
    /// that waiter returns the event to unsignaled.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;

        if self.manual_reset {
            self.cond.notify_all();
        } else {
            // The flag is consumed under the mutex in wait(), so even if the
            // condvar wakes more than one thread only one observes it set.
            self.cond.notify_one();
        }
    }

    /// Forces the event to unsignaled.
    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    /// Blocks until the event is signaled or the timeout elapses. Returns
    /// whether the event was acquired.
    ///
    /// The timeout is converted to a monotonic deadline up front, so
    /// spurious wakeups never extend the total wait. `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        // A timeout so large that the deadline overflows is a forever-wait.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut signaled = self.signaled.lock().unwrap();
        loop {
            if *signaled {
                if !self.manual_reset {
                    *signaled = false;
                }
                return true;
            }

            match deadline {
                None => {
                    signaled = self.cond.wait(signaled).unwrap();
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self.cond.wait_timeout(signaled, deadline - now).unwrap();
                    signaled = guard;
                }
            }
        }
    }
}
