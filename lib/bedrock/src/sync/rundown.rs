//! Rundown protection: a one-shot gate that admits arbitrary concurrent
//! acquirers until it is closed, then blocks new acquirers and waits for the
//! existing ones to drain.
//!
//! The whole state is one 64-bit word: bit 0 is the "rundown active" flag,
//! bits 1..63 hold the reference count shifted up by one, so the count moves
//! in steps of two and can never disturb the flag.

use std::sync::atomic::{AtomicU64, Ordering};

use bedrock_platform::thread::{sleep, yield_processor};

use crate::status::Status;

/// The "rundown active" flag; once set it is never cleared.
const ACTIVE: u64 = 1;
/// One reference, kept clear of the flag bit.
const INCREMENT: u64 = 2;

/// How often the drain loop re-checks the word, in milliseconds. Small
/// enough for a responsive shutdown, large enough not to spin.
const DRAIN_POLL_MILLIS: u64 = 100;

/// See the [module docs](self).
#[derive(Debug, Default)]
pub struct RundownProtection {
    word: AtomicU64,
}

impl RundownProtection {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    /// Takes a reference on the gate, or returns `None` forever once
    /// [`wait_for_release`](Self::wait_for_release) has marked it active.
    #[must_use]
    pub fn acquire(&self) -> Option<RundownGuard<'_>> {
        loop {
            let current = self.word.load(Ordering::Acquire);

            if current & ACTIVE != 0 {
                return None;
            }

            // Close to the top of the range an increment could carry into
            // the flag bit; wait for holders to drain instead.
            if current >= u64::MAX - INCREMENT {
                yield_processor();
                continue;
            }

            if self
                .word
                .compare_exchange(
                    current,
                    current + INCREMENT,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(RundownGuard { rundown: self });
            }

            // somebody else moved the word; retry
        }
    }

    /// Whether the gate has been marked active. Non-blocking; once true it
    /// stays true.
    pub fn is_run_down(&self) -> bool {
        self.word.load(Ordering::Acquire) & ACTIVE != 0
    }

    /// Marks the gate active and blocks until every outstanding reference is
    /// released, i.e. until the word is exactly the flag bit. After this
    /// returns, every later [`acquire`](Self::acquire) fails.
    ///
    /// Safe to call from several threads; all of them return once the gate
    /// is drained.
    pub fn wait_for_release(&self) {
        loop {
            let current = self.word.load(Ordering::Acquire);

            if current & ACTIVE != 0 {
                while self.word.load(Ordering::Acquire) != ACTIVE {
                    sleep(DRAIN_POLL_MILLIS);
                }
                return;
            }

            // Try to set the flag; whether we or a racing thread succeeds,
            // the next iteration enters the drain wait above.
            let _ = self.word.compare_exchange(
                current,
                current | ACTIVE,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }

    fn release(&self) {
        loop {
            let current = self.word.load(Ordering::Relaxed);

            if current < INCREMENT {
                panic!(
                    "rundown released more times than acquired: {}",
                    Status::InvalidStateTransition
                );
            }

            if self
                .word
                .compare_exchange(
                    current,
                    current - INCREMENT,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn raw_word(&self) -> u64 {
        self.word.load(Ordering::SeqCst)
    }
}

/// A held reference on a [`RundownProtection`]; released on drop.
#[derive(Debug)]
#[must_use]
pub struct RundownGuard<'a> {
    rundown: &'a RundownProtection,
}

impl Drop for RundownGuard<'_> {
    fn drop(&mut self) {
        self.rundown.release();
    }
}
