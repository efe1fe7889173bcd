//! A shared/exclusive spinlock in a single 16-bit word.
//!
//! Bits 0..14 count shared holders; bit 15 is the writer flag. The lock
//! never blocks in the host, only spins, so it is usable on any execution
//! path that tolerates atomics. It is not fair and is intended for short
//! critical sections that should not see heavy contention.

use std::sync::atomic::{AtomicU16, Ordering};

use bedrock_platform::thread::yield_processor;

use crate::status::Status;

/// Writer pending/held flag.
const WRITER: u16 = 0x8000;
/// Mask of the shared-holder count. Also its saturation value.
const READER_MASK: u16 = 0x7fff;

/// A shared/exclusive busy lock. See the [module docs](self).
#[derive(Debug, Default)]
pub struct BusyLock {
    word: AtomicU16,
}

impl BusyLock {
    pub const fn new() -> Self {
        Self {
            word: AtomicU16::new(0),
        }
    }

    /// Spins until exclusive access is granted.
    pub fn lock_exclusive(&self) -> BusyLockExclusiveGuard<'_> {
        loop {
            // The expected value masks the writer bit off: if another writer
            // already holds (or is draining toward) the lock, the exchange
            // below can never succeed and we keep spinning.
            let current = self.word.load(Ordering::Relaxed) & READER_MASK;
            let with_writer = current | WRITER;

            if self
                .word
                .compare_exchange(current, with_writer, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                yield_processor();
                continue;
            }

            // The writer bit keeps new readers and writers out; wait for the
            // shared holders that got in before us to drain.
            while self.word.load(Ordering::Acquire) & READER_MASK != 0 {
                yield_processor();
            }

            return BusyLockExclusiveGuard { lock: self };
        }
    }

    /// Spins until shared access is granted.
    ///
    /// At [`READER_MASK`] concurrent shared holders the count is saturated
    /// and further acquirers spin until a holder leaves, rather than
    /// overflowing into the writer bit.
    pub fn lock_shared(&self) -> BusyLockSharedGuard<'_> {
        loop {
            let current = self.word.load(Ordering::Relaxed) & READER_MASK;
            if current == READER_MASK {
                yield_processor();
                continue;
            }

            if self
                .word
                .compare_exchange(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return BusyLockSharedGuard { lock: self };
            }

            yield_processor();
        }
    }

    fn unlock_exclusive(&self) {
        // Anything but "writer only" here means the word was corrupted or
        // the release is unpaired. Not safe to recover.
        if self
            .word
            .compare_exchange(WRITER, 0, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            panic!(
                "exclusive busy lock release without exclusive ownership: {}",
                Status::MutantNotOwned
            );
        }
    }

    fn unlock_shared(&self) {
        loop {
            let current = self.word.load(Ordering::Relaxed);
            if current & READER_MASK == 0 {
                panic!(
                    "shared busy lock release without any shared holder: {}",
                    Status::MutantNotOwned
                );
            }

            if self
                .word
                .compare_exchange(current, current - 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }

            yield_processor();
        }
    }

    #[cfg(test)]
    fn force_word(&self, value: u16) {
        self.word.store(value, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn raw_word(&self) -> u16 {
        self.word.load(Ordering::SeqCst)
    }
}

/// Releases the exclusive hold on drop.
#[derive(Debug)]
pub struct BusyLockExclusiveGuard<'a> {
    lock: &'a BusyLock,
}

impl Drop for BusyLockExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_exclusive();
    }
}

/// Releases one shared hold on drop.
#[derive(Debug)]
pub struct BusyLockSharedGuard<'a> {
    lock: &'a BusyLock,
}

impl Drop for BusyLockSharedGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_shared();
    }
}
