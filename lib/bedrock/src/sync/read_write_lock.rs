//! A read/write lock layered on the host primitive.
//!
//! On hosted targets the slim reader/writer primitive is
//! [`std::sync::RwLock`]; this wrapper fixes the substrate's policies on top
//! of it. Construction reports failure as a status, since some hosts can
//! fail to initialize the primitive. A poisoned lock means a holder panicked
//! mid-section; that is an unrecoverable invariant violation, not a per-call
//! error.

use std::sync::RwLock;

use crate::status::Status;

pub type ReadGuard<'a, T> = std::sync::RwLockReadGuard<'a, T>;
pub type WriteGuard<'a, T> = std::sync::RwLockWriteGuard<'a, T>;

#[derive(Debug, Default)]
pub struct ReadWriteLock<T> {
    inner: RwLock<T>,
}

impl<T> ReadWriteLock<T> {
    /// Creates the lock around `value`. Initialization failure of the host
    /// primitive propagates; on this host it is infallible.
    pub fn new(value: T) -> Result<Self, Status> {
        Ok(Self {
            inner: RwLock::new(value),
        })
    }

    /// Acquires the lock shared; blocks while a writer holds it.
    pub fn read(&self) -> ReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|_| {
            panic!(
                "read/write lock poisoned by a panicked holder: {}",
                Status::InvalidStateTransition
            )
        })
    }

    /// Acquires the lock exclusive; blocks while any holder exists.
    pub fn write(&self) -> WriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(|_| {
            panic!(
                "read/write lock poisoned by a panicked holder: {}",
                Status::InvalidStateTransition
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn readers_share_writers_exclude() {
        let lock = Arc::new(ReadWriteLock::new(0u32).unwrap());

        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(*r1 + *r2, 0);
        drop((r1, r2));

        let lock_clone = Arc::clone(&lock);
        let writer_done = Arc::new(AtomicBool::new(false));
        let writer_done_clone = Arc::clone(&writer_done);

        let reader = lock.read();
        let writer = std::thread::spawn(move || {
            let mut value = lock_clone.write();
            *value = 7;
            writer_done_clone.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!writer_done.load(Ordering::SeqCst));
        drop(reader);

        writer.join().unwrap();
        assert_eq!(*lock.read(), 7);
    }
}
