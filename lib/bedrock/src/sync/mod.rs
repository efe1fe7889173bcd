//! Synchronization and lifetime primitives.

mod busy_lock;
mod read_write_lock;
mod rundown;
mod signal;

pub use busy_lock::{BusyLock, BusyLockExclusiveGuard, BusyLockSharedGuard};
pub use read_write_lock::{ReadGuard, ReadWriteLock, WriteGuard};
pub use rundown::{RundownGuard, RundownProtection};
pub use signal::Signal;
