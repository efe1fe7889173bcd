//! An adapter over a host thread with explicit run/join lifecycle.
//!
//! The internal lock serializes lifecycle calls (`run`, `join`) against each
//! other, and that is all it does. The adapter does not make the spawned
//! work concurrent-safe; that is the closure's business.

use std::sync::Mutex;

use bedrock_platform::thread::{self, ThreadHandle};

use crate::status::Status;

#[derive(Debug)]
pub struct WorkerThread {
    name: String,
    handle: Mutex<Option<ThreadHandle>>,
}

impl WorkerThread {
    /// An adapter with no thread. `name` is given to every thread this
    /// adapter spawns.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the thread running `callback`.
    ///
    /// Fails with `InvalidStateTransition` if a thread already exists, and
    /// with `InsufficientResources` if the host cannot spawn one.
    pub fn run<F>(&self, callback: F) -> Result<(), Status>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut handle = self.lock_handle();

        if handle.is_some() {
            return Err(Status::InvalidStateTransition);
        }

        let spawned =
            thread::spawn(&self.name, callback).map_err(|_| Status::InsufficientResources)?;

        *handle = Some(spawned);
        Ok(())
    }

    /// Blocks until the thread exits and releases the handle; a no-op when
    /// no thread exists. A panicked thread is propagated.
    pub fn join(&self) {
        let mut handle = self.lock_handle();

        if let Some(joinable) = handle.take() {
            thread::join(joinable);
        }
    }

    /// Whether a thread currently exists (spawned and not yet joined).
    pub fn is_joinable(&self) -> bool {
        self.lock_handle().is_some()
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<ThreadHandle>> {
        self.handle.lock().unwrap_or_else(|_| {
            panic!(
                "worker thread lifecycle lock poisoned: {}",
                Status::InvalidStateTransition
            )
        })
    }
}
