//! Execution & dispatch: the worker-thread adapter and the thread pool.

mod thread_pool;
mod worker;

pub use thread_pool::{ThreadPool, INITIAL_THREADS, MAX_THREADS, MAX_WORKLOAD_BEFORE_GROW};
pub use worker::WorkerThread;
