//! A bounded thread pool with round-robin dispatch over per-worker queues.
//!
//! Every worker owns a two-lock queue of work nodes and an auto-reset wakeup
//! signal; `enqueue` picks a worker round-robin, parks a node on its queue
//! and sets its signal. Workers drain their whole queue per wakeup. A drain
//! that comes back unusually large is taken as a load signal and grows the
//! pool, up to its bound.
//!
//! Shutdown is cooperative: [`rundown`](ThreadPool::rundown) closes the
//! pool's gate (new enqueues are refused), waits for in-flight enqueues to
//! finish, then stops each worker and drains the leftovers through their
//! rundown callbacks. Exactly one of a work item's two callbacks runs,
//! always.

use std::mem::size_of;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, trace};

use crate::collections::{two_lock_queue_chain_next, QueueLink, RawTwoLockQueue};
use crate::mem::LookasideAllocator;
use crate::pool::WorkerThread;
use crate::status::Status;
use crate::sync::{ReadWriteLock, RundownProtection, Signal};

/// Workers started by [`ThreadPool::new`].
pub const INITIAL_THREADS: usize = 2;
/// Upper bound on workers for [`ThreadPool::new`].
pub const MAX_THREADS: usize = 32;
/// A single drain of at least this many items asks the pool for one more
/// worker. A crude load signal, deliberately cheap.
pub const MAX_WORKLOAD_BEFORE_GROW: usize = 64;

type WorkCallback = Box<dyn FnOnce() + Send + 'static>;

/// One queued unit of work. Lives in the pool's lookaside allocator and is
/// owned by a worker's queue until drained.
#[repr(C)]
struct WorkNode {
    /// Keep first: the link address is the node address.
    link: QueueLink,
    /// Runs in steady state.
    run: WorkCallback,
    /// Runs instead when the item is drained by a shutdown.
    rundown: WorkCallback,
}

#[derive(Debug)]
struct PoolWorker {
    queue: RawTwoLockQueue,
    wakeup: Signal,
    shutdown: AtomicBool,
    thread: WorkerThread,
}

#[derive(Debug)]
struct PoolShared {
    workers: ReadWriteLock<Vec<Arc<PoolWorker>>>,
    round_robin: AtomicUsize,
    gate: RundownProtection,
    node_allocator: LookasideAllocator,
    max_threads: usize,
}

/// See the [module docs](self).
#[derive(Debug)]
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl ThreadPool {
    /// A pool with [`INITIAL_THREADS`] workers, growable to [`MAX_THREADS`].
    pub fn new() -> Result<Self, Status> {
        Self::with_limits(INITIAL_THREADS, MAX_THREADS)
    }

    /// A pool with `initial_threads` workers, growable to `max_threads`.
    /// `initial_threads` must be in `1..=max_threads`.
    pub fn with_limits(initial_threads: usize, max_threads: usize) -> Result<Self, Status> {
        if initial_threads == 0 || initial_threads > max_threads {
            return Err(Status::InvalidParameter);
        }

        let shared = Arc::new(PoolShared {
            workers: ReadWriteLock::new(Vec::with_capacity(initial_threads))?,
            round_robin: AtomicUsize::new(0),
            gate: RundownProtection::new(),
            // work nodes must survive paging pressure; they are critical
            node_allocator: LookasideAllocator::new(size_of::<WorkNode>(), true),
            max_threads,
        });

        let pool = Self { shared };

        for _ in 0..initial_threads {
            if let Err(status) = spawn_worker(&pool.shared) {
                pool.rundown();
                return Err(status);
            }
        }

        Ok(pool)
    }

    /// The number of live workers.
    pub fn thread_count(&self) -> usize {
        self.shared.workers.read().len()
    }

    /// Queues a work item. `run` fires on a pool worker in steady state;
    /// `rundown` fires instead if the item is still queued when the pool
    /// shuts down. Exactly one of the two fires.
    pub fn enqueue<F, R>(&self, run: F, rundown: R) -> Result<(), Status>
    where
        F: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;

        // holding the gate keeps rundown() from completing under us
        let Some(_gate) = shared.gate.acquire() else {
            return Err(Status::ShutdownInProgress);
        };

        let worker = {
            let workers = shared.workers.read();
            if workers.is_empty() {
                return Err(Status::InvalidStateTransition);
            }

            // a plain counter: approximate round-robin is all that's
            // promised
            let index = shared.round_robin.fetch_add(1, Ordering::Relaxed) % workers.len();
            Arc::clone(&workers[index])
        };

        let block = shared.node_allocator.allocate(size_of::<WorkNode>())?;
        let node = block.cast::<WorkNode>();

        // SAFETY: the block is a full element, sized and aligned for a
        // WorkNode; construct it in place.
        unsafe {
            node.as_ptr().write(WorkNode {
                link: QueueLink::new(),
                run: Box::new(run),
                rundown: Box::new(rundown),
            });
        }

        // SAFETY: the link is the node's first field; the node stays live
        // until a drain hands it back.
        unsafe { worker.queue.push(node.cast::<QueueLink>()) };
        worker.wakeup.set();

        Ok(())
    }

    /// Shuts the pool down: refuses new enqueues, waits for in-flight ones,
    /// then stops every worker and drains the leftovers through their
    /// rundown callbacks. After this returns no callback of any kind fires
    /// again. Idempotent.
    pub fn rundown(&self) {
        let shared = &self.shared;

        // block further inserts and further worker creation
        shared.gate.wait_for_release();

        let workers = std::mem::take(&mut *shared.workers.write());
        if !workers.is_empty() {
            debug!("thread pool rundown: stopping {} worker(s)", workers.len());
        }

        for worker in workers {
            worker.shutdown.store(true, Ordering::Release);
            worker.wakeup.set();
            worker.thread.join();

            // anything still queued runs its rundown callback, right here
            drain_queue(&worker, shared);
        }

        shared.round_robin.store(0, Ordering::Relaxed);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.rundown();
    }
}

/// Starts one more worker and publishes it in the vector. Refused while the
/// pool is shutting down or at its thread quota.
fn spawn_worker(shared: &Arc<PoolShared>) -> Result<(), Status> {
    // not a lock: just keeps rundown() from completing mid-spawn
    let Some(_gate) = shared.gate.acquire() else {
        return Err(Status::ShutdownInProgress);
    };

    if shared.workers.read().len() >= shared.max_threads {
        return Err(Status::QuotaExceeded);
    }

    let worker = Arc::new(PoolWorker {
        queue: RawTwoLockQueue::new(),
        // auto-reset: one set wakes one drain pass
        wakeup: Signal::new(false)?,
        shutdown: AtomicBool::new(false),
        thread: WorkerThread::new("bedrock-pool"),
    });

    let worker_clone = Arc::clone(&worker);
    let shared_clone = Arc::clone(shared);
    worker
        .thread
        .run(move || worker_main(worker_clone, shared_clone))?;

    let lost_quota_race = {
        let mut workers = shared.workers.write();
        if workers.len() >= shared.max_threads {
            true
        } else {
            workers.push(Arc::clone(&worker));
            false
        }
    };

    if lost_quota_race {
        // lost the race to another grower; take the fresh worker back down
        // (outside the vector lock, since joining can take a moment)
        worker.shutdown.store(true, Ordering::Release);
        worker.wakeup.set();
        worker.thread.join();
        return Err(Status::QuotaExceeded);
    }

    trace!("thread pool grew by one worker");
    Ok(())
}

fn worker_main(worker: Arc<PoolWorker>, shared: Arc<PoolShared>) {
    while !worker.shutdown.load(Ordering::Acquire) {
        worker.wakeup.wait();

        let processed = drain_queue(&worker, &shared);

        // a huge drain means we're behind; ask for help, best effort
        if processed >= MAX_WORKLOAD_BEFORE_GROW && !worker.shutdown.load(Ordering::Acquire) {
            if let Err(status) = spawn_worker(&shared) {
                trace!("pool growth declined: {status}");
            }
        }
    }

    // shutdown: whatever raced in since the last drain still gets its
    // rundown callback
    drain_queue(&worker, &shared);
}

/// Flushes the worker's queue and runs every drained item: the normal
/// callback in steady state, the rundown callback once the worker's
/// shutdown flag is set. Returns the number of items run.
fn drain_queue(worker: &PoolWorker, shared: &PoolShared) -> usize {
    let mut processed = 0;
    let mut next = worker.queue.flush();

    while let Some(link) = next {
        // SAFETY: the chain is detached and exclusively ours.
        next = unsafe { two_lock_queue_chain_next(link) };

        let node_ptr = link.as_ptr().cast::<WorkNode>();
        // SAFETY: every link in a worker queue is the first field of a
        // WorkNode constructed in enqueue(); move it out of the block.
        let node = unsafe { node_ptr.read() };

        // checked per item: a shutdown can land mid-drain
        let callback = if worker.shutdown.load(Ordering::Acquire) {
            node.rundown
        } else {
            node.run
        };
        callback();
        processed += 1;

        // SAFETY: the block came from this allocator and its contents have
        // been moved out.
        unsafe {
            shared
                .node_allocator
                .free(NonNull::new_unchecked(node_ptr.cast::<u8>()))
        };
    }

    processed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn invalid_limits_are_rejected() {
        assert_eq!(
            ThreadPool::with_limits(0, 4).unwrap_err(),
            Status::InvalidParameter
        );
        assert_eq!(
            ThreadPool::with_limits(5, 4).unwrap_err(),
            Status::InvalidParameter
        );
    }

    #[test]
    fn work_runs_on_a_worker() {
        let pool = ThreadPool::with_limits(2, 4).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            // count on both paths: an item drained by the shutdown still
            // counts exactly once
            let on_run = Arc::clone(&counter);
            let on_rundown = Arc::clone(&counter);
            pool.enqueue(
                move || {
                    on_run.fetch_add(1, Ordering::SeqCst);
                },
                move || {
                    on_rundown.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        }

        pool.rundown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn enqueue_after_rundown_is_refused() {
        let pool = ThreadPool::with_limits(1, 1).unwrap();
        pool.rundown();

        assert_eq!(
            pool.enqueue(|| {}, || {}).unwrap_err(),
            Status::ShutdownInProgress
        );
    }

    #[test]
    fn rundown_is_idempotent() {
        let pool = ThreadPool::with_limits(2, 2).unwrap();
        pool.enqueue(|| {}, || {}).unwrap();

        pool.rundown();
        pool.rundown();
        assert_eq!(pool.thread_count(), 0);
    }

    #[test]
    fn items_on_one_worker_run_in_order() {
        let pool = ThreadPool::with_limits(1, 1).unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..100 {
            // the shutdown drain walks the queue in the same order, so
            // recording on both paths keeps the sequence complete
            let on_run = Arc::clone(&order);
            let on_rundown = Arc::clone(&order);
            pool.enqueue(
                move || {
                    on_run.lock().unwrap().push(i);
                },
                move || {
                    on_rundown.lock().unwrap().push(i);
                },
            )
            .unwrap();
        }

        pool.rundown();

        let order = order.lock().unwrap();
        assert_eq!(*order, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn slow_drains_grow_the_pool() {
        let pool = Arc::new(ThreadPool::with_limits(1, 2).unwrap());
        assert_eq!(pool.thread_count(), 1);

        // pile up far more than MAX_WORKLOAD_BEFORE_GROW items while the
        // single worker is stuck on the first one
        let (send, recv) = crossbeam::channel::bounded::<()>(1);
        pool.enqueue(
            move || {
                let _ = recv.recv();
            },
            || {},
        )
        .unwrap();

        for _ in 0..(MAX_WORKLOAD_BEFORE_GROW * 2) {
            pool.enqueue(|| {}, || {}).unwrap();
        }
        send.send(()).unwrap();

        // the big drain happens now; growth follows it, so poll briefly
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pool.thread_count() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.thread_count(), 2);

        pool.rundown();
    }
}
