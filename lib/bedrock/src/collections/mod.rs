//! Concurrent containers: a two-lock FIFO queue and an insert/flush-only
//! atomic stack.
//!
//! Both come in two shapes: a raw intrusive core operating on caller-owned
//! links (what the allocators and the thread pool consume), and a safe typed
//! facade over heap nodes for everything else.

mod atomic_stack;
mod two_lock_queue;

pub use atomic_stack::{AtomicStack, RawAtomicStack, StackLink};
pub use two_lock_queue::{QueueLink, RawTwoLockQueue, TwoLockQueue};

pub(crate) use two_lock_queue::chain_next as two_lock_queue_chain_next;
