//! bedrock - a runtime substrate for concurrent, kernel-aware software.
//!
//! The crate provides the primitives such software is built from, in four
//! layers (leaves first):
//!
//! - **Memory infrastructure** ([`mem`]): a byte-level allocator handle, a
//!   lookaside (free-list) allocator, a process-wide size-class split
//!   allocator, and ownership boxes ([`mem::SharedBox`], [`mem::UniqueBox`])
//!   that allocate through them.
//! - **Synchronization** ([`sync`]): a shared/exclusive busy lock, a
//!   read/write lock over the host primitive, a manual/auto-reset signal,
//!   and rundown protection with wait-for-drain semantics.
//! - **Concurrent containers** ([`collections`]): a two-lock FIFO queue and
//!   an insert/flush-only atomic stack.
//! - **Execution & dispatch** ([`pool`], [`events`]): a worker-thread
//!   adapter, a bounded thread pool with round-robin dispatch over
//!   per-worker queues, and an event bus whose listener set is updated by
//!   copy-on-write snapshots.
//!
//! Errors are values ([`Status`]); invariant violations (double release,
//! releasing a lock that isn't held, allocator header corruption) are
//! programmer errors and panic. Host facilities are consumed only through
//! the `bedrock-platform` crate.
//!
//! Unsafe code is confined to the raw intrusive containers and the memory
//! infrastructure; everything layered above them (the pool, the event bus,
//! the typed container facades) is written in safe code against their
//! interfaces.

// https://github.com/rust-lang/rfcs/blob/master/text/2585-unsafe-block-in-unsafe-fn.md
#![deny(unsafe_op_in_unsafe_fn)]

pub mod collections;
pub mod events;
pub mod mem;
pub mod pool;
pub mod status;
pub mod sync;

pub use status::Status;
