//! A FIFO linked queue with separate head and tail locks.
//!
//! Enqueue takes only the tail lock and dequeue only the head lock in the
//! common path, so producers and consumers don't contend. Both locks are
//! taken (head first, always) when the queue transitions to or from empty,
//! and for a flush. The only race worth worrying about is around that
//! first/last element, which is exactly the case handled under both locks.
//!
//! (After Michael & Scott's two-lock queue,
//! <http://www.cs.rochester.edu/research/synchronization/pseudocode/queues.html>.)

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::sync::BusyLock;

/// The intrusive hook a type embeds to live in a [`RawTwoLockQueue`].
///
/// Must be the first field of a `#[repr(C)]` node so the link address is the
/// node address. The pointer is atomic because the queue's one benign race
/// runs right through it: with a single element queued, a pop (head lock)
/// examines the same `next` field a concurrent push (tail lock) appends to.
#[derive(Debug)]
#[repr(C)]
pub struct QueueLink {
    next: AtomicPtr<QueueLink>,
}

impl QueueLink {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl Default for QueueLink {
    fn default() -> Self {
        Self::new()
    }
}

/// The intrusive two-lock queue. Caller owns the nodes; the queue only ever
/// touches their links.
#[derive(Debug)]
pub struct RawTwoLockQueue {
    /// Written only under `head_lock` (plus `tail_lock` for the empty
    /// transitions).
    head: UnsafeCell<*mut QueueLink>,
    /// Written only under `tail_lock` (plus `head_lock` for the empty
    /// transitions).
    tail: UnsafeCell<*mut QueueLink>,
    head_lock: BusyLock,
    tail_lock: BusyLock,
}

// SAFETY: `head`/`tail` are only accessed under their busy locks.
unsafe impl Send for RawTwoLockQueue {}
// SAFETY: as above.
unsafe impl Sync for RawTwoLockQueue {}

impl RawTwoLockQueue {
    pub const fn new() -> Self {
        Self {
            head: UnsafeCell::new(ptr::null_mut()),
            tail: UnsafeCell::new(ptr::null_mut()),
            head_lock: BusyLock::new(),
            tail_lock: BusyLock::new(),
        }
    }

    /// Appends `link` at the tail.
    ///
    /// # Safety
    ///
    /// `link` must point to a live link that stays valid until it is handed
    /// back by [`pop`](Self::pop) or [`flush`](Self::flush), and must not
    /// currently be in any queue.
    pub unsafe fn push(&self, link: NonNull<QueueLink>) {
        // SAFETY: caller guarantees exclusive access to the link.
        unsafe { (*link.as_ptr()).next.store(ptr::null_mut(), Ordering::Relaxed) };

        // Common path: a non-empty queue only needs the tail.
        {
            let _tail_guard = self.tail_lock.lock_exclusive();

            // SAFETY: tail is accessed under the tail lock.
            let tail = unsafe { *self.tail.get() };
            if !tail.is_null() {
                // SAFETY: the tail node is in the queue, so its link is ours
                // under the tail lock; a racing pop of it reads atomically.
                unsafe {
                    (*tail).next.store(link.as_ptr(), Ordering::Release);
                    *self.tail.get() = link.as_ptr();
                }
                return;
            }
        }

        // First element: the head moves too, so take both locks, head first.
        let _head_guard = self.head_lock.lock_exclusive();
        let _tail_guard = self.tail_lock.lock_exclusive();

        // SAFETY: both locks held.
        unsafe {
            // might have raced with another push, check again
            let tail = *self.tail.get();
            if !tail.is_null() {
                (*tail).next.store(link.as_ptr(), Ordering::Release);
                *self.tail.get() = link.as_ptr();
            } else {
                debug_assert!((*self.head.get()).is_null());
                *self.head.get() = link.as_ptr();
                *self.tail.get() = link.as_ptr();
            }
        }
    }

    /// Detaches and returns the head link, or `None` on an empty queue. The
    /// returned link is exclusively the caller's again.
    pub fn pop(&self) -> Option<NonNull<QueueLink>> {
        // Common path: more than one element only needs the head.
        {
            let _head_guard = self.head_lock.lock_exclusive();

            // SAFETY: head is accessed under the head lock.
            let head = unsafe { *self.head.get() };
            if head.is_null() {
                return None;
            }

            // SAFETY: the head node is in the queue; a racing push onto it
            // (single-element state) stores atomically.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if !next.is_null() {
                // SAFETY: as above; detach the head.
                unsafe {
                    *self.head.get() = next;
                    (*head).next.store(ptr::null_mut(), Ordering::Relaxed);
                }
                return NonNull::new(head);
            }
        }

        // Last element: the tail clears too, so take both locks, head first.
        let _head_guard = self.head_lock.lock_exclusive();
        let _tail_guard = self.tail_lock.lock_exclusive();

        // SAFETY: both locks held.
        unsafe {
            // might have raced with a push or another pop, check again
            let head = *self.head.get();
            if head.is_null() {
                return None;
            }

            let next = (*head).next.load(Ordering::Acquire);
            if next.is_null() {
                debug_assert_eq!(*self.tail.get(), head);
                *self.head.get() = ptr::null_mut();
                *self.tail.get() = ptr::null_mut();
            } else {
                *self.head.get() = next;
            }

            (*head).next.store(ptr::null_mut(), Ordering::Relaxed);
            NonNull::new(head)
        }
    }

    /// Detaches the entire list and returns its old head; the links stay
    /// chained through `next` and are exclusively the caller's again.
    pub fn flush(&self) -> Option<NonNull<QueueLink>> {
        let _head_guard = self.head_lock.lock_exclusive();
        let _tail_guard = self.tail_lock.lock_exclusive();

        // SAFETY: both locks held.
        unsafe {
            let head = *self.head.get();
            *self.head.get() = ptr::null_mut();
            *self.tail.get() = ptr::null_mut();
            NonNull::new(head)
        }
    }

    /// Whether the queue was empty at the moment of the check.
    pub fn is_empty(&self) -> bool {
        let _head_guard = self.head_lock.lock_exclusive();
        // SAFETY: head is accessed under the head lock.
        unsafe { (*self.head.get()).is_null() }
    }
}

impl Default for RawTwoLockQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads the link that follows `link` in a detached chain.
///
/// # Safety
///
/// `link` must be part of a chain the caller exclusively owns (i.e. returned
/// by [`RawTwoLockQueue::flush`] or [`RawTwoLockQueue::pop`]).
pub(crate) unsafe fn chain_next(link: NonNull<QueueLink>) -> Option<NonNull<QueueLink>> {
    // SAFETY: caller owns the chain.
    NonNull::new(unsafe { (*link.as_ptr()).next.load(Ordering::Acquire) })
}

#[repr(C)]
struct Node<T> {
    /// Keep first: the link address is the node address.
    link: QueueLink,
    value: T,
}

/// A safe FIFO over the raw queue; nodes are heap-allocated per element.
pub struct TwoLockQueue<T> {
    raw: RawTwoLockQueue,
    _marker: PhantomData<Node<T>>,
}

// SAFETY: values are moved in on push and out on pop; the raw queue
// synchronizes all link access.
unsafe impl<T: Send> Send for TwoLockQueue<T> {}
// SAFETY: as above.
unsafe impl<T: Send> Sync for TwoLockQueue<T> {}

impl<T> TwoLockQueue<T> {
    pub fn new() -> Self {
        Self {
            raw: RawTwoLockQueue::new(),
            _marker: PhantomData,
        }
    }

    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            link: QueueLink::new(),
            value,
        }));

        // SAFETY: the node is freshly boxed, in no queue, and lives until a
        // pop/flush hands it back (Drop flushes leftovers).
        unsafe { self.raw.push(NonNull::new_unchecked(node.cast())) };
    }

    pub fn pop(&self) -> Option<T> {
        let link = self.raw.pop()?;

        // SAFETY: every link in this queue is the first field of a boxed
        // `Node<T>` created in push().
        let node = unsafe { Box::from_raw(link.as_ptr().cast::<Node<T>>()) };
        Some(node.value)
    }

    /// Detaches everything in one shot and returns the values in FIFO order.
    pub fn flush(&self) -> Vec<T> {
        let mut values = Vec::new();
        let mut next = self.raw.flush();

        while let Some(link) = next {
            // SAFETY: the chain is detached and exclusively ours.
            next = unsafe { chain_next(link) };
            // SAFETY: as in pop().
            let node = unsafe { Box::from_raw(link.as_ptr().cast::<Node<T>>()) };
            values.push(node.value);
        }

        values
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl<T> Default for TwoLockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for TwoLockQueue<T> {
    fn drop(&mut self) {
        // free (and drop) whatever is still queued
        drop(self.flush());
    }
}
