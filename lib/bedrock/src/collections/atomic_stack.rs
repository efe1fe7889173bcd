//! A lock-free LIFO over a single atomic head pointer.
//!
//! Only insertion and flush are supported, on purpose. A pop (or any
//! arbitrary unlink) would have to read `head.next` while a concurrent
//! flush may already have detached and freed that node; the two-lock queue
//! is the container for workloads that need single-element removal.
//! Consumption happens by flushing the whole chain and walking it privately.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use bedrock_platform::thread::yield_processor;

/// The intrusive hook a type embeds to live in a [`RawAtomicStack`].
///
/// Must be the first field of a `#[repr(C)]` node so the link address is the
/// node address.
#[derive(Debug)]
#[repr(C)]
pub struct StackLink {
    next: *mut StackLink,
}

impl StackLink {
    pub const fn new() -> Self {
        Self {
            next: ptr::null_mut(),
        }
    }
}

impl Default for StackLink {
    fn default() -> Self {
        Self::new()
    }
}

/// The intrusive lock-free stack. Caller owns the nodes; the stack only ever
/// touches their links.
#[derive(Debug)]
pub struct RawAtomicStack {
    head: AtomicPtr<StackLink>,
}

impl RawAtomicStack {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Pushes `link` as the new head.
    ///
    /// # Safety
    ///
    /// `link` must point to a live link that stays valid until it is handed
    /// back by [`flush`](Self::flush), and must not currently be in any
    /// stack.
    pub unsafe fn insert(&self, link: NonNull<StackLink>) {
        loop {
            let current = self.head.load(Ordering::Acquire);

            // SAFETY: until the exchange below succeeds the link is still
            // exclusively ours.
            unsafe { (*link.as_ptr()).next = current };

            if self
                .head
                .compare_exchange(
                    current,
                    link.as_ptr(),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }

            yield_processor();
        }
    }

    /// Detaches the whole chain and returns its head; the links stay chained
    /// through `next` and are exclusively the caller's again.
    pub fn flush(&self) -> Option<NonNull<StackLink>> {
        NonNull::new(self.head.swap(ptr::null_mut(), Ordering::AcqRel))
    }

    /// A snapshot of the current head pointer.
    ///
    /// The snapshot may be stale by the time the caller looks at it, and the
    /// `next` fields behind it must not be dereferenced without external
    /// synchronization: a concurrent flush may have freed them.
    pub fn head(&self) -> *mut StackLink {
        self.head.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.head().is_null()
    }
}

impl Default for RawAtomicStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads the link that follows `link` in a detached chain.
///
/// # Safety
///
/// `link` must be part of a chain the caller exclusively owns (i.e. returned
/// by [`RawAtomicStack::flush`]).
pub(crate) unsafe fn chain_next(link: NonNull<StackLink>) -> Option<NonNull<StackLink>> {
    // SAFETY: caller owns the chain.
    NonNull::new(unsafe { (*link.as_ptr()).next })
}

#[repr(C)]
struct Node<T> {
    /// Keep first: the link address is the node address.
    link: StackLink,
    value: T,
}

/// A safe LIFO over the raw stack; nodes are heap-allocated per element.
pub struct AtomicStack<T> {
    raw: RawAtomicStack,
    _marker: PhantomData<Node<T>>,
}

// SAFETY: values are moved in on insert and out on flush; the raw stack
// synchronizes all link access.
unsafe impl<T: Send> Send for AtomicStack<T> {}
// SAFETY: as above.
unsafe impl<T: Send> Sync for AtomicStack<T> {}

impl<T> AtomicStack<T> {
    pub fn new() -> Self {
        Self {
            raw: RawAtomicStack::new(),
            _marker: PhantomData,
        }
    }

    pub fn insert(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            link: StackLink::new(),
            value,
        }));

        // SAFETY: the node is freshly boxed, in no stack, and lives until a
        // flush hands it back (Drop flushes leftovers).
        unsafe { self.raw.insert(NonNull::new_unchecked(node.cast())) };
    }

    /// Detaches everything in one shot and returns the values in LIFO order
    /// (most recently inserted first).
    pub fn flush(&self) -> Vec<T> {
        let mut values = Vec::new();
        let mut next = self.raw.flush();

        while let Some(link) = next {
            // SAFETY: the chain is detached and exclusively ours.
            next = unsafe { chain_next(link) };
            // SAFETY: every link in this stack is the first field of a boxed
            // `Node<T>` created in insert().
            let node = unsafe { Box::from_raw(link.as_ptr().cast::<Node<T>>()) };
            values.push(node.value);
        }

        values
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl<T> Default for AtomicStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AtomicStack<T> {
    fn drop(&mut self) {
        drop(self.flush());
    }
}
