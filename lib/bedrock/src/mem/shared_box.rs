//! Shared ownership with an inline reference count.
//!
//! A [`SharedBox`] makes one contiguous allocation holding the atomic
//! counter followed by the value, so sharing costs no second allocation and
//! the terminal drop frees a single block. The allocation goes through an
//! [`AllocatorHandle`], so shared values can live in paged, critical, or
//! split-allocator memory.
//!
//! Capability casts (widening to a trait object) keep the counter and the
//! allocation base and adjust only the object type, through
//! [`into_raw`](SharedBox::into_raw) / [`from_raw`](SharedBox::from_raw)
//! plus the language's raw-pointer unsize coercion:
//!
//! ```
//! use bedrock::mem::{SharedBox, SharedInner};
//!
//! trait Greet: Send + Sync {
//!     fn hello(&self) -> &'static str;
//! }
//!
//! struct English;
//! impl Greet for English {
//!     fn hello(&self) -> &'static str {
//!         "hello"
//!     }
//! }
//!
//! let concrete = SharedBox::new(English).unwrap();
//! let raw: *mut SharedInner<dyn Greet> = SharedBox::<English>::into_raw(concrete);
//! // SAFETY: same allocation, only the pointer type widened.
//! let widened: SharedBox<dyn Greet> = unsafe { SharedBox::from_raw(raw) };
//! assert_eq!(widened.hello(), "hello");
//! ```

use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicU64, Ordering};

use bedrock_platform::mem::DEFAULT_ALIGNMENT;
use bedrock_platform::thread::yield_processor;

use crate::mem::AllocatorHandle;
use crate::status::Status;

/// The single allocation behind a [`SharedBox`]: counter first, value last.
///
/// Public only so capability casts can name the type; the fields are not.
#[repr(C)]
pub struct SharedInner<T: ?Sized> {
    /// Number of live [`SharedBox`] handles.
    refs: AtomicU64,
    /// How to free the combined block.
    handle: AllocatorHandle,
    value: T,
}

/// A shared, immutable value with an inline reference count. See the
/// [module docs](self).
pub struct SharedBox<T: ?Sized> {
    inner: NonNull<SharedInner<T>>,
    _marker: PhantomData<SharedInner<T>>,
}

// SAFETY: a SharedBox hands out only shared references to T across threads,
// and the counter is atomic.
unsafe impl<T: ?Sized + Send + Sync> Send for SharedBox<T> {}
// SAFETY: as above.
unsafe impl<T: ?Sized + Send + Sync> Sync for SharedBox<T> {}

impl<T> SharedBox<T> {
    /// Shares `value` in paged memory with the count at 1.
    pub fn new(value: T) -> Result<Self, Status> {
        Self::new_in(value, AllocatorHandle::paged())
    }

    /// Shares `value` in memory from `handle` with the count at 1.
    pub fn new_in(value: T, handle: AllocatorHandle) -> Result<Self, Status> {
        let layout = std::alloc::Layout::new::<SharedInner<T>>();

        // the provider's alignment guarantee is all we get
        if layout.align() > DEFAULT_ALIGNMENT {
            return Err(Status::InvalidParameter);
        }

        let block = handle
            .allocate(layout.size())
            .ok_or(Status::InsufficientResources)?;
        let inner = block.cast::<SharedInner<T>>();

        // SAFETY: the block is big and aligned enough for SharedInner<T>.
        unsafe {
            inner.as_ptr().write(SharedInner {
                refs: AtomicU64::new(1),
                handle,
                value,
            });
        }

        Ok(Self {
            inner,
            _marker: PhantomData,
        })
    }
}

impl<T: ?Sized> SharedBox<T> {
    /// The current count. Racy by nature; useful for diagnostics and tests.
    pub fn ref_count(&self) -> u64 {
        self.inner().refs.load(Ordering::Acquire)
    }

    /// Whether both boxes share one allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        std::ptr::eq(
            a.inner.as_ptr().cast::<u8>(),
            b.inner.as_ptr().cast::<u8>(),
        )
    }

    /// Disassembles the box without touching the count. Pair with
    /// [`from_raw`](Self::from_raw) (possibly at a widened type) to
    /// reassemble.
    pub fn into_raw(this: Self) -> *mut SharedInner<T> {
        let inner = this.inner.as_ptr();
        std::mem::forget(this);
        inner
    }

    /// Reassembles a box from [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `inner` must have come from `into_raw`, must still be live, and the
    /// ownership taken there must be transferred here exactly once. The
    /// pointee type may differ from the `into_raw` type only by an unsize
    /// coercion (same allocation, same value).
    pub unsafe fn from_raw(inner: *mut SharedInner<T>) -> Self {
        Self {
            // SAFETY: per the contract the pointer came from a live box.
            inner: unsafe { NonNull::new_unchecked(inner) },
            _marker: PhantomData,
        }
    }

    fn inner(&self) -> &SharedInner<T> {
        // SAFETY: the allocation is live for as long as any handle exists.
        unsafe { self.inner.as_ref() }
    }
}

impl<T: ?Sized> Deref for SharedBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T: ?Sized> Clone for SharedBox<T> {
    fn clone(&self) -> Self {
        let refs = &self.inner().refs;

        loop {
            let current = refs.load(Ordering::Relaxed);

            // A saturated counter never overflows into wraparound; the
            // cloner waits for some handle to drop instead.
            if current == u64::MAX {
                yield_processor();
                continue;
            }

            if refs
                .compare_exchange(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Self {
                    inner: self.inner,
                    _marker: PhantomData,
                };
            }

            yield_processor();
        }
    }
}

impl<T: ?Sized> Drop for SharedBox<T> {
    fn drop(&mut self) {
        if self.inner().refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        // pair with the Release above so the value's final state is visible
        atomic::fence(Ordering::Acquire);

        let handle = self.inner().handle;
        // for a widened T the layout comes from the value's vtable
        let size = std::alloc::Layout::for_value(self.inner()).size();

        // SAFETY: we hold the last reference; nothing can reach the value
        // after this.
        unsafe {
            std::ptr::drop_in_place(self.inner.as_ptr());
            handle.free(self.inner.cast::<u8>(), size);
        }
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for SharedBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedBox").field(&&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountsDrops(Arc<AtomicU32>);

    impl Drop for CountsDrops {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn clones_share_and_the_last_drop_destroys() {
        let drops = Arc::new(AtomicU32::new(0));

        let a = SharedBox::new(CountsDrops(Arc::clone(&drops))).unwrap();
        assert_eq!(a.ref_count(), 1);

        let b = a.clone();
        assert_eq!(a.ref_count(), 2);
        assert!(SharedBox::ptr_eq(&a, &b));

        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(b.ref_count(), 1);

        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn critical_memory_works_too() {
        let shared = SharedBox::new_in([0u8; 128], AllocatorHandle::critical()).unwrap();
        assert_eq!(shared.iter().map(|b| *b as u32).sum::<u32>(), 0);
    }

    #[test]
    fn concurrent_clone_and_drop_settle_to_one() {
        let drops = Arc::new(AtomicU32::new(0));
        let shared = SharedBox::new(CountsDrops(Arc::clone(&drops))).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let extra = shared.clone();
                        drop(extra);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.ref_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    trait Speak: Send + Sync {
        fn word(&self) -> &'static str;
    }

    struct Dog;

    impl Speak for Dog {
        fn word(&self) -> &'static str {
            "woof"
        }
    }

    #[test]
    fn widening_preserves_the_count_and_allocation() {
        let concrete = SharedBox::new(Dog).unwrap();
        let keep = concrete.clone();
        assert_eq!(keep.ref_count(), 2);

        let raw: *mut SharedInner<dyn Speak> = SharedBox::<Dog>::into_raw(concrete);
        // SAFETY: same allocation, only the pointer type widened.
        let widened: SharedBox<dyn Speak> = unsafe { SharedBox::from_raw(raw) };

        assert_eq!(widened.word(), "woof");
        assert_eq!(widened.ref_count(), 2);

        drop(keep);
        assert_eq!(widened.ref_count(), 1);
    }
}
