//! Unique ownership over an [`AllocatorHandle`] allocation.
//!
//! A [`UniqueBox`] keeps the allocation base and the object pointer as
//! separate fields, so a capability cast (widening to a trait object) can
//! adjust the object side while the block is still freed from its true
//! base. Disassemble with [`into_raw_parts`](UniqueBox::into_raw_parts),
//! widen the object pointer, and reassemble with
//! [`from_raw_parts`](UniqueBox::from_raw_parts).

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bedrock_platform::mem::DEFAULT_ALIGNMENT;

use crate::mem::AllocatorHandle;
use crate::status::Status;

/// A move-only owner of a single allocated value. See the
/// [module docs](self).
pub struct UniqueBox<T: ?Sized> {
    object: NonNull<T>,
    /// Start of the underlying block; what actually gets freed.
    allocation: NonNull<u8>,
    allocation_size: usize,
    handle: AllocatorHandle,
    _marker: PhantomData<T>,
}

// SAFETY: a UniqueBox is exclusive ownership, like Box.
unsafe impl<T: ?Sized + Send> Send for UniqueBox<T> {}
// SAFETY: as above.
unsafe impl<T: ?Sized + Sync> Sync for UniqueBox<T> {}

impl<T> UniqueBox<T> {
    /// Places `value` in paged memory.
    pub fn new(value: T) -> Result<Self, Status> {
        Self::new_in(value, AllocatorHandle::paged())
    }

    /// Places `value` in memory from `handle`.
    pub fn new_in(value: T, handle: AllocatorHandle) -> Result<Self, Status> {
        let layout = std::alloc::Layout::new::<T>();

        // the provider's alignment guarantee is all we get
        if layout.align() > DEFAULT_ALIGNMENT {
            return Err(Status::InvalidParameter);
        }

        let allocation = handle
            .allocate(layout.size())
            .ok_or(Status::InsufficientResources)?;
        let object = allocation.cast::<T>();

        // SAFETY: the block is big and aligned enough for T.
        unsafe { object.as_ptr().write(value) };

        Ok(Self {
            object,
            allocation,
            allocation_size: layout.size(),
            handle,
            _marker: PhantomData,
        })
    }
}

impl<T: ?Sized> UniqueBox<T> {
    /// Disassembles the box: `(object, allocation base, allocation size,
    /// handle)`. The caller takes over ownership; nothing is dropped or
    /// freed.
    pub fn into_raw_parts(this: Self) -> (NonNull<T>, NonNull<u8>, usize, AllocatorHandle) {
        let parts = (
            this.object,
            this.allocation,
            this.allocation_size,
            this.handle,
        );
        std::mem::forget(this);
        parts
    }

    /// Reassembles a box from [`into_raw_parts`](Self::into_raw_parts).
    ///
    /// # Safety
    ///
    /// The parts must have come from `into_raw_parts` and ownership must be
    /// transferred here exactly once. The object pointer may differ from
    /// the original only by an unsize coercion (same object, same
    /// allocation).
    pub unsafe fn from_raw_parts(
        object: NonNull<T>,
        allocation: NonNull<u8>,
        allocation_size: usize,
        handle: AllocatorHandle,
    ) -> Self {
        Self {
            object,
            allocation,
            allocation_size,
            handle,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Deref for UniqueBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the object is live while the box exists.
        unsafe { self.object.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for UniqueBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and we hold the box exclusively.
        unsafe { self.object.as_mut() }
    }
}

impl<T: ?Sized> Drop for UniqueBox<T> {
    fn drop(&mut self) {
        // SAFETY: we own the object and the block; nothing reaches either
        // after this.
        unsafe {
            std::ptr::drop_in_place(self.object.as_ptr());
            self.handle.free(self.allocation, self.allocation_size);
        }
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for UniqueBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UniqueBox").field(&&**self).finish()
    }
}
