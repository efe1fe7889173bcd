//! The allocator handle: a stateless, copyable `{alloc, free}` pair.
//!
//! Everything in the substrate that owns an allocation (the ownership boxes,
//! collaborator code) takes one of these by value. The allocation policy is
//! chosen at construction and carried with the object, whether that policy
//! is paged or critical, provider-direct or through the split allocator.

use std::ptr::NonNull;

use bedrock_platform::mem as provider;

use crate::mem::split;

#[derive(Debug, Clone, Copy)]
pub struct AllocatorHandle {
    alloc: fn(usize) -> Option<NonNull<u8>>,
    free: unsafe fn(NonNull<u8>, usize),
}

impl AllocatorHandle {
    /// Pageable memory straight from the provider. The default policy.
    pub fn paged() -> Self {
        Self {
            alloc: provider_alloc_paged,
            free: provider_free,
        }
    }

    /// Non-pageable (under the host's paging policy) memory straight from
    /// the provider.
    pub fn critical() -> Self {
        Self {
            alloc: provider_alloc_critical,
            free: provider_free,
        }
    }

    /// Pageable memory through the process-wide split allocator. The split
    /// allocator must be initialized for the lifetime of every allocation
    /// made through this handle.
    pub fn split_paged() -> Self {
        Self {
            alloc: split_alloc_paged,
            free: split_free_paged,
        }
    }

    /// Critical memory through the process-wide split allocator.
    pub fn split_critical() -> Self {
        Self {
            alloc: split_alloc_critical,
            free: split_free_critical,
        }
    }

    /// Allocates `size` zeroed bytes, aligned to at least the provider's
    /// default alignment. `None` on exhaustion.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (self.alloc)(size)
    }

    /// Returns a block to its source.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`allocate`](Self::allocate) on this same
    /// handle with the same `size`, and must not be used afterwards.
    pub unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded contract.
        unsafe { (self.free)(ptr, size) }
    }
}

impl Default for AllocatorHandle {
    fn default() -> Self {
        Self::paged()
    }
}

fn provider_alloc_paged(size: usize) -> Option<NonNull<u8>> {
    provider::allocate(size, false)
}

fn provider_alloc_critical(size: usize) -> Option<NonNull<u8>> {
    provider::allocate(size, true)
}

unsafe fn provider_free(ptr: NonNull<u8>, size: usize) {
    // SAFETY: forwarded contract.
    unsafe { provider::release(ptr, size) }
}

fn split_alloc_paged(size: usize) -> Option<NonNull<u8>> {
    split::allocate(size, false).ok()
}

fn split_alloc_critical(size: usize) -> Option<NonNull<u8>> {
    split::allocate(size, true).ok()
}

unsafe fn split_free_paged(ptr: NonNull<u8>, _size: usize) {
    // the split allocator recovers the size from its block header
    // SAFETY: forwarded contract.
    unsafe { split::free(ptr, false) }
}

unsafe fn split_free_critical(ptr: NonNull<u8>, _size: usize) {
    // SAFETY: forwarded contract.
    unsafe { split::free(ptr, true) }
}
