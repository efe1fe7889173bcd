//! A lookaside allocator: a bounded cache of same-sized blocks.
//!
//! Freed blocks are parked on a free list instead of going back to the
//! provider, so a hot allocate/free cycle costs two queue operations rather
//! than two trips into the host allocator. The free list is a two-lock
//! queue: its pop gives back one block at a time, and the only contention is
//! around the empty transitions.
//!
//! The cache bound is advisory. The count is maintained with plain atomic
//! increments and decrements that are not fenced against the queue
//! operations, so it can be transiently off by the number of racing
//! threads; the algorithm is correct regardless of how many blocks are
//! actually cached.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};

use bedrock_platform::mem as provider;

use crate::collections::{two_lock_queue_chain_next, QueueLink, RawTwoLockQueue};
use crate::status::Status;

/// A free-list allocator of fixed-size blocks. See the [module docs](self).
#[derive(Debug)]
pub struct LookasideAllocator {
    element_size: usize,
    max_cached: i64,
    /// Approximate; see the module docs.
    cached: AtomicI64,
    critical: bool,
    free_list: RawTwoLockQueue,
}

impl LookasideAllocator {
    /// An allocator of `element_size`-byte blocks with a cache bound derived
    /// from the element size (roughly 256 KiB of parked memory).
    pub fn new(element_size: usize, critical: bool) -> Self {
        let max_cached = ((256 * 1024) / element_size.max(1)).clamp(4, 64);
        Self::with_cache_limit(element_size, max_cached as u32, critical)
    }

    /// An allocator with an explicit cache bound.
    pub fn with_cache_limit(element_size: usize, max_cached: u32, critical: bool) -> Self {
        // Free blocks double as queue links, so they can't be smaller than
        // one. Provider blocks are always link-aligned.
        let element_size = element_size.max(std::mem::size_of::<QueueLink>());

        Self {
            element_size,
            max_cached: i64::from(max_cached),
            cached: AtomicI64::new(0),
            critical,
            free_list: RawTwoLockQueue::new(),
        }
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Allocates one block. `size` may be anything up to the element size;
    /// the block handed back is always a full element. Cached blocks are
    /// re-zeroed before they are returned.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, Status> {
        if size > self.element_size {
            return Err(Status::InvalidParameter);
        }

        if let Some(link) = self.free_list.pop() {
            self.cached.fetch_sub(1, Ordering::Relaxed);

            let block = link.cast::<u8>();
            // SAFETY: every free-list entry is a full element-size block
            // owned by this allocator.
            unsafe { std::ptr::write_bytes(block.as_ptr(), 0, self.element_size) };
            return Ok(block);
        }

        provider::allocate(self.element_size, self.critical).ok_or(Status::InsufficientResources)
    }

    /// Returns a block. Parked on the free list unless the cache has
    /// (approximately) reached its bound, in which case it goes back to the
    /// provider.
    ///
    /// # Safety
    ///
    /// `block` must have come from [`allocate`](Self::allocate) on this
    /// allocator and must not be used afterwards.
    pub unsafe fn free(&self, block: NonNull<u8>) {
        if self.cached.load(Ordering::Relaxed) >= self.max_cached {
            // SAFETY: the block is a full element from our provider.
            unsafe { provider::release(block, self.element_size) };
            return;
        }

        // SAFETY: the block is ours, unused, and at least link-sized.
        unsafe { self.free_list.push(block.cast::<QueueLink>()) };
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn cached_blocks(&self) -> i64 {
        self.cached.load(Ordering::SeqCst)
    }
}

impl Drop for LookasideAllocator {
    fn drop(&mut self) {
        // every cached block goes back to the provider
        let mut next = self.free_list.flush();
        while let Some(link) = next {
            // read the chain pointer before the block is gone
            // SAFETY: the chain is detached and exclusively ours.
            next = unsafe { two_lock_queue_chain_next(link) };
            // SAFETY: every free-list entry is an element-size provider
            // block.
            unsafe { provider::release(link.cast::<u8>(), self.element_size) };
        }
    }
}
