//! The split allocator: a fixed ladder of lookaside lists, one per size
//! class, behind a process-wide entry point.
//!
//! A request is routed to the smallest class that can hold it; anything
//! above the largest class passes straight through to the provider. Every
//! block carries a header recording the *requested* size and a magic tag,
//! so `free` can route the block back to the class it came from - and panic
//! loudly if the header has been trampled.
//!
//! There are two process-wide instances, one per criticality, created by
//! [`initialize`] and torn down by [`deinitialize`]. Tearing down while any
//! allocation is outstanding is a fatal error.

use std::ptr::NonNull;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use bedrock_platform::mem as provider;
use bedrock_platform::mem::DEFAULT_ALIGNMENT;
use log::debug;
use static_assertions::{const_assert, const_assert_eq};

use crate::mem::LookasideAllocator;
use crate::status::Status;

/// The size-class ladder. A request of up to `SIZE_CLASSES[i]` bytes is
/// served by class `i`.
const SIZE_CLASSES: [usize; 5] = [64, 512, 4096, 32768, 262144];

/// Magic value marking a live split-allocator block.
const BLOCK_TAG: u64 = u64::from_le_bytes(*b"bedrock!");

/// The header preceding every user pointer.
#[repr(C)]
struct BlockHeader {
    /// The size the caller asked for (not the class size).
    requested_size: u64,
    tag: u64,
}

const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

// The user pointer is the first byte after the header, so the header must
// preserve the provider's alignment guarantee.
const_assert_eq!(HEADER_SIZE, 16);
const_assert!(std::mem::align_of::<BlockHeader>() <= DEFAULT_ALIGNMENT);
const_assert!(HEADER_SIZE % DEFAULT_ALIGNMENT == 0);

/// One criticality's ladder of lookaside lists plus the passthrough path.
/// The process-wide instances live behind [`initialize`]; the type itself is
/// also usable standalone (and is, in tests).
pub(crate) struct SplitGroup {
    critical: bool,
    /// Live allocations made through this group.
    outstanding: AtomicI64,
    classes: [LookasideAllocator; SIZE_CLASSES.len()],
}

impl SplitGroup {
    pub(crate) fn new(critical: bool) -> Self {
        Self {
            critical,
            outstanding: AtomicI64::new(0),
            // each class stores class-size + header bytes per block
            classes: SIZE_CLASSES
                .map(|class| LookasideAllocator::new(class + HEADER_SIZE, critical)),
        }
    }

    /// The ladder rung serving `size`, or `None` for the passthrough path.
    fn class_index(size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|class| size <= *class)
    }

    pub(crate) fn allocate(&self, size: usize) -> Result<NonNull<u8>, Status> {
        let total = size.checked_add(HEADER_SIZE).ok_or(Status::IntegerOverflow)?;

        let block = match Self::class_index(size) {
            Some(index) => self.classes[index].allocate(total)?,
            None => {
                provider::allocate(total, self.critical).ok_or(Status::InsufficientResources)?
            }
        };

        // SAFETY: the block is at least `total` bytes and header-aligned.
        unsafe {
            block.cast::<BlockHeader>().as_ptr().write(BlockHeader {
                requested_size: size as u64,
                tag: BLOCK_TAG,
            });
        }

        // SAFETY: `total` doesn't overflow, so the offset is in bounds.
        let user = unsafe { NonNull::new_unchecked(block.as_ptr().add(HEADER_SIZE)) };
        debug_assert_eq!(user.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);

        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(user)
    }

    /// # Safety
    ///
    /// `user` must have come from [`allocate`](Self::allocate) on this group
    /// and must not be used afterwards.
    pub(crate) unsafe fn free(&self, user: NonNull<u8>) {
        // SAFETY: allocate() put a header directly before the user pointer.
        let block = unsafe { user.as_ptr().sub(HEADER_SIZE) };
        // SAFETY: as above; read a copy, the block may be recycled below.
        let header = unsafe { block.cast::<BlockHeader>().read() };

        if header.tag != BLOCK_TAG {
            panic!(
                "split allocator block header is corrupt (tag {:#x}): {}",
                header.tag,
                Status::BufferOverflow
            );
        }

        let size = header.requested_size as usize;
        self.outstanding.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: `block` is the allocation start; NonNull because user > 0.
        let block = unsafe { NonNull::new_unchecked(block) };
        match Self::class_index(size) {
            // SAFETY: the block is a full element of that class.
            Some(index) => unsafe { self.classes[index].free(block) },
            // SAFETY: passthrough blocks were provider-allocated at
            // size + HEADER_SIZE.
            None => unsafe { provider::release(block, size + HEADER_SIZE) },
        }
    }

    pub(crate) fn outstanding(&self) -> i64 {
        self.outstanding.load(Ordering::SeqCst)
    }
}

struct SplitInstances {
    paged: SplitGroup,
    critical: SplitGroup,
}

impl SplitInstances {
    fn group(&self, critical: bool) -> &SplitGroup {
        if critical {
            &self.critical
        } else {
            &self.paged
        }
    }
}

static INSTANCES: RwLock<Option<SplitInstances>> = RwLock::new(None);

/// Creates the two process-wide instances (paged and critical). Calling
/// this while already initialized is a fatal misuse.
pub fn initialize() -> Result<(), Status> {
    let mut instances = INSTANCES.write().unwrap();

    if instances.is_some() {
        panic!(
            "split allocator initialized twice: {}",
            Status::InvalidStateTransition
        );
    }

    *instances = Some(SplitInstances {
        paged: SplitGroup::new(false),
        critical: SplitGroup::new(true),
    });

    debug!("split allocator initialized (classes: {SIZE_CLASSES:?})");
    Ok(())
}

/// Tears the process-wide instances down, returning every cached block to
/// the provider. A no-op when not initialized; fatal if any allocation made
/// through [`allocate`] is still outstanding.
pub fn deinitialize() {
    let mut instances = INSTANCES.write().unwrap();

    let Some(live) = instances.take() else {
        return;
    };

    let leaked = live.paged.outstanding() + live.critical.outstanding();
    if leaked != 0 {
        panic!(
            "split allocator deinitialized with {leaked} outstanding allocation(s): {}",
            Status::InvalidStateTransition
        );
    }

    debug!("split allocator deinitialized");
    // dropping the groups flushes every lookaside cache
}

/// Allocates `size` zeroed bytes from the instance selected by `critical`.
/// Fatal if [`initialize`] has not run.
pub fn allocate(size: usize, critical: bool) -> Result<NonNull<u8>, Status> {
    let instances = INSTANCES.read().unwrap();
    let instances = instances
        .as_ref()
        .expect("split allocator used before initialize()");

    instances.group(critical).allocate(size)
}

/// Returns a block to the instance selected by `critical`.
///
/// # Safety
///
/// `ptr` must have come from [`allocate`] with the same `critical` flag and
/// must not be used afterwards.
pub unsafe fn free(ptr: NonNull<u8>, critical: bool) {
    let instances = INSTANCES.read().unwrap();
    let instances = instances
        .as_ref()
        .expect("split allocator used before initialize()");

    // SAFETY: forwarded contract.
    unsafe { instances.group(critical).free(ptr) };
}
