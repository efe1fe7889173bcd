//! Memory infrastructure: the allocator handle, the lookaside (free-list)
//! allocator, the process-wide split (size-class) allocator, and the
//! ownership boxes that allocate through them.

mod handle;
mod lookaside;
mod shared_box;
pub mod split;
mod unique_box;

pub use handle::AllocatorHandle;
pub use lookaside::LookasideAllocator;
pub use shared_box::{SharedBox, SharedInner};
pub use unique_box::UniqueBox;
