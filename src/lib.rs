//! First-fit heap allocator over a single caller-supplied byte segment.
//!
//! The segment is reserved once from the backing store and never grows;
//! every allocation is an aligned sub-range of it. Block metadata lives
//! in-band: one word in front of each payload packs the payload size with
//! a free/used flag in the low bits, and while a block is free its first
//! two payload words thread it into a doubly linked, address-ordered free
//! list.
//!
//! ```text
//!   [ size|sss ][ payload ... ][ size|sss ][ payload ... ]
//!        ^ 8-byte header            free payload reuse:
//!                                   [ prev_free ][ next_free ][ ... ]
//! ```
//!
//! Allocation walks the free list first-fit and splits the chosen block
//! when the remainder can host another block. Freeing merges with the
//! right neighbor when that neighbor is free. Reallocation grows in place
//! by absorbing free right neighbors before falling back to
//! allocate-copy-free.
//!
//! The allocator is single-threaded and non-reentrant; the functions below
//! drive one engine per thread. Use [`SegmentAllocator`] directly to
//! manage an engine instance of your own.
//!
//! ```
//! use segalloc::backing;
//!
//! let start = backing::reserve(1024).unwrap();
//! assert!(segalloc::init(start, 1024));
//!
//! let p = segalloc::allocate(100).unwrap();
//! backing::write(p, b"payload");
//!
//! let p = segalloc::reallocate(p, 300).unwrap();
//! assert!(segalloc::validate_heap());
//!
//! segalloc::deallocate(p);
//! ```

pub mod error;
pub mod mem;
pub mod script;
pub mod utils;

pub use crate::error::{AllocError, ConsistencyFault};
pub use crate::mem::allocator::{Policy, SegmentAllocator};
pub use crate::mem::{SegPtr, ALIGNMENT, EMPTY_PTR};
pub use crate::utils::mem_context::{backing, OutOfMemory};
pub use crate::utils::MemMetrics;

use std::cell::RefCell;

thread_local! {
    static SEGMENT_ALLOCATOR: RefCell<Option<SegmentAllocator>> = RefCell::new(None);
}

/// (Re)initializes the thread's allocator on `[start, start + size)` with
/// the explicit free-list policy. Returns `false` when the segment is
/// refused. Re-initializing discards all previous state; pointers handed
/// out before are void.
pub fn init(start: SegPtr, size: usize) -> bool {
    init_with_policy(start, size, Policy::Explicit)
}

pub fn init_with_policy(start: SegPtr, size: usize, policy: Policy) -> bool {
    match SegmentAllocator::init(start, size, policy) {
        Ok(allocator) => {
            SEGMENT_ALLOCATOR.with(|it| *it.borrow_mut() = Some(allocator));
            true
        }
        Err(e) => {
            tracing::warn!(%e, "init failed");
            false
        }
    }
}

pub fn deinit() {
    SEGMENT_ALLOCATOR.with(|it| *it.borrow_mut() = None);
}

/// Pointer to at least `size` bytes, 8-byte aligned, or `None` when no
/// free block fits.
pub fn allocate(size: usize) -> Option<SegPtr> {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &mut *it.borrow_mut() {
            alloc.allocate(size).ok()
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}

/// Releases an allocation. `EMPTY_PTR` is a no-op.
pub fn deallocate(ptr: SegPtr) {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &mut *it.borrow_mut() {
            alloc.deallocate(ptr)
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}

/// Resizes an allocation, preserving the payload prefix. `None` on
/// failure, in which case the old pointer stays valid.
pub fn reallocate(ptr: SegPtr, size: usize) -> Option<SegPtr> {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &mut *it.borrow_mut() {
            alloc.reallocate(ptr, size).ok()
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}

/// Whole-heap consistency check; the violated invariant, if any, is
/// logged.
pub fn validate_heap() -> bool {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &*it.borrow() {
            match alloc.validate() {
                Ok(()) => true,
                Err(fault) => {
                    tracing::error!(%fault, "heap consistency check failed");
                    false
                }
            }
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}

pub fn mem_metrics() -> MemMetrics {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &*it.borrow() {
            alloc.metrics()
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}

pub fn _debug_print_heap() {
    SEGMENT_ALLOCATOR.with(|it| {
        if let Some(alloc) = &*it.borrow() {
            tracing::info!("{:?}", alloc);
        } else {
            unreachable!("SegmentAllocator is not initialized");
        }
    })
}
