use crate::mem::SegPtr;
use thiserror::Error;

/// Failures surfaced by the allocation API. The heap stays valid across
/// every one of them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The segment handed to `init` is unusable: null or unaligned start,
    /// a length that is not a positive word multiple hosting at least one
    /// minimum block, or a range the backing store does not cover.
    #[error("segment rejected (start {start:#x}, {size} bytes)")]
    InitRefused { start: SegPtr, size: usize },

    /// No free block can satisfy the request. The heap is unchanged.
    #[error("not enough segment space ({requested} bytes requested)")]
    OutOfSpace { requested: usize },

    /// The move step of a reallocation found no room. The original pointer
    /// is still valid and its payload bytes untouched; free right neighbors
    /// absorbed before the attempt remain part of the widened allocation.
    #[error("no room to move the reallocation ({requested} bytes requested)")]
    ReallocFallback { requested: usize },
}

/// A single violated heap invariant, reported by the validator with the
/// offset(s) it was detected at. Detection never modifies the heap.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyFault {
    #[error("block at {at:#x} carries unrecognized status bits {bits:#05b}")]
    BadStatusBits { at: SegPtr, bits: u64 },

    #[error("block at {at:#x} has a misaligned payload size ({size} bytes)")]
    MisalignedBlock { at: SegPtr, size: usize },

    #[error("block at {at:#x} is smaller than the minimum payload ({size} < {min})")]
    UndersizedBlock { at: SegPtr, size: usize, min: usize },

    #[error("heap walk at {at:#x} does not land on the segment end {end:#x}")]
    WalkOvershoot { at: SegPtr, end: SegPtr },

    #[error("size counters drifted (free {free}, allocated {allocated})")]
    CounterDrift { free: u64, allocated: u64 },

    #[error("free list holds {listed} blocks but the walk saw {walked} free blocks")]
    FreeCountMismatch { listed: usize, walked: usize },

    #[error("free list endpoints are set on an empty list")]
    DanglingEndpoints,

    #[error("free list endpoint at {at:#x} does not carry the end sentinel")]
    BadEndpoint { at: SegPtr },

    #[error("free list references a block at {at:#x} that is not marked free")]
    ListedBlockNotFree { at: SegPtr },

    #[error("free list is out of address order at {at:#x}")]
    ListOutOfOrder { at: SegPtr },

    #[error("free list link at {at:#x} points outside the segment ({link:#x})")]
    LinkOutOfBounds { at: SegPtr, link: SegPtr },

    #[error("free list links around {at:#x} are not mutually consistent")]
    InconsistentLinks { at: SegPtr },

    #[error("free list traversal visited {traversed} blocks, expected {expected}")]
    ListLengthMismatch { traversed: usize, expected: usize },
}
