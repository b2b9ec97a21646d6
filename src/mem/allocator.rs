use crate::error::AllocError;
use crate::mem::block::{Block, Status, HEADER_SIZE};
use crate::mem::free_list::FreeList;
use crate::mem::{SegPtr, ALIGNMENT, EMPTY_PTR, PTR_SIZE};
use crate::utils::mem_context::backing;
use crate::utils::MemMetrics;
use std::fmt::{Debug, Formatter};

/// Free-block bookkeeping variant of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Doubly linked address-ordered free list, rightward coalescing on
    /// free, reallocation by right-neighbor absorption.
    Explicit,
    /// No free list: allocation scans every block, free flips the status
    /// bit and adjacent free blocks are never merged.
    Implicit,
}

impl Policy {
    pub(crate) fn min_payload(self) -> usize {
        match self {
            // room for the two free-list link words
            Policy::Explicit => PTR_SIZE * 2,
            Policy::Implicit => ALIGNMENT,
        }
    }
}

/// Requests are served in word multiples, never below the policy minimum.
/// A zero-byte request gets a minimum block.
fn round_up(requested: usize, min_payload: usize) -> usize {
    if requested <= min_payload {
        return min_payload;
    }

    (requested + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// First-fit allocator over one fixed byte segment of the backing store.
///
/// The segment is partitioned into blocks at all times: a one-word header
/// (`size | status`) followed by an aligned payload. Blocks never move;
/// allocation, free and reallocation only rewrite headers and the link
/// words threaded through free payloads.
pub struct SegmentAllocator {
    pub(super) start: SegPtr,
    pub(super) end: SegPtr,
    pub(super) policy: Policy,
    pub(super) free_list: FreeList,
    pub(super) free_size: u64,
    pub(super) allocated_size: u64,
}

impl SegmentAllocator {
    /// Takes over `[start, start + size)` and carves it into one free block
    /// spanning the whole segment. Outstanding pointers from an earlier
    /// allocator over the same range are void.
    pub fn init(start: SegPtr, size: usize, policy: Policy) -> Result<Self, AllocError> {
        let refused = AllocError::InitRefused { start, size };

        if start == 0 || start == EMPTY_PTR || start % ALIGNMENT as u64 != 0 {
            return Err(refused);
        }
        if size % ALIGNMENT != 0 || size < HEADER_SIZE + policy.min_payload() {
            return Err(refused);
        }
        let end = start.checked_add(size as u64).ok_or(refused)?;
        if !backing::offset_exists(end) {
            return Err(refused);
        }

        let first = Block::new_free(start, size - HEADER_SIZE);
        let free_list = match policy {
            Policy::Explicit => FreeList::singleton(first),
            Policy::Implicit => FreeList::empty(),
        };

        Ok(Self {
            start,
            end,
            policy,
            free_list,
            free_size: size as u64,
            allocated_size: 0,
        })
    }

    /// Returns the payload offset of a used block of at least `requested`
    /// bytes, 8-byte aligned.
    pub fn allocate(&mut self, requested: usize) -> Result<SegPtr, AllocError> {
        let need = round_up(requested, self.policy.min_payload());

        let fit = match self.policy {
            Policy::Explicit => self.find_fit_listed(need),
            Policy::Implicit => self.find_fit_scanned(need),
        };

        let Some(block) = fit else {
            tracing::warn!(requested, need, "not enough segment space for this allocation");
            return Err(AllocError::OutOfSpace { requested });
        };

        let size = block.size();
        let taken = if size - need >= HEADER_SIZE + self.policy.min_payload() {
            // carve the remainder into a new free block occupying the same
            // list slot as the chosen one
            let spare = Block::new_free(
                block.base() + (HEADER_SIZE + need) as u64,
                size - need - HEADER_SIZE,
            );
            if self.policy == Policy::Explicit {
                self.free_list.replace(block, spare);
            }
            block.set_meta(need, Status::Used);

            need
        } else {
            // the remainder cannot host another block, keep it as padding
            if self.policy == Policy::Explicit {
                self.free_list.eject(block);
            }
            block.set_meta(size, Status::Used);

            size
        };

        self.free_size -= (HEADER_SIZE + taken) as u64;
        self.allocated_size += (HEADER_SIZE + taken) as u64;

        tracing::trace!(ptr = block.payload_ptr(), requested, need, "allocate");
        Ok(block.payload_ptr())
    }

    /// Releases a payload offset obtained from `allocate`/`reallocate`.
    /// `EMPTY_PTR` is a no-op. A freed block merges with its right neighbor
    /// when that neighbor is free; merging leftward is never attempted.
    pub fn deallocate(&mut self, ptr: SegPtr) {
        if ptr == EMPTY_PTR {
            return;
        }

        let block = Block::from_payload_ptr(ptr);
        let size = block.size();

        self.allocated_size -= (HEADER_SIZE + size) as u64;
        self.free_size += (HEADER_SIZE + size) as u64;

        if self.policy == Policy::Implicit {
            block.set_meta(size, Status::Free);
            tracing::trace!(ptr, size, "deallocate");
            return;
        }

        match self.free_neighbor_to_right(block.next_neighbor_ptr()) {
            Some(right) => {
                // the freed block grows over its right neighbor and takes
                // the neighbor's place in the free list
                let merged = size + HEADER_SIZE + right.size();
                block.set_meta(merged, Status::Free);
                self.free_list.replace(right, block);
            }
            None => {
                block.set_meta(size, Status::Free);
                self.free_list.insert(block);
            }
        }

        tracing::trace!(ptr, size, "deallocate");
    }

    /// Resizes the allocation at `ptr` to at least `new_size` bytes,
    /// preserving the payload prefix. Growth is attempted in place first by
    /// absorbing free right neighbors; only then does the payload move.
    ///
    /// When the move itself fails, the original pointer stays valid and its
    /// bytes untouched, but any neighbors absorbed on the way remain part
    /// of the (now wider) allocation.
    pub fn reallocate(&mut self, ptr: SegPtr, new_size: usize) -> Result<SegPtr, AllocError> {
        if ptr == EMPTY_PTR {
            return self.allocate(new_size);
        }

        let need = round_up(new_size, self.policy.min_payload());
        let block = Block::from_payload_ptr(ptr);
        let old_size = block.size();
        let mut cur_size = old_size;

        if self.policy == Policy::Explicit {
            // grow over free right neighbors as far as they reach
            while let Some(right) =
                self.free_neighbor_to_right(block.base() + (HEADER_SIZE + cur_size) as u64)
            {
                self.free_list.eject(right);

                let absorbed = (HEADER_SIZE + right.size()) as u64;
                self.free_size -= absorbed;
                self.allocated_size += absorbed;

                cur_size += HEADER_SIZE + right.size();
            }
        }

        if cur_size >= need {
            let leftover = cur_size - need;

            if leftover >= HEADER_SIZE + self.policy.min_payload() {
                block.set_meta(need, Status::Used);

                let spare = Block::new_free(
                    block.base() + (HEADER_SIZE + need) as u64,
                    leftover - HEADER_SIZE,
                );
                if self.policy == Policy::Explicit {
                    self.free_list.insert(spare);
                }

                self.allocated_size -= leftover as u64;
                self.free_size += leftover as u64;
            } else {
                block.set_meta(cur_size, Status::Used);
            }

            tracing::trace!(ptr, new_size, cur_size, "reallocate in place");
            return Ok(ptr);
        }

        // not even the absorbed width is enough: leave one coherent used
        // block behind and move the payload
        block.set_meta(cur_size, Status::Used);

        let new_ptr = self
            .allocate(new_size)
            .map_err(|_| AllocError::ReallocFallback {
                requested: new_size,
            })?;

        // the copy length is the pre-absorption payload, everything past it
        // never held caller bytes
        let mut payload = vec![0u8; old_size];
        block.read_payload(0, &mut payload);
        Block::from_payload_ptr(new_ptr).write_payload(0, &payload);

        self.deallocate(ptr);

        tracing::trace!(old = ptr, new = new_ptr, new_size, "reallocate moved");
        Ok(new_ptr)
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn start(&self) -> SegPtr {
        self.start
    }

    pub fn end(&self) -> SegPtr {
        self.end
    }

    pub fn free_block_count(&self) -> usize {
        self.free_list.len()
    }

    pub fn metrics(&self) -> MemMetrics {
        MemMetrics {
            available: self.end - self.start,
            free: self.free_size,
            allocated: self.allocated_size,
        }
    }

    /// Walks the heap block by block. Address order, every block exactly
    /// once; on a consistent heap the walk ends exactly at the segment end.
    pub(crate) fn blocks(&self) -> Blocks {
        Blocks {
            cursor: self.start,
            end: self.end,
        }
    }

    fn find_fit_listed(&self, need: usize) -> Option<Block> {
        let mut cursor = self.free_list.head_ptr();

        while cursor != EMPTY_PTR {
            let block = Block::from_ptr(cursor);
            if block.size() >= need {
                return Some(block);
            }
            cursor = block.next_free();
        }

        None
    }

    fn find_fit_scanned(&self, need: usize) -> Option<Block> {
        self.blocks().find(|b| b.is_free() && b.size() >= need)
    }

    fn free_neighbor_to_right(&self, right_ptr: SegPtr) -> Option<Block> {
        if right_ptr == self.end {
            return None;
        }

        let right = Block::from_ptr(right_ptr);
        right.is_free().then_some(right)
    }
}

impl Debug for SegmentAllocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        struct HeapMap<'a>(&'a SegmentAllocator);

        impl Debug for HeapMap<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.debug_list()
                    .entries(self.0.blocks().map(|b| {
                        format!(
                            "{:#x}+{} {}",
                            b.base(),
                            b.size(),
                            if b.is_free() { "free" } else { "used" }
                        )
                    }))
                    .finish()
            }
        }

        f.debug_struct("SegmentAllocator")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("policy", &self.policy)
            .field("free_blocks", &self.free_list.len())
            .field("heap", &HeapMap(self))
            .finish()
    }
}

pub(crate) struct Blocks {
    cursor: SegPtr,
    end: SegPtr,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.cursor >= self.end {
            return None;
        }

        let block = Block::from_ptr(self.cursor);
        self.cursor = block.next_neighbor_ptr();

        Some(block)
    }
}
