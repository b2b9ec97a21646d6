use crate::error::ConsistencyFault;
use crate::mem::allocator::{Policy, SegmentAllocator};
use crate::mem::block::{Block, FREE_BITS, HEADER_SIZE, USED_BITS};
use crate::mem::{ALIGNMENT, EMPTY_PTR};

impl SegmentAllocator {
    /// Read-only whole-heap consistency check, safe to run between any two
    /// public calls. Walks every block by header arithmetic, then traverses
    /// the free list in both directions and reconciles it with the walk.
    pub fn validate(&self) -> Result<(), ConsistencyFault> {
        let walked_free = self.check_blocks()?;

        if self.policy == Policy::Explicit {
            if walked_free != self.free_list.len() {
                return Err(ConsistencyFault::FreeCountMismatch {
                    listed: self.free_list.len(),
                    walked: walked_free,
                });
            }
            self.check_free_list(false)?;
            self.check_free_list(true)?;
        }

        Ok(())
    }

    fn check_blocks(&self) -> Result<usize, ConsistencyFault> {
        let mut cursor = self.start;
        let mut free_count = 0;
        let mut free_bytes = 0;
        let mut allocated_bytes = 0;

        while cursor < self.end {
            let block = Block::from_ptr(cursor);

            let bits = block.status_bits();
            if bits != FREE_BITS && bits != USED_BITS {
                return Err(ConsistencyFault::BadStatusBits { at: cursor, bits });
            }

            let size = block.size();
            if size % ALIGNMENT != 0 {
                return Err(ConsistencyFault::MisalignedBlock { at: cursor, size });
            }
            if size < self.policy.min_payload() {
                return Err(ConsistencyFault::UndersizedBlock {
                    at: cursor,
                    size,
                    min: self.policy.min_payload(),
                });
            }

            // a consistent chain of headers lands exactly on the segment
            // end; a corrupt size shows up as a jump past it
            let next = cursor
                .checked_add(HEADER_SIZE as u64)
                .and_then(|it| it.checked_add(size as u64))
                .filter(|&it| it <= self.end)
                .ok_or(ConsistencyFault::WalkOvershoot {
                    at: cursor,
                    end: self.end,
                })?;

            if block.is_free() {
                free_count += 1;
                free_bytes += next - cursor;
            } else {
                allocated_bytes += next - cursor;
            }

            cursor = next;
        }

        if free_bytes != self.free_size || allocated_bytes != self.allocated_size {
            return Err(ConsistencyFault::CounterDrift {
                free: self.free_size,
                allocated: self.allocated_size,
            });
        }

        Ok(free_count)
    }

    fn check_free_list(&self, reverse: bool) -> Result<(), ConsistencyFault> {
        let expected = self.free_list.len();

        if expected == 0 {
            if self.free_list.head_ptr() != EMPTY_PTR || self.free_list.tail_ptr() != EMPTY_PTR {
                return Err(ConsistencyFault::DanglingEndpoints);
            }
            return Ok(());
        }

        let mut cursor = if reverse {
            self.free_list.tail_ptr()
        } else {
            self.free_list.head_ptr()
        };

        for visited in 0..expected {
            if cursor == EMPTY_PTR {
                return Err(ConsistencyFault::ListLengthMismatch {
                    traversed: visited,
                    expected,
                });
            }

            let block = Block::from_ptr(cursor);
            if !block.is_free() {
                return Err(ConsistencyFault::ListedBlockNotFree { at: cursor });
            }

            let prev = block.prev_free();
            let next = block.next_free();

            for link in [prev, next] {
                if link != EMPTY_PTR && !(self.start..self.end).contains(&link) {
                    return Err(ConsistencyFault::LinkOutOfBounds { at: cursor, link });
                }
            }

            // endpoints carry the sentinel, everything else stays strictly
            // address-ascending
            let (towards_head, towards_tail) = (prev, next);
            let at_first = visited == 0;
            let at_last = visited == expected - 1;

            if (if reverse { at_last } else { at_first }) && towards_head != EMPTY_PTR {
                return Err(ConsistencyFault::BadEndpoint { at: cursor });
            }
            if (if reverse { at_first } else { at_last }) && towards_tail != EMPTY_PTR {
                return Err(ConsistencyFault::BadEndpoint { at: cursor });
            }

            if prev != EMPTY_PTR && prev >= cursor {
                return Err(ConsistencyFault::ListOutOfOrder { at: cursor });
            }
            if next != EMPTY_PTR && next <= cursor {
                return Err(ConsistencyFault::ListOutOfOrder { at: cursor });
            }

            if prev != EMPTY_PTR {
                let neighbor = Block::from_ptr(prev);
                if !neighbor.is_free() {
                    return Err(ConsistencyFault::ListedBlockNotFree { at: prev });
                }
                if neighbor.next_free() != cursor {
                    return Err(ConsistencyFault::InconsistentLinks { at: cursor });
                }
            }
            if next != EMPTY_PTR {
                let neighbor = Block::from_ptr(next);
                if !neighbor.is_free() {
                    return Err(ConsistencyFault::ListedBlockNotFree { at: next });
                }
                if neighbor.prev_free() != cursor {
                    return Err(ConsistencyFault::InconsistentLinks { at: cursor });
                }
            }

            cursor = if reverse { prev } else { next };
        }

        if cursor != EMPTY_PTR {
            return Err(ConsistencyFault::ListLengthMismatch {
                traversed: expected + 1,
                expected,
            });
        }

        Ok(())
    }
}
