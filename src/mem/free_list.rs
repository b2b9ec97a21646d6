use crate::mem::block::Block;
use crate::mem::{EMPTY_PTR, SegPtr};

/// Doubly linked list of free blocks, threaded through their payloads and
/// kept sorted by ascending address. Sorted order is what keeps rightward
/// coalescing and the consistency checks cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeList {
    head: SegPtr,
    tail: SegPtr,
    len: usize,
}

impl FreeList {
    pub(crate) fn empty() -> Self {
        Self {
            head: EMPTY_PTR,
            tail: EMPTY_PTR,
            len: 0,
        }
    }

    pub(crate) fn singleton(block: Block) -> Self {
        block.set_prev_free(EMPTY_PTR);
        block.set_next_free(EMPTY_PTR);

        Self {
            head: block.base(),
            tail: block.base(),
            len: 1,
        }
    }

    pub(crate) fn head_ptr(&self) -> SegPtr {
        self.head
    }

    pub(crate) fn tail_ptr(&self) -> SegPtr {
        self.tail
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Links a free block in at its address-ordered position.
    pub(crate) fn insert(&mut self, block: Block) {
        self.len += 1;

        if self.head == EMPTY_PTR {
            block.set_prev_free(EMPTY_PTR);
            block.set_next_free(EMPTY_PTR);
            self.head = block.base();
            self.tail = block.base();
            return;
        }

        if block.base() < self.head {
            let head = Block::from_ptr(self.head);
            block.set_prev_free(EMPTY_PTR);
            block.set_next_free(head.base());
            head.set_prev_free(block.base());
            self.head = block.base();
            return;
        }

        if block.base() > self.tail {
            let tail = Block::from_ptr(self.tail);
            block.set_prev_free(tail.base());
            block.set_next_free(EMPTY_PTR);
            tail.set_next_free(block.base());
            self.tail = block.base();
            return;
        }

        // somewhere in the middle: walk to the first listed block past it
        let mut next = Block::from_ptr(self.head);
        while next.base() < block.base() {
            next = Block::from_ptr(next.next_free());
        }
        let prev = Block::from_ptr(next.prev_free());

        prev.set_next_free(block.base());
        next.set_prev_free(block.base());
        block.set_prev_free(prev.base());
        block.set_next_free(next.base());
    }

    /// Unlinks a listed block, patching its neighbors and the endpoints.
    pub(crate) fn eject(&mut self, block: Block) {
        self.len -= 1;

        let prev = block.prev_free();
        let next = block.next_free();

        if prev != EMPTY_PTR {
            Block::from_ptr(prev).set_next_free(next);
        }
        if next != EMPTY_PTR {
            Block::from_ptr(next).set_prev_free(prev);
        }

        if self.head == block.base() {
            self.head = next;
        }
        if self.tail == block.base() {
            self.tail = prev;
        }
    }

    /// Hands `old`'s exact list slot to `new`: same neighbors, same
    /// endpoint roles, length unchanged. Used when an allocation split
    /// leaves a smaller free remainder and when a freed block grows over
    /// its listed right neighbor; in both cases the replacement address
    /// keeps the list sorted.
    pub(crate) fn replace(&mut self, old: Block, new: Block) {
        let prev = old.prev_free();
        let next = old.next_free();

        new.set_prev_free(prev);
        new.set_next_free(next);

        if prev != EMPTY_PTR {
            Block::from_ptr(prev).set_next_free(new.base());
        }
        if next != EMPTY_PTR {
            Block::from_ptr(next).set_prev_free(new.base());
        }

        if self.head == old.base() {
            self.head = new.base();
        }
        if self.tail == old.base() {
            self.tail = new.base();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FreeList;
    use crate::mem::block::Block;
    use crate::mem::EMPTY_PTR;
    use crate::utils::mem_context::backing;

    // lays out free blocks of the given payloads back to back
    fn blocks(payloads: &[usize]) -> Vec<Block> {
        backing::clear();
        let total: usize = payloads.iter().map(|p| 8 + p).sum();
        let mut at = backing::reserve(total as u64).expect("Unable to reserve");

        payloads
            .iter()
            .map(|&p| {
                let block = Block::new_free(at, p);
                at += (8 + p) as u64;
                block
            })
            .collect()
    }

    fn collect_forward(list: &FreeList) -> Vec<u64> {
        let mut out = vec![];
        let mut cursor = list.head_ptr();
        while cursor != EMPTY_PTR {
            out.push(cursor);
            cursor = Block::from_ptr(cursor).next_free();
        }
        out
    }

    fn collect_backward(list: &FreeList) -> Vec<u64> {
        let mut out = vec![];
        let mut cursor = list.tail_ptr();
        while cursor != EMPTY_PTR {
            out.push(cursor);
            cursor = Block::from_ptr(cursor).prev_free();
        }
        out
    }

    #[test]
    fn insertion_keeps_address_order() {
        let b = blocks(&[16, 16, 16, 16]);

        let mut list = FreeList::empty();
        list.insert(b[2]);
        list.insert(b[0]);
        list.insert(b[3]);
        list.insert(b[1]);

        let forward = collect_forward(&list);
        assert_eq!(
            forward,
            vec![b[0].base(), b[1].base(), b[2].base(), b[3].base()]
        );

        let mut backward = collect_backward(&list);
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(list.len(), 4);
        assert_eq!(list.head_ptr(), b[0].base());
        assert_eq!(list.tail_ptr(), b[3].base());
    }

    #[test]
    fn ejection_patches_neighbors_and_endpoints() {
        let b = blocks(&[16, 16, 16]);

        let mut list = FreeList::empty();
        for &block in &b {
            list.insert(block);
        }

        list.eject(b[1]);
        assert_eq!(collect_forward(&list), vec![b[0].base(), b[2].base()]);

        list.eject(b[0]);
        assert_eq!(list.head_ptr(), b[2].base());
        assert_eq!(list.tail_ptr(), b[2].base());

        list.eject(b[2]);
        assert_eq!(list.head_ptr(), EMPTY_PTR);
        assert_eq!(list.tail_ptr(), EMPTY_PTR);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn replacement_keeps_the_slot() {
        let b = blocks(&[16, 16, 16, 16]);

        let mut list = FreeList::empty();
        list.insert(b[0]);
        list.insert(b[1]);
        list.insert(b[3]);

        // b[1] hands its slot to b[2], neighbors keep their roles
        list.replace(b[1], b[2]);

        assert_eq!(
            collect_forward(&list),
            vec![b[0].base(), b[2].base(), b[3].base()]
        );
        assert_eq!(list.len(), 3);

        // replacing an endpoint moves the endpoint
        list.replace(b[0], b[1]);
        assert_eq!(list.head_ptr(), b[1].base());
    }
}
