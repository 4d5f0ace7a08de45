//! The doubly-linked free list threaded through free blocks' payloads.
//!
//! Every operation here is O(1): nodes carry their own `prev`/`next`
//! pointers (see [`crate::tag::BlockCursor`]), so insertion and removal
//! never walk the list. The list is unordered (LIFO insertion order, not
//! address order); [`crate::arena::Arena::find_fit`] is the only
//! operation that scans it.

use crate::tag::BlockCursor;

pub(crate) struct FreeList {
    head: Option<BlockCursor>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        FreeList { head: None }
    }

    pub(crate) fn head(&self) -> Option<BlockCursor> {
        self.head
    }

    /// Overwrites the head pointer directly, without touching any node's
    /// link fields. Used only when splicing a node back into an exact
    /// remembered position (realloc rollback) rather than at the front.
    pub(crate) fn set_head(&mut self, node: Option<BlockCursor>) {
        self.head = node;
    }

    /// Inserts `node` at the head of the list. `node` must not already be
    /// a member.
    pub(crate) fn push_front(&mut self, node: BlockCursor) {
        node.set_prev_link(None);
        node.set_next_link(self.head);
        if let Some(old_head) = self.head {
            old_head.set_prev_link(Some(node));
        }
        self.head = Some(node);
    }

    /// Unlinks `node` from wherever it sits in the list. `node` must
    /// currently be a member.
    pub(crate) fn remove(&mut self, node: BlockCursor) {
        let prev = node.prev_link();
        let next = node.next_link();

        match prev {
            Some(p) => p.set_next_link(next),
            None => self.head = next,
        }
        if let Some(n) = next {
            n.set_prev_link(prev);
        }
    }

    /// Walks the list front to back, yielding every member. Used by
    /// best-fit search and by debug-mode sanity checks.
    pub(crate) fn iter(&self) -> FreeListIter {
        FreeListIter { next: self.head }
    }
}

pub(crate) struct FreeListIter {
    next: Option<BlockCursor>,
}

impl Iterator for FreeListIter {
    type Item = BlockCursor;

    fn next(&mut self) -> Option<BlockCursor> {
        let current = self.next?;
        self.next = current.next_link();
        Some(current)
    }
}
