//! Function layout: the order of blocks in a function and of instructions in a block.
//!
//! Both orders are intrusive doubly linked lists keyed by entity id, so relinking a block or
//! an instruction never touches the data flow graph.
use cranelift_entity::SecondaryMap;

use super::{BlockId, InsnId};

#[derive(Debug, Clone, Default)]
pub struct Layout {
    blocks: SecondaryMap<BlockId, BlockNode>,
    insns: SecondaryMap<InsnId, InsnNode>,
    entry_block: Option<BlockId>,
    last_block: Option<BlockId>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.entry_block
    }

    pub fn last_block(&self) -> Option<BlockId> {
        self.last_block
    }

    pub fn is_entry_block(&self, block: BlockId) -> bool {
        self.entry_block == Some(block)
    }

    pub fn is_block_empty(&self, block: BlockId) -> bool {
        self.first_insn_of(block).is_none()
    }

    pub fn prev_block_of(&self, block: BlockId) -> Option<BlockId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].prev
    }

    pub fn next_block_of(&self, block: BlockId) -> Option<BlockId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].next
    }

    pub fn is_block_inserted(&self, block: BlockId) -> bool {
        self.blocks[block].inserted
    }

    pub fn first_insn_of(&self, block: BlockId) -> Option<InsnId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].first_insn
    }

    pub fn last_insn_of(&self, block: BlockId) -> Option<InsnId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].last_insn
    }

    pub fn prev_insn_of(&self, insn: InsnId) -> Option<InsnId> {
        debug_assert!(self.is_insn_inserted(insn));
        self.insns[insn].prev
    }

    pub fn next_insn_of(&self, insn: InsnId) -> Option<InsnId> {
        debug_assert!(self.is_insn_inserted(insn));
        self.insns[insn].next
    }

    /// Returns the block containing `insn`.
    ///
    /// # Panics
    /// Panics if `insn` is not inserted.
    pub fn insn_block(&self, insn: InsnId) -> BlockId {
        self.insns[insn]
            .block
            .unwrap_or_else(|| panic!("`{insn}` is not inserted"))
    }

    pub fn is_insn_inserted(&self, insn: InsnId) -> bool {
        self.insns[insn].block.is_some()
    }

    pub fn iter_block(&self) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(self.entry_block, |&block| self.blocks[block].next)
    }

    pub fn iter_insn(&self, block: BlockId) -> impl Iterator<Item = InsnId> + '_ {
        debug_assert!(self.is_block_inserted(block));
        std::iter::successors(self.blocks[block].first_insn, |&insn| self.insns[insn].next)
    }

    pub fn iter_insn_rev(&self, block: BlockId) -> impl Iterator<Item = InsnId> + '_ {
        debug_assert!(self.is_block_inserted(block));
        std::iter::successors(self.blocks[block].last_insn, |&insn| self.insns[insn].prev)
    }

    pub fn block_num(&self) -> usize {
        self.iter_block().count()
    }

    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.is_block_inserted(block));
        self.link_block(block, self.last_block, None);
    }

    pub fn insert_block_before(&mut self, block: BlockId, before: BlockId) {
        debug_assert!(self.is_block_inserted(before));
        debug_assert!(!self.is_block_inserted(block));
        self.link_block(block, self.blocks[before].prev, Some(before));
    }

    pub fn insert_block_after(&mut self, block: BlockId, after: BlockId) {
        debug_assert!(self.is_block_inserted(after));
        debug_assert!(!self.is_block_inserted(block));
        self.link_block(block, Some(after), self.blocks[after].next);
    }

    /// Moves `block` right after `after`. The instructions of `block` move with it.
    pub fn move_block_after(&mut self, block: BlockId, after: BlockId) {
        debug_assert!(block != after);
        self.unlink_block(block);
        self.link_block(block, Some(after), self.blocks[after].next);
    }

    /// Removes `block` from the layout. The block must not contain any instruction.
    pub fn remove_block(&mut self, block: BlockId) {
        debug_assert!(self.is_block_empty(block), "`{block}` still has insns");
        self.unlink_block(block);
        self.blocks[block] = BlockNode::default();
    }

    pub fn append_insn(&mut self, insn: InsnId, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        self.link_insn(insn, block, self.blocks[block].last_insn, None);
    }

    pub fn prepend_insn(&mut self, insn: InsnId, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        self.link_insn(insn, block, None, self.blocks[block].first_insn);
    }

    pub fn insert_insn_before(&mut self, insn: InsnId, before: InsnId) {
        let block = self.insn_block(before);
        self.link_insn(insn, block, self.insns[before].prev, Some(before));
    }

    pub fn insert_insn_after(&mut self, insn: InsnId, after: InsnId) {
        let block = self.insn_block(after);
        self.link_insn(insn, block, Some(after), self.insns[after].next);
    }

    /// Remove instruction from the layout.
    pub fn remove_insn(&mut self, insn: InsnId) {
        let block = self.insn_block(insn);
        let InsnNode { prev, next, .. } = self.insns[insn];

        match prev {
            Some(prev) => self.insns[prev].next = next,
            None => self.blocks[block].first_insn = next,
        }
        match next {
            Some(next) => self.insns[next].prev = prev,
            None => self.blocks[block].last_insn = prev,
        }

        self.insns[insn] = InsnNode::default();
    }

    fn link_block(&mut self, block: BlockId, prev: Option<BlockId>, next: Option<BlockId>) {
        match prev {
            Some(prev) => self.blocks[prev].next = Some(block),
            None => self.entry_block = Some(block),
        }
        match next {
            Some(next) => self.blocks[next].prev = Some(block),
            None => self.last_block = Some(block),
        }

        let node = &mut self.blocks[block];
        node.prev = prev;
        node.next = next;
        node.inserted = true;
    }

    /// Detaches `block` from the block list, keeping its instruction list intact.
    fn unlink_block(&mut self, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        let BlockNode { prev, next, .. } = self.blocks[block];

        match prev {
            Some(prev) => self.blocks[prev].next = next,
            None => self.entry_block = next,
        }
        match next {
            Some(next) => self.blocks[next].prev = prev,
            None => self.last_block = prev,
        }

        let node = &mut self.blocks[block];
        node.prev = None;
        node.next = None;
        node.inserted = false;
    }

    fn link_insn(
        &mut self,
        insn: InsnId,
        block: BlockId,
        prev: Option<InsnId>,
        next: Option<InsnId>,
    ) {
        debug_assert!(!self.is_insn_inserted(insn));

        match prev {
            Some(prev) => self.insns[prev].next = Some(insn),
            None => self.blocks[block].first_insn = Some(insn),
        }
        match next {
            Some(next) => self.insns[next].prev = Some(insn),
            None => self.blocks[block].last_insn = Some(insn),
        }

        self.insns[insn] = InsnNode {
            block: Some(block),
            prev,
            next,
        };
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
struct BlockNode {
    prev: Option<BlockId>,
    next: Option<BlockId>,
    first_insn: Option<InsnId>,
    last_insn: Option<InsnId>,
    inserted: bool,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
struct InsnNode {
    /// A block in which the insn exists.
    block: Option<BlockId>,
    prev: Option<InsnId>,
    next: Option<InsnId>,
}
