use super::{BlockId, Function, InsnData, InsnId, ValueId};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    At(InsnId),
    BlockTop(BlockId),
    BlockBottom(BlockId),
    #[default]
    NoWhere,
}

/// A positioned editor over a function layout.
///
/// Inserting at `At(insn)` or `BlockTop(block)` places the new insn after the current location
/// and moves the cursor onto it, so successive insertions keep their program order.
/// Inserting at `BlockBottom(block)` appends and leaves the cursor at the bottom.
pub trait FuncCursor {
    fn at_location(loc: CursorLocation) -> Self;
    fn set_location(&mut self, loc: CursorLocation);
    fn loc(&self) -> CursorLocation;

    fn set_to_entry(&mut self, func: &Function) {
        let loc = if let Some(entry) = func.layout.entry_block() {
            CursorLocation::BlockTop(entry)
        } else {
            CursorLocation::NoWhere
        };

        self.set_location(loc);
    }

    /// Moves the cursor so that the next insertion lands right before `insn`.
    fn set_before(&mut self, func: &Function, insn: InsnId) {
        let loc = match func.layout.prev_insn_of(insn) {
            Some(prev) => CursorLocation::At(prev),
            None => CursorLocation::BlockTop(func.layout.insn_block(insn)),
        };
        self.set_location(loc);
    }

    fn insert_insn(&mut self, func: &mut Function, insn: InsnId) {
        match self.loc() {
            CursorLocation::At(at) => func.layout.insert_insn_after(insn, at),
            CursorLocation::BlockTop(block) => func.layout.prepend_insn(insn, block),
            CursorLocation::BlockBottom(block) => {
                func.layout.append_insn(insn, block);
                return;
            }
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
        self.set_location(CursorLocation::At(insn));
    }

    fn insert_insn_data(&mut self, func: &mut Function, data: InsnData) -> InsnId {
        let insn = func.dfg.make_insn(data);
        self.insert_insn(func, insn);
        insn
    }

    /// Inserts `data` and attaches a fresh result value if the insn produces one.
    fn insert_insn_with_result(
        &mut self,
        func: &mut Function,
        data: InsnData,
    ) -> (InsnId, Option<ValueId>) {
        let insn = self.insert_insn_data(func, data);
        let result = self.make_result(func, insn);
        (insn, result)
    }

    /// Inserts a value producing insn and returns its result.
    ///
    /// # Panics
    /// Panics if `data` doesn't produce a value.
    fn insert_value(&mut self, func: &mut Function, data: InsnData) -> ValueId {
        let (insn, result) = self.insert_insn_with_result(func, data);
        result.unwrap_or_else(|| panic!("`{insn}` doesn't produce a value"))
    }

    fn append_insn(&mut self, func: &mut Function, insn: InsnId) {
        let current_block = self.expect_block(func);
        func.layout.append_insn(insn, current_block);
    }

    fn prepend_insn(&mut self, func: &mut Function, insn: InsnId) {
        let current_block = self.expect_block(func);
        func.layout.prepend_insn(insn, current_block);
    }

    fn replace(&mut self, func: &mut Function, insn_data: InsnData) {
        let insn = self.expect_insn();
        func.dfg.replace_insn(insn, insn_data);
    }

    /// Removes the insn at the cursor and moves the cursor to the next location.
    ///
    /// # Panics
    /// Panics if the result of the insn is still used.
    fn remove_insn(&mut self, func: &mut Function) {
        let insn = self.expect_insn();
        if let Some(result) = func.dfg.insn_result(insn) {
            assert_eq!(
                func.dfg.users_num(result),
                0,
                "removing `{insn}` while `{result}` is still used"
            );
        }

        let next_loc = self.next_loc(func);
        func.dfg.untrack_insn(insn);
        func.layout.remove_insn(insn);
        self.set_location(next_loc);
    }

    fn make_result(&mut self, func: &mut Function, insn: InsnId) -> Option<ValueId> {
        let value_data = func.dfg.make_result(insn)?;
        let value = func.dfg.make_value(value_data);
        func.dfg.attach_result(insn, value);
        Some(value)
    }

    fn make_block(&mut self, func: &mut Function) -> BlockId {
        func.dfg.make_block()
    }

    fn insn(&self) -> Option<InsnId> {
        if let CursorLocation::At(insn) = self.loc() {
            Some(insn)
        } else {
            None
        }
    }

    fn expect_insn(&self) -> InsnId {
        self.insn()
            .expect("current cursor location doesn't point to insn")
    }

    fn block(&self, func: &Function) -> Option<BlockId> {
        match self.loc() {
            CursorLocation::At(insn) => Some(func.layout.insn_block(insn)),
            CursorLocation::BlockTop(block) | CursorLocation::BlockBottom(block) => Some(block),
            CursorLocation::NoWhere => None,
        }
    }

    fn expect_block(&self, func: &Function) -> BlockId {
        self.block(func).expect("cursor loc points to `NoWhere`")
    }

    /// Inserts `block` right after the current block.
    fn insert_block(&mut self, func: &mut Function, block: BlockId) {
        let current = self.expect_block(func);
        func.layout.insert_block_after(block, current)
    }

    fn append_block(&mut self, func: &mut Function, block: BlockId) {
        func.layout.append_block(block);
    }

    fn next_loc(&self, func: &Function) -> CursorLocation {
        match self.loc() {
            CursorLocation::At(insn) => func.layout.next_insn_of(insn).map_or_else(
                || CursorLocation::BlockBottom(func.layout.insn_block(insn)),
                CursorLocation::At,
            ),
            CursorLocation::BlockTop(block) => func
                .layout
                .first_insn_of(block)
                .map_or(CursorLocation::BlockBottom(block), CursorLocation::At),
            CursorLocation::BlockBottom(block) => func
                .layout
                .next_block_of(block)
                .map_or(CursorLocation::NoWhere, CursorLocation::BlockTop),
            CursorLocation::NoWhere => CursorLocation::NoWhere,
        }
    }

    fn proceed(&mut self, func: &Function) {
        self.set_location(self.next_loc(func));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InsnInserter {
    loc: CursorLocation,
}

impl FuncCursor for InsnInserter {
    fn at_location(loc: CursorLocation) -> Self {
        Self { loc }
    }

    fn set_location(&mut self, loc: CursorLocation) {
        self.loc = loc;
    }

    fn loc(&self) -> CursorLocation {
        self.loc
    }
}
