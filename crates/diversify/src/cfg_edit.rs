//! Block level editing helpers shared by the structural passes.

use rustc_hash::{FxHashMap, FxHashSet};

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BlockId, Function, InsnData, InsnId, Type, Value, ValueId,
};

use crate::{error::DiversifyError, Result};

/// Copies blocks together with their instructions, remapping every block and value defined by
/// the copied region to its copy.
///
/// Values that are not defined in the region are kept as is when copying inside a function.
/// When copying into another function they must be registered with [`RegionCloner::map_value`]
/// beforehand; constants are re-created in the destination.
#[derive(Debug, Default)]
pub struct RegionCloner {
    value_map: FxHashMap<ValueId, ValueId>,
    block_map: FxHashMap<BlockId, BlockId>,
    insn_map: FxHashMap<InsnId, InsnId>,
}

impl RegionCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_value(&mut self, from: ValueId, to: ValueId) {
        self.value_map.insert(from, to);
    }

    pub fn map_block(&mut self, from: BlockId, to: BlockId) {
        self.block_map.insert(from, to);
    }

    pub fn value(&self, value: ValueId) -> ValueId {
        self.value_map.get(&value).copied().unwrap_or(value)
    }

    pub fn block(&self, block: BlockId) -> BlockId {
        self.block_map.get(&block).copied().unwrap_or(block)
    }

    /// Returns the copy of `insn`.
    ///
    /// # Panics
    /// Panics if `insn` was not copied.
    pub fn insn(&self, insn: InsnId) -> InsnId {
        self.insn_map
            .get(&insn)
            .copied()
            .unwrap_or_else(|| panic!("`{insn}` was not copied"))
    }

    /// Copies `blocks` inside `func`, placing the copies in order right after `after`.
    /// Returns the copies in the order of `blocks`.
    pub fn clone_within(
        &mut self,
        func: &mut Function,
        blocks: &[BlockId],
        after: BlockId,
    ) -> Vec<BlockId> {
        let snapshot = Snapshot::take(func, blocks);
        self.materialize(None, func, &snapshot, Some(after))
    }

    /// Copies `blocks` of `src` to the end of `dst`.
    /// Returns the copies in the order of `blocks`.
    ///
    /// # Panics
    /// Panics if an instruction result or argument of `src` used in the region has no mapping.
    pub fn clone_into(
        &mut self,
        src: &Function,
        dst: &mut Function,
        blocks: &[BlockId],
    ) -> Vec<BlockId> {
        let snapshot = Snapshot::take(src, blocks);
        self.materialize(Some(src), dst, &snapshot, None)
    }

    fn materialize(
        &mut self,
        src: Option<&Function>,
        dst: &mut Function,
        snapshot: &Snapshot,
        mut after: Option<BlockId>,
    ) -> Vec<BlockId> {
        let mut cursor = InsnInserter::at_location(CursorLocation::NoWhere);
        let mut new_blocks = Vec::with_capacity(snapshot.blocks.len());
        let mut new_insns = Vec::new();

        // Create blocks, insns and results first so that forward references can be remapped.
        for (block, insns) in &snapshot.blocks {
            let new_block = dst.dfg.make_block();
            match after {
                Some(after) => dst.layout.insert_block_after(new_block, after),
                None => dst.layout.append_block(new_block),
            }
            after = Some(new_block);
            self.block_map.insert(*block, new_block);
            new_blocks.push(new_block);

            cursor.set_location(CursorLocation::BlockBottom(new_block));
            for (insn, data, result) in insns {
                let new_insn = cursor.insert_insn_data(dst, InsnData::Unreachable);
                self.insn_map.insert(*insn, new_insn);
                if let Some((result, ty)) = result {
                    let new_result = dst.dfg.make_value(Value::Insn {
                        insn: new_insn,
                        ty: *ty,
                    });
                    dst.dfg.attach_result(new_insn, new_result);
                    self.value_map.insert(*result, new_result);
                }
                new_insns.push((new_insn, data));
            }
        }

        for (new_insn, data) in new_insns {
            let mut data = data.clone();
            data.visit_values_mut(&mut |value| *value = self.remap_value(src, dst, *value));
            data.visit_blocks_mut(&mut |block| *block = self.block(*block));
            dst.dfg.replace_insn(new_insn, data);
        }

        new_blocks
    }

    fn remap_value(&mut self, src: Option<&Function>, dst: &mut Function, value: ValueId) -> ValueId {
        if let Some(mapped) = self.value_map.get(&value) {
            return *mapped;
        }

        let Some(src) = src else {
            return value;
        };

        let mapped = match *src.dfg.value(value) {
            Value::Immediate { imm, .. } => dst.dfg.make_imm_value(imm),
            Value::Global { gv, .. } => dst.dfg.make_global_value(gv),
            Value::Undef { ty } => dst.dfg.make_undef_value(ty),
            Value::Insn { .. } | Value::Arg { .. } => {
                panic!("`{value}` is used in the copied region but has no mapping")
            }
        };
        self.value_map.insert(value, mapped);
        mapped
    }
}

/// An insn with its data and its result.
type InsnSnapshot = (InsnId, InsnData, Option<(ValueId, Type)>);

struct Snapshot {
    blocks: Vec<(BlockId, Vec<InsnSnapshot>)>,
}

impl Snapshot {
    fn take(func: &Function, blocks: &[BlockId]) -> Self {
        let blocks = blocks
            .iter()
            .map(|&block| {
                let insns = func
                    .layout
                    .iter_insn(block)
                    .map(|insn| {
                        let result = func
                            .dfg
                            .insn_result(insn)
                            .map(|result| (result, func.dfg.value_ty(result)));
                        (insn, func.dfg.insn(insn).clone(), result)
                    })
                    .collect();
                (block, insns)
            })
            .collect();
        Self { blocks }
    }
}

/// Removes `blocks` and their instructions from `func`.
///
/// Every value defined in the removed blocks must be unused outside of them, otherwise
/// [`DiversifyError::LiveValueRemoved`] is returned.
pub fn remove_blocks(func: &mut Function, blocks: &[BlockId]) -> Result<()> {
    let insns: Vec<InsnId> = blocks
        .iter()
        .flat_map(|&block| func.layout.iter_insn(block))
        .collect();
    let removed: FxHashSet<_> = insns.iter().copied().collect();

    for &insn in &insns {
        func.dfg.untrack_insn(insn);
    }

    for &insn in &insns {
        let Some(value) = func.dfg.insn_result(insn) else {
            continue;
        };
        if let Some(&user) = func.dfg.users(value).find(|user| !removed.contains(user)) {
            return Err(DiversifyError::LiveValueRemoved {
                func: func.sig.name().to_string(),
                value,
                user,
            });
        }
    }

    for &insn in &insns {
        func.layout.remove_insn(insn);
    }
    for &block in blocks {
        func.layout.remove_block(block);
    }

    Ok(())
}

/// Returns the phis at the top of `block`.
pub fn phis_of(func: &Function, block: BlockId) -> Vec<InsnId> {
    func.layout
        .iter_insn(block)
        .take_while(|insn| func.dfg.is_phi(*insn))
        .collect()
}

/// Rewrites the incoming block `from` of every phi in `block` to `to`.
pub fn retarget_phis(func: &mut Function, block: BlockId, from: BlockId, to: BlockId) {
    for phi in phis_of(func, block) {
        func.dfg.rewrite_phi_block(phi, from, to);
    }
}

/// Replaces the value of `phi` flowing through `from` with `value`.
///
/// # Panics
/// Panics if `phi` has no incoming value from `from`.
pub fn set_phi_incoming(func: &mut Function, phi: InsnId, from: BlockId, value: ValueId) {
    let idx = func
        .dfg
        .insn(phi)
        .phi_blocks()
        .iter()
        .position(|block| *block == from)
        .unwrap_or_else(|| panic!("`{phi}` has no incoming value from `{from}`"));
    func.dfg.replace_insn_arg_at(phi, idx, value);
}

/// Replaces every phi of `block` by its incoming value from `pred`.
pub fn fold_phis(func: &mut Function, block: BlockId, pred: BlockId) {
    let mut cursor = InsnInserter::at_location(CursorLocation::NoWhere);
    for phi in phis_of(func, block) {
        let Some(incoming) = func.dfg.insn(phi).phi_value_from(pred) else {
            continue;
        };
        if let Some(result) = func.dfg.insn_result(phi) {
            func.dfg.change_to_alias(result, incoming);
        }
        cursor.set_location(CursorLocation::At(phi));
        cursor.remove_insn(func);
    }
}

/// Returns the leading run of `alloca` insns of the entry block.
pub fn entry_allocas(func: &Function) -> Vec<InsnId> {
    let Some(entry) = func.layout.entry_block() else {
        return Vec::new();
    };
    func.layout
        .iter_insn(entry)
        .take_while(|insn| func.dfg.is_alloca(*insn))
        .collect()
}

/// Returns the terminator of `block`.
///
/// # Panics
/// Panics if `block` is empty.
pub fn terminator_of(func: &Function, block: BlockId) -> InsnId {
    func.layout
        .last_insn_of(block)
        .unwrap_or_else(|| panic!("`{block}` has no terminator"))
}
