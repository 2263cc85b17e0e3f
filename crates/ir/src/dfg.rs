//! This module contains the IR data flow graph.
use std::collections::BTreeSet;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;

use super::{BranchInfo, GlobalVariable, Immediate, InsnData, InsnId, Type, Value, ValueId};

#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    #[doc(hidden)]
    pub blocks: PrimaryMap<BlockId, Block>,
    #[doc(hidden)]
    pub values: PrimaryMap<ValueId, Value>,
    insns: PrimaryMap<InsnId, InsnData>,
    insn_results: SecondaryMap<InsnId, PackedOption<ValueId>>,
    immediates: FxHashMap<Immediate, ValueId>,
    globals: FxHashMap<GlobalVariable, ValueId>,
    users: SecondaryMap<ValueId, BTreeSet<InsnId>>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    pub fn make_insn(&mut self, insn_data: InsnData) -> InsnId {
        let insn = self.insns.push(insn_data);
        self.attach_user(insn);
        insn
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        let imm: Immediate = imm.into();
        if let Some(&value) = self.immediates.get(&imm) {
            return value;
        }

        let ty = imm.ty();
        let value = self.make_value(Value::Immediate { imm, ty });
        self.immediates.insert(imm, value);
        value
    }

    /// Returns a pointer value to the global variable.
    pub fn make_global_value(&mut self, gv: GlobalVariable) -> ValueId {
        if let Some(&value) = self.globals.get(&gv) {
            return value;
        }

        let value = self.make_value(Value::Global { gv, ty: Type::Ptr });
        self.globals.insert(gv, value);
        value
    }

    pub fn make_undef_value(&mut self, ty: Type) -> ValueId {
        self.make_value(Value::Undef { ty })
    }

    pub fn make_arg_value(&mut self, ty: Type, idx: usize) -> Value {
        Value::Arg { ty, idx }
    }

    /// Returns the result value data of the `insn` if the insn produces one.
    pub fn make_result(&self, insn: InsnId) -> Option<Value> {
        let ty = self.insns[insn].result_type(self)?;
        Some(Value::Insn { insn, ty })
    }

    pub fn attach_result(&mut self, insn: InsnId, value: ValueId) {
        debug_assert!(self.insn_results[insn].is_none());
        self.insn_results[insn] = value.into();
    }

    pub fn replace_insn(&mut self, insn: InsnId, insn_data: InsnData) {
        self.untrack_insn(insn);
        self.insns[insn] = insn_data;
        self.attach_user(insn);
    }

    /// Replaces every occurrence of `from` in the arguments of `insn` with `to`.
    pub fn replace_insn_arg(&mut self, insn: InsnId, from: ValueId, to: ValueId) {
        self.untrack_insn(insn);
        self.insns[insn].visit_values_mut(&mut |value| {
            if *value == from {
                *value = to;
            }
        });
        self.attach_user(insn);
    }

    /// Replaces the `idx`-th argument of `insn` with `to`.
    pub fn replace_insn_arg_at(&mut self, insn: InsnId, idx: usize, to: ValueId) {
        self.untrack_insn(insn);
        self.insns[insn].args_mut()[idx] = to;
        self.attach_user(insn);
    }

    pub fn insn(&self, insn: InsnId) -> &InsnData {
        &self.insns[insn]
    }

    pub fn insn_args(&self, insn: InsnId) -> &[ValueId] {
        self.insns[insn].args()
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    pub fn value_ty(&self, value: ValueId) -> Type {
        self.values[value].ty()
    }

    pub fn value_insn(&self, value: ValueId) -> Option<InsnId> {
        match self.values[value] {
            Value::Insn { insn, .. } => Some(insn),
            _ => None,
        }
    }

    pub fn value_imm(&self, value: ValueId) -> Option<Immediate> {
        match self.values[value] {
            Value::Immediate { imm, .. } => Some(imm),
            _ => None,
        }
    }

    pub fn value_gv(&self, value: ValueId) -> Option<GlobalVariable> {
        match self.values[value] {
            Value::Global { gv, .. } => Some(gv),
            _ => None,
        }
    }

    pub fn is_imm(&self, value: ValueId) -> bool {
        matches!(self.values[value], Value::Immediate { .. })
    }

    /// Returns `true` if the value is a literal that doesn't depend on any definition:
    /// immediates, global addresses and undef.
    pub fn is_constant(&self, value: ValueId) -> bool {
        matches!(
            self.values[value],
            Value::Immediate { .. } | Value::Global { .. } | Value::Undef { .. }
        )
    }

    pub fn attach_user(&mut self, insn: InsnId) {
        let insn_data = &self.insns[insn];
        let users = &mut self.users;
        insn_data.visit_values(&mut |value| {
            users[value].insert(insn);
        })
    }

    /// Removes `insn` from the user sets of its arguments.
    pub fn untrack_insn(&mut self, insn: InsnId) {
        let insn_data = &self.insns[insn];
        let users = &mut self.users;
        insn_data.visit_values(&mut |value| {
            users[value].remove(&insn);
        })
    }

    pub fn remove_user(&mut self, value: ValueId, user: InsnId) {
        self.users[value].remove(&user);
    }

    /// Returns the all instructions that use the `value`.
    pub fn users(&self, value: ValueId) -> impl Iterator<Item = &InsnId> {
        self.users[value].iter()
    }

    /// Returns the number of instructions that use the `value`.
    pub fn users_num(&self, value: ValueId) -> usize {
        self.users[value].len()
    }

    pub fn insn_result(&self, insn: InsnId) -> Option<ValueId> {
        self.insn_results[insn].expand()
    }

    pub fn branch_info(&self, insn: InsnId) -> BranchInfo {
        self.insns[insn].analyze_branch()
    }

    pub fn is_terminator(&self, insn: InsnId) -> bool {
        self.insns[insn].is_terminator()
    }

    /// Returns `true` if the insn leaves the function.
    pub fn is_exit(&self, insn: InsnId) -> bool {
        matches!(
            self.insns[insn],
            InsnData::Return { .. } | InsnData::Unreachable
        )
    }

    pub fn is_phi(&self, insn: InsnId) -> bool {
        self.insns[insn].is_phi()
    }

    pub fn is_return(&self, insn: InsnId) -> bool {
        self.insns[insn].is_return()
    }

    pub fn is_alloca(&self, insn: InsnId) -> bool {
        self.insns[insn].is_alloca()
    }

    pub fn append_phi_arg(&mut self, insn: InsnId, value: ValueId, block: BlockId) {
        self.insns[insn].append_phi_arg(value, block);
        self.attach_user(insn);
    }

    /// Removes the phi argument flowing through `from` and returns its value.
    pub fn remove_phi_arg(&mut self, insn: InsnId, from: BlockId) -> ValueId {
        self.untrack_insn(insn);
        let value = self.insns[insn].remove_phi_arg(from);
        self.attach_user(insn);
        value
    }

    /// Rewrites the incoming block `from` of the phi `insn` to `to`.
    pub fn rewrite_phi_block(&mut self, insn: InsnId, from: BlockId, to: BlockId) {
        if let InsnData::Phi { blocks, .. } = &mut self.insns[insn] {
            for block in blocks.iter_mut() {
                if *block == from {
                    *block = to;
                }
            }
        }
    }

    pub fn rewrite_branch_dest(&mut self, insn: InsnId, from: BlockId, to: BlockId) {
        self.insns[insn].rewrite_branch_dest(from, to)
    }

    /// Redirects every use of `value` to `alias`.
    pub fn change_to_alias(&mut self, value: ValueId, alias: ValueId) {
        let mut users = std::mem::take(&mut self.users[value]);
        for insn in &users {
            self.insns[*insn].visit_values_mut(&mut |user_value| {
                if *user_value == value {
                    *user_value = alias;
                }
            });
        }
        self.users[alias].append(&mut users);
    }
}

/// An opaque reference to [`Block`]
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// A block data definition.
/// A Block data doesn't hold any information for layout of a program. It is managed by
/// [`super::layout::Layout`].
#[derive(Debug, Clone, Default)]
pub struct Block {}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}
