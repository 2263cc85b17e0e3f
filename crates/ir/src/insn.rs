//! This module contains IR instruction definitions.
use std::fmt;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use super::{BlockId, DataFlowGraph, FuncRef, Type, ValueId};

/// An opaque reference to [`InsnData`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);
entity_impl!(InsnId, "insn");

/// An instruction data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InsnData {
    /// Unary instructions.
    Unary { code: UnaryOp, args: [ValueId; 1] },

    /// Binary instructions.
    Binary { code: BinaryOp, args: [ValueId; 2] },

    /// Integer comparisons, producing `i1`.
    Cmp { code: CmpOp, args: [ValueId; 2] },

    /// Cast operations.
    Cast {
        code: CastOp,
        args: [ValueId; 1],
        ty: Type,
    },

    /// Allocate `args[0]` elements of `ty` on the stack frame.
    Alloca { ty: Type, args: [ValueId; 1] },

    /// Load a value of `ty` from the address `args[0]`.
    Load { args: [ValueId; 1], ty: Type },

    /// Store `args[1]` to the address `args[0]`.
    Store { args: [ValueId; 2] },

    /// Compute `args[0] + args[1] * size_of(elem_ty)`.
    Gep { args: [ValueId; 2], elem_ty: Type },

    /// Call a function in the same module.
    Call {
        func: FuncRef,
        args: SmallVec<[ValueId; 8]>,
        ret_ty: Type,
    },

    /// Query the host for frame level information.
    Intrinsic {
        code: IntrinsicOp,
        args: SmallVec<[ValueId; 2]>,
    },

    /// Unconditional jump instruction.
    Jump { dests: [BlockId; 1] },

    /// Conditional jump instruction. Jumps to `dests[0]` if `args[0]` is true.
    Branch {
        args: [ValueId; 1],
        dests: [BlockId; 2],
    },

    /// Switch on `args[0]`. `table[i]` is taken when `args[0] == args[i + 1]`.
    BrTable {
        args: SmallVec<[ValueId; 8]>,
        default: Option<BlockId>,
        table: SmallVec<[BlockId; 8]>,
    },

    /// Return.
    Return { args: Option<ValueId> },

    Unreachable,

    /// Phi function.
    Phi {
        values: SmallVec<[ValueId; 8]>,
        blocks: SmallVec<[BlockId; 8]>,
        ty: Type,
    },
}

impl InsnData {
    pub fn unary(code: UnaryOp, arg: ValueId) -> Self {
        Self::Unary { code, args: [arg] }
    }

    pub fn binary(code: BinaryOp, lhs: ValueId, rhs: ValueId) -> Self {
        Self::Binary {
            code,
            args: [lhs, rhs],
        }
    }

    pub fn cmp(code: CmpOp, lhs: ValueId, rhs: ValueId) -> Self {
        Self::Cmp {
            code,
            args: [lhs, rhs],
        }
    }

    pub fn cast(code: CastOp, arg: ValueId, ty: Type) -> Self {
        Self::Cast {
            code,
            args: [arg],
            ty,
        }
    }

    pub fn alloca(ty: Type, count: ValueId) -> Self {
        Self::Alloca { ty, args: [count] }
    }

    pub fn load(addr: ValueId, ty: Type) -> Self {
        Self::Load { args: [addr], ty }
    }

    pub fn store(addr: ValueId, value: ValueId) -> Self {
        Self::Store {
            args: [addr, value],
        }
    }

    pub fn gep(base: ValueId, index: ValueId, elem_ty: Type) -> Self {
        Self::Gep {
            args: [base, index],
            elem_ty,
        }
    }

    pub fn call(func: FuncRef, args: &[ValueId], ret_ty: Type) -> Self {
        Self::Call {
            func,
            args: args.into(),
            ret_ty,
        }
    }

    pub fn intrinsic(code: IntrinsicOp, args: &[ValueId]) -> Self {
        Self::Intrinsic {
            code,
            args: args.into(),
        }
    }

    pub fn jump(dest: BlockId) -> Self {
        Self::Jump { dests: [dest] }
    }

    pub fn branch(cond: ValueId, then: BlockId, else_: BlockId) -> Self {
        Self::Branch {
            args: [cond],
            dests: [then, else_],
        }
    }

    pub fn ret(arg: Option<ValueId>) -> Self {
        Self::Return { args: arg }
    }

    pub fn phi(ty: Type) -> Self {
        Self::Phi {
            values: SmallVec::new(),
            blocks: SmallVec::new(),
            ty,
        }
    }

    pub fn analyze_branch(&self) -> BranchInfo {
        match self {
            Self::Jump { dests } => BranchInfo::Jump { dest: dests[0] },

            Self::Branch { args, dests } => BranchInfo::Br {
                cond: args[0],
                dests,
            },

            Self::BrTable {
                args,
                default,
                table,
            } => BranchInfo::BrTable {
                args,
                default: *default,
                table,
            },

            _ => BranchInfo::NotBranch,
        }
    }

    pub fn rewrite_branch_dest(&mut self, from: BlockId, to: BlockId) {
        match self {
            Self::Jump { dests } => {
                if dests[0] == from {
                    dests[0] = to
                }
            }

            Self::Branch { dests, .. } => {
                for block in dests.iter_mut() {
                    if *block == from {
                        *block = to;
                    }
                }
            }

            Self::BrTable { default, table, .. } => {
                if *default == Some(from) {
                    *default = Some(to);
                }

                for block in table.iter_mut() {
                    if *block == from {
                        *block = to
                    }
                }
            }

            _ => {}
        }
    }

    pub fn args(&self) -> &[ValueId] {
        match self {
            Self::Binary { args, .. } | Self::Cmp { args, .. } | Self::Store { args } => args,
            Self::Gep { args, .. } => args,

            Self::Unary { args, .. }
            | Self::Cast { args, .. }
            | Self::Alloca { args, .. }
            | Self::Load { args, .. }
            | Self::Branch { args, .. } => args,

            Self::Call { args, .. }
            | Self::BrTable { args, .. }
            | Self::Phi { values: args, .. } => args,

            Self::Intrinsic { args, .. } => args,

            Self::Return { args } => args.as_slice(),

            Self::Jump { .. } | Self::Unreachable => &[],
        }
    }

    pub fn args_mut(&mut self) -> &mut [ValueId] {
        match self {
            Self::Binary { args, .. } | Self::Cmp { args, .. } | Self::Store { args } => args,
            Self::Gep { args, .. } => args,

            Self::Unary { args, .. }
            | Self::Cast { args, .. }
            | Self::Alloca { args, .. }
            | Self::Load { args, .. }
            | Self::Branch { args, .. } => args,

            Self::Call { args, .. }
            | Self::BrTable { args, .. }
            | Self::Phi { values: args, .. } => args,

            Self::Intrinsic { args, .. } => args,

            Self::Return { args } => args.as_mut_slice(),

            Self::Jump { .. } | Self::Unreachable => &mut [],
        }
    }

    pub fn visit_values(&self, f: &mut dyn FnMut(ValueId)) {
        for &arg in self.args() {
            f(arg)
        }
    }

    pub fn visit_values_mut(&mut self, f: &mut dyn FnMut(&mut ValueId)) {
        for arg in self.args_mut() {
            f(arg)
        }
    }

    /// Visits every block referenced by the instruction, including phi provenance.
    pub fn visit_blocks_mut(&mut self, f: &mut dyn FnMut(&mut BlockId)) {
        match self {
            Self::Jump { dests } => dests.iter_mut().for_each(f),
            Self::Branch { dests, .. } => dests.iter_mut().for_each(f),
            Self::BrTable { default, table, .. } => {
                if let Some(default) = default {
                    f(default);
                }
                table.iter_mut().for_each(f);
            }
            Self::Phi { blocks, .. } => blocks.iter_mut().for_each(f),
            _ => {}
        }
    }

    pub fn append_phi_arg(&mut self, value: ValueId, block: BlockId) {
        match self {
            Self::Phi { values, blocks, .. } => {
                values.push(value);
                blocks.push(block)
            }
            _ => panic!("expects `InsnData::Phi` but got `{self:?}`"),
        }
    }

    /// Remove phi arg that flow through the `from`.
    ///
    /// # Panics
    /// If `insn` is not a phi insn or there is no phi argument from the block, then the function panics.
    pub fn remove_phi_arg(&mut self, from: BlockId) -> ValueId {
        let Self::Phi { values, blocks, .. } = self else {
            panic!("insn is not a phi function");
        };

        let index = blocks
            .iter()
            .position(|block| *block == from)
            .unwrap_or_else(|| panic!("no phi argument flows through `{from}`"));
        blocks.remove(index);
        values.remove(index)
    }

    pub fn phi_blocks(&self) -> &[BlockId] {
        match self {
            Self::Phi { blocks, .. } => blocks,
            _ => panic!("insn is not a phi function"),
        }
    }

    /// Returns the incoming value flowing through `from`.
    pub fn phi_value_from(&self, from: BlockId) -> Option<ValueId> {
        match self {
            Self::Phi { values, blocks, .. } => blocks
                .iter()
                .position(|block| *block == from)
                .map(|idx| values[idx]),
            _ => None,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return { .. })
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self, Self::Alloca { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. }
                | Self::Branch { .. }
                | Self::BrTable { .. }
                | Self::Return { .. }
                | Self::Unreachable
        )
    }

    /// Returns `true` if the insn transfers control to another function or queries the host.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. } | Self::Intrinsic { .. })
    }

    /// Returns the address operand if the insn reads or writes memory.
    pub fn memory_addr(&self) -> Option<ValueId> {
        match self {
            Self::Load { args, .. } => Some(args[0]),
            Self::Store { args } => Some(args[0]),
            _ => None,
        }
    }

    pub fn result_type(&self, dfg: &DataFlowGraph) -> Option<Type> {
        match self {
            Self::Unary { args, .. } => Some(dfg.value_ty(args[0])),
            Self::Binary { args, .. } => Some(dfg.value_ty(args[0])),
            Self::Cmp { .. } => Some(Type::I1),
            Self::Cast { ty, .. } | Self::Load { ty, .. } | Self::Phi { ty, .. } => Some(*ty),
            Self::Alloca { .. } | Self::Gep { .. } => Some(Type::Ptr),
            Self::Call { ret_ty, .. } => (!ret_ty.is_unit()).then_some(*ret_ty),
            Self::Intrinsic { code, .. } => Some(code.result_type()),
            Self::Store { .. }
            | Self::Jump { .. }
            | Self::Branch { .. }
            | Self::BrTable { .. }
            | Self::Return { .. }
            | Self::Unreachable => None,
        }
    }
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Neg => "neg",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    Shl,
    Shr,
    Sar,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn is_division(self) -> bool {
        matches!(self, Self::Sdiv | Self::Udiv | Self::Srem | Self::Urem)
    }

    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Sdiv => "sdiv",
            Self::Udiv => "udiv",
            Self::Srem => "srem",
            Self::Urem => "urem",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sar => "sar",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison predicates. `lt`, `le`, `gt` and `ge` are unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Slt => "slt",
            Self::Sle => "sle",
            Self::Sgt => "sgt",
            Self::Sge => "sge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
}

impl CastOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Sext => "sext",
            Self::Zext => "zext",
            Self::Trunc => "trunc",
        }
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host provided primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicOp {
    /// Returns the return address of the frame at depth `args[0]`. Only depth 0 is supported.
    ReturnAddress,
}

impl IntrinsicOp {
    pub fn result_type(self) -> Type {
        match self {
            Self::ReturnAddress => Type::Ptr,
        }
    }

    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::ReturnAddress => "return_address",
        }
    }
}

impl fmt::Display for IntrinsicOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
pub enum BranchInfo<'a> {
    NotBranch,

    /// Unconditional jump
    Jump { dest: BlockId },

    /// Conditional jump.
    Br {
        cond: ValueId,
        dests: &'a [BlockId],
    },

    /// Indirect jump.
    BrTable {
        args: &'a [ValueId],
        default: Option<BlockId>,
        table: &'a [BlockId],
    },
}

impl<'a> BranchInfo<'a> {
    pub fn iter_dests(self) -> BranchDestIter<'a> {
        BranchDestIter {
            branch_info: self,
            idx: 0,
        }
    }

    pub fn dests_num(self) -> usize {
        match self {
            Self::NotBranch => 0,
            Self::Jump { .. } => 1,
            Self::Br { dests, .. } => dests.len(),
            Self::BrTable { default, table, .. } => table.len() + usize::from(default.is_some()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct BranchDestIter<'a> {
    branch_info: BranchInfo<'a>,
    idx: usize,
}

impl Iterator for BranchDestIter<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.branch_info.dests_num() {
            return None;
        }

        let dest = match self.branch_info {
            BranchInfo::Jump { dest } => dest,
            BranchInfo::Br { dests, .. } => dests[self.idx],
            BranchInfo::BrTable { default, table, .. } => match default {
                Some(default) if self.idx == 0 => default,
                Some(_) => table[self.idx - 1],
                None => table[self.idx],
            },
            BranchInfo::NotBranch => return None,
        };
        self.idx += 1;
        Some(dest)
    }
}
