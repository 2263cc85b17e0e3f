//! Recognition of counted loops.
//!
//! A counted loop has the shape
//! ```text
//! preheader:
//!     jump header;
//! header:
//!     iv = phi (0 preheader) (next latch);
//!     c = slt iv N;            // or the unsigned `lt`
//!     br c body exit;
//! ...
//! latch:
//!     next = add iv 1;         // anywhere in the loop
//!     jump header;
//! ```
//! where `N` is an immediate, the header is the only block leaving the loop and `c` has no
//! other user.

use std::ops::RangeInclusive;

use polymorph_ir::{
    BinaryOp, BlockId, CmpOp, ControlFlowGraph, Function, InsnData, InsnId, Type, ValueId,
};

use crate::{
    cfg_edit::terminator_of,
    loop_analysis::{Loop, LoopTree},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct CountedLoop {
    pub lp: Loop,
    pub header: BlockId,
    pub preheader: BlockId,
    pub latch: BlockId,
    /// In-loop successor of the header.
    pub body: BlockId,
    /// The only block entered when leaving the loop.
    pub exit: BlockId,
    pub iv: ValueId,
    pub iv_phi: InsnId,
    pub cmp: InsnId,
    pub bound: i64,
    /// `iv + 1`, flowing back from the latch.
    pub next: ValueId,
    pub ty: Type,
}

/// Matches `lp` against the counted loop shape with a bound in `bounds`.
pub(super) fn match_counted_loop(
    func: &Function,
    cfg: &ControlFlowGraph,
    lpt: &LoopTree,
    lp: Loop,
    bounds: RangeInclusive<i64>,
) -> Option<CountedLoop> {
    let header = lpt.loop_header(lp);

    let preheader = lpt.preheader(cfg, lp)?;
    if !matches!(func.dfg.insn(terminator_of(func, preheader)), InsnData::Jump { .. }) {
        return None;
    }

    let latches = lpt.latches(cfg, lp);
    let [latch] = latches.as_slice() else {
        return None;
    };

    let exits = lpt.exit_edges(cfg, lp);
    let [(exiting, exit)] = exits.as_slice() else {
        return None;
    };
    if *exiting != header {
        return None;
    }

    let term = terminator_of(func, header);
    let InsnData::Branch { args, dests } = func.dfg.insn(term) else {
        return None;
    };
    let [body, else_] = *dests;
    if else_ != *exit || !lpt.is_in_loop(body, lp) {
        return None;
    }

    let cmp = func.dfg.value_insn(args[0])?;
    if func.layout.insn_block(cmp) != header || func.dfg.users_num(args[0]) != 1 {
        return None;
    }
    let InsnData::Cmp {
        code: CmpOp::Slt | CmpOp::Lt,
        args: [iv, bound_value],
    } = *func.dfg.insn(cmp)
    else {
        return None;
    };
    let bound = func.dfg.value_imm(bound_value)?.as_i64();
    if !bounds.contains(&bound) {
        return None;
    }

    let iv_phi = func.dfg.value_insn(iv)?;
    if func.layout.insn_block(iv_phi) != header {
        return None;
    }
    let InsnData::Phi { values, ty, .. } = func.dfg.insn(iv_phi) else {
        return None;
    };
    if values.len() != 2 || !ty.is_integral() || ty.bits() < 8 {
        return None;
    }
    let init = func.dfg.insn(iv_phi).phi_value_from(preheader)?;
    let next = func.dfg.insn(iv_phi).phi_value_from(*latch)?;
    if !func.dfg.value_imm(init).is_some_and(|imm| imm.is_zero()) {
        return None;
    }
    if !is_increment_of(func, lpt, lp, next, iv) {
        return None;
    }

    Some(CountedLoop {
        lp,
        header,
        preheader,
        latch: *latch,
        body,
        exit: *exit,
        iv,
        iv_phi,
        cmp,
        bound,
        next,
        ty: *ty,
    })
}

/// Returns `true` if `next` is `iv + 1` computed inside `lp`.
fn is_increment_of(
    func: &Function,
    lpt: &LoopTree,
    lp: Loop,
    next: ValueId,
    iv: ValueId,
) -> bool {
    let Some(insn) = func.dfg.value_insn(next) else {
        return false;
    };
    if !lpt.is_in_loop(func.layout.insn_block(insn), lp) {
        return false;
    }
    let InsnData::Binary {
        code: BinaryOp::Add,
        args: [lhs, rhs],
    } = *func.dfg.insn(insn)
    else {
        return false;
    };
    let is_one = |value| func.dfg.value_imm(value).is_some_and(|imm| imm.is_one());
    (lhs == iv && is_one(rhs)) || (rhs == iv && is_one(lhs))
}

/// Returns the number of insns in `block`.
pub(super) fn insn_num(func: &Function, block: BlockId) -> usize {
    func.layout.iter_insn(block).count()
}
