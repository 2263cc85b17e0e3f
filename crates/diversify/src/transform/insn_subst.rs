//! Rewrites integer `add`, `sub` and `mul` into equivalent expansions.
//!
//! | original | expansion                                         |
//! |----------|---------------------------------------------------|
//! | `a + b`  | `a - (0 - b)` or `0 - ((0 - a) + (0 - b))`        |
//! | `a - b`  | `a + (0 - b)`                                     |
//! | `a * b`  | `0 - ((0 - a) * b)` or `a * (b - 1) + a`          |
//!
//! All identities hold under two's complement wraparound.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, Function, Immediate, InsnData, InsnId, Module, ValueId,
};
use rand::{rngs::StdRng, Rng};

use super::{definitions, Transform};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct InsnSubst;

impl InsnSubst {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for InsnSubst {
    fn name(&self) -> &'static str {
        "insn_subst"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            let func = &mut module.funcs[func_ref];
            for (insn, code) in collect_targets(func) {
                substitute(func, insn, code, rng);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Collects the integer `add`, `sub` and `mul` insns present before any rewrite.
fn collect_targets(func: &Function) -> Vec<(InsnId, BinaryOp)> {
    let mut targets = Vec::new();
    for block in func.layout.iter_block() {
        for insn in func.layout.iter_insn(block) {
            let InsnData::Binary { code, args } = func.dfg.insn(insn) else {
                continue;
            };
            if matches!(code, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
                && func.dfg.value_ty(args[0]).is_integral()
            {
                targets.push((insn, *code));
            }
        }
    }
    targets
}

fn substitute(func: &mut Function, insn: InsnId, code: BinaryOp, rng: &mut StdRng) {
    let [lhs, rhs] = match func.dfg.insn(insn) {
        InsnData::Binary { args, .. } => *args,
        _ => unreachable!(),
    };
    let ty = func.dfg.value_ty(lhs);
    let zero = func.dfg.make_imm_value(Immediate::zero(ty));

    let mut cursor = InsnInserter::at_location(CursorLocation::NoWhere);
    cursor.set_before(func, insn);
    let mut emit = |func: &mut Function, code, lhs, rhs| -> ValueId {
        cursor.insert_value(func, InsnData::binary(code, lhs, rhs))
    };

    let root = match code {
        BinaryOp::Add if rng.gen_bool(0.5) => {
            let neg_rhs = emit(func, BinaryOp::Sub, zero, rhs);
            emit(func, BinaryOp::Sub, lhs, neg_rhs)
        }
        BinaryOp::Add => {
            let neg_lhs = emit(func, BinaryOp::Sub, zero, lhs);
            let neg_rhs = emit(func, BinaryOp::Sub, zero, rhs);
            let sum = emit(func, BinaryOp::Add, neg_lhs, neg_rhs);
            emit(func, BinaryOp::Sub, zero, sum)
        }
        BinaryOp::Sub => {
            let neg_rhs = emit(func, BinaryOp::Sub, zero, rhs);
            emit(func, BinaryOp::Add, lhs, neg_rhs)
        }
        BinaryOp::Mul if rng.gen_bool(0.5) => {
            let neg_lhs = emit(func, BinaryOp::Sub, zero, lhs);
            let prod = emit(func, BinaryOp::Mul, neg_lhs, rhs);
            emit(func, BinaryOp::Sub, zero, prod)
        }
        BinaryOp::Mul => {
            let one = func.dfg.make_imm_value(Immediate::one(ty));
            let rhs_minus_one = emit(func, BinaryOp::Sub, rhs, one);
            let prod = emit(func, BinaryOp::Mul, lhs, rhs_minus_one);
            emit(func, BinaryOp::Add, prod, lhs)
        }
        _ => unreachable!("`{code}` has no substitution"),
    };

    if let Some(result) = func.dfg.insn_result(insn) {
        func.dfg.change_to_alias(result, root);
    }
    cursor.set_location(CursorLocation::At(insn));
    cursor.remove_insn(func);
}
