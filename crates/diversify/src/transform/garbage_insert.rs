//! Inserts identity computations whose results are never used.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, Function, Immediate, InsnData, InsnId, Module, ValueId,
};
use rand::{rngs::StdRng, Rng};

use super::{definitions, Transform};
use crate::{config::GarbageConfig, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct GarbageInsert {
    config: GarbageConfig,
}

impl GarbageInsert {
    pub fn new(config: GarbageConfig) -> Self {
        Self { config }
    }
}

impl Transform for GarbageInsert {
    fn name(&self) -> &'static str {
        "garbage_insert"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            let func = &mut module.funcs[func_ref];
            let candidates: Vec<_> = func
                .layout
                .iter_block()
                .flat_map(|block| func.layout.iter_insn(block))
                .filter_map(|insn| eligible_result(func, insn).map(|value| (insn, value)))
                .collect();

            for (insn, value) in candidates {
                if rng.gen_bool(self.config.probability) {
                    insert_garbage(func, insn, value, rng);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

/// Returns the result of `insn` if garbage may follow it.
fn eligible_result(func: &Function, insn: InsnId) -> Option<ValueId> {
    let data = func.dfg.insn(insn);
    if data.is_terminator() || data.is_phi() || data.is_alloca() {
        return None;
    }
    let value = func.dfg.insn_result(insn)?;
    let ty = func.dfg.value_ty(value);
    (ty.is_integral() && ty.bits() > 1).then_some(value)
}

fn insert_garbage(func: &mut Function, insn: InsnId, x: ValueId, rng: &mut StdRng) {
    let ty = func.dfg.value_ty(x);
    let n = func
        .dfg
        .make_imm_value(Immediate::from_i64(rng.gen_range(1..=100), ty));
    let mut cursor = InsnInserter::at_location(CursorLocation::At(insn));
    let mut emit = |func: &mut Function, code, lhs, rhs| -> ValueId {
        cursor.insert_value(func, InsnData::binary(code, lhs, rhs))
    };

    match rng.gen_range(0..5) {
        0 => {
            let added = emit(func, BinaryOp::Add, x, n);
            emit(func, BinaryOp::Sub, added, n);
        }
        1 => {
            let two = func.dfg.make_imm_value(Immediate::from_i64(2, ty));
            let doubled = emit(func, BinaryOp::Mul, x, two);
            emit(func, BinaryOp::Sdiv, doubled, two);
        }
        2 => {
            let masked = emit(func, BinaryOp::Xor, x, n);
            emit(func, BinaryOp::Xor, masked, n);
        }
        3 => {
            let zero = func.dfg.make_imm_value(Immediate::zero(ty));
            emit(func, BinaryOp::Or, x, zero);
        }
        _ => {
            let all_one = func.dfg.make_imm_value(Immediate::all_one(ty));
            emit(func, BinaryOp::And, x, all_one);
        }
    }
}
