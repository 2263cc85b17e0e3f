//! Hides integer literals behind a pair of XORs with a random mask.
//!
//! An immediate operand `c` becomes `x ^ r` where `x` holds `c ^ r`. With the opacity
//! barrier enabled, `x` is stored to a throwaway stack slot and loaded back right away, so a
//! later simplification cannot fold the pair into the literal again.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, Function, Immediate, InsnData, InsnId, Module, Type, ValueId,
};
use rand::{rngs::StdRng, Rng};
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{definitions, Transform};
use crate::{cfg_edit::entry_allocas, config::ConstObfuscateConfig, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConstObfuscate {
    config: ConstObfuscateConfig,
}

impl ConstObfuscate {
    pub fn new(config: ConstObfuscateConfig) -> Self {
        Self { config }
    }
}

impl Transform for ConstObfuscate {
    fn name(&self) -> &'static str {
        "const_obfuscate"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            let mut rewriter = ConstRewriter::new(self.config.opacity_barrier);
            changed |= rewriter.run(&mut module.funcs[func_ref], rng);
        }
        Ok(changed)
    }
}

struct ConstRewriter {
    opacity_barrier: bool,
    /// Barrier slot of each integer type, created on first use.
    slots: FxHashMap<Type, ValueId>,
}

impl ConstRewriter {
    fn new(opacity_barrier: bool) -> Self {
        Self {
            opacity_barrier,
            slots: FxHashMap::default(),
        }
    }

    fn run(&mut self, func: &mut Function, rng: &mut StdRng) -> bool {
        let targets: Vec<_> = func
            .layout
            .iter_block()
            .flat_map(|block| func.layout.iter_insn(block))
            .filter(|insn| is_eligible(func.dfg.insn(*insn)))
            .collect();

        let mut changed = false;
        for insn in targets {
            for idx in 0..func.dfg.insn_args(insn).len() {
                let arg = func.dfg.insn_args(insn)[idx];
                let Some(imm) = func.dfg.value_imm(arg) else {
                    continue;
                };
                let masked = self.mask(func, insn, imm, rng);
                func.dfg.replace_insn_arg_at(insn, idx, masked);
                changed = true;
            }
        }
        changed
    }

    /// Emits `(imm ^ r) ^ r` right before `insn` and returns its value.
    fn mask(
        &mut self,
        func: &mut Function,
        insn: InsnId,
        imm: Immediate,
        rng: &mut StdRng,
    ) -> ValueId {
        let ty = imm.ty();
        let key = Immediate::from_i64(rng.gen::<i64>(), ty);
        let key_value = func.dfg.make_imm_value(key);
        let hidden = func.dfg.make_imm_value(imm ^ key);
        trace!(func = func.sig.name(), %insn, %imm, %key, "mask immediate");

        let slot = self.opacity_barrier.then(|| self.slot(func, ty));
        let mut cursor = InsnInserter::at_location(CursorLocation::NoWhere);
        cursor.set_before(func, insn);
        let hidden = match slot {
            Some(slot) => {
                cursor.insert_insn_data(func, InsnData::store(slot, hidden));
                cursor.insert_value(func, InsnData::load(slot, ty))
            }
            None => hidden,
        };
        cursor.insert_value(func, InsnData::binary(BinaryOp::Xor, hidden, key_value))
    }

    /// Returns the barrier slot for `ty`, appending it to the entry alloca prefix if needed.
    fn slot(&mut self, func: &mut Function, ty: Type) -> ValueId {
        if let Some(&slot) = self.slots.get(&ty) {
            return slot;
        }

        let loc = match entry_allocas(func).last() {
            Some(&last) => CursorLocation::At(last),
            None => CursorLocation::BlockTop(func.layout.entry_block().unwrap_or_else(|| {
                panic!("`{}` has no entry block", func.sig.name())
            })),
        };
        let mut cursor = InsnInserter::at_location(loc);
        let count = func.dfg.make_imm_value(1i32);
        let slot = cursor.insert_value(func, InsnData::alloca(ty, count));
        self.slots.insert(ty, slot);
        slot
    }
}

/// Returns `false` for insns whose immediate operands must stay literal.
fn is_eligible(data: &InsnData) -> bool {
    !matches!(
        data,
        InsnData::BrTable { .. }
            | InsnData::Alloca { .. }
            | InsnData::Gep { .. }
            | InsnData::Intrinsic { .. }
            | InsnData::Phi { .. }
    )
}
