//! Grows every stack frame by a random number of bytes.
//!
//! A byte array of `granule * k` bytes with `k` in `1..=max_granules` is allocated ahead of
//! every other stack slot and touched once with a zero store right after the alloca prefix, so
//! frame size and the offset of every slot differ per build.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    Function, InsnData, Module, Type,
};
use rand::{rngs::StdRng, Rng};
use tracing::trace;

use super::{definitions, Transform};
use crate::{cfg_edit::entry_allocas, config::StackPadConfig, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct StackPad {
    config: StackPadConfig,
}

impl StackPad {
    pub fn new(config: StackPadConfig) -> Self {
        Self { config }
    }
}

impl Transform for StackPad {
    fn name(&self) -> &'static str {
        "stack_pad"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        if self.config.granule == 0 || self.config.max_granules == 0 {
            return Ok(false);
        }

        let mut changed = false;
        for func_ref in definitions(module) {
            let granules = rng.gen_range(1..=self.config.max_granules);
            let Some(bytes) = self
                .config
                .granule
                .checked_mul(granules)
                .and_then(|bytes| i32::try_from(bytes).ok())
            else {
                trace!(granules, "pad size overflows");
                continue;
            };
            changed |= pad_frame(&mut module.funcs[func_ref], bytes);
        }
        Ok(changed)
    }
}

fn pad_frame(func: &mut Function, bytes: i32) -> bool {
    let Some(entry) = func.layout.entry_block() else {
        return false;
    };
    trace!(func = func.sig.name(), bytes, "pad frame");

    let count = func.dfg.make_imm_value(bytes);
    let mut cursor = InsnInserter::at_location(CursorLocation::BlockTop(entry));
    let pad = cursor.insert_value(func, InsnData::alloca(Type::I8, count));

    if let Some(&last) = entry_allocas(func).last() {
        cursor.set_location(CursorLocation::At(last));
    }
    let zero = func.dfg.make_imm_value(0i8);
    cursor.insert_insn_data(func, InsnData::store(pad, zero));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_interpreter::Machine;
    use polymorph_ir::{builder::test_util::*, Immediate};
    use rand::SeedableRng;

    /// `test_func(a)` spilling `a` to a slot and returning the slot address.
    fn slot_address_module() -> (Module, polymorph_ir::FuncRef) {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::Ptr);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let a = builder.args()[0];
        let slot = builder.alloca(Type::I32, 1);
        builder.store(slot, a);
        builder.ret(Some(slot));
        let func_ref = mb.define(builder);
        (mb.build(), func_ref)
    }

    fn slot_address(module: &Module, func_ref: polymorph_ir::FuncRef) -> u64 {
        let res = Machine::new(module).run(func_ref, &[1i32.into()]).unwrap();
        res.and_then(|e_val| e_val.as_ptr()).unwrap()
    }

    #[test]
    fn pad_leads_the_prefix() {
        let (mut module, func_ref) = slot_address_module();
        let b0 = module.funcs[func_ref].layout.entry_block().unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        assert!(StackPad::default().apply(&mut module, &mut rng).unwrap());

        let func = &module.funcs[func_ref];
        let insns: Vec<_> = func.layout.iter_insn(b0).collect();
        assert_eq!(insns.len(), 5);
        assert_eq!(entry_allocas(func).len(), 2);

        let InsnData::Alloca { ty, args } = func.dfg.insn(insns[0]) else {
            panic!("expected the pad alloca");
        };
        assert_eq!(*ty, Type::I8);
        let bytes = func.dfg.value_imm(args[0]).unwrap().as_i64();
        assert!(bytes % 16 == 0 && (16..=256).contains(&bytes));

        let InsnData::Store { args } = func.dfg.insn(insns[2]) else {
            panic!("expected the pad store");
        };
        assert_eq!(func.dfg.value_insn(args[0]), Some(insns[0]));
        assert_eq!(func.dfg.value_imm(args[1]), Some(Immediate::I8(0)));
    }

    #[test]
    fn slot_offsets_move() {
        let (module, func_ref) = slot_address_module();
        let unpadded = slot_address(&module, func_ref);

        let addresses: Vec<_> = (0..8)
            .map(|seed| {
                let (mut module, func_ref) = slot_address_module();
                let mut rng = StdRng::seed_from_u64(seed);
                StackPad::default().apply(&mut module, &mut rng).unwrap();
                slot_address(&module, func_ref)
            })
            .collect();

        assert!(addresses.iter().all(|addr| *addr > unpadded));
        assert!(addresses.iter().any(|addr| *addr != addresses[0]));
    }

    #[test]
    fn oversized_pads_are_skipped() {
        let (mut module, func_ref) = slot_address_module();
        let pass = StackPad::new(StackPadConfig {
            granule: u32::MAX,
            max_granules: 4,
        });
        let mut rng = StdRng::seed_from_u64(4);
        assert!(!pass.apply(&mut module, &mut rng).unwrap());
        assert_eq!(entry_allocas(&module.funcs[func_ref]).len(), 1);
    }

    #[test]
    fn function_without_slots_is_padded_at_the_top() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let a = builder.args()[0];
        builder.ret(Some(a));
        let func_ref = mb.define(builder);
        let mut module = mb.build();

        let mut rng = StdRng::seed_from_u64(4);
        assert!(StackPad::default().apply(&mut module, &mut rng).unwrap());
        let func = &module.funcs[func_ref];
        let first = func.layout.first_insn_of(b0).unwrap();
        assert!(func.dfg.is_alloca(first));
    }
}
