//! Randomizes the order of stack slots so that frame offsets differ per build.

use polymorph_ir::{Function, Module};
use rand::{rngs::StdRng, seq::SliceRandom};

use super::{definitions, Transform};
use crate::{cfg_edit::entry_allocas, Result};

/// Permutes the leading run of `alloca` insns of every entry block.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackSlotShuffle;

impl StackSlotShuffle {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for StackSlotShuffle {
    fn name(&self) -> &'static str {
        "stack_slot_shuffle"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            changed |= shuffle_slots(&mut module.funcs[func_ref], rng);
        }
        Ok(changed)
    }
}

fn shuffle_slots(func: &mut Function, rng: &mut StdRng) -> bool {
    let original = entry_allocas(func);
    if original.len() <= 1 {
        return false;
    }

    let mut slots = original.clone();
    slots.shuffle(rng);
    if slots == original {
        return false;
    }

    let entry = func.layout.insn_block(original[0]);
    for &slot in &original {
        func.layout.remove_insn(slot);
    }
    for &slot in slots.iter().rev() {
        func.layout.prepend_insn(slot, entry);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::{builder::test_util::*, Type};
    use rand::SeedableRng;

    #[test]
    fn only_the_prefix_moves() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let a = builder.args()[0];
        let slots: Vec<_> = (0..5).map(|_| builder.alloca(Type::I32, 1)).collect();
        for &slot in &slots {
            builder.store(slot, a);
        }
        let late = builder.alloca(Type::I64, 1);
        let v = builder.load(slots[0], Type::I32);
        builder.store(late, a);
        builder.ret(Some(v));
        let func_ref = mb.define(builder);
        let mut module = mb.build();

        let before: Vec<_> = module.funcs[func_ref].layout.iter_insn(b0).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let mut changed = false;
        for _ in 0..4 {
            changed |= StackSlotShuffle::new().apply(&mut module, &mut rng).unwrap();
        }
        assert!(changed);

        let func = &module.funcs[func_ref];
        let after: Vec<_> = func.layout.iter_insn(b0).collect();
        let mut prefix = after[..5].to_vec();
        prefix.sort();
        let mut expected = before[..5].to_vec();
        expected.sort();
        assert_eq!(prefix, expected);
        assert_eq!(after[5..], before[5..]);
    }
}
