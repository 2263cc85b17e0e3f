//! Exchanges adjacent independent instructions.
//!
//! Every exchange is licensed by [`can_exchange`] on the pair as it is laid out at that moment,
//! so a chain of exchanges never moves an insn past another one it was not checked against.

use polymorph_ir::{BlockId, Function, Module};
use rand::{rngs::StdRng, Rng};
use tracing::trace;

use super::{definitions, Transform};
use crate::{alias::can_exchange, config::InsnReorderConfig, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct InsnReorder {
    config: InsnReorderConfig,
}

impl InsnReorder {
    pub fn new(config: InsnReorderConfig) -> Self {
        Self { config }
    }
}

impl Transform for InsnReorder {
    fn name(&self) -> &'static str {
        "insn_reorder"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            let func = &mut module.funcs[func_ref];
            let blocks: Vec<_> = func.layout.iter_block().collect();
            for block in blocks {
                changed |= self.reorder_block(func, block, rng);
            }
        }
        Ok(changed)
    }
}

impl InsnReorder {
    fn reorder_block(&self, func: &mut Function, block: BlockId, rng: &mut StdRng) -> bool {
        let mut changed = false;
        let mut cur = func.layout.first_insn_of(block);

        while let Some(insn) = cur {
            let Some(next) = func.layout.next_insn_of(insn) else {
                break;
            };

            if can_exchange(func, insn, next) && rng.gen_bool(self.config.probability) {
                trace!(func = func.sig.name(), %insn, %next, "exchange");
                func.layout.remove_insn(next);
                func.layout.insert_insn_before(next, insn);
                changed = true;
            } else {
                cur = Some(next);
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::{builder::test_util::*, InsnId, Type};
    use rand::SeedableRng;

    #[test]
    fn dependent_insns_keep_their_order() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let (a, b) = (builder.args()[0], builder.args()[1]);
        let s0 = builder.alloca(Type::I32, 1);
        let s1 = builder.alloca(Type::I32, 1);
        builder.store(s0, a);
        let st0 = builder.last_insn().unwrap();
        builder.store(s1, b);
        let st1 = builder.last_insn().unwrap();
        let x = builder.add(a, b);
        let y = builder.mul(a, b);
        let l0 = builder.load(s0, Type::I32);
        let l1 = builder.load(s1, Type::I32);
        let z = builder.sub(x, y);
        let w = builder.add(l0, l1);
        let r = builder.xor(z, w);
        builder.ret(Some(r));
        let func_ref = mb.define(builder);
        let mut module = mb.build();

        let pass = InsnReorder::new(InsnReorderConfig { probability: 1.0 });
        let mut rng = StdRng::seed_from_u64(5);
        assert!(pass.apply(&mut module, &mut rng).unwrap());

        let func = &module.funcs[func_ref];
        let order: Vec<InsnId> = func.layout.iter_insn(b0).collect();
        let pos_of = |insn: InsnId| order.iter().position(|i| *i == insn).unwrap();
        let pos = |value| pos_of(func.dfg.value_insn(value).unwrap());

        // Every def still precedes its users.
        for (idx, &insn) in order.iter().enumerate() {
            for &arg in func.dfg.insn_args(insn) {
                if func.dfg.value_insn(arg).is_some() {
                    assert!(pos(arg) < idx);
                }
            }
        }
        // Accesses of the same slot keep their order.
        assert!(pos_of(st0) < pos(l0));
        assert!(pos_of(st1) < pos(l1));
        assert!(func.dfg.is_terminator(*order.last().unwrap()));
    }

    #[test]
    fn entry_allocas_stay_a_prefix() {
        for seed in 0..16 {
            let mut mb = TestModuleBuilder::new();
            let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
            let b0 = builder.append_block();
            builder.switch_to_block(b0);
            let (a, b) = (builder.args()[0], builder.args()[1]);
            let s0 = builder.alloca(Type::I32, 1);
            let s1 = builder.alloca(Type::I32, 1);
            let x = builder.add(a, b);
            builder.store(s0, x);
            builder.store(s1, b);
            let l0 = builder.load(s0, Type::I32);
            let l1 = builder.load(s1, Type::I32);
            let r = builder.add(l0, l1);
            builder.ret(Some(r));
            let func_ref = mb.define(builder);
            let mut module = mb.build();

            let pass = InsnReorder::new(InsnReorderConfig { probability: 1.0 });
            let mut rng = StdRng::seed_from_u64(seed);
            pass.apply(&mut module, &mut rng).unwrap();

            let func = &module.funcs[func_ref];
            let order: Vec<InsnId> = func.layout.iter_insn(b0).collect();
            assert_eq!(crate::cfg_edit::entry_allocas(func), order[..2], "seed {seed}");
        }
    }

    #[test]
    fn zero_probability_is_noop() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let (a, b) = (builder.args()[0], builder.args()[1]);
        let x = builder.add(a, b);
        let y = builder.mul(a, b);
        let z = builder.sub(x, y);
        builder.ret(Some(z));
        mb.define(builder);
        let mut module = mb.build();

        let pass = InsnReorder::new(InsnReorderConfig { probability: 0.0 });
        let mut rng = StdRng::seed_from_u64(5);
        assert!(!pass.apply(&mut module, &mut rng).unwrap());
    }
}
