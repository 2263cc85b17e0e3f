//! Values crossing the boundary of a block region.

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use polymorph_ir::{BlockId, Function, Value, ValueId};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegionLiveValues {
    /// Values defined outside of the region and used inside, in order of first use.
    /// Function arguments are included; immediates, globals and undef are not.
    pub inputs: IndexSet<ValueId>,
    /// Values defined inside of the region and used outside.
    pub outputs: IndexSet<ValueId>,
}

impl RegionLiveValues {
    /// Computes the live values of `region`, visiting its blocks in the given order.
    pub fn compute(func: &Function, region: &[BlockId]) -> Self {
        let in_region: FxHashSet<_> = region.iter().copied().collect();
        let defined_inside = |value: ValueId| match func.dfg.value(value) {
            Value::Insn { insn, .. } => {
                func.layout.is_insn_inserted(*insn)
                    && in_region.contains(&func.layout.insn_block(*insn))
            }
            _ => false,
        };

        let mut live = Self::default();
        for &block in region {
            for insn in func.layout.iter_insn(block) {
                for &arg in func.dfg.insn_args(insn) {
                    if func.dfg.is_constant(arg) || defined_inside(arg) {
                        continue;
                    }
                    live.inputs.insert(arg);
                }

                let Some(result) = func.dfg.insn_result(insn) else {
                    continue;
                };
                let escapes = func.dfg.users(result).any(|user| {
                    func.layout.is_insn_inserted(*user)
                        && !in_region.contains(&func.layout.insn_block(*user))
                });
                if escapes {
                    live.outputs.insert(result);
                }
            }
        }

        live
    }

    pub fn is_closed(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::{builder::test_util::*, Type};

    #[test]
    fn inputs_in_first_use_order() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let (a, b) = (builder.args()[0], builder.args()[1]);

        builder.switch_to_block(b0);
        let x = builder.mul(a, a);
        builder.jump(b1);

        builder.switch_to_block(b1);
        let ten = builder.make_imm_value(10i32);
        let y = builder.add(b, ten);
        let z = builder.add(y, x);
        builder.jump(b2);

        builder.switch_to_block(b2);
        let w = builder.sub(z, a);
        builder.ret(Some(w));

        let func_ref = mb.define(builder);
        let module = mb.build();
        let func = &module.funcs[func_ref];

        let live = RegionLiveValues::compute(func, &[b1, b2]);
        assert_eq!(live.inputs.iter().copied().collect::<Vec<_>>(), vec![b, x, a]);
        assert!(live.is_closed());

        let live = RegionLiveValues::compute(func, &[b1]);
        assert_eq!(live.inputs.iter().copied().collect::<Vec<_>>(), vec![b, x]);
        assert_eq!(live.outputs.iter().copied().collect::<Vec<_>>(), vec![z]);
        assert!(!live.is_closed());
    }
}
