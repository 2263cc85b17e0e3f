//! Outlines the tail of a function into a new private function.
//!
//! A block `B` entered only by an unconditional jump from `P` starts the region of every block
//! reachable from `B`. If nothing else enters the region and no value defined in it is used
//! outside, the region is copied into `<name>.split` taking the region inputs as parameters,
//! and `P` tail-calls it instead.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BlockId, ControlFlowGraph, FuncRef, Function, InsnData, Linkage, Module, Signature, Type,
};
use rand::{rngs::StdRng, seq::SliceRandom};
use tracing::{debug, trace};

use super::{definitions, Transform};
use crate::{
    cfg_edit::{fold_phis, remove_blocks, terminator_of, RegionCloner},
    config::FuncSplitConfig,
    live_values::RegionLiveValues,
    Result,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct FuncSplit {
    config: FuncSplitConfig,
}

impl FuncSplit {
    pub fn new(config: FuncSplitConfig) -> Self {
        Self { config }
    }

    fn is_candidate(&self, func: &Function) -> bool {
        func.sig.name() != self.config.entry_point
            && !func.sig.is_variadic()
            && func.layout.block_num() >= 2
    }
}

impl Transform for FuncSplit {
    fn name(&self) -> &'static str {
        "func_split"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut candidates: Vec<_> = definitions(module)
            .into_iter()
            .filter(|func_ref| self.is_candidate(&module.funcs[*func_ref]))
            .collect();
        candidates.shuffle(rng);

        for func_ref in candidates {
            let Some(point) = SplitPoint::find(&module.funcs[func_ref], rng) else {
                trace!(func = module.funcs[func_ref].sig.name(), "no split point");
                continue;
            };
            let callee = point.split(module, func_ref)?;
            debug!(
                func = module.funcs[func_ref].sig.name(),
                callee = module.funcs[callee].sig.name(),
                block = %point.block,
                "split function"
            );
            return Ok(true);
        }

        Ok(false)
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitPoint {
    /// First block of the outlined region.
    block: BlockId,
    /// The only predecessor of `block`.
    pred: BlockId,
}

impl SplitPoint {
    /// Returns a random block that starts an outlinable region.
    fn find(func: &Function, rng: &mut StdRng) -> Option<Self> {
        let entry = func.layout.entry_block()?;
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(func);

        let mut blocks: Vec<_> = func
            .layout
            .iter_block()
            .filter(|block| *block != entry)
            .collect();
        blocks.shuffle(rng);

        blocks.into_iter().find_map(|block| {
            let &[pred] = cfg.preds_of(block).copied().collect::<Vec<_>>().as_slice() else {
                return None;
            };
            let point = Self { block, pred };
            point.is_outlinable(func, &cfg, entry).then_some(point)
        })
    }

    fn is_outlinable(&self, func: &Function, cfg: &ControlFlowGraph, entry: BlockId) -> bool {
        let InsnData::Jump { dests: [dest] } = func.dfg.insn(terminator_of(func, self.pred))
        else {
            return false;
        };
        if *dest != self.block {
            return false;
        }

        let region = cfg.reachable_from(self.block);
        if region.contains(&self.pred) || region.contains(&entry) {
            return false;
        }

        let entered_from_outside = region
            .iter()
            .filter(|block| **block != self.block)
            .any(|block| cfg.preds_of(*block).any(|pred| !region.contains(pred)));
        if entered_from_outside {
            return false;
        }

        // The return address of the outlined copy would differ.
        let reads_frame = region.iter().any(|block| {
            func.layout
                .iter_insn(*block)
                .any(|insn| matches!(func.dfg.insn(insn), InsnData::Intrinsic { .. }))
        });

        !reads_frame && RegionLiveValues::compute(func, &region).is_closed()
    }

    /// Moves the region into a new function and returns it.
    fn split(&self, module: &mut Module, func_ref: FuncRef) -> Result<FuncRef> {
        let name = split_name(module, module.funcs[func_ref].sig.name());
        let func = &mut module.funcs[func_ref];
        fold_phis(func, self.block, self.pred);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(func);
        let region = cfg.reachable_from(self.block);
        let live = RegionLiveValues::compute(func, &region);

        let ret_ty = func.sig.ret_ty();
        let arg_tys: Vec<Type> = live.inputs.iter().map(|v| func.dfg.value_ty(*v)).collect();
        let sig = Signature::new(&name, Linkage::Private, &arg_tys, ret_ty);
        let mut callee = Function::new(&sig);
        let mut cloner = RegionCloner::new();
        for (input, param) in live.inputs.iter().zip(callee.arg_values.iter()) {
            cloner.map_value(*input, *param);
        }
        cloner.clone_into(func, &mut callee, &region);

        let callee_ref = module.insert_function_after(callee, func_ref);
        let func = &mut module.funcs[func_ref];

        let jump = terminator_of(func, self.pred);
        let args: Vec<_> = live.inputs.into_iter().collect();
        let mut cursor = InsnInserter::at_location(CursorLocation::NoWhere);
        cursor.set_before(func, jump);
        let (_, result) =
            cursor.insert_insn_with_result(func, InsnData::call(callee_ref, &args, ret_ty));
        cursor.insert_insn_data(func, InsnData::ret(result));
        cursor.set_location(CursorLocation::At(jump));
        cursor.remove_insn(func);

        remove_blocks(func, &region)?;
        Ok(callee_ref)
    }
}

/// Returns `<base>.split`, or `<base>.split.N` with the smallest free `N`.
fn split_name(module: &Module, base: &str) -> String {
    let name = format!("{base}.split");
    if module.func_by_name(&name).is_none() {
        return name;
    }
    (1..)
        .map(|n| format!("{base}.split.{n}"))
        .find(|name| module.func_by_name(name).is_none())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::builder::test_util::*;
    use rand::SeedableRng;

    use crate::verify::verify_function;

    fn sample() -> (Module, FuncRef) {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let b3 = builder.append_block();
        let (a, b) = (builder.args()[0], builder.args()[1]);

        builder.switch_to_block(b0);
        let x = builder.add(a, b);
        builder.jump(b1);

        builder.switch_to_block(b1);
        let y = builder.mul(x, a);
        let c = builder.slt(y, b);
        builder.br(c, b2, b3);

        builder.switch_to_block(b2);
        builder.ret(Some(y));

        builder.switch_to_block(b3);
        builder.ret(Some(b));

        let func_ref = mb.define(builder);
        (mb.build(), func_ref)
    }

    #[test]
    fn tail_is_outlined() {
        let (mut module, func_ref) = sample();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(FuncSplit::default().apply(&mut module, &mut rng).unwrap());

        let order: Vec<_> = module.iter_functions().collect();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], func_ref);
        let callee = &module.funcs[order[1]];
        assert_eq!(callee.sig.name(), "test_func.split");
        assert_eq!(callee.sig.linkage(), Linkage::Private);
        assert_eq!(callee.sig.args(), &[Type::I32, Type::I32, Type::I32]);
        assert_eq!(callee.layout.block_num(), 3);

        let caller = &module.funcs[func_ref];
        assert_eq!(caller.layout.block_num(), 1);
        let entry = caller.layout.entry_block().unwrap();
        let insns: Vec<_> = caller.layout.iter_insn(entry).collect();
        assert_eq!(insns.len(), 3);
        assert!(matches!(caller.dfg.insn(insns[1]), InsnData::Call { .. }));
        assert!(caller.dfg.is_return(insns[2]));

        verify_function(&module, func_ref).unwrap();
        verify_function(&module, order[1]).unwrap();
    }

    #[test]
    fn entry_point_is_not_split() {
        let (mut module, _) = sample();
        let pass = FuncSplit::new(FuncSplitConfig {
            entry_point: "test_func",
        });
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!pass.apply(&mut module, &mut rng).unwrap());
        assert_eq!(module.iter_functions().count(), 1);
    }

    #[test]
    fn split_names_do_not_collide() {
        let (mut module, _) = sample();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(FuncSplit::default().apply(&mut module, &mut rng).unwrap());
        assert_eq!(split_name(&module, "test_func"), "test_func.split.1");
    }
}
