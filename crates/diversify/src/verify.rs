//! Structural checks of the IR invariants every pass must preserve.

use rustc_hash::FxHashSet;

use polymorph_ir::{
    BlockId, ControlFlowGraph, FuncRef, Function, InsnData, InsnId, Module, Value,
};

use crate::{
    domtree::DomTree,
    error::{DiversifyError, Violation},
    Result,
};

/// Verifies every definition of `module`, attributing a failure to `pass`.
pub fn verify_module(module: &Module, pass: &'static str) -> Result<()> {
    for func_ref in module.iter_definitions() {
        verify_function(module, func_ref).map_err(|violation| {
            DiversifyError::InvariantViolation {
                pass,
                func: module.funcs[func_ref].sig.name().to_string(),
                violation,
            }
        })?;
    }
    Ok(())
}

/// Returns the first broken invariant of the function, if any.
pub fn verify_function(module: &Module, func_ref: FuncRef) -> std::result::Result<(), Violation> {
    let func = &module.funcs[func_ref];
    let mut cfg = ControlFlowGraph::new();
    cfg.compute(func);
    let mut domtree = DomTree::new();
    domtree.compute(&cfg);

    let verifier = FunctionVerifier {
        module,
        func,
        cfg: &cfg,
        domtree: &domtree,
    };
    verifier.check_entry()?;
    for block in func.layout.iter_block() {
        verifier.check_block_shape(block)?;
        verifier.check_phis(block)?;
    }
    for block in func.layout.iter_block() {
        for insn in func.layout.iter_insn(block) {
            verifier.check_uses(insn)?;
            verifier.check_call(insn)?;
        }
    }
    Ok(())
}

struct FunctionVerifier<'a> {
    module: &'a Module,
    func: &'a Function,
    cfg: &'a ControlFlowGraph,
    domtree: &'a DomTree,
}

impl FunctionVerifier<'_> {
    fn check_entry(&self) -> std::result::Result<(), Violation> {
        match self.func.layout.entry_block() {
            Some(entry) if self.cfg.pred_num_of(entry) != 0 => {
                Err(Violation::EntryHasPreds(entry))
            }
            _ => Ok(()),
        }
    }

    fn check_block_shape(&self, block: BlockId) -> std::result::Result<(), Violation> {
        let last = self.func.layout.last_insn_of(block);
        if !last.is_some_and(|insn| self.func.dfg.is_terminator(insn)) {
            return Err(Violation::MissingTerminator(block));
        }

        for insn in self.func.layout.iter_insn(block) {
            if self.func.dfg.is_terminator(insn) && Some(insn) != last {
                return Err(Violation::MisplacedTerminator { insn, block });
            }
            for dest in self.func.dfg.branch_info(insn).iter_dests() {
                if !self.func.layout.is_block_inserted(dest) {
                    return Err(Violation::DanglingBranch { insn, dest });
                }
            }
        }
        Ok(())
    }

    fn check_phis(&self, block: BlockId) -> std::result::Result<(), Violation> {
        let mut seen_non_phi = false;
        for insn in self.func.layout.iter_insn(block) {
            if !self.func.dfg.is_phi(insn) {
                seen_non_phi = true;
                continue;
            }
            if seen_non_phi {
                return Err(Violation::MisplacedPhi(insn));
            }

            let incoming = self.func.dfg.insn(insn).phi_blocks();
            let expected = self.cfg.pred_num_of(block);
            let distinct: FxHashSet<_> = incoming.iter().copied().collect();
            if incoming.len() != expected || distinct.len() != expected {
                return Err(Violation::PhiArity {
                    insn,
                    block,
                    expected,
                    found: incoming.len(),
                });
            }
            if let Some(&pred) = self.cfg.preds_of(block).find(|pred| !distinct.contains(pred)) {
                return Err(Violation::PhiMissingIncoming { insn, pred });
            }
        }
        Ok(())
    }

    fn check_uses(&self, user: InsnId) -> std::result::Result<(), Violation> {
        let data = self.func.dfg.insn(user);
        let user_block = self.func.layout.insn_block(user);
        for (idx, &value) in data.args().iter().enumerate() {
            if !self.func.dfg.users(value).any(|u| *u == user) {
                return Err(Violation::StaleUseList { value, user });
            }

            let Value::Insn { insn: def, .. } = *self.func.dfg.value(value) else {
                continue;
            };
            if !self.func.layout.is_insn_inserted(def) {
                return Err(Violation::DanglingUse { value, user });
            }
            if !self.domtree.is_reachable(user_block) {
                continue;
            }

            let dominated = match data {
                // A phi operand is used at the end of its incoming block.
                InsnData::Phi { blocks, .. } => {
                    let def_block = self.func.layout.insn_block(def);
                    !self.domtree.is_reachable(blocks[idx])
                        || self.domtree.dominates(def_block, blocks[idx])
                }
                _ => self.domtree.insn_dominates(self.func, def, user),
            };
            if !dominated {
                return Err(Violation::UseNotDominated { value, user });
            }
        }
        Ok(())
    }

    fn check_call(&self, insn: InsnId) -> std::result::Result<(), Violation> {
        let InsnData::Call { func: callee, args, .. } = self.func.dfg.insn(insn) else {
            return Ok(());
        };
        let sig = &self.module.funcs[*callee].sig;
        let expected = sig.args().len();
        let arity_ok = if sig.is_variadic() {
            args.len() >= expected
        } else {
            args.len() == expected
        };
        if arity_ok {
            Ok(())
        } else {
            Err(Violation::CallArity {
                insn,
                callee: *callee,
                expected,
                found: args.len(),
            })
        }
    }
}
