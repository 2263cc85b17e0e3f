//! This module contains dominator tree related structs.
//!
//! The algorithm is based on Keith D. Cooper., Timothy J. Harvey., and Ken Kennedy.: A Simple, Fast Dominance Algorithm:
//! <https://www.cs.rice.edu/~keith/EMBED/dom.pdf>

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use polymorph_ir::{BlockId, ControlFlowGraph, Function, InsnId};

#[derive(Default, Debug)]
pub struct DomTree {
    doms: SecondaryMap<BlockId, PackedOption<BlockId>>,
    rpo: Vec<BlockId>,
}

impl DomTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.doms.clear();
        self.rpo.clear();
    }

    /// Returns the immediate dominator of the `block`.
    /// Returns None if the `block` is unreachable from the entry block, or the `block` is the entry block itself.
    pub fn idom_of(&self, block: BlockId) -> Option<BlockId> {
        if self.rpo.first() == Some(&block) {
            return None;
        }
        self.doms[block].expand()
    }

    /// Returns `true` if block1 strictly dominates block2.
    pub fn strictly_dominates(&self, block1: BlockId, block2: BlockId) -> bool {
        let mut current_block = block2;
        while let Some(block) = self.idom_of(current_block) {
            if block == block1 {
                return true;
            }
            current_block = block;
        }

        false
    }

    /// Returns `true` if block1 dominates block2.
    pub fn dominates(&self, block1: BlockId, block2: BlockId) -> bool {
        if block1 == block2 {
            return true;
        }

        self.strictly_dominates(block1, block2)
    }

    /// Returns `true` if `def` is executed before `user` on every path reaching `user`.
    /// Both insns must be in the layout of `func`.
    pub fn insn_dominates(&self, func: &Function, def: InsnId, user: InsnId) -> bool {
        let def_block = func.layout.insn_block(def);
        let user_block = func.layout.insn_block(user);
        if def_block != user_block {
            return self.strictly_dominates(def_block, user_block);
        }

        let mut next = func.layout.next_insn_of(def);
        while let Some(insn) = next {
            if insn == user {
                return true;
            }
            next = func.layout.next_insn_of(insn);
        }
        false
    }

    pub fn compute(&mut self, cfg: &ControlFlowGraph) {
        self.clear();

        self.rpo = cfg.post_order().collect();
        self.rpo.reverse();

        let block_num = self.rpo.len();

        let mut rpo_nums = SecondaryMap::with_capacity(block_num);
        for (i, &block) in self.rpo.iter().enumerate() {
            rpo_nums[block] = (block_num - i) as u32;
        }

        match self.rpo.first() {
            Some(&entry) => self.doms[entry] = entry.into(),
            None => return,
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let processed_pred =
                    match cfg.preds_of(block).find(|&&pred| self.doms[pred].is_some()) {
                        Some(pred) => *pred,
                        _ => continue,
                    };
                let mut new_dom = processed_pred;

                for &pred in cfg.preds_of(block) {
                    if pred != processed_pred && self.doms[pred].is_some() {
                        new_dom = self.intersect(new_dom, pred, &rpo_nums);
                    }
                }
                if Some(new_dom) != self.doms[block].expand() {
                    changed = true;
                    self.doms[block] = new_dom.into();
                }
            }
        }
    }

    /// Returns `true` if block is reachable from the entry block.
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.doms[block].is_some()
    }

    /// Returns blocks in RPO.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    fn intersect(
        &self,
        mut b1: BlockId,
        mut b2: BlockId,
        rpo_nums: &SecondaryMap<BlockId, u32>,
    ) -> BlockId {
        while b1 != b2 {
            while rpo_nums[b1] < rpo_nums[b2] {
                b1 = self.doms[b1].expand().unwrap_or(b1);
            }
            while rpo_nums[b2] < rpo_nums[b1] {
                b2 = self.doms[b2].expand().unwrap_or(b2);
            }
        }

        b1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use polymorph_ir::{builder::test_util::*, Type};

    fn calc_dom(func: &Function) -> DomTree {
        let mut cfg = ControlFlowGraph::default();
        cfg.compute(func);
        let mut dom_tree = DomTree::default();
        dom_tree.compute(&cfg);
        dom_tree
    }

    #[test]
    fn dom_tree_if_else() {
        let mut test_module_builder = TestModuleBuilder::new();
        let mut builder = test_module_builder.func_builder(&[], Type::Unit);

        let entry_block = builder.append_block();
        let then_block = builder.append_block();
        let else_block = builder.append_block();
        let merge_block = builder.append_block();

        builder.switch_to_block(entry_block);
        let v0 = builder.make_imm_value(true);
        builder.br(v0, else_block, then_block);

        builder.switch_to_block(then_block);
        builder.jump(merge_block);

        builder.switch_to_block(else_block);
        builder.jump(merge_block);

        builder.switch_to_block(merge_block);
        builder.ret(None);

        let func_ref = test_module_builder.define(builder);
        let module = test_module_builder.build();
        let dom_tree = calc_dom(&module.funcs[func_ref]);

        assert_eq!(dom_tree.idom_of(entry_block), None);
        assert_eq!(dom_tree.idom_of(then_block), Some(entry_block));
        assert_eq!(dom_tree.idom_of(else_block), Some(entry_block));
        assert_eq!(dom_tree.idom_of(merge_block), Some(entry_block));
        assert!(dom_tree.is_reachable(entry_block));
        assert!(!dom_tree.dominates(then_block, merge_block));
    }

    #[test]
    fn unreachable_edge() {
        let mut test_module_builder = TestModuleBuilder::new();
        let mut builder = test_module_builder.func_builder(&[], Type::Unit);

        let a = builder.append_block();
        let b = builder.append_block();
        let c = builder.append_block();
        let d = builder.append_block();

        builder.switch_to_block(a);
        builder.jump(b);

        builder.switch_to_block(b);
        builder.ret(None);

        builder.switch_to_block(c);
        builder.jump(d);

        builder.switch_to_block(d);
        builder.ret(None);

        let func_ref = test_module_builder.define(builder);
        let module = test_module_builder.build();
        let dom_tree = calc_dom(&module.funcs[func_ref]);

        assert_eq!(dom_tree.idom_of(b), Some(a));
        assert!(!dom_tree.is_reachable(c));
        assert!(!dom_tree.is_reachable(d));
        assert_eq!(dom_tree.rpo(), &[a, b]);
    }

    #[test]
    fn insn_order_within_block() {
        let mut test_module_builder = TestModuleBuilder::new();
        let mut builder = test_module_builder.func_builder(&[Type::I32], Type::I32);

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let arg = builder.args()[0];
        let v1 = builder.add(arg, arg);
        let v2 = builder.mul(v1, arg);
        builder.ret(Some(v2));

        let func_ref = test_module_builder.define(builder);
        let module = test_module_builder.build();
        let func = &module.funcs[func_ref];
        let dom_tree = calc_dom(func);

        let add = func.dfg.value_insn(v1).unwrap();
        let mul = func.dfg.value_insn(v2).unwrap();
        assert!(dom_tree.insn_dominates(func, add, mul));
        assert!(!dom_tree.insn_dominates(func, mul, add));
    }
}
