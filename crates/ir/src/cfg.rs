use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use crate::{BlockId, Function, InsnId};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    entry: PackedOption<BlockId>,
    blocks: SecondaryMap<BlockId, BlockNode>,
    /// Blocks ending with `return` or `unreachable`.
    pub exits: smallvec::SmallVec<[BlockId; 8]>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, func: &Function) {
        self.clear();

        self.entry = func.layout.entry_block().into();

        for block in func.layout.iter_block() {
            if let Some(last_insn) = func.layout.last_insn_of(block) {
                self.analyze_insn(func, last_insn);
            }
        }
    }

    pub fn preds_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].preds.iter()
    }

    pub fn succs_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].succs.iter()
    }

    pub fn pred_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].preds.len()
    }

    pub fn succ_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].succs.len()
    }

    pub fn is_pred_of(&self, pred: BlockId, block: BlockId) -> bool {
        self.blocks[block].preds.contains(&pred)
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry.expand()
    }

    pub fn post_order(&self) -> CfgPostOrder<'_> {
        CfgPostOrder::new(self)
    }

    /// Returns `block` and every block reachable from it, in depth first pre-order.
    pub fn reachable_from(&self, block: BlockId) -> Vec<BlockId> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack = vec![block];
        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }
            order.push(block);
            let succs: Vec<_> = self.succs_of(block).copied().collect();
            stack.extend(succs.into_iter().rev());
        }
        order
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to].preds.insert(from);
        self.blocks[from].succs.insert(to);
    }

    pub fn clear(&mut self) {
        self.entry = None.into();
        self.blocks.clear();
        self.exits.clear();
    }

    fn analyze_insn(&mut self, func: &Function, insn: InsnId) {
        let block = func.layout.insn_block(insn);
        if func.dfg.is_exit(insn) {
            self.exits.push(block);
        }

        for dest in func.dfg.branch_info(insn).iter_dests() {
            self.add_edge(block, dest);
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
struct BlockNode {
    preds: BTreeSet<BlockId>,
    succs: BTreeSet<BlockId>,
}

pub struct CfgPostOrder<'a> {
    cfg: &'a ControlFlowGraph,
    node_state: SecondaryMap<BlockId, NodeState>,
    stack: Vec<BlockId>,
}

impl<'a> CfgPostOrder<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self {
            cfg,
            node_state: SecondaryMap::default(),
            stack: cfg.entry().into_iter().collect(),
        }
    }
}

impl Iterator for CfgPostOrder<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        while let Some(&block) = self.stack.last() {
            match self.node_state[block] {
                NodeState::Unvisited => {
                    self.node_state[block] = NodeState::Visited;
                    for &succ in self.cfg.succs_of(block) {
                        if self.node_state[succ] == NodeState::Unvisited {
                            self.stack.push(succ);
                        }
                    }
                }
                NodeState::Visited => {
                    self.stack.pop();
                    self.node_state[block] = NodeState::Finished;
                    return Some(block);
                }
                NodeState::Finished => {
                    self.stack.pop();
                }
            }
        }

        None
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    #[default]
    Unvisited,
    Visited,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::test_util::TestModuleBuilder, Type};

    #[test]
    fn diamond() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I1], Type::Unit);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let b3 = builder.append_block();
        let cond = builder.args()[0];

        builder.switch_to_block(b0);
        builder.br(cond, b1, b2);
        builder.switch_to_block(b1);
        builder.jump(b3);
        builder.switch_to_block(b2);
        builder.jump(b3);
        builder.switch_to_block(b3);
        builder.ret(None);

        let func_ref = mb.define(builder);
        let module = mb.build();

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&module.funcs[func_ref]);
        assert_eq!(cfg.entry(), Some(b0));
        assert_eq!(cfg.pred_num_of(b3), 2);
        assert_eq!(cfg.succ_num_of(b0), 2);
        assert_eq!(cfg.exits.as_slice(), &[b3]);

        let po: Vec<_> = cfg.post_order().collect();
        assert_eq!(po.len(), 4);
        assert_eq!(po.last(), Some(&b0));
        assert_eq!(po[0], b3);

        assert_eq!(cfg.reachable_from(b1), vec![b1, b3]);
    }
}
