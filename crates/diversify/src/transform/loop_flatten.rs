//! Flattens a perfect nest of two counted loops into a single loop.
//!
//! ```text
//! for i in 0..N {            for k in 0..N * M {
//!     for j in 0..M {    =>      let (i, j) = (k / M, k % M);
//!         body(i, j)             body(i, j)
//!     }                      }
//! }
//! ```
//! The nest is accepted only if neither header carries anything besides its induction
//! variable, the inner preheader and the outer latch hold nothing but control flow and the
//! increment, and `N * M` fits the induction variable type.

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, BlockId, CmpOp, ControlFlowGraph, Function, Immediate, InsnData, Module, Type,
    ValueId,
};
use rand::{rngs::StdRng, Rng};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::{
    definitions,
    loop_pattern::{insn_num, match_counted_loop, CountedLoop},
    Transform,
};
use crate::{
    cfg_edit::{remove_blocks, retarget_phis, terminator_of, RegionCloner},
    config::LoopFlattenConfig,
    domtree::DomTree,
    loop_analysis::{Loop, LoopTree},
    Result,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoopFlatten {
    config: LoopFlattenConfig,
}

impl LoopFlatten {
    pub fn new(config: LoopFlattenConfig) -> Self {
        Self { config }
    }

    /// Flattens at most one nest of `func`.
    fn run_on_func(&self, func: &mut Function, rng: &mut StdRng) -> Result<bool> {
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(func);
        let mut domtree = DomTree::new();
        domtree.compute(&cfg);
        let mut lpt = LoopTree::new();
        lpt.compute(&cfg, &domtree);

        for lp in lpt.loops() {
            let Some(nest) = LoopNest::match_nest(func, &cfg, &lpt, lp, self.config.max_bound)
            else {
                continue;
            };
            if !rng.gen_bool(self.config.probability) {
                continue;
            }

            debug!(
                func = func.sig.name(),
                header = %nest.outer.header,
                outer = nest.outer.bound,
                inner = nest.inner.bound,
                "flatten loop nest"
            );
            nest.flatten(func)?;
            return Ok(true);
        }

        Ok(false)
    }
}

impl Transform for LoopFlatten {
    fn name(&self) -> &'static str {
        "loop_flatten"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            changed |= self.run_on_func(&mut module.funcs[func_ref], rng)?;
        }
        Ok(changed)
    }
}

struct LoopNest {
    outer: CountedLoop,
    inner: CountedLoop,
    /// Every block of the outer loop.
    blocks: Vec<BlockId>,
    /// Blocks of the inner loop without its header, body entry first.
    inner_body: Vec<BlockId>,
}

impl LoopNest {
    fn match_nest(
        func: &Function,
        cfg: &ControlFlowGraph,
        lpt: &LoopTree,
        lp: Loop,
        max_bound: i64,
    ) -> Option<Self> {
        let outer = match_counted_loop(func, cfg, lpt, lp, 1..=max_bound)?;
        let &[inner_lp] = lpt.children_of(outer.lp) else {
            return None;
        };
        let inner = match_counted_loop(func, cfg, lpt, inner_lp, 1..=max_bound)?;

        if outer.ty != inner.ty
            || outer.body != inner.preheader
            || inner.exit != outer.latch
            || insn_num(func, inner.preheader) != 1
            || insn_num(func, outer.latch) != 2
            || insn_num(func, outer.header) != 3
            || insn_num(func, inner.header) != 3
        {
            return None;
        }
        let next_block = func.dfg.value_insn(outer.next).map(|insn| func.layout.insn_block(insn));
        if next_block != Some(outer.latch) {
            return None;
        }

        let blocks = lpt.blocks_of(cfg, lp);
        let inner_blocks = lpt.blocks_of(cfg, inner_lp);
        if blocks.len() != inner_blocks.len() + 3 {
            return None;
        }

        let total = outer.bound.checked_mul(inner.bound)?;
        if total > signed_max(outer.ty) {
            return None;
        }

        // Only the outer induction variable may be observed after the nest.
        let region: FxHashSet<_> = blocks.iter().copied().collect();
        for &block in &blocks {
            for insn in func.layout.iter_insn(block) {
                let Some(value) = func.dfg.insn_result(insn) else {
                    continue;
                };
                if value != outer.iv
                    && func
                        .dfg
                        .users(value)
                        .any(|user| !region.contains(&func.layout.insn_block(*user)))
                {
                    return None;
                }
            }
        }

        let inner_body = inner_blocks
            .into_iter()
            .filter(|block| *block != inner.header)
            .collect();
        Some(Self {
            outer,
            inner,
            blocks,
            inner_body,
        })
    }

    fn flatten(self, func: &mut Function) -> Result<()> {
        let Self {
            outer,
            inner,
            blocks,
            inner_body,
        } = self;
        let ty = outer.ty;
        let imm = |func: &mut Function, value: i64| {
            func.dfg.make_imm_value(Immediate::from_i64(value, ty))
        };

        let header = func.dfg.make_block();
        let prologue = func.dfg.make_block();
        let latch = func.dfg.make_block();
        let exit = func.dfg.make_block();
        func.layout.insert_block_before(header, outer.header);
        func.layout.insert_block_after(prologue, header);

        // header: k = phi (0 preheader) (k + 1 latch); br (k < N * M) prologue exit
        let zero = imm(func, 0);
        let total = imm(func, outer.bound * inner.bound);
        let mut cursor = InsnInserter::at_location(CursorLocation::BlockBottom(header));
        let (k_phi, k) = cursor.insert_insn_with_result(func, InsnData::phi(ty));
        let k = k.unwrap_or_else(|| unreachable!());
        func.dfg.append_phi_arg(k_phi, zero, outer.preheader);
        let cond = cursor.insert_value(func, InsnData::cmp(CmpOp::Slt, k, total));
        cursor.insert_insn_data(func, InsnData::branch(cond, prologue, exit));

        // prologue: i = k / M; j = k % M
        let inner_bound = imm(func, inner.bound);
        cursor.set_location(CursorLocation::BlockBottom(prologue));
        let i = cursor.insert_value(func, InsnData::binary(BinaryOp::Sdiv, k, inner_bound));
        let j = cursor.insert_value(func, InsnData::binary(BinaryOp::Srem, k, inner_bound));

        let mut cloner = RegionCloner::new();
        cloner.map_value(outer.iv, i);
        cloner.map_value(inner.iv, j);
        let copies = cloner.clone_within(func, &inner_body, prologue);
        let body = cloner.block(inner.body);
        cursor.set_location(CursorLocation::BlockBottom(prologue));
        cursor.insert_insn_data(func, InsnData::jump(body));
        trace!(func = func.sig.name(), %header, %body, "flattened body");

        // The copied body returns to the flat latch instead of the inner header.
        for &copy in &copies {
            let term = terminator_of(func, copy);
            func.dfg.rewrite_branch_dest(term, inner.header, latch);
        }
        retarget_phis(func, body, inner.header, prologue);

        let last_copy = copies.last().copied().unwrap_or(prologue);
        func.layout.insert_block_after(latch, last_copy);
        func.layout.insert_block_after(exit, latch);

        let one = imm(func, 1);
        cursor.set_location(CursorLocation::BlockBottom(latch));
        let k_next = cursor.insert_value(func, InsnData::binary(BinaryOp::Add, k, one));
        cursor.insert_insn_data(func, InsnData::jump(header));
        func.dfg.append_phi_arg(k_phi, k_next, latch);

        cursor.set_location(CursorLocation::BlockBottom(exit));
        cursor.insert_insn_data(func, InsnData::jump(outer.exit));

        // Enter the flat loop and leave it through its own exit block.
        let entry_jump = terminator_of(func, outer.preheader);
        func.dfg
            .rewrite_branch_dest(entry_jump, outer.header, header);
        retarget_phis(func, outer.exit, outer.header, exit);

        let region: FxHashSet<_> = blocks.iter().copied().collect();
        let outside_users: Vec<_> = func
            .dfg
            .users(outer.iv)
            .copied()
            .filter(|user| !region.contains(&func.layout.insn_block(*user)))
            .collect();
        let outer_bound: ValueId = imm(func, outer.bound);
        for user in outside_users {
            func.dfg.replace_insn_arg(user, outer.iv, outer_bound);
        }

        remove_blocks(func, &blocks)
    }
}

fn signed_max(ty: Type) -> i64 {
    match ty.bits() {
        bits @ 1..=63 => (1i64 << (bits - 1)) - 1,
        _ => i64::MAX,
    }
}
