//! Splits a counted loop `for i in 0..N` into two or three consecutive loops over
//! `0..N/k`, `N/k..2N/k` and so on.
//!
//! Each part is a full copy of the loop. A part starts its induction variable at the bound of
//! the previous part and takes every other loop-carried value from the previous part's header.
//! The original loop is removed afterwards.

use polymorph_ir::{
    BlockId, ControlFlowGraph, Function, Immediate, InsnId, Module, ValueId,
};
use rand::{rngs::StdRng, Rng};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::{
    definitions,
    loop_pattern::{match_counted_loop, CountedLoop},
    Transform,
};
use crate::{
    cfg_edit::{
        phis_of, remove_blocks, retarget_phis, set_phi_incoming, terminator_of, RegionCloner,
    },
    config::LoopSplitConfig,
    domtree::DomTree,
    loop_analysis::LoopTree,
    Result,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoopSplit {
    config: LoopSplitConfig,
}

impl LoopSplit {
    pub fn new(config: LoopSplitConfig) -> Self {
        Self { config }
    }

    /// Splits at most one loop of `func`.
    fn run_on_func(&self, func: &mut Function, rng: &mut StdRng) -> Result<bool> {
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(func);
        let mut domtree = DomTree::new();
        domtree.compute(&cfg);
        let mut lpt = LoopTree::new();
        lpt.compute(&cfg, &domtree);

        let bounds = self.config.min_bound..=self.config.max_bound;
        for lp in lpt.loops() {
            let Some(counted) = match_counted_loop(func, &cfg, &lpt, lp, bounds.clone()) else {
                continue;
            };
            if !rng.gen_bool(self.config.probability) {
                continue;
            }

            let parts = rng.gen_range(2..=3);
            let blocks = lpt.blocks_of(&cfg, lp);
            debug!(
                func = func.sig.name(),
                header = %counted.header,
                bound = counted.bound,
                parts,
                "split loop"
            );
            split_loop(func, &counted, &blocks, parts)?;
            return Ok(true);
        }

        Ok(false)
    }
}

impl Transform for LoopSplit {
    fn name(&self) -> &'static str {
        "loop_split"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            changed |= self.run_on_func(&mut module.funcs[func_ref], rng)?;
        }
        Ok(changed)
    }
}

/// Returns the iteration boundaries `[0, .., N]` of `parts` ranges covering `0..bound`.
fn split_points(bound: i64, parts: i64) -> Vec<i64> {
    (0..=parts).map(|k| bound * k / parts).collect()
}

fn split_loop(
    func: &mut Function,
    counted: &CountedLoop,
    blocks: &[BlockId],
    parts: i64,
) -> Result<()> {
    let points = split_points(counted.bound, parts);
    let header_phis = phis_of(func, counted.header);
    let escaping = escaping_uses(func, blocks);

    let mut after = *blocks.last().unwrap_or(&counted.header);
    let mut prev: Option<(BlockId, RegionCloner)> = None;
    let mut first_header = None;

    for range in points.windows(2) {
        let (lo, hi) = (range[0], range[1]);
        let mut cloner = RegionCloner::new();
        let copies = cloner.clone_within(func, blocks, after);
        after = copies[copies.len() - 1];
        let header = cloner.block(counted.header);
        trace!(func = func.sig.name(), %header, lo, hi, "loop part");

        let hi = func.dfg.make_imm_value(Immediate::from_i64(hi, counted.ty));
        func.dfg.replace_insn_arg_at(cloner.insn(counted.cmp), 1, hi);

        match &prev {
            None => first_header = Some(header),
            Some((prev_header, prev_cloner)) => {
                let lo = func.dfg.make_imm_value(Immediate::from_i64(lo, counted.ty));
                for &phi in &header_phis {
                    let init = if phi == counted.iv_phi {
                        lo
                    } else {
                        let Some(result) = func.dfg.insn_result(phi) else {
                            continue;
                        };
                        prev_cloner.value(result)
                    };
                    let new_phi = cloner.insn(phi);
                    set_phi_incoming(func, new_phi, counted.preheader, init);
                    func.dfg
                        .rewrite_phi_block(new_phi, counted.preheader, *prev_header);
                }

                let prev_term = terminator_of(func, *prev_header);
                func.dfg.rewrite_branch_dest(prev_term, counted.exit, header);
            }
        }
        prev = Some((header, cloner));
    }

    let (Some(first_header), Some((last_header, last))) = (first_header, prev) else {
        return Ok(());
    };

    let entry_jump = terminator_of(func, counted.preheader);
    func.dfg
        .rewrite_branch_dest(entry_jump, counted.header, first_header);
    retarget_phis(func, counted.exit, counted.header, last_header);
    for (value, user) in escaping {
        func.dfg.replace_insn_arg(user, value, last.value(value));
    }

    remove_blocks(func, blocks)
}

/// Collects the values defined in `blocks` together with their users outside of `blocks`.
fn escaping_uses(func: &Function, blocks: &[BlockId]) -> Vec<(ValueId, InsnId)> {
    let region: FxHashSet<_> = blocks.iter().copied().collect();
    let mut uses = Vec::new();
    for &block in blocks {
        for insn in func.layout.iter_insn(block) {
            let Some(value) = func.dfg.insn_result(insn) else {
                continue;
            };
            for &user in func.dfg.users(value) {
                if !region.contains(&func.layout.insn_block(user)) {
                    uses.push((value, user));
                }
            }
        }
    }
    uses.sort_unstable();
    uses.dedup();
    uses
}
