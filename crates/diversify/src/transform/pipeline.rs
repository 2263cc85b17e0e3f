//! Diversification pipeline for composing and running passes.
//!
//! [`Pass`] names one transform. [`Pipeline`] holds an ordered sequence of passes and runs
//! them against a module, drawing every random decision from a single generator seeded by
//! the caller.

use polymorph_ir::Module;
use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

use super::{
    BlockShuffle, ConstObfuscate, FuncShuffle, FuncSplit, GarbageInsert, InsnReorder, InsnSubst,
    LoopFlatten, LoopSplit, ShadowStack, StackPad, StackSlotShuffle, Transform,
};
use crate::{config::PipelineConfig, verify::verify_module, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Permutes the non-entry blocks of each function.
    BlockShuffle,
    /// Permutes the function definitions of the module.
    FuncShuffle,
    /// Permutes the entry block stack slots.
    StackSlotShuffle,
    /// Exchanges independent adjacent instructions.
    InsnReorder,
    /// Rewrites `add`, `sub` and `mul` into equivalent expansions.
    InsnSubst,
    /// Hides integer literals behind a pair of XORs.
    ConstObfuscate,
    /// Inserts identity computations with unused results.
    GarbageInsert,
    /// Outlines a function tail into a new function.
    FuncSplit,
    /// Flattens a two level counted loop nest.
    LoopFlatten,
    /// Splits a counted loop into consecutive ranges.
    LoopSplit,
    /// Checks return addresses against a shadow stack.
    ShadowStack,
    /// Grows stack frames by a random amount.
    StackPad,
}

/// An ordered sequence of diversification passes.
///
/// Use [`Pipeline::default_pipeline`] for the full preset, or build a custom sequence with
/// [`Pipeline::new`] and [`Pipeline::add_pass`].
///
/// # Analysis lifecycle
///
/// Every pass recomputes the analyses it needs (CFG, dominator tree, loop tree) from the
/// current IR, so passes can be freely reordered or repeated.
#[derive(Debug, Clone)]
pub struct Pipeline {
    passes: Vec<Pass>,
    /// Configuration shared by every pass of this pipeline.
    pub config: PipelineConfig,
}

impl Pipeline {
    /// Create an empty pipeline with the default configuration.
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Default pipeline.
    ///
    /// Loop passes come first since they match on the plain `iv + 1` and `iv < N` shapes
    /// that the instruction level rewrites destroy. Layout shuffles come last.
    pub fn default_pipeline() -> Self {
        let mut p = Self::new();
        p.add_pass(Pass::LoopFlatten)
            .add_pass(Pass::LoopSplit)
            .add_pass(Pass::FuncSplit)
            .add_pass(Pass::InsnSubst)
            .add_pass(Pass::ConstObfuscate)
            .add_pass(Pass::GarbageInsert)
            .add_pass(Pass::InsnReorder)
            .add_pass(Pass::ShadowStack)
            .add_pass(Pass::StackSlotShuffle)
            .add_pass(Pass::StackPad)
            .add_pass(Pass::BlockShuffle)
            .add_pass(Pass::FuncShuffle);
        p
    }

    /// Append a pass to the pipeline. Returns `&mut Self` for chaining.
    pub fn add_pass(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Run every pass in order on `module`.
    ///
    /// The same `seed` always produces the same output for the same input. Returns `true` if
    /// any pass modified the module. The first error stops the run.
    pub fn run(&self, module: &mut Module, seed: u64) -> Result<bool> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut changed = false;
        for &pass in &self.passes {
            changed |= self.run_pass(pass, module, &mut rng)?;
        }
        Ok(changed)
    }

    fn run_pass(&self, pass: Pass, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let config = &self.config;
        let transform: Box<dyn Transform> = match pass {
            Pass::BlockShuffle => Box::new(BlockShuffle::new()),
            Pass::FuncShuffle => Box::new(FuncShuffle::new()),
            Pass::StackSlotShuffle => Box::new(StackSlotShuffle::new()),
            Pass::InsnReorder => Box::new(InsnReorder::new(config.insn_reorder)),
            Pass::InsnSubst => Box::new(InsnSubst::new()),
            Pass::ConstObfuscate => Box::new(ConstObfuscate::new(config.const_obfuscate)),
            Pass::GarbageInsert => Box::new(GarbageInsert::new(config.garbage)),
            Pass::FuncSplit => Box::new(FuncSplit::new(config.func_split)),
            Pass::LoopFlatten => Box::new(LoopFlatten::new(config.loop_flatten)),
            Pass::LoopSplit => Box::new(LoopSplit::new(config.loop_split)),
            Pass::ShadowStack => Box::new(ShadowStack::new(config.shadow_stack)),
            Pass::StackPad => Box::new(StackPad::new(config.stack_pad)),
        };

        let changed = transform.apply(module, rng)?;
        debug!(pass = transform.name(), changed, "pass finished");
        if config.verify_each_pass {
            verify_module(module, transform.name())?;
        }
        Ok(changed)
    }
}

impl Default for Pipeline {
    /// Returns [`Pipeline::default_pipeline`], not an empty pipeline.
    fn default() -> Self {
        Self::default_pipeline()
    }
}
