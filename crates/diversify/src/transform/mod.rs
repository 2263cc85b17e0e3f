//! Randomized, semantics preserving rewrites of a [`Module`].

pub mod block_shuffle;
pub mod const_obfuscate;
pub mod func_shuffle;
pub mod func_split;
pub mod garbage_insert;
pub mod insn_reorder;
pub mod insn_subst;
pub mod loop_flatten;
mod loop_pattern;
pub mod loop_split;
pub mod pipeline;
pub mod shadow_stack;
pub mod stack_pad;
pub mod stack_slot_shuffle;

use polymorph_ir::Module;
use rand::rngs::StdRng;

use crate::Result;

pub use block_shuffle::BlockShuffle;
pub use const_obfuscate::ConstObfuscate;
pub use func_shuffle::FuncShuffle;
pub use func_split::FuncSplit;
pub use garbage_insert::GarbageInsert;
pub use insn_reorder::InsnReorder;
pub use insn_subst::InsnSubst;
pub use loop_flatten::LoopFlatten;
pub use loop_split::LoopSplit;
pub use pipeline::{Pass, Pipeline};
pub use shadow_stack::ShadowStack;
pub use stack_pad::StackPad;
pub use stack_slot_shuffle::StackSlotShuffle;

/// A single diversification pass.
pub trait Transform {
    /// Returns the pass name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Rewrites `module` in place, drawing every random decision from `rng`.
    /// Returns `true` if the module was modified.
    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool>;
}

/// Returns the definitions of `module` in layout order.
///
/// Collected up front so that passes can mutate the module while iterating.
fn definitions(module: &Module) -> Vec<polymorph_ir::FuncRef> {
    module.iter_definitions().collect()
}
