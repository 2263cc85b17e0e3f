//! Randomizes the layout order of basic blocks.
//!
//! The entry block stays first; every other block is moved together with its instruction
//! list, so successors and dominance are untouched.

use polymorph_ir::{Function, Module};
use rand::{rngs::StdRng, seq::SliceRandom};
use tracing::trace;

use super::{definitions, Transform};
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockShuffle;

impl BlockShuffle {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for BlockShuffle {
    fn name(&self) -> &'static str {
        "block_shuffle"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for func_ref in definitions(module) {
            changed |= shuffle_blocks(&mut module.funcs[func_ref], rng);
        }
        Ok(changed)
    }
}

fn shuffle_blocks(func: &mut Function, rng: &mut StdRng) -> bool {
    let Some(entry) = func.layout.entry_block() else {
        return false;
    };

    let original: Vec<_> = func.layout.iter_block().skip(1).collect();
    if original.len() <= 1 {
        return false;
    }

    let mut blocks = original.clone();
    blocks.shuffle(rng);
    if blocks == original {
        trace!(func = func.sig.name(), "block order unchanged");
        return false;
    }

    let mut prev = entry;
    for block in blocks {
        func.layout.move_block_after(block, prev);
        prev = block;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::{builder::test_util::*, Type};
    use rand::SeedableRng;

    #[test]
    fn entry_stays_first() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let blocks: Vec<_> = (0..6).map(|_| builder.append_block()).collect();
        let a = builder.args()[0];
        for pair in blocks.windows(2) {
            builder.switch_to_block(pair[0]);
            builder.jump(pair[1]);
        }
        builder.switch_to_block(blocks[5]);
        builder.ret(Some(a));
        let func_ref = mb.define(builder);
        let mut module = mb.build();

        let mut rng = StdRng::seed_from_u64(7);
        let mut changed = false;
        for _ in 0..8 {
            changed |= BlockShuffle::new().apply(&mut module, &mut rng).unwrap();
        }
        assert!(changed);

        let func = &module.funcs[func_ref];
        let order: Vec<_> = func.layout.iter_block().collect();
        assert_eq!(order[0], blocks[0]);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, blocks);
        for &block in &blocks[..5] {
            assert_eq!(func.layout.iter_insn(block).count(), 1);
        }
    }

    #[test]
    fn single_successor_is_noop() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let a = builder.args()[0];
        builder.switch_to_block(b0);
        builder.jump(b1);
        builder.switch_to_block(b1);
        builder.ret(Some(a));
        mb.define(builder);
        let mut module = mb.build();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(!BlockShuffle::new().apply(&mut module, &mut rng).unwrap());
    }
}
