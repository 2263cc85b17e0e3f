//! Randomizes the order of function definitions in a module.

use polymorph_ir::Module;
use rand::{rngs::StdRng, seq::SliceRandom};

use super::{definitions, Transform};
use crate::Result;

/// Permutes definitions among the positions they occupy in [`Module::func_order`].
/// Declarations keep their positions.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuncShuffle;

impl FuncShuffle {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for FuncShuffle {
    fn name(&self) -> &'static str {
        "func_shuffle"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool> {
        let original = definitions(module);
        if original.len() <= 1 {
            return Ok(false);
        }

        let mut shuffled = original.clone();
        shuffled.shuffle(rng);
        if shuffled == original {
            return Ok(false);
        }

        let mut shuffled = shuffled.into_iter();
        for slot in module.func_order.iter_mut() {
            if !module.funcs[*slot].is_declaration() {
                if let Some(func_ref) = shuffled.next() {
                    *slot = func_ref;
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymorph_ir::{Linkage, ModuleBuilder, Signature, Type};
    use rand::SeedableRng;

    #[test]
    fn declarations_keep_positions() {
        let mut mb = ModuleBuilder::new();
        let mut defs = Vec::new();
        let mut decls = Vec::new();
        for i in 0..6 {
            if i % 2 == 0 {
                let sig = Signature::new(&format!("ext{i}"), Linkage::External, &[], Type::Unit);
                decls.push(mb.declare_function(sig));
                continue;
            }
            let sig = Signature::new(&format!("f{i}"), Linkage::Public, &[], Type::Unit);
            let func_ref = mb.declare_function(sig);
            let mut builder = mb.func_builder(func_ref);
            let b0 = builder.append_block();
            builder.switch_to_block(b0);
            builder.ret(None);
            defs.push(mb.define(builder));
        }
        let mut module = mb.build();

        let mut rng = StdRng::seed_from_u64(3);
        let mut changed = false;
        for _ in 0..4 {
            changed |= FuncShuffle::new().apply(&mut module, &mut rng).unwrap();
        }
        assert!(changed);

        for (pos, decl) in [0, 2, 4].into_iter().zip(&decls) {
            assert_eq!(module.func_order[pos], *decl);
        }
        let mut placed: Vec<_> = [1, 3, 5].iter().map(|pos| module.func_order[*pos]).collect();
        placed.sort();
        assert_eq!(placed, defs);
    }
}
