//! Property tests checking that rewritten arithmetic and reordered blocks compute the same
//! values for any input.

mod common;

use common::{binary_module, memory_module, run_binary};
use polymorph_diversify::{alias::can_exchange, config::InsnReorderConfig, Pass, Pipeline};
use polymorph_ir::{InsnId, Module};
use proptest::prelude::*;

fn diversify(mut module: Module, pass: Pass, seed: u64) -> Module {
    let mut pipeline = Pipeline::new();
    pipeline.config.verify_each_pass = true;
    pipeline.add_pass(pass);
    pipeline.run(&mut module, seed).unwrap();
    module
}

/// `((a + b) ^ (a - b)) | (a & b)` with a shifted product mixed in.
fn bitwise_module() -> Module {
    binary_module(|builder, a, b| {
        let sum = builder.add(a, b);
        let diff = builder.sub(a, b);
        let x = builder.xor(sum, diff);
        let y = builder.and(a, b);
        let z = builder.or(x, y);
        let p = builder.mul(a, b);
        let three = builder.make_imm_value(3i32);
        let p = builder.sar(p, three);
        let n = builder.not(p);
        builder.add(z, n)
    })
}

/// `(a + c1) * c2 ^ b` with constants `c1` and `c2`.
fn constant_module(c1: i32, c2: i32) -> Module {
    binary_module(move |builder, a, b| {
        let c1 = builder.make_imm_value(c1);
        let c2 = builder.make_imm_value(c2);
        let x = builder.add(a, c1);
        let x = builder.mul(x, c2);
        builder.xor(x, b)
    })
}

/// Adjacent pairs of the entry block of `main` that may be exchanged.
fn exchangeable_pairs(module: &Module) -> Vec<(InsnId, InsnId)> {
    let func = &module.funcs[module.func_by_name("main").unwrap()];
    let entry = func.layout.entry_block().unwrap();
    let insns: Vec<_> = func.layout.iter_insn(entry).collect();
    insns
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .filter(|&(a, b)| can_exchange(func, a, b))
        .collect()
}

#[test]
fn memory_module_has_exchangeable_pairs() {
    let module = memory_module();
    let pairs = exchangeable_pairs(&module);
    assert!(pairs.len() >= 4, "{pairs:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn substitution_keeps_results(a in any::<i32>(), b in any::<i32>(), seed in any::<u64>()) {
        let original = bitwise_module();
        let expected = run_binary(&original, a, b).unwrap();
        let module = diversify(bitwise_module(), Pass::InsnSubst, seed);
        prop_assert_eq!(run_binary(&module, a, b).unwrap(), expected);
    }

    #[test]
    fn constant_masking_keeps_results(
        a in any::<i32>(),
        b in any::<i32>(),
        c1 in any::<i32>(),
        c2 in any::<i32>(),
        seed in any::<u64>(),
    ) {
        let expected = run_binary(&constant_module(c1, c2), a, b).unwrap();
        let module = diversify(constant_module(c1, c2), Pass::ConstObfuscate, seed);
        prop_assert_eq!(run_binary(&module, a, b).unwrap(), expected);
    }

    #[test]
    fn garbage_keeps_results(a in any::<i32>(), b in any::<i32>(), seed in any::<u64>()) {
        let expected = run_binary(&bitwise_module(), a, b).unwrap();
        let module = diversify(bitwise_module(), Pass::GarbageInsert, seed);
        prop_assert_eq!(run_binary(&module, a, b).unwrap(), expected);
    }

    #[test]
    fn each_exchanged_pair_keeps_results(a in any::<i32>(), b in any::<i32>()) {
        let expected = run_binary(&memory_module(), a, b).unwrap();
        for (first, second) in exchangeable_pairs(&memory_module()) {
            let mut module = memory_module();
            let main = module.func_by_name("main").unwrap();
            let layout = &mut module.funcs[main].layout;
            layout.remove_insn(second);
            layout.insert_insn_before(second, first);
            prop_assert_eq!(run_binary(&module, a, b).unwrap(), expected, "{:?}", (first, second));
        }
    }

    #[test]
    fn reordering_keeps_results(a in any::<i32>(), b in any::<i32>(), seed in any::<u64>()) {
        let expected = run_binary(&memory_module(), a, b).unwrap();
        let mut module = memory_module();
        let mut pipeline = Pipeline::new();
        pipeline.config.insn_reorder = InsnReorderConfig { probability: 1.0 };
        pipeline.add_pass(Pass::InsnReorder);
        pipeline.run(&mut module, seed).unwrap();
        prop_assert_eq!(run_binary(&module, a, b).unwrap(), expected);
    }
}
