mod common;

use common::{run_main, sample_module, SAMPLE_PRINTS};
use polymorph_diversify::{
    config::{GarbageConfig, InsnReorderConfig, LoopFlattenConfig, LoopSplitConfig},
    verify::verify_module,
    Pass, Pipeline, PipelineConfig,
};
use polymorph_diversify::cfg_edit::entry_allocas;
use polymorph_ir::{Module, ModuleWriter};
use std::collections::BTreeSet;

fn aggressive_config() -> PipelineConfig {
    PipelineConfig {
        verify_each_pass: true,
        insn_reorder: InsnReorderConfig { probability: 1.0 },
        garbage: GarbageConfig { probability: 1.0 },
        loop_flatten: LoopFlattenConfig {
            probability: 1.0,
            ..LoopFlattenConfig::default()
        },
        loop_split: LoopSplitConfig {
            probability: 1.0,
            ..LoopSplitConfig::default()
        },
        ..PipelineConfig::default()
    }
}

#[test]
fn sample_module_runs() {
    let module = sample_module();
    let (res, output) = run_main(&module).unwrap();
    assert!(res.is_some());
    assert_eq!(output.len(), SAMPLE_PRINTS);
    assert_eq!(output[..30], (0..30).collect::<Vec<_>>()[..]);
    assert_eq!(output[30..42], (0..12).collect::<Vec<_>>()[..]);
    assert_eq!(output[42], 7);
}

#[test]
fn default_pipeline_preserves_behavior() {
    let original = sample_module();
    let expected = run_main(&original).unwrap();

    for seed in 0..24 {
        let mut module = sample_module();
        let mut pipeline = Pipeline::default_pipeline();
        pipeline.config.verify_each_pass = true;
        assert!(pipeline.run(&mut module, seed).unwrap());
        assert_eq!(run_main(&module).unwrap(), expected, "seed {seed}");
    }
}

#[test]
fn aggressive_pipeline_preserves_behavior() {
    let expected = run_main(&sample_module()).unwrap();

    for seed in 0..24 {
        let mut module = sample_module();
        let mut pipeline = Pipeline::default_pipeline();
        pipeline.config = aggressive_config();
        pipeline.run(&mut module, seed).unwrap();
        verify_module(&module, "aggressive").unwrap();
        assert_eq!(run_main(&module).unwrap(), expected, "seed {seed}");
    }
}

#[test]
fn every_pass_preserves_behavior_alone() {
    let expected = run_main(&sample_module()).unwrap();

    for &pass in Pipeline::default_pipeline().passes() {
        for seed in 0..8 {
            let mut module = sample_module();
            let mut pipeline = Pipeline::new();
            pipeline.config = aggressive_config();
            pipeline.add_pass(pass);
            pipeline.run(&mut module, seed).unwrap();
            assert_eq!(
                run_main(&module).unwrap(),
                expected,
                "{pass:?} with seed {seed}"
            );
        }
    }
}

#[test]
fn repeated_runs_preserve_behavior() {
    let expected = run_main(&sample_module()).unwrap();

    let mut module = sample_module();
    let pipeline = Pipeline::default_pipeline();
    for seed in 100..104 {
        pipeline.run(&mut module, seed).unwrap();
    }
    assert_eq!(run_main(&module).unwrap(), expected);
}

#[test]
fn same_seed_same_module() {
    let dump = |seed| {
        let mut module = sample_module();
        let mut pipeline = Pipeline::default_pipeline();
        pipeline.config = aggressive_config();
        pipeline.run(&mut module, seed).unwrap();
        ModuleWriter::new(&module).dump_string().unwrap()
    };

    assert_eq!(dump(42), dump(42));
    let first = dump(0);
    assert!((1..8).any(|seed| dump(seed) != first));
}

#[test]
fn shuffles_keep_the_module_intact() {
    let original = sample_module();
    let expected = run_main(&original).unwrap();

    let mut module = sample_module();
    let mut pipeline = Pipeline::new();
    pipeline
        .add_pass(Pass::BlockShuffle)
        .add_pass(Pass::FuncShuffle)
        .add_pass(Pass::StackSlotShuffle);
    pipeline.run(&mut module, 3).unwrap();

    assert_eq!(module.funcs.len(), original.funcs.len());
    for func_ref in original.iter_functions() {
        let name = original.funcs[func_ref].sig.name();
        let shuffled = module.func_by_name(name).unwrap();
        assert_eq!(
            module.funcs[shuffled].layout.block_num(),
            original.funcs[func_ref].layout.block_num(),
        );
    }
    assert_eq!(run_main(&module).unwrap(), expected);
}

fn shuffled(pass: Pass, seed: u64) -> Module {
    let mut module = sample_module();
    let mut pipeline = Pipeline::new();
    pipeline.add_pass(pass);
    pipeline.run(&mut module, seed).unwrap();
    module
}

#[test]
fn block_orders_vary_with_the_seed() {
    let original = sample_module();
    let nest = original.func_by_name("nest").unwrap();
    let original_blocks: Vec<_> = original.funcs[nest].layout.iter_block().collect();
    let mut sorted_blocks = original_blocks.clone();
    sorted_blocks.sort();

    let mut orders = BTreeSet::new();
    for seed in 0..16 {
        let module = shuffled(Pass::BlockShuffle, seed);
        let mut blocks: Vec<_> = module.funcs[nest].layout.iter_block().collect();
        assert_eq!(blocks[0], original_blocks[0], "seed {seed}");
        orders.insert(blocks.clone());
        blocks.sort();
        assert_eq!(blocks, sorted_blocks, "seed {seed}");
    }
    assert!(orders.len() >= 2);
}

#[test]
fn slot_orders_vary_with_the_seed() {
    let original = sample_module();
    let fill = original.func_by_name("fill").unwrap();
    let mut original_slots = entry_allocas(&original.funcs[fill]);
    original_slots.sort();

    let mut orders = BTreeSet::new();
    for seed in 0..16 {
        let module = shuffled(Pass::StackSlotShuffle, seed);
        let mut slots = entry_allocas(&module.funcs[fill]);
        orders.insert(slots.clone());
        slots.sort();
        assert_eq!(slots, original_slots, "seed {seed}");
    }
    assert_eq!(orders.len(), 2);
}

