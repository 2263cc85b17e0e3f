//! Tunables of the diversification passes.

/// Configuration shared by a [`crate::transform::Pipeline`] run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Run [`crate::verify::verify_module`] after every pass. On by default; turning it off
    /// lets a broken module through to the caller unreported.
    pub verify_each_pass: bool,
    pub insn_reorder: InsnReorderConfig,
    pub const_obfuscate: ConstObfuscateConfig,
    pub garbage: GarbageConfig,
    pub func_split: FuncSplitConfig,
    pub loop_flatten: LoopFlattenConfig,
    pub loop_split: LoopSplitConfig,
    pub shadow_stack: ShadowStackConfig,
    pub stack_pad: StackPadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_each_pass: true,
            insn_reorder: InsnReorderConfig::default(),
            const_obfuscate: ConstObfuscateConfig::default(),
            garbage: GarbageConfig::default(),
            func_split: FuncSplitConfig::default(),
            loop_flatten: LoopFlattenConfig::default(),
            loop_split: LoopSplitConfig::default(),
            shadow_stack: ShadowStackConfig::default(),
            stack_pad: StackPadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InsnReorderConfig {
    /// Probability of exchanging an exchangeable adjacent pair.
    pub probability: f64,
}

impl Default for InsnReorderConfig {
    fn default() -> Self {
        Self { probability: 0.5 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstObfuscateConfig {
    /// Route `c ^ r` through a store and a reload of a throwaway stack slot.
    pub opacity_barrier: bool,
}

impl Default for ConstObfuscateConfig {
    fn default() -> Self {
        Self {
            opacity_barrier: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GarbageConfig {
    /// Probability of following an eligible insn with an identity sequence.
    pub probability: f64,
}

impl Default for GarbageConfig {
    fn default() -> Self {
        Self { probability: 0.3 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FuncSplitConfig {
    /// Name of the program entry point, which is never split.
    pub entry_point: &'static str,
}

impl Default for FuncSplitConfig {
    fn default() -> Self {
        Self { entry_point: "main" }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopFlattenConfig {
    pub probability: f64,
    /// Largest accepted bound of either loop of the nest.
    pub max_bound: i64,
}

impl Default for LoopFlattenConfig {
    fn default() -> Self {
        Self {
            probability: 0.3,
            max_bound: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSplitConfig {
    pub probability: f64,
    /// Smallest accepted bound. Loops with fewer iterations are left alone.
    pub min_bound: i64,
    pub max_bound: i64,
}

impl Default for LoopSplitConfig {
    fn default() -> Self {
        Self {
            probability: 0.25,
            min_bound: 4,
            max_bound: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShadowStackConfig {
    /// Number of return addresses the shadow stack holds.
    pub capacity: usize,
}

impl Default for ShadowStackConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StackPadConfig {
    /// Padding is a multiple of `granule` bytes.
    pub granule: u32,
    /// Largest multiple of `granule` to allocate.
    pub max_granules: u32,
}

impl Default for StackPadConfig {
    fn default() -> Self {
        Self {
            granule: 16,
            max_granules: 16,
        }
    }
}
