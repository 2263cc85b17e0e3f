use super::FunctionBuilder;
use crate::{
    module::FuncRef, GlobalVariable, GlobalVariableData, Module, Signature,
};

/// Assembles a [`Module`] from declarations and function bodies built by [`FunctionBuilder`].
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a function, returning the existing reference if the name is already declared.
    pub fn declare_function(&mut self, sig: Signature) -> FuncRef {
        if let Some(func_ref) = self.module.func_by_name(sig.name()) {
            func_ref
        } else {
            self.module.declare_function(sig)
        }
    }

    pub fn lookup_func(&self, name: &str) -> Option<FuncRef> {
        self.module.func_by_name(name)
    }

    pub fn sig(&self, func_ref: FuncRef) -> &Signature {
        &self.module.funcs[func_ref].sig
    }

    pub fn make_global(&mut self, global: GlobalVariableData) -> GlobalVariable {
        self.module.make_global(global)
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalVariable> {
        self.module.global_by_symbol(name)
    }

    pub fn func_builder(&self, func_ref: FuncRef) -> FunctionBuilder {
        FunctionBuilder::new(func_ref, self.sig(func_ref))
    }

    /// Installs the body built by `builder` into the module.
    pub fn define(&mut self, builder: FunctionBuilder) -> FuncRef {
        let func_ref = builder.func_ref();
        self.module.funcs[func_ref] = builder.build();
        func_ref
    }

    pub fn build(self) -> Module {
        self.module
    }
}
