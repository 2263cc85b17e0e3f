mod func_builder;
mod module_builder;

pub use func_builder::FunctionBuilder;
pub use module_builder::ModuleBuilder;

pub mod test_util {
    use super::*;

    use crate::{ir_writer::FuncWriter, module::FuncRef, Linkage, Module, Signature, Type};

    /// A module builder for tests that only need a single function named `test_func`.
    #[derive(Default)]
    pub struct TestModuleBuilder {
        module_builder: ModuleBuilder,
    }

    impl TestModuleBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn func_builder(&mut self, args: &[Type], ret_ty: Type) -> FunctionBuilder {
            let sig = Signature::new("test_func", Linkage::Public, args, ret_ty);
            let func_ref = self.module_builder.declare_function(sig);
            self.module_builder.func_builder(func_ref)
        }

        pub fn define(&mut self, builder: FunctionBuilder) -> FuncRef {
            self.module_builder.define(builder)
        }

        pub fn build(self) -> Module {
            self.module_builder.build()
        }
    }

    pub fn dump_func(module: &Module, func_ref: FuncRef) -> String {
        let mut writer = FuncWriter::new(module, func_ref);
        writer.dump_string().unwrap()
    }
}
