use cranelift_entity::{entity_impl, PrimaryMap};

use super::{Function, GlobalVariable, GlobalVariableData, Linkage, Signature};

#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Holds all functions declared in the module.
    pub funcs: PrimaryMap<FuncRef, Function>,

    /// Order in which the functions are laid out.
    pub func_order: Vec<FuncRef>,

    pub globals: PrimaryMap<GlobalVariable, GlobalVariableData>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a function without body and appends it to the function order.
    pub fn declare_function(&mut self, sig: Signature) -> FuncRef {
        let func_ref = self.funcs.push(Function::new(&sig));
        self.func_order.push(func_ref);
        func_ref
    }

    /// Adds `func` to the module and places it right after `after` in the function order.
    pub fn insert_function_after(&mut self, func: Function, after: FuncRef) -> FuncRef {
        let func_ref = self.funcs.push(func);
        let pos = self
            .func_order
            .iter()
            .position(|f| *f == after)
            .map_or(self.func_order.len(), |pos| pos + 1);
        self.func_order.insert(pos, func_ref);
        func_ref
    }

    /// Returns functions in layout order.
    pub fn iter_functions(&self) -> impl Iterator<Item = FuncRef> + '_ {
        self.func_order.iter().copied()
    }

    /// Returns functions that have a body, in layout order.
    pub fn iter_definitions(&self) -> impl Iterator<Item = FuncRef> + '_ {
        self.iter_functions()
            .filter(|func_ref| !self.funcs[*func_ref].is_declaration())
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncRef> {
        self.iter_functions()
            .find(|func_ref| self.funcs[*func_ref].sig.name() == name)
    }

    /// Returns `true` if the function has external linkage.
    pub fn is_external(&self, func_ref: FuncRef) -> bool {
        self.funcs[func_ref].sig.linkage() == Linkage::External
    }

    /// Creates a module level variable.
    ///
    /// # Panics
    /// Panics if the symbol is already used by another global.
    pub fn make_global(&mut self, data: GlobalVariableData) -> GlobalVariable {
        assert!(
            self.global_by_symbol(&data.symbol).is_none(),
            "duplicate global symbol `{}`",
            data.symbol
        );
        self.globals.push(data)
    }

    pub fn global_by_symbol(&self, symbol: &str) -> Option<GlobalVariable> {
        self.globals
            .iter()
            .find_map(|(gv, data)| (data.symbol == symbol).then_some(gv))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "func");
