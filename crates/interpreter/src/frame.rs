use cranelift_entity::SecondaryMap;

use polymorph_ir::{BlockId, FuncRef, Function, InsnId, ValueId};

use crate::value::EvalValue;

pub struct Frame {
    pub func: FuncRef,
    /// The insn being executed.
    pub pc: InsnId,
    pub prev_block: Option<BlockId>,
    /// Address the `return_address` intrinsic reports for this activation.
    pub ret_addr: u64,
    /// Stack top at entry, restored on return.
    pub stack_mark: usize,
    locals: SecondaryMap<ValueId, EvalValue>,
}

impl Frame {
    /// Creates a frame positioned at the first insn of the entry block of `func`.
    ///
    /// # Panics
    /// Panics if `func` is a declaration or `args` doesn't match its arity.
    pub fn new(
        func_ref: FuncRef,
        func: &Function,
        args: &[EvalValue],
        ret_addr: u64,
        stack_mark: usize,
    ) -> Self {
        let arg_values = &func.arg_values;
        assert_eq!(
            arg_values.len(),
            args.len(),
            "`{}` called with a wrong number of arguments",
            func.sig.name()
        );

        let pc = func
            .layout
            .entry_block()
            .and_then(|entry| func.layout.first_insn_of(entry))
            .unwrap_or_else(|| panic!("`{}` has no body", func.sig.name()));

        let mut frame = Self {
            func: func_ref,
            pc,
            prev_block: None,
            ret_addr,
            stack_mark,
            locals: SecondaryMap::default(),
        };

        for (arg_val, arg_e_val) in arg_values.iter().zip(args) {
            frame.map_val(*arg_val, *arg_e_val);
        }

        frame
    }

    pub fn map_val(&mut self, val: ValueId, e_val: EvalValue) {
        self.locals[val] = e_val;
    }

    pub fn local(&self, val: ValueId) -> EvalValue {
        self.locals[val]
    }
}
