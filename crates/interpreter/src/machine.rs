use byteorder::{ByteOrder, LittleEndian};
use cranelift_entity::{EntityRef, SecondaryMap};

use polymorph_ir::{
    BinaryOp, BlockId, CastOp, CmpOp, FuncRef, Function, GlobalVariable, Immediate, InsnData,
    InsnId, IntrinsicOp, Module, Type, UnaryOp, Value, ValueId,
};

use crate::{
    error::{ExecError, Result},
    frame::Frame,
    value::EvalValue,
};

/// Addresses below this are never valid.
const NULL_GUARD: usize = 16;
const ALIGN: usize = 8;
/// Return address reported to the function started by [`Machine::run`].
pub const ENTRY_RETURN_ADDRESS: u64 = 0x7fff_0000_0000;
const CALL_SITE_BASE: u64 = 0x4000_0000_0000;

pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;
pub const DEFAULT_MEMORY_LIMIT: usize = 1 << 24;

enum Action {
    Continue,
    JumpTo(BlockId),
    Call {
        callee: FuncRef,
        args: Vec<EvalValue>,
    },
    Return(Option<EvalValue>),
}

/// Executes functions of a module.
///
/// Memory is a single little endian byte array holding the module globals followed by the
/// stack. Globals keep their contents across [`Machine::run`] calls.
///
/// Calls to declarations are served by the host: `abort` stops the execution with
/// [`ExecError::Aborted`] and `print` appends its arguments to [`Machine::output`].
pub struct Machine<'a> {
    module: &'a Module,
    frames: Vec<Frame>,
    memory: Vec<u8>,
    globals: SecondaryMap<GlobalVariable, u64>,
    stack_base: usize,
    sp: usize,
    steps: u64,
    step_limit: u64,
    memory_limit: usize,
    output: Vec<i64>,
}

impl<'a> Machine<'a> {
    pub fn new(module: &'a Module) -> Self {
        let mut memory = vec![0; NULL_GUARD];
        let mut globals = SecondaryMap::new();
        for (gv, data) in module.globals.iter() {
            let addr = align_up(memory.len());
            memory.resize(addr + data.size_of(), 0);
            if let Some(init) = data.init {
                let elem_size = data.ty.size_of();
                for idx in 0..data.len {
                    write_imm(&mut memory, addr + idx * elem_size, init);
                }
            }
            globals[gv] = addr as u64;
        }

        let stack_base = align_up(memory.len());
        Self {
            module,
            frames: Vec::new(),
            memory,
            globals,
            stack_base,
            sp: stack_base,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            output: Vec::new(),
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Values passed to `print` so far.
    pub fn output(&self) -> &[i64] {
        &self.output
    }

    /// Returns the address of the global named `symbol`.
    pub fn global_addr(&self, symbol: &str) -> Option<u64> {
        self.module
            .global_by_symbol(symbol)
            .map(|gv| self.globals[gv])
    }

    /// Runs the function named `name`.
    ///
    /// # Panics
    /// Panics if the module has no such function.
    pub fn run_by_name(&mut self, name: &str, args: &[EvalValue]) -> Result<Option<EvalValue>> {
        let func_ref = self
            .module
            .func_by_name(name)
            .unwrap_or_else(|| panic!("no function named `{name}`"));
        self.run(func_ref, args)
    }

    /// Runs `func_ref` to completion and returns its result, `None` for unit functions.
    pub fn run(&mut self, func_ref: FuncRef, args: &[EvalValue]) -> Result<Option<EvalValue>> {
        let module = self.module;
        self.frames.clear();
        self.sp = self.stack_base;
        self.steps = 0;

        let func = &module.funcs[func_ref];
        if func.is_declaration() {
            return self.call_host(func_ref, args);
        }
        self.frames
            .push(Frame::new(func_ref, func, args, ENTRY_RETURN_ADDRESS, self.sp));

        loop {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(ExecError::StepLimitExceeded(self.step_limit));
            }

            let (e_val, action) = self.step()?;
            let frame = self.top_frame_mut();
            let func = &module.funcs[frame.func];
            if let (Some(result), Some(e_val)) = (func.dfg.insn_result(frame.pc), e_val) {
                frame.map_val(result, e_val);
            }

            match action {
                Action::Continue => {
                    frame.pc = func
                        .layout
                        .next_insn_of(frame.pc)
                        .unwrap_or_else(|| panic!("fall through detected in `{}`", func.sig.name()));
                }

                Action::JumpTo(dest) => self.enter_block(dest),

                Action::Call { callee, args } => {
                    let ret_addr = call_site_address(frame.func, frame.pc);
                    let new_frame =
                        Frame::new(callee, &module.funcs[callee], &args, ret_addr, self.sp);
                    self.frames.push(new_frame);
                }

                Action::Return(e_val) => {
                    if let Some(frame) = self.frames.pop() {
                        self.sp = frame.stack_mark;
                    }
                    let Some(caller) = self.frames.last_mut() else {
                        return Ok(e_val);
                    };
                    let func = &module.funcs[caller.func];
                    if let (Some(result), Some(e_val)) = (func.dfg.insn_result(caller.pc), e_val) {
                        caller.map_val(result, e_val);
                    }
                    caller.pc = func
                        .layout
                        .next_insn_of(caller.pc)
                        .unwrap_or_else(|| panic!("call terminates a block of `{}`", func.sig.name()));
                }
            }
        }
    }

    /// Loads a value of `ty` from `addr`.
    pub fn load(&self, addr: u64, ty: Type) -> Result<EvalValue> {
        let size = ty.size_of();
        let start = self.check_access(addr, size)?;
        let bytes = &self.memory[start..start + size];
        let e_val = match ty {
            Type::Ptr => EvalValue::Ptr(LittleEndian::read_u64(bytes)),
            Type::Unit => panic!("`unit` can't be loaded"),
            _ => {
                let raw = LittleEndian::read_uint(bytes, size);
                EvalValue::Imm(Immediate::from_i64(raw as i64, ty))
            }
        };
        Ok(e_val)
    }

    /// Stores `e_val` to `addr`, using the width of its type.
    ///
    /// # Panics
    /// Panics if `e_val` is undefined.
    pub fn store(&mut self, addr: u64, e_val: EvalValue) -> Result<()> {
        match e_val {
            EvalValue::Imm(imm) => {
                let start = self.check_access(addr, imm.ty().size_of())?;
                write_imm(&mut self.memory, start, imm);
            }
            EvalValue::Ptr(ptr) => {
                let start = self.check_access(addr, Type::Ptr.size_of())?;
                LittleEndian::write_u64(&mut self.memory[start..start + 8], ptr);
            }
            EvalValue::Undef => panic!("undef value in store"),
        }
        Ok(())
    }

    fn top_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn top_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Executes the insn at the top frame pc.
    fn step(&mut self) -> Result<(Option<EvalValue>, Action)> {
        let module = self.module;
        let frame = self.top_frame();
        let func = &module.funcs[frame.func];
        let insn = frame.pc;

        let e_val = match func.dfg.insn(insn) {
            InsnData::Unary { code, args } => {
                let arg = self.imm(func, args[0])?;
                let res = match code {
                    UnaryOp::Not => !arg,
                    UnaryOp::Neg => -arg,
                };
                res.into()
            }

            InsnData::Binary { code, args } => {
                let lhs = self.imm(func, args[0])?;
                let rhs = self.imm(func, args[1])?;
                if code.is_division() && rhs.is_zero() {
                    return Err(ExecError::DivisionByZero {
                        func: func.sig.name().to_string(),
                        insn,
                    });
                }
                eval_binary(*code, lhs, rhs).into()
            }

            InsnData::Cmp { code, args } => {
                let lhs = self.operand(func, args[0])?;
                let rhs = self.operand(func, args[1])?;
                match (lhs, rhs) {
                    (EvalValue::Ptr(lhs), EvalValue::Ptr(rhs)) => {
                        EvalValue::cmp_ptr(*code, lhs, rhs).into()
                    }
                    _ => eval_cmp(*code, to_imm(lhs), to_imm(rhs)).into(),
                }
            }

            InsnData::Cast { code, args, ty } => {
                let arg = self.imm(func, args[0])?;
                let res = match code {
                    CastOp::Sext => arg.sext(*ty),
                    CastOp::Zext => arg.zext(*ty),
                    CastOp::Trunc => arg.trunc(*ty),
                };
                res.into()
            }

            InsnData::Alloca { ty, args } => {
                let count = self.imm(func, args[0])?.as_u64();
                let size = (ty.size_of() as u64).saturating_mul(count);
                EvalValue::Ptr(self.alloca(size)?)
            }

            InsnData::Load { args, ty } => {
                let addr = self.ptr(func, args[0])?;
                self.load(addr, *ty)?
            }

            InsnData::Store { args } => {
                let addr = self.ptr(func, args[0])?;
                let e_val = self.operand(func, args[1])?;
                self.store(addr, e_val)?;
                return Ok((None, Action::Continue));
            }

            InsnData::Gep { args, elem_ty } => {
                let base = self.ptr(func, args[0])?;
                let idx = self.imm(func, args[1])?.as_i64();
                let offset = idx.wrapping_mul(elem_ty.size_of() as i64);
                EvalValue::Ptr(base.wrapping_add(offset as u64))
            }

            InsnData::Call { func: callee, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| self.operand(func, *arg))
                    .collect::<Result<Vec<_>>>()?;
                if module.funcs[*callee].is_declaration() {
                    let e_val = self.call_host(*callee, &args)?;
                    return Ok((e_val, Action::Continue));
                }
                return Ok((
                    None,
                    Action::Call {
                        callee: *callee,
                        args,
                    },
                ));
            }

            InsnData::Intrinsic { code, .. } => match code {
                IntrinsicOp::ReturnAddress => EvalValue::Ptr(frame.ret_addr),
            },

            InsnData::Jump { dests } => return Ok((None, Action::JumpTo(dests[0]))),

            InsnData::Branch { args, dests } => {
                let cond = self.imm(func, args[0])?;
                let dest = if cond.is_zero() { dests[1] } else { dests[0] };
                return Ok((None, Action::JumpTo(dest)));
            }

            InsnData::BrTable {
                args,
                default,
                table,
            } => {
                let scrutinee = self.imm(func, args[0])?;
                for (case, dest) in args[1..].iter().zip(table) {
                    if self.imm(func, *case)? == scrutinee {
                        return Ok((None, Action::JumpTo(*dest)));
                    }
                }
                let Some(default) = default else {
                    return Err(ExecError::Unreachable {
                        func: func.sig.name().to_string(),
                    });
                };
                return Ok((None, Action::JumpTo(*default)));
            }

            InsnData::Return { args } => {
                let e_val = args.map(|arg| self.operand(func, arg)).transpose()?;
                return Ok((None, Action::Return(e_val)));
            }

            InsnData::Unreachable => {
                return Err(ExecError::Unreachable {
                    func: func.sig.name().to_string(),
                })
            }

            InsnData::Phi { .. } => panic!("phi `{insn}` is executed outside of a block entry"),
        };

        Ok((Some(e_val), Action::Continue))
    }

    /// Moves the top frame to `dest`, evaluating its phis at once.
    fn enter_block(&mut self, dest: BlockId) {
        let module = self.module;
        let frame = self.top_frame();
        let func = &module.funcs[frame.func];
        let from = func.layout.insn_block(frame.pc);

        let mut incoming = Vec::new();
        let mut pc = func.layout.first_insn_of(dest);
        while let Some(insn) = pc.filter(|insn| func.dfg.is_phi(*insn)) {
            let value = func
                .dfg
                .insn(insn)
                .phi_value_from(from)
                .unwrap_or_else(|| panic!("phi `{insn}` has no value from `{from}`"));
            if let Some(result) = func.dfg.insn_result(insn) {
                incoming.push((result, self.lookup(func, value)));
            }
            pc = func.layout.next_insn_of(insn);
        }

        let frame = self.top_frame_mut();
        for (result, e_val) in incoming {
            frame.map_val(result, e_val);
        }
        frame.prev_block = Some(from);
        frame.pc = pc.unwrap_or_else(|| panic!("`{dest}` has no terminator"));
    }

    fn call_host(&mut self, callee: FuncRef, args: &[EvalValue]) -> Result<Option<EvalValue>> {
        let name = self.module.funcs[callee].sig.name();
        match name {
            "abort" => Err(ExecError::Aborted),
            "print" => {
                self.output
                    .extend(args.iter().map(|arg| arg.as_i64().unwrap_or_default()));
                Ok(None)
            }
            _ => Err(ExecError::UnknownHostFunction(name.to_string())),
        }
    }

    fn alloca(&mut self, size: u64) -> Result<u64> {
        let addr = align_up(self.sp);
        let end = usize::try_from(size)
            .ok()
            .and_then(|size| addr.checked_add(size))
            .filter(|end| *end <= self.memory_limit)
            .ok_or(ExecError::OutOfBounds {
                addr: addr as u64,
                size: size as usize,
            })?;

        if self.memory.len() < end {
            self.memory.resize(end, 0);
        }
        self.memory[addr..end].fill(0);
        self.sp = end;
        Ok(addr as u64)
    }

    fn check_access(&self, addr: u64, size: usize) -> Result<usize> {
        let start = addr as usize;
        if start < NULL_GUARD || start.saturating_add(size) > self.memory.len() {
            return Err(ExecError::OutOfBounds { addr, size });
        }
        Ok(start)
    }

    fn lookup(&self, func: &Function, value: ValueId) -> EvalValue {
        match func.dfg.value(value) {
            Value::Immediate { imm, .. } => EvalValue::Imm(*imm),
            Value::Global { gv, .. } => EvalValue::Ptr(self.globals[*gv]),
            Value::Undef { .. } => EvalValue::Undef,
            Value::Insn { .. } | Value::Arg { .. } => self.top_frame().local(value),
        }
    }

    /// Looks up an operand that must be defined.
    fn operand(&self, func: &Function, value: ValueId) -> Result<EvalValue> {
        let e_val = self.lookup(func, value);
        if e_val.is_undef() {
            return Err(ExecError::Undef {
                func: func.sig.name().to_string(),
                value,
            });
        }
        Ok(e_val)
    }

    fn imm(&self, func: &Function, value: ValueId) -> Result<Immediate> {
        self.operand(func, value).map(to_imm)
    }

    fn ptr(&self, func: &Function, value: ValueId) -> Result<u64> {
        let e_val = self.operand(func, value)?;
        Ok(match e_val {
            EvalValue::Ptr(addr) => addr,
            _ => to_imm(e_val).as_u64(),
        })
    }
}

fn eval_binary(code: BinaryOp, lhs: Immediate, rhs: Immediate) -> Immediate {
    match code {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Sdiv => lhs.sdiv(rhs),
        BinaryOp::Udiv => lhs.udiv(rhs),
        BinaryOp::Srem => lhs.srem(rhs),
        BinaryOp::Urem => lhs.urem(rhs),
        BinaryOp::Shl => lhs.shl(rhs),
        BinaryOp::Shr => lhs.shr(rhs),
        BinaryOp::Sar => lhs.sar(rhs),
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
    }
}

fn eval_cmp(code: CmpOp, lhs: Immediate, rhs: Immediate) -> Immediate {
    match code {
        CmpOp::Eq => lhs.imm_eq(rhs),
        CmpOp::Ne => lhs.imm_ne(rhs),
        CmpOp::Slt => lhs.slt(rhs),
        CmpOp::Sle => lhs.sle(rhs),
        CmpOp::Sgt => lhs.sgt(rhs),
        CmpOp::Sge => lhs.sge(rhs),
        CmpOp::Lt => lhs.lt(rhs),
        CmpOp::Le => lhs.le(rhs),
        CmpOp::Gt => lhs.gt(rhs),
        CmpOp::Ge => lhs.ge(rhs),
    }
}

/// Treats a pointer as a 64 bit integer.
fn to_imm(e_val: EvalValue) -> Immediate {
    match e_val {
        EvalValue::Imm(imm) => imm,
        EvalValue::Ptr(addr) => Immediate::I64(addr as i64),
        EvalValue::Undef => panic!("undef value used as an immediate"),
    }
}

fn write_imm(memory: &mut [u8], start: usize, imm: Immediate) {
    let size = imm.ty().size_of();
    LittleEndian::write_uint(&mut memory[start..start + size], imm.as_u64(), size);
}

fn align_up(addr: usize) -> usize {
    addr.next_multiple_of(ALIGN)
}

/// Returns the synthetic return address of the call at `insn` in `func`.
fn call_site_address(func: FuncRef, insn: InsnId) -> u64 {
    CALL_SITE_BASE + ((func.index() as u64) << 24) + insn.index() as u64
}
