use std::io;

use crate::{
    module::FuncRef, BlockId, Function, GlobalVariableData, InsnData, InsnId, Module, Value,
    ValueId,
};

pub struct ModuleWriter<'a> {
    module: &'a Module,
}

impl<'a> ModuleWriter<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self { module }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        for gv_data in self.module.globals.values() {
            gv_data.ir_write(&mut w)?;
        }

        for func_ref in self.module.iter_functions() {
            if self.module.funcs[func_ref].is_declaration() {
                FuncWriter::new(self.module, func_ref).write_declaration(&mut w)?;
            }
        }

        for func_ref in self.module.iter_definitions() {
            writeln!(w)?;
            FuncWriter::new(self.module, func_ref).write(&mut w)?;
        }

        Ok(())
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        Ok(String::from_utf8_lossy(&s).into_owned())
    }
}

pub struct FuncWriter<'a> {
    module: &'a Module,
    func: &'a Function,
    level: u8,
}

impl<'a> FuncWriter<'a> {
    pub fn new(module: &'a Module, func_ref: FuncRef) -> Self {
        Self {
            module,
            func: &module.funcs[func_ref],
            level: 0,
        }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        write!(
            w,
            "func {} %{}(",
            self.func.sig.linkage(),
            self.func.sig.name()
        )?;
        let mut delim = "";
        for &arg in &self.func.arg_values {
            write!(w, "{delim}{}.{}", arg, self.func.dfg.value_ty(arg))?;
            delim = ", ";
        }
        writeln!(w, ") -> {} {{", self.func.sig.ret_ty())?;

        self.level += 1;
        let mut blocks = self.func.layout.iter_block().peekable();
        while let Some(block) = blocks.next() {
            self.write_block_with_insn(block, &mut w)?;
            if blocks.peek().is_some() {
                writeln!(w)?;
            }
        }
        self.level -= 1;

        writeln!(w, "}}")
    }

    pub fn write_declaration(&mut self, mut w: impl io::Write) -> io::Result<()> {
        let sig = &self.func.sig;
        write!(w, "declare {} %{}(", sig.linkage(), sig.name())?;
        let mut delim = "";
        for ty in sig.args() {
            write!(w, "{delim}{ty}")?;
            delim = ", ";
        }
        if sig.is_variadic() {
            write!(w, "{delim}...")?;
        }
        writeln!(w, ") -> {};", sig.ret_ty())
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        Ok(String::from_utf8_lossy(&s).into_owned())
    }

    pub fn write_block_with_insn(
        &mut self,
        block: BlockId,
        mut w: impl io::Write,
    ) -> io::Result<()> {
        self.indent(&mut w)?;
        writeln!(w, "{block}:")?;

        self.level += 1;
        for insn in self.func.layout.iter_insn(block) {
            self.indent(&mut w)?;
            self.write_insn(insn, &mut w)?;
            writeln!(w, ";")?;
        }
        self.level -= 1;

        Ok(())
    }

    pub fn write_insn(&self, insn: InsnId, mut w: impl io::Write) -> io::Result<()> {
        if let Some(result) = self.func.dfg.insn_result(insn) {
            write!(w, "{}.{} = ", result, self.func.dfg.value_ty(result))?;
        }

        match self.func.dfg.insn(insn) {
            InsnData::Unary { code, args } => {
                write!(w, "{code}")?;
                self.write_values(args, &mut w)
            }
            InsnData::Binary { code, args } => {
                write!(w, "{code}")?;
                self.write_values(args, &mut w)
            }
            InsnData::Cmp { code, args } => {
                write!(w, "{code}")?;
                self.write_values(args, &mut w)
            }
            InsnData::Cast { code, args, ty } => {
                write!(w, "{code}")?;
                self.write_values(args, &mut w)?;
                write!(w, " {ty}")
            }
            InsnData::Alloca { ty, args } => {
                write!(w, "alloca {ty}")?;
                self.write_values(args, &mut w)
            }
            InsnData::Load { args, ty } => {
                write!(w, "load")?;
                self.write_values(args, &mut w)?;
                write!(w, " {ty}")
            }
            InsnData::Store { args } => {
                write!(w, "store")?;
                self.write_values(args, &mut w)
            }
            InsnData::Gep { args, elem_ty } => {
                write!(w, "gep")?;
                self.write_values(args, &mut w)?;
                write!(w, " {elem_ty}")
            }
            InsnData::Call { func, args, .. } => {
                write!(w, "call %{}", self.module.funcs[*func].sig.name())?;
                self.write_values(args, &mut w)
            }
            InsnData::Intrinsic { code, args } => {
                write!(w, "{code}")?;
                self.write_values(args, &mut w)
            }
            InsnData::Jump { dests } => write!(w, "jump {}", dests[0]),
            InsnData::Branch { args, dests } => {
                write!(w, "br")?;
                self.write_values(args, &mut w)?;
                write!(w, " {} {}", dests[0], dests[1])
            }
            InsnData::BrTable {
                args,
                default,
                table,
            } => {
                write!(w, "br_table")?;
                self.write_values(&args[..1], &mut w)?;
                if let Some(default) = default {
                    write!(w, " {default}")?;
                }
                for (value, dest) in args[1..].iter().zip(table.iter()) {
                    write!(w, " (")?;
                    self.write_value(*value, &mut w)?;
                    write!(w, " {dest})")?;
                }
                Ok(())
            }
            InsnData::Return { args } => {
                write!(w, "return")?;
                self.write_values(args.as_slice(), &mut w)
            }
            InsnData::Unreachable => write!(w, "unreachable"),
            InsnData::Phi { values, blocks, .. } => {
                write!(w, "phi")?;
                for (value, block) in values.iter().zip(blocks.iter()) {
                    write!(w, " (")?;
                    self.write_value(*value, &mut w)?;
                    write!(w, " {block})")?;
                }
                Ok(())
            }
        }
    }

    fn write_values(&self, values: &[ValueId], mut w: impl io::Write) -> io::Result<()> {
        for &value in values {
            write!(w, " ")?;
            self.write_value(value, &mut w)?;
        }
        Ok(())
    }

    fn write_value(&self, value: ValueId, mut w: impl io::Write) -> io::Result<()> {
        match self.func.dfg.value(value) {
            Value::Immediate { imm, ty } => write!(w, "{imm}.{ty}"),
            Value::Global { gv, .. } => write!(w, "%{}", self.module.globals[*gv].symbol),
            Value::Undef { ty } => write!(w, "undef.{ty}"),
            Value::Insn { .. } | Value::Arg { .. } => write!(w, "{value}"),
        }
    }

    fn indent(&self, mut w: impl io::Write) -> io::Result<()> {
        w.write_all(" ".repeat(self.level as usize * 4).as_bytes())
    }
}

impl GlobalVariableData {
    fn ir_write(&self, w: &mut impl io::Write) -> io::Result<()> {
        write!(w, "global {} {}", self.linkage, self.ty)?;
        if self.is_array() {
            write!(w, "[{}]", self.len)?;
        }
        write!(w, " %{}", self.symbol)?;
        match self.init {
            Some(init) => writeln!(w, " = {init};"),
            None => writeln!(w, ";"),
        }
    }
}
