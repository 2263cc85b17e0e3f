use crate::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    module::FuncRef,
    BinaryOp, BlockId, CastOp, CmpOp, Function, GlobalVariable, Immediate, InsnData, InsnId,
    IntrinsicOp, Signature, Type, UnaryOp, ValueId,
};

macro_rules! impl_binary_insn {
    ($name:ident, $code:path) => {
        pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
            self.insert_value(InsnData::binary($code, lhs, rhs))
        }
    };
}

macro_rules! impl_cmp_insn {
    ($name:ident, $code:path) => {
        pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
            self.insert_value(InsnData::cmp($code, lhs, rhs))
        }
    };
}

macro_rules! impl_cast_insn {
    ($name:ident, $code:path) => {
        pub fn $name(&mut self, arg: ValueId, ty: Type) -> ValueId {
            self.insert_value(InsnData::cast($code, arg, ty))
        }
    };
}

pub struct FunctionBuilder {
    pub func: Function,
    func_ref: FuncRef,
    pub cursor: InsnInserter,
}

impl FunctionBuilder {
    pub fn new(func_ref: FuncRef, sig: &Signature) -> Self {
        Self {
            func: Function::new(sig),
            func_ref,
            cursor: InsnInserter::at_location(CursorLocation::NoWhere),
        }
    }

    pub fn func_ref(&self) -> FuncRef {
        self.func_ref
    }

    pub fn build(self) -> Function {
        self.func
    }

    pub fn args(&self) -> &[ValueId] {
        &self.func.arg_values
    }

    pub fn append_block(&mut self) -> BlockId {
        let block = self.cursor.make_block(&mut self.func);
        self.cursor.append_block(&mut self.func, block);
        block
    }

    pub fn make_block(&mut self) -> BlockId {
        self.cursor.make_block(&mut self.func)
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.cursor.set_location(CursorLocation::BlockBottom(block));
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.cursor.block(&self.func)
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        self.func.dfg.make_imm_value(imm)
    }

    pub fn make_undef_value(&mut self, ty: Type) -> ValueId {
        self.func.dfg.make_undef_value(ty)
    }

    /// Returns a pointer value to the global variable.
    pub fn make_global_value(&mut self, gv: GlobalVariable) -> ValueId {
        self.func.dfg.make_global_value(gv)
    }

    impl_binary_insn!(add, BinaryOp::Add);
    impl_binary_insn!(sub, BinaryOp::Sub);
    impl_binary_insn!(mul, BinaryOp::Mul);
    impl_binary_insn!(sdiv, BinaryOp::Sdiv);
    impl_binary_insn!(udiv, BinaryOp::Udiv);
    impl_binary_insn!(srem, BinaryOp::Srem);
    impl_binary_insn!(urem, BinaryOp::Urem);
    impl_binary_insn!(shl, BinaryOp::Shl);
    impl_binary_insn!(shr, BinaryOp::Shr);
    impl_binary_insn!(sar, BinaryOp::Sar);
    impl_binary_insn!(and, BinaryOp::And);
    impl_binary_insn!(or, BinaryOp::Or);
    impl_binary_insn!(xor, BinaryOp::Xor);

    impl_cmp_insn!(eq, CmpOp::Eq);
    impl_cmp_insn!(ne, CmpOp::Ne);
    impl_cmp_insn!(slt, CmpOp::Slt);
    impl_cmp_insn!(sle, CmpOp::Sle);
    impl_cmp_insn!(sgt, CmpOp::Sgt);
    impl_cmp_insn!(sge, CmpOp::Sge);
    impl_cmp_insn!(lt, CmpOp::Lt);
    impl_cmp_insn!(le, CmpOp::Le);
    impl_cmp_insn!(gt, CmpOp::Gt);
    impl_cmp_insn!(ge, CmpOp::Ge);

    impl_cast_insn!(sext, CastOp::Sext);
    impl_cast_insn!(zext, CastOp::Zext);
    impl_cast_insn!(trunc, CastOp::Trunc);

    pub fn not(&mut self, arg: ValueId) -> ValueId {
        self.insert_value(InsnData::unary(UnaryOp::Not, arg))
    }

    pub fn neg(&mut self, arg: ValueId) -> ValueId {
        self.insert_value(InsnData::unary(UnaryOp::Neg, arg))
    }

    /// Allocates `count` elements of `ty` on the stack.
    pub fn alloca(&mut self, ty: Type, count: u32) -> ValueId {
        let count = self.make_imm_value(count as i32);
        self.insert_value(InsnData::alloca(ty, count))
    }

    pub fn load(&mut self, addr: ValueId, ty: Type) -> ValueId {
        self.insert_value(InsnData::load(addr, ty))
    }

    pub fn store(&mut self, addr: ValueId, value: ValueId) {
        self.insert_insn(InsnData::store(addr, value));
    }

    pub fn gep(&mut self, base: ValueId, index: ValueId, elem_ty: Type) -> ValueId {
        self.insert_value(InsnData::gep(base, index, elem_ty))
    }

    pub fn call(&mut self, func: FuncRef, args: &[ValueId], ret_ty: Type) -> Option<ValueId> {
        self.insert_insn(InsnData::call(func, args, ret_ty))
    }

    pub fn return_address(&mut self) -> ValueId {
        let depth = self.make_imm_value(0i32);
        self.insert_value(InsnData::intrinsic(IntrinsicOp::ReturnAddress, &[depth]))
    }

    pub fn jump(&mut self, dest: BlockId) {
        self.insert_insn(InsnData::jump(dest));
    }

    pub fn br(&mut self, cond: ValueId, then: BlockId, else_: BlockId) {
        self.insert_insn(InsnData::branch(cond, then, else_));
    }

    pub fn br_table(&mut self, scrutinee: ValueId, default: Option<BlockId>, table: &[(ValueId, BlockId)]) {
        let mut args = smallvec::smallvec![scrutinee];
        args.extend(table.iter().map(|(value, _)| *value));
        let table = table.iter().map(|(_, block)| *block).collect();
        self.insert_insn(InsnData::BrTable {
            args,
            default,
            table,
        });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.insert_insn(InsnData::ret(value));
    }

    pub fn unreachable(&mut self) {
        self.insert_insn(InsnData::Unreachable);
    }

    pub fn phi(&mut self, ty: Type, args: &[(ValueId, BlockId)]) -> ValueId {
        let phi = self.insert_value(InsnData::phi(ty));
        for &(value, block) in args {
            self.append_phi_arg(phi, value, block);
        }
        phi
    }

    pub fn append_phi_arg(&mut self, phi_res: ValueId, value: ValueId, block: BlockId) {
        let phi_insn = self
            .func
            .dfg
            .value_insn(phi_res)
            .expect("`phi_res` should be a result of phi insn");
        self.func.dfg.append_phi_arg(phi_insn, value, block);
    }

    /// Inserts an insn at the current position and returns its result, if any.
    pub fn insert_insn(&mut self, data: InsnData) -> Option<ValueId> {
        let (_, result) = self.cursor.insert_insn_with_result(&mut self.func, data);
        result
    }

    pub fn last_insn(&self) -> Option<InsnId> {
        let block = self.current_block()?;
        self.func.layout.last_insn_of(block)
    }

    pub fn type_of(&self, value: ValueId) -> Type {
        self.func.dfg.value_ty(value)
    }

    fn insert_value(&mut self, data: InsnData) -> ValueId {
        self.cursor.insert_value(&mut self.func, data)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use crate::Type;

    #[test]
    fn entry_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::Unit);

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let v0 = builder.make_imm_value(1i8);
        let v1 = builder.make_imm_value(2i8);
        let v2 = builder.add(v0, v1);
        builder.sub(v2, v0);
        builder.ret(None);

        let func_ref = mb.define(builder);
        let module = mb.build();

        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func() -> unit {
    block0:
        v2.i8 = add 1.i8 2.i8;
        v3.i8 = sub v2 1.i8;
        return;
}
"
        );
    }

    #[test]
    fn entry_block_with_args() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I64], Type::Unit);

        let entry_block = builder.append_block();
        builder.switch_to_block(entry_block);
        let args = builder.args();
        let (arg0, arg1) = (args[0], args[1]);
        let v3 = builder.sext(arg0, Type::I64);
        builder.mul(v3, arg1);
        builder.ret(None);

        let func_ref = mb.define(builder);
        let module = mb.build();

        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func(v0.i32, v1.i64) -> unit {
    block0:
        v2.i64 = sext v0 i64;
        v3.i64 = mul v2 v1;
        return;
}
"
        );
    }

    #[test]
    fn then_else_merge_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I64], Type::Unit);

        let entry_block = builder.append_block();
        let then_block = builder.append_block();
        let else_block = builder.append_block();
        let merge_block = builder.append_block();

        let arg0 = builder.args()[0];

        builder.switch_to_block(entry_block);
        let cond = builder.make_imm_value(true);
        builder.br(cond, then_block, else_block);

        builder.switch_to_block(then_block);
        let v1 = builder.add(arg0, arg0);
        builder.jump(merge_block);

        builder.switch_to_block(else_block);
        let v2 = builder.mul(arg0, arg0);
        builder.jump(merge_block);

        builder.switch_to_block(merge_block);
        let v3 = builder.phi(Type::I64, &[(v1, then_block), (v2, else_block)]);
        builder.add(v3, arg0);
        builder.ret(None);

        let func_ref = mb.define(builder);
        let module = mb.build();

        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func(v0.i64) -> unit {
    block0:
        br 1.i1 block1 block2;

    block1:
        v2.i64 = add v0 v0;
        jump block3;

    block2:
        v3.i64 = mul v0 v0;
        jump block3;

    block3:
        v4.i64 = phi (v2 block1) (v3 block2);
        v5.i64 = add v4 v0;
        return;
}
"
        );
    }
}
