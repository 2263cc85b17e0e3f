#![allow(dead_code)]

use polymorph_interpreter::{EvalValue, ExecError, Machine};
use polymorph_ir::{
    BlockId, FuncRef, FunctionBuilder, GlobalVariableData, Linkage, Module, ModuleBuilder,
    Signature, Type, ValueId,
};

/// Number of `print` calls made by one run of `main` of [`sample_module`].
pub const SAMPLE_PRINTS: usize = 6 * 5 + 12 + 1;

/// Result and printed values of one run of `main`.
pub type Trace = (Option<EvalValue>, Vec<i64>);

pub fn run_main(module: &Module) -> Result<Trace, ExecError> {
    let mut machine = Machine::new(module);
    let res = machine.run_by_name("main", &[])?;
    Ok((res, machine.output().to_vec()))
}

/// A module with a loop nest, a single counted loop, array accesses, branches with phis and
/// calls, driven by `main`.
pub fn sample_module() -> Module {
    let mut mb = ModuleBuilder::new();
    let print = declare_print(&mut mb);
    let seed = mb.make_global(GlobalVariableData::new(
        "seed",
        Type::I32,
        Linkage::Private,
        Some(17i32.into()),
    ));

    let mix = define_mix(&mut mb);
    let nest = define_nest(&mut mb, mix, print);
    let scale = define_scale(&mut mb, print);
    let fill = define_fill(&mut mb);
    let leaf = define_leaf(&mut mb, print);

    let main = mb.declare_function(Signature::new("main", Linkage::Public, &[], Type::I64));
    let mut builder = mb.func_builder(main);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let a = builder.call(nest, &[], Type::I32).unwrap();
    let seed_addr = builder.make_global_value(seed);
    let s = builder.load(seed_addr, Type::I32);
    let b = builder.call(mix, &[a, s], Type::I32).unwrap();
    let c = builder.call(scale, &[b], Type::I64).unwrap();
    let d = builder.call(fill, &[], Type::I32).unwrap();
    builder.call(leaf, &[], Type::Unit);
    let d = builder.sext(d, Type::I64);
    let r = builder.add(c, d);
    builder.ret(Some(r));
    mb.define(builder);

    mb.build()
}

/// `mix(a, b)`: arithmetic on constants with a diamond merged by a phi.
fn define_mix(mb: &mut ModuleBuilder) -> FuncRef {
    let func_ref = mb.declare_function(Signature::new(
        "mix",
        Linkage::Private,
        &[Type::I32, Type::I32],
        Type::I32,
    ));
    let mut builder = mb.func_builder(func_ref);
    let [b0, b1, b2, b3] = blocks(&mut builder);
    let (a, b) = (builder.args()[0], builder.args()[1]);
    let mask = builder.make_imm_value(0x5a5ai32);
    let seven = builder.make_imm_value(7i32);
    let three = builder.make_imm_value(3i32);
    let low = builder.make_imm_value(0xffffi32);

    builder.switch_to_block(b0);
    let t0 = builder.xor(a, mask);
    let t1 = builder.mul(b, seven);
    let t2 = builder.add(t0, t1);
    let c = builder.slt(a, b);
    builder.br(c, b1, b2);

    builder.switch_to_block(b1);
    let u = builder.sub(t2, a);
    let u = builder.udiv(u, three);
    builder.jump(b3);

    builder.switch_to_block(b2);
    let v = builder.shl(b, three);
    let w = builder.or(v, t2);
    let w = builder.neg(w);
    builder.jump(b3);

    builder.switch_to_block(b3);
    let r = builder.phi(Type::I32, &[(u, b1), (w, b2)]);
    let r = builder.and(r, low);
    builder.ret(Some(r));

    mb.define(builder)
}

/// `nest()`: a 6 x 5 loop nest accumulating `mix(i, j)` in a stack slot and printing
/// `i * 5 + j` on every inner iteration.
fn define_nest(mb: &mut ModuleBuilder, mix: FuncRef, print: FuncRef) -> FuncRef {
    let func_ref = mb.declare_function(Signature::new("nest", Linkage::Private, &[], Type::I32));
    let mut builder = mb.func_builder(func_ref);
    let [b0, b1, b2, b3, b4, b5, b6] = blocks(&mut builder);
    let zero = builder.make_imm_value(0i32);
    let one = builder.make_imm_value(1i32);
    let n = builder.make_imm_value(6i32);
    let m = builder.make_imm_value(5i32);

    builder.switch_to_block(b0);
    let slot = builder.alloca(Type::I32, 1);
    builder.store(slot, zero);
    builder.jump(b1);

    builder.switch_to_block(b1);
    let i = builder.phi(Type::I32, &[(zero, b0)]);
    let c = builder.slt(i, n);
    builder.br(c, b2, b6);

    builder.switch_to_block(b2);
    builder.jump(b3);

    builder.switch_to_block(b3);
    let j = builder.phi(Type::I32, &[(zero, b2)]);
    let c = builder.slt(j, m);
    builder.br(c, b4, b5);

    builder.switch_to_block(b4);
    let v = builder.load(slot, Type::I32);
    let t = builder.call(mix, &[i, j], Type::I32).unwrap();
    let v = builder.add(v, t);
    builder.store(slot, v);
    let k = builder.mul(i, m);
    let k = builder.add(k, j);
    let k = builder.sext(k, Type::I64);
    builder.call(print, &[k], Type::Unit);
    let j_next = builder.add(j, one);
    builder.append_phi_arg(j, j_next, b4);
    builder.jump(b3);

    builder.switch_to_block(b5);
    let i_next = builder.add(i, one);
    builder.append_phi_arg(i, i_next, b5);
    builder.jump(b1);

    builder.switch_to_block(b6);
    let r = builder.load(slot, Type::I32);
    builder.ret(Some(r));

    mb.define(builder)
}

/// `scale(n)`: sums `(i * n) ^ i` over `0..12` in a phi, printing every `i`.
fn define_scale(mb: &mut ModuleBuilder, print: FuncRef) -> FuncRef {
    let func_ref = mb.declare_function(Signature::new(
        "scale",
        Linkage::Private,
        &[Type::I32],
        Type::I64,
    ));
    let mut builder = mb.func_builder(func_ref);
    let [b0, b1, b2, b3] = blocks(&mut builder);
    let n = builder.args()[0];
    let zero = builder.make_imm_value(0i32);
    let zero64 = builder.make_imm_value(0i64);
    let one = builder.make_imm_value(1i32);
    let bound = builder.make_imm_value(12i32);

    builder.switch_to_block(b0);
    let n64 = builder.sext(n, Type::I64);
    builder.jump(b1);

    builder.switch_to_block(b1);
    let i = builder.phi(Type::I32, &[(zero, b0)]);
    let acc = builder.phi(Type::I64, &[(zero64, b0)]);
    let c = builder.slt(i, bound);
    builder.br(c, b2, b3);

    builder.switch_to_block(b2);
    let x = builder.sext(i, Type::I64);
    builder.call(print, &[x], Type::Unit);
    let y = builder.mul(x, n64);
    let y = builder.xor(y, x);
    let acc_next = builder.add(acc, y);
    let i_next = builder.add(i, one);
    builder.append_phi_arg(i, i_next, b2);
    builder.append_phi_arg(acc, acc_next, b2);
    builder.jump(b1);

    builder.switch_to_block(b3);
    builder.ret(Some(acc));

    mb.define(builder)
}

/// `fill()`: writes squares to a stack array and reads two of them back.
fn define_fill(mb: &mut ModuleBuilder) -> FuncRef {
    let func_ref = mb.declare_function(Signature::new("fill", Linkage::Private, &[], Type::I32));
    let mut builder = mb.func_builder(func_ref);
    let [b0] = blocks(&mut builder);

    builder.switch_to_block(b0);
    let arr = builder.alloca(Type::I32, 8);
    let tmp = builder.alloca(Type::I64, 1);
    for idx in 0..8i32 {
        let idx_value = builder.make_imm_value(idx);
        let square = builder.make_imm_value(idx * idx + 1);
        let slot = builder.gep(arr, idx_value, Type::I32);
        builder.store(slot, square);
    }
    let big = builder.make_imm_value(-9i64);
    builder.store(tmp, big);

    let three = builder.make_imm_value(3i32);
    let seven = builder.make_imm_value(7i32);
    let p = builder.gep(arr, three, Type::I32);
    let x = builder.load(p, Type::I32);
    let p = builder.gep(arr, seven, Type::I32);
    let y = builder.load(p, Type::I32);
    let t = builder.load(tmp, Type::I64);
    let t = builder.trunc(t, Type::I32);
    let r = builder.sub(y, x);
    let r = builder.add(r, t);
    builder.ret(Some(r));

    mb.define(builder)
}

/// `leaf()`: a unit function printing `7`.
fn define_leaf(mb: &mut ModuleBuilder, print: FuncRef) -> FuncRef {
    let func_ref = mb.declare_function(Signature::new("leaf", Linkage::Private, &[], Type::Unit));
    let mut builder = mb.func_builder(func_ref);
    let [b0] = blocks(&mut builder);

    builder.switch_to_block(b0);
    let seven = builder.make_imm_value(7i64);
    builder.call(print, &[seven], Type::Unit);
    builder.ret(None);

    mb.define(builder)
}

/// A module with a single `main(a: i32, b: i32) -> i32` built by `body`.
pub fn binary_module(body: impl FnOnce(&mut FunctionBuilder, ValueId, ValueId) -> ValueId) -> Module {
    let mut mb = ModuleBuilder::new();
    let main = mb.declare_function(Signature::new(
        "main",
        Linkage::Public,
        &[Type::I32, Type::I32],
        Type::I32,
    ));
    let mut builder = mb.func_builder(main);
    let [b0] = blocks(&mut builder);
    builder.switch_to_block(b0);
    let (a, b) = (builder.args()[0], builder.args()[1]);
    let r = body(&mut builder, a, b);
    builder.ret(Some(r));
    mb.define(builder);
    mb.build()
}

pub fn run_binary(module: &Module, a: i32, b: i32) -> Result<Option<EvalValue>, ExecError> {
    Machine::new(module).run_by_name("main", &[a.into(), b.into()])
}

/// `main()` printing `i` for every `i` in `0..n`.
pub fn counted_loop_module(n: i32) -> Module {
    let mut mb = ModuleBuilder::new();
    let print = declare_print(&mut mb);
    let main = mb.declare_function(Signature::new("main", Linkage::Public, &[], Type::Unit));
    let mut builder = mb.func_builder(main);
    let [b0, b1, b2, b3] = blocks(&mut builder);
    let zero = builder.make_imm_value(0i32);
    let one = builder.make_imm_value(1i32);
    let bound = builder.make_imm_value(n);

    builder.switch_to_block(b0);
    builder.jump(b1);

    builder.switch_to_block(b1);
    let i = builder.phi(Type::I32, &[(zero, b0)]);
    let c = builder.slt(i, bound);
    builder.br(c, b2, b3);

    builder.switch_to_block(b2);
    let x = builder.sext(i, Type::I64);
    builder.call(print, &[x], Type::Unit);
    let i_next = builder.add(i, one);
    builder.append_phi_arg(i, i_next, b2);
    builder.jump(b1);

    builder.switch_to_block(b3);
    builder.ret(None);

    mb.define(builder);
    mb.build()
}

/// `main()` printing `i * m + j` for every `i` in `0..n` and `j` in `0..m`.
pub fn loop_nest_module(n: i32, m: i32) -> Module {
    let mut mb = ModuleBuilder::new();
    let print = declare_print(&mut mb);
    let main = mb.declare_function(Signature::new("main", Linkage::Public, &[], Type::Unit));
    let mut builder = mb.func_builder(main);
    let [b0, b1, b2, b3, b4, b5, b6] = blocks(&mut builder);
    let zero = builder.make_imm_value(0i32);
    let one = builder.make_imm_value(1i32);
    let n = builder.make_imm_value(n);
    let m = builder.make_imm_value(m);

    builder.switch_to_block(b0);
    builder.jump(b1);

    builder.switch_to_block(b1);
    let i = builder.phi(Type::I32, &[(zero, b0)]);
    let c = builder.slt(i, n);
    builder.br(c, b2, b6);

    builder.switch_to_block(b2);
    builder.jump(b3);

    builder.switch_to_block(b3);
    let j = builder.phi(Type::I32, &[(zero, b2)]);
    let c = builder.slt(j, m);
    builder.br(c, b4, b5);

    builder.switch_to_block(b4);
    let k = builder.mul(i, m);
    let k = builder.add(k, j);
    let k = builder.sext(k, Type::I64);
    builder.call(print, &[k], Type::Unit);
    let j_next = builder.add(j, one);
    builder.append_phi_arg(j, j_next, b4);
    builder.jump(b3);

    builder.switch_to_block(b5);
    let i_next = builder.add(i, one);
    builder.append_phi_arg(i, i_next, b5);
    builder.jump(b1);

    builder.switch_to_block(b6);
    builder.ret(None);

    mb.define(builder);
    mb.build()
}

/// `main(a, b)` mixing arithmetic with accesses of two stack slots and a global, all in the
/// entry block.
pub fn memory_module() -> Module {
    let mut mb = ModuleBuilder::new();
    let g = mb.make_global(GlobalVariableData::new(
        "g",
        Type::I32,
        Linkage::Private,
        Some(5i32.into()),
    ));
    let main = mb.declare_function(Signature::new(
        "main",
        Linkage::Public,
        &[Type::I32, Type::I32],
        Type::I32,
    ));
    let mut builder = mb.func_builder(main);
    let [b0] = blocks(&mut builder);
    builder.switch_to_block(b0);
    let (a, b) = (builder.args()[0], builder.args()[1]);
    let s0 = builder.alloca(Type::I32, 1);
    let s1 = builder.alloca(Type::I32, 1);
    let gv = builder.make_global_value(g);

    builder.store(s0, a);
    builder.store(s1, b);
    let x = builder.add(a, b);
    let old = builder.load(gv, Type::I32);
    builder.store(gv, x);
    let y = builder.load(s0, Type::I32);
    builder.store(s0, x);
    let z = builder.sub(y, old);
    let w = builder.load(s1, Type::I32);
    let v = builder.load(s0, Type::I32);
    let p = builder.mul(w, v);
    builder.store(s1, p);
    let q = builder.load(gv, Type::I32);
    let r = builder.xor(z, q);
    let t = builder.load(s1, Type::I32);
    let r = builder.add(r, t);
    builder.ret(Some(r));

    mb.define(builder);
    mb.build()
}

fn declare_print(mb: &mut ModuleBuilder) -> FuncRef {
    mb.declare_function(Signature::new(
        "print",
        Linkage::External,
        &[Type::I64],
        Type::Unit,
    ))
}

fn blocks<const N: usize>(builder: &mut FunctionBuilder) -> [BlockId; N] {
    std::array::from_fn(|_| builder.append_block())
}
