//! Return address protection with a shadow stack.
//!
//! Every instrumented function pushes its return address to a module level array on entry.
//! All returns are funneled through one epilogue that pops the saved address and compares it
//! with the live one, calling `abort` on a mismatch.
//!
//! ```text
//! entry:                                  epilogue:
//!     sp = load shadow_sp                     r = phi ...
//!     slot = gep shadow_stack sp              sp = sub (load shadow_sp) 1
//!     store slot (return_address 0)           store shadow_sp sp
//!     store shadow_sp (add sp 1)              saved = load (gep shadow_stack sp)
//!     ...                                     ok = eq saved (return_address 0)
//!                                             br ok ret trap
//! ```

use polymorph_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, BlockId, CmpOp, FuncRef, Function, GlobalVariable, GlobalVariableData, Immediate,
    InsnData, InsnId, IntrinsicOp, Linkage, Module, Signature, Type, ValueId,
};
use rand::rngs::StdRng;
use tracing::{debug, trace};

use super::{definitions, Transform};
use crate::{cfg_edit::entry_allocas, config::ShadowStackConfig, Result};

pub const SHADOW_SP: &str = "shadow_sp";
pub const SHADOW_STACK: &str = "shadow_stack";
const ABORT: &str = "abort";

#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowStack {
    config: ShadowStackConfig,
}

impl ShadowStack {
    pub fn new(config: ShadowStackConfig) -> Self {
        Self { config }
    }
}

impl Transform for ShadowStack {
    fn name(&self) -> &'static str {
        "shadow_stack"
    }

    fn apply(&self, module: &mut Module, _rng: &mut StdRng) -> Result<bool> {
        if module.global_by_symbol(SHADOW_SP).is_some() {
            trace!("module is already instrumented");
            return Ok(false);
        }

        let targets: Vec<_> = definitions(module)
            .into_iter()
            .filter(|func_ref| {
                let func = &module.funcs[*func_ref];
                func.sig.name() != ABORT && !returns_of(func).is_empty()
            })
            .collect();
        if targets.is_empty() {
            return Ok(false);
        }

        let globals = ShadowGlobals::declare(module, self.config.capacity);
        for func_ref in targets {
            let func = &mut module.funcs[func_ref];
            debug!(func = func.sig.name(), "instrument returns");
            globals.instrument(func);
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy)]
struct ShadowGlobals {
    sp: GlobalVariable,
    stack: GlobalVariable,
    abort: FuncRef,
}

impl ShadowGlobals {
    fn declare(module: &mut Module, capacity: usize) -> Self {
        let sp = module.make_global(GlobalVariableData::new(
            SHADOW_SP,
            Type::I32,
            Linkage::Private,
            Some(Immediate::I32(0)),
        ));
        let stack = module.make_global(GlobalVariableData::array(
            SHADOW_STACK,
            Type::Ptr,
            capacity,
            Linkage::Private,
        ));
        let abort = match module.func_by_name(ABORT) {
            Some(abort) => abort,
            None => module.declare_function(Signature::new(
                ABORT,
                Linkage::External,
                &[],
                Type::Unit,
            )),
        };

        Self { sp, stack, abort }
    }

    fn instrument(&self, func: &mut Function) {
        let Some(entry) = func.layout.entry_block() else {
            return;
        };
        let returns = returns_of(func);
        let sp_addr = func.dfg.make_global_value(self.sp);
        let stack_addr = func.dfg.make_global_value(self.stack);
        let one = func.dfg.make_imm_value(1i32);

        // Push after the stack slots so that the alloca prefix stays intact.
        let loc = entry_allocas(func)
            .last()
            .map_or(CursorLocation::BlockTop(entry), |&last| {
                CursorLocation::At(last)
            });
        let mut cursor = InsnInserter::at_location(loc);
        let sp = cursor.insert_value(func, InsnData::load(sp_addr, Type::I32));
        let slot = cursor.insert_value(func, InsnData::gep(stack_addr, sp, Type::Ptr));
        let ra = insert_return_address(&mut cursor, func);
        cursor.insert_insn_data(func, InsnData::store(slot, ra));
        let sp_inc = cursor.insert_value(func, InsnData::binary(BinaryOp::Add, sp, one));
        cursor.insert_insn_data(func, InsnData::store(sp_addr, sp_inc));

        let epilogue = func.dfg.make_block();
        let ret_block = func.dfg.make_block();
        let trap_block = func.dfg.make_block();
        func.layout.append_block(epilogue);
        func.layout.append_block(ret_block);
        func.layout.append_block(trap_block);

        let merged = self.redirect_returns(func, &returns, epilogue);

        // Pop and check.
        cursor.set_location(CursorLocation::BlockBottom(epilogue));
        let sp = cursor.insert_value(func, InsnData::load(sp_addr, Type::I32));
        let sp_dec = cursor.insert_value(func, InsnData::binary(BinaryOp::Sub, sp, one));
        cursor.insert_insn_data(func, InsnData::store(sp_addr, sp_dec));
        let slot = cursor.insert_value(func, InsnData::gep(stack_addr, sp_dec, Type::Ptr));
        let saved = cursor.insert_value(func, InsnData::load(slot, Type::Ptr));
        let ra = insert_return_address(&mut cursor, func);
        let ok = cursor.insert_value(func, InsnData::cmp(CmpOp::Eq, saved, ra));
        cursor.insert_insn_data(func, InsnData::branch(ok, ret_block, trap_block));

        cursor.set_location(CursorLocation::BlockBottom(ret_block));
        cursor.insert_insn_data(func, InsnData::ret(merged));

        cursor.set_location(CursorLocation::BlockBottom(trap_block));
        cursor.insert_insn_data(func, InsnData::call(self.abort, &[], Type::Unit));
        cursor.insert_insn_data(func, InsnData::Unreachable);
    }

    /// Turns every return into a jump to `epilogue` and merges the returned values there.
    fn redirect_returns(
        &self,
        func: &mut Function,
        returns: &[InsnId],
        epilogue: BlockId,
    ) -> Option<ValueId> {
        let ret_ty = func.sig.ret_ty();
        let phi = (!ret_ty.is_unit()).then(|| {
            let mut cursor = InsnInserter::at_location(CursorLocation::BlockBottom(epilogue));
            cursor.insert_insn_with_result(func, InsnData::phi(ret_ty))
        });

        for &ret in returns {
            let block = func.layout.insn_block(ret);
            let value = func.dfg.insn_args(ret).first().copied();
            func.dfg.replace_insn(ret, InsnData::jump(epilogue));
            if let Some((phi, _)) = phi {
                let value = value.unwrap_or_else(|| func.dfg.make_undef_value(ret_ty));
                func.dfg.append_phi_arg(phi, value, block);
            }
        }

        phi.and_then(|(_, result)| result)
    }
}

fn insert_return_address(cursor: &mut InsnInserter, func: &mut Function) -> ValueId {
    let depth = func.dfg.make_imm_value(0i32);
    cursor.insert_value(
        func,
        InsnData::intrinsic(IntrinsicOp::ReturnAddress, &[depth]),
    )
}

fn returns_of(func: &Function) -> Vec<InsnId> {
    func.layout
        .iter_block()
        .flat_map(|block| func.layout.iter_insn(block))
        .filter(|insn| func.dfg.is_return(*insn))
        .collect()
}
