//! Dependency and alias queries licensing the exchange of adjacent instructions.

use polymorph_ir::{Function, GlobalVariable, InsnId, Value, ValueId};

/// Syntactic origin of a pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// The result of an `alloca`.
    StackSlot(InsnId),
    /// The address of a module global.
    Global(GlobalVariable),
    /// Anything else: arguments, loaded pointers, `gep` results, phis.
    Unknown,
}

impl Provenance {
    pub fn of(func: &Function, ptr: ValueId) -> Self {
        match func.dfg.value(ptr) {
            Value::Insn { insn, .. } if func.dfg.is_alloca(*insn) => Self::StackSlot(*insn),
            Value::Global { gv, .. } => Self::Global(*gv),
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    NoAlias,
    MustAlias,
    MayAlias,
}

pub fn alias(lhs: Provenance, rhs: Provenance) -> AliasResult {
    match (lhs, rhs) {
        (Provenance::Unknown, _) | (_, Provenance::Unknown) => AliasResult::MayAlias,
        (lhs, rhs) if lhs == rhs => AliasResult::MustAlias,
        _ => AliasResult::NoAlias,
    }
}

/// Returns `true` if `a`, immediately followed by `b` in the same block, can be swapped with `b`
/// without changing the behavior of the function.
pub fn can_exchange(func: &Function, a: InsnId, b: InsnId) -> bool {
    let a_data = func.dfg.insn(a);
    let b_data = func.dfg.insn(b);

    if a_data.is_terminator() || b_data.is_terminator() || a_data.is_phi() || b_data.is_phi() {
        return false;
    }

    if a_data.is_call() || b_data.is_call() {
        return false;
    }

    // Stack slots stay where they are so the entry alloca prefix is never broken up.
    if a_data.is_alloca() || b_data.is_alloca() {
        return false;
    }

    if depends_on(func, a, b) || depends_on(func, b, a) {
        return false;
    }

    match (a_data.memory_addr(), b_data.memory_addr()) {
        (Some(a_addr), Some(b_addr)) => {
            alias(Provenance::of(func, a_addr), Provenance::of(func, b_addr))
                == AliasResult::NoAlias
        }
        _ => true,
    }
}

/// Returns `true` if `user` consumes the result of `def`.
fn depends_on(func: &Function, def: InsnId, user: InsnId) -> bool {
    func.dfg
        .insn_result(def)
        .is_some_and(|result| func.dfg.insn_args(user).contains(&result))
}
