use polymorph_ir::{CmpOp, Immediate, Type};

/// A runtime value held by a frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EvalValue {
    Imm(Immediate),
    /// A byte address into the machine memory.
    Ptr(u64),
    #[default]
    Undef,
}

impl EvalValue {
    pub fn as_imm(self) -> Option<Immediate> {
        match self {
            Self::Imm(imm) => Some(imm),
            _ => None,
        }
    }

    pub fn as_ptr(self) -> Option<u64> {
        match self {
            Self::Ptr(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn is_undef(self) -> bool {
        matches!(self, Self::Undef)
    }

    /// Returns the value as `i64`, sign-extending immediates.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Imm(imm) => Some(imm.as_i64()),
            Self::Ptr(addr) => Some(addr as i64),
            Self::Undef => None,
        }
    }

    /// Returns the type of the value, `None` for undef.
    pub fn ty(self) -> Option<Type> {
        match self {
            Self::Imm(imm) => Some(imm.ty()),
            Self::Ptr(_) => Some(Type::Ptr),
            Self::Undef => None,
        }
    }

    /// Compares two pointers.
    pub(crate) fn cmp_ptr(code: CmpOp, lhs: u64, rhs: u64) -> Immediate {
        let (slhs, srhs) = (lhs as i64, rhs as i64);
        let res = match code {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Slt => slhs < srhs,
            CmpOp::Sle => slhs <= srhs,
            CmpOp::Sgt => slhs > srhs,
            CmpOp::Sge => slhs >= srhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        };
        Immediate::I1(res)
    }
}

impl From<Immediate> for EvalValue {
    fn from(imm: Immediate) -> Self {
        Self::Imm(imm)
    }
}

macro_rules! eval_value_from_primary {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for EvalValue {
                fn from(val: $ty) -> Self {
                    Self::Imm(val.into())
                }
            }
        )*
    };
}

eval_value_from_primary!(bool, i8, i16, i32, i64);
