//! This module contains the IR value definition.
use std::{fmt, ops};

use cranelift_entity::entity_impl;

use super::{GlobalVariable, InsnId, Type};

/// An opaque reference to [`Value`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ValueId(pub u32);
entity_impl!(ValueId, "v");

/// A value data definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The value is defined by an instruction.
    Insn { insn: InsnId, ty: Type },

    /// The value is a function argument.
    Arg { ty: Type, idx: usize },

    /// The value is an immediate value.
    Immediate { imm: Immediate, ty: Type },

    /// The value is the address of a global variable.
    Global { gv: GlobalVariable, ty: Type },

    Undef { ty: Type },
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Self::Insn { ty, .. }
            | Self::Arg { ty, .. }
            | Self::Immediate { ty, .. }
            | Self::Global { ty, .. }
            | Self::Undef { ty } => *ty,
        }
    }
}

/// An integer literal. All arithmetic wraps around the bit width of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I1(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl Immediate {
    pub fn ty(self) -> Type {
        match self {
            Self::I1(..) => Type::I1,
            Self::I8(..) => Type::I8,
            Self::I16(..) => Type::I16,
            Self::I32(..) => Type::I32,
            Self::I64(..) => Type::I64,
        }
    }

    /// Truncates `val` to the width of `ty`.
    ///
    /// # Panics
    /// Panics if `ty` is not an integral type.
    pub fn from_i64(val: i64, ty: Type) -> Self {
        match ty {
            Type::I1 => Self::I1(val & 1 != 0),
            Type::I8 => Self::I8(val as i8),
            Type::I16 => Self::I16(val as i16),
            Type::I32 => Self::I32(val as i32),
            Type::I64 => Self::I64(val),
            Type::Ptr | Type::Unit => panic!("`{ty}` can't hold an immediate"),
        }
    }

    /// Returns the value sign-extended to 64 bits. `i1` is treated as `0` or `1`.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::I1(val) => val as i64,
            Self::I8(val) => val as i64,
            Self::I16(val) => val as i64,
            Self::I32(val) => val as i64,
            Self::I64(val) => val,
        }
    }

    /// Returns the value zero-extended to 64 bits.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::I1(val) => val as u64,
            Self::I8(val) => val as u8 as u64,
            Self::I16(val) => val as u16 as u64,
            Self::I32(val) => val as u32 as u64,
            Self::I64(val) => val as u64,
        }
    }

    pub fn as_usize(self) -> usize {
        self.as_u64() as usize
    }

    pub fn zero(ty: Type) -> Self {
        Self::from_i64(0, ty)
    }

    pub fn one(ty: Type) -> Self {
        Self::from_i64(1, ty)
    }

    pub fn all_one(ty: Type) -> Self {
        Self::from_i64(-1, ty)
    }

    pub fn is_zero(self) -> bool {
        self.as_u64() == 0
    }

    pub fn is_one(self) -> bool {
        self.as_u64() == 1
    }

    pub fn sdiv(self, rhs: Self) -> Self {
        self.apply_binop(rhs, |lhs, rhs| lhs.wrapping_div(rhs))
    }

    pub fn udiv(self, rhs: Self) -> Self {
        self.apply_unsigned_binop(rhs, |lhs, rhs| lhs / rhs)
    }

    pub fn srem(self, rhs: Self) -> Self {
        self.apply_binop(rhs, |lhs, rhs| lhs.wrapping_rem(rhs))
    }

    pub fn urem(self, rhs: Self) -> Self {
        self.apply_unsigned_binop(rhs, |lhs, rhs| lhs % rhs)
    }

    pub fn shl(self, rhs: Self) -> Self {
        let amount = self.shift_amount(rhs);
        self.apply_binop(rhs, |lhs, _| lhs.wrapping_shl(amount))
    }

    /// Logical shift right.
    pub fn shr(self, rhs: Self) -> Self {
        let amount = self.shift_amount(rhs);
        self.apply_unsigned_binop(rhs, |lhs, _| lhs.wrapping_shr(amount))
    }

    /// Arithmetic shift right.
    pub fn sar(self, rhs: Self) -> Self {
        let amount = self.shift_amount(rhs);
        self.apply_binop(rhs, |lhs, _| lhs.wrapping_shr(amount))
    }

    pub fn imm_eq(self, rhs: Self) -> Self {
        debug_assert_eq!(self.ty(), rhs.ty());
        (self == rhs).into()
    }

    pub fn imm_ne(self, rhs: Self) -> Self {
        debug_assert_eq!(self.ty(), rhs.ty());
        (self != rhs).into()
    }

    pub fn slt(self, rhs: Self) -> Self {
        (self.signed() < rhs.signed()).into()
    }

    pub fn sle(self, rhs: Self) -> Self {
        (self.signed() <= rhs.signed()).into()
    }

    pub fn sgt(self, rhs: Self) -> Self {
        (self.signed() > rhs.signed()).into()
    }

    pub fn sge(self, rhs: Self) -> Self {
        (self.signed() >= rhs.signed()).into()
    }

    pub fn lt(self, rhs: Self) -> Self {
        (self.as_u64() < rhs.as_u64()).into()
    }

    pub fn le(self, rhs: Self) -> Self {
        (self.as_u64() <= rhs.as_u64()).into()
    }

    pub fn gt(self, rhs: Self) -> Self {
        (self.as_u64() > rhs.as_u64()).into()
    }

    pub fn ge(self, rhs: Self) -> Self {
        (self.as_u64() >= rhs.as_u64()).into()
    }

    pub fn sext(self, ty: Type) -> Self {
        debug_assert!(self.ty() <= ty);
        Self::from_i64(self.signed(), ty)
    }

    pub fn zext(self, ty: Type) -> Self {
        debug_assert!(self.ty() <= ty);
        Self::from_i64(self.as_u64() as i64, ty)
    }

    pub fn trunc(self, ty: Type) -> Self {
        debug_assert!(self.ty() >= ty);
        Self::from_i64(self.as_i64(), ty)
    }

    /// Signed interpretation, where `i1` true is `-1`.
    fn signed(self) -> i64 {
        match self {
            Self::I1(val) => -(val as i64),
            _ => self.as_i64(),
        }
    }

    fn shift_amount(self, rhs: Self) -> u32 {
        (rhs.as_u64() % self.ty().bits() as u64) as u32
    }

    fn apply_binop(self, rhs: Self, f: impl FnOnce(i64, i64) -> i64) -> Self {
        debug_assert_eq!(self.ty(), rhs.ty());
        Self::from_i64(f(self.as_i64(), rhs.as_i64()), self.ty())
    }

    fn apply_unsigned_binop(self, rhs: Self, f: impl FnOnce(u64, u64) -> u64) -> Self {
        debug_assert_eq!(self.ty(), rhs.ty());
        Self::from_i64(f(self.as_u64(), rhs.as_u64()) as i64, self.ty())
    }
}

impl ops::Add for Immediate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_add)
    }
}

impl ops::Sub for Immediate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_sub)
    }
}

impl ops::Mul for Immediate {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_mul)
    }
}

impl ops::Neg for Immediate {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_i64(self.as_i64().wrapping_neg(), self.ty())
    }
}

impl ops::BitAnd for Immediate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.apply_binop(rhs, |lhs, rhs| lhs & rhs)
    }
}

impl ops::BitOr for Immediate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.apply_binop(rhs, |lhs, rhs| lhs | rhs)
    }
}

impl ops::BitXor for Immediate {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        self.apply_binop(rhs, |lhs, rhs| lhs ^ rhs)
    }
}

impl ops::Not for Immediate {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_i64(!self.as_i64(), self.ty())
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

macro_rules! imm_from_primary {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Immediate {
                fn from(val: $ty) -> Self {
                    Self::$variant(val)
                }
            }
        )*
    };
}

imm_from_primary!(bool => I1, i8 => I8, i16 => I16, i32 => I32, i64 => I64);
