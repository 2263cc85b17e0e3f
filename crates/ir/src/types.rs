//! This module contains the IR type definitions.
use std::fmt;

/// Types of IR values.
///
/// Aggregates are never values: stack slots and globals hold `len` elements of a
/// scalar type and are addressed through `ptr` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    Unit,
}

impl Type {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::I1 | Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_pointer(self) -> bool {
        self == Self::Ptr
    }

    pub fn is_unit(self) -> bool {
        self == Self::Unit
    }

    /// Returns the bit width of the type.
    pub fn bits(self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 | Self::Ptr => 64,
            Self::Unit => 0,
        }
    }

    /// Returns the number of bytes a value of the type occupies in memory.
    pub fn size_of(self) -> usize {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 | Self::Ptr => 8,
            Self::Unit => 0,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::I1 => "i1",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Ptr => "ptr",
            Self::Unit => "unit",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
