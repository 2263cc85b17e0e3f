use cranelift_entity::entity_impl;

use super::{Immediate, Linkage, Type};

/// An opaque reference to [`GlobalVariableData`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct GlobalVariable(pub u32);
entity_impl!(GlobalVariable, "gv");

/// A module level variable holding `len` elements of `ty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalVariableData {
    pub symbol: String,
    pub ty: Type,
    pub len: usize,
    pub linkage: Linkage,
    /// Initial value of every element. Zero initialized if `None`.
    pub init: Option<Immediate>,
}

impl GlobalVariableData {
    pub fn new(symbol: &str, ty: Type, linkage: Linkage, init: Option<Immediate>) -> Self {
        Self {
            symbol: symbol.to_string(),
            ty,
            len: 1,
            linkage,
            init,
        }
    }

    pub fn array(symbol: &str, ty: Type, len: usize, linkage: Linkage) -> Self {
        Self {
            symbol: symbol.to_string(),
            ty,
            len,
            linkage,
            init: None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.len != 1
    }

    /// Returns the size of the variable in bytes.
    pub fn size_of(&self) -> usize {
        self.ty.size_of() * self.len
    }
}
