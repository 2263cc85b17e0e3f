use std::fmt;

/// Linkage of symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    /// The symbol is defined in the module, and can be used from the outside of the module.
    Public,

    /// The symbol is defined in the module, and can NOT be referred from another module.
    #[default]
    Private,

    /// The symbol is defined outside of the module.
    External,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
            Self::External => write!(f, "external"),
        }
    }
}
