//! A reference interpreter for `polymorph-ir` modules.
//!
//! It is used to check that diversified modules behave like the modules they were derived from.
pub mod error;
pub mod frame;
pub mod machine;
pub mod value;

pub use error::{ExecError, Result};
pub use machine::Machine;
pub use value::EvalValue;
