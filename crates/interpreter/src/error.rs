use polymorph_ir::{InsnId, ValueId};

pub type Result<T> = std::result::Result<T, ExecError>;

/// Reasons an execution stops before the entry function returns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("the program called `abort`")]
    Aborted,

    #[error("`unreachable` executed in `{func}`")]
    Unreachable { func: String },

    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(u64),

    #[error("division by zero at `{insn}` in `{func}`")]
    DivisionByZero { func: String, insn: InsnId },

    #[error("access of {size} bytes at {addr:#x} is out of bounds")]
    OutOfBounds { addr: u64, size: usize },

    #[error("call to unknown host function `{0}`")]
    UnknownHostFunction(String),

    #[error("`{value}` is undefined when used in `{func}`")]
    Undef { func: String, value: ValueId },
}
