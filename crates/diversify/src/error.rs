use polymorph_ir::{BlockId, FuncRef, InsnId, ValueId};

pub type Result<T> = std::result::Result<T, DiversifyError>;

/// Fatal errors raised while diversifying a module.
///
/// A pass that cannot prove its preconditions skips the candidate silently; these errors only
/// report a broken IR, and the run stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiversifyError {
    #[error("`{pass}` left `{func}` in a broken state: {violation}")]
    InvariantViolation {
        pass: &'static str,
        func: String,
        violation: Violation,
    },

    #[error("`{value}` of a removed region is still used by `{user}` in `{func}`")]
    LiveValueRemoved {
        func: String,
        value: ValueId,
        user: InsnId,
    },
}

/// A single IR invariant found broken by [`crate::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("entry block `{0}` has predecessors")]
    EntryHasPreds(BlockId),

    #[error("`{0}` doesn't end with a terminator")]
    MissingTerminator(BlockId),

    #[error("terminator `{insn}` is followed by another insn in `{block}`")]
    MisplacedTerminator { insn: InsnId, block: BlockId },

    #[error("phi `{0}` follows a non-phi insn")]
    MisplacedPhi(InsnId),

    #[error("phi `{insn}` has {found} incoming values but `{block}` has {expected} predecessors")]
    PhiArity {
        insn: InsnId,
        block: BlockId,
        expected: usize,
        found: usize,
    },

    #[error("phi `{insn}` has no incoming value from `{pred}`")]
    PhiMissingIncoming { insn: InsnId, pred: BlockId },

    #[error("`{dest}` targeted by `{insn}` is not in the layout")]
    DanglingBranch { insn: InsnId, dest: BlockId },

    #[error("`{value}` used by `{user}` is defined by a removed insn")]
    DanglingUse { value: ValueId, user: InsnId },

    #[error("`{value}` used by `{user}` is not dominated by its definition")]
    UseNotDominated { value: ValueId, user: InsnId },

    #[error("use-list of `{value}` doesn't record `{user}`")]
    StaleUseList { value: ValueId, user: InsnId },

    #[error("`{insn}` passes {found} arguments to `{callee}` which takes {expected}")]
    CallArity {
        insn: InsnId,
        callee: FuncRef,
        expected: usize,
        found: usize,
    },
}
