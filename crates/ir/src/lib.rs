pub mod builder;
pub mod cfg;
pub mod dfg;
pub mod func_cursor;
pub mod function;
pub mod global_variable;
pub mod insn;
pub mod ir_writer;
pub mod layout;
pub mod linkage;
pub mod module;
pub mod types;
pub mod value;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use cfg::ControlFlowGraph;
pub use dfg::{Block, BlockId, DataFlowGraph};
pub use func_cursor::{CursorLocation, FuncCursor, InsnInserter};
pub use function::{Function, Signature};
pub use global_variable::{GlobalVariable, GlobalVariableData};
pub use insn::{
    BinaryOp, BranchInfo, CastOp, CmpOp, InsnData, InsnId, IntrinsicOp, UnaryOp,
};
pub use ir_writer::{FuncWriter, ModuleWriter};
pub use layout::Layout;
pub use linkage::Linkage;
pub use module::{FuncRef, Module};
pub use types::Type;
pub use value::{Immediate, Value, ValueId};
