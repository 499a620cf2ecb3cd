//! The compiler's own LLVM-module-shaped IR.
//!
//! A [`Module`](module::Module) owns named struct layouts, globals, and
//! functions whose bodies are CFGs of labeled blocks. The
//! [`FunctionBuilder`](builder::FunctionBuilder) maintains an insertion point
//! the way an LLVM IRBuilder does; the printer renders deterministic
//! LLVM-syntax text and the parser reads the same subset back for the
//! backend's parse → verify → print contract.
//!
//! Named struct layouts are packed: field offsets are the plain prefix sums
//! of field sizes, matching sema's layout estimates and the runtime
//! reflection cache.

pub mod builder;
pub mod module;
pub mod parser;
pub mod printer;
pub mod types;
pub mod verify;

pub use builder::FunctionBuilder;
pub use module::{
    Block, Callee, Const, Function, Global, Inst, IrLinkage, Module, Op, Param, StructDef, Term,
    Value,
};
pub use types::{BinOp, CastOp, ICmpPred, RmwOp, Type};
