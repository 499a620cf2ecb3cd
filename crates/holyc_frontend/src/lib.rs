//! # HolyC Frontend
//!
//! The source-facing half of the compiler pipeline: preprocessing, lexing,
//! parsing, and semantic analysis. Each phase is a single failure boundary
//! that either produces its output or a [`Diagnostic`](diagnostics::Diagnostic);
//! nothing recovers mid-phase.
//!
//! ```text
//! source text ──preprocess──▶ expanded text ──lex/parse──▶ Node tree
//!              ──sema──▶ TypedNode tree (input to HIR lowering)
//! ```

pub mod ast;
pub mod decl;
pub mod diagnostics;
pub mod lexer;
pub mod literals;
pub mod parser;
pub mod preprocessor;
pub mod printfmt;
pub mod sema;
pub mod types;

use thiserror::Error;

/// Driver execution mode; gates `#ifjit`/`#ifaot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Jit,
    Aot,
}

/// Frontend phase failure.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("{0}")]
    Diagnostic(diagnostics::Diagnostic),
}

impl From<diagnostics::Diagnostic> for FrontendError {
    fn from(diag: diagnostics::Diagnostic) -> Self {
        FrontendError::Diagnostic(diag)
    }
}

pub use ast::{dump_typed, Node, NodeKind, TypedNode};
pub use decl::Linkage;
pub use diagnostics::{Diagnostic, Severity};
pub use preprocessor::{run_preprocessor, PreprocessorOptions};
pub use types::{Ty, TyKind, ValueClass};
