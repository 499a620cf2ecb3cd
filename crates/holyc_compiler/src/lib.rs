//! # HolyC Compiler
//!
//! The back half of the pipeline: HIR lowering, emission to the crate's
//! LLVM-module-shaped IR, the self-hosted execution engine with named JIT
//! sessions, and the AOT build glue.
//!
//! ## Architecture
//!
//! - **HIR**: closed statement/expression variants with resolved defaults,
//!   exception regions, and reflection metadata.
//! - **IR**: typed module of packed struct layouts, globals, and CFG
//!   function bodies; printed as standard LLVM syntax and parsed back for
//!   the backend's parse → verify → print contract.
//! - **Engine**: a typed interpreter over verified IR using real host
//!   memory, with the runtime shims implemented in-process.
//!
//! Data flows strictly forward; the only back-edge is the session store
//! that caches installed modules under a session name.

pub mod backend;
pub mod emit;
pub mod hir;
pub mod ir;
pub mod jit;
pub mod lowering;
pub mod pipeline;
pub mod runtime;

use holyc_frontend::Diagnostic;
use thiserror::Error;

/// Compiler-side phase failure.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// A frontend or lowering diagnostic, rendered in canonical form.
    #[error("{0}")]
    Diagnostic(Diagnostic),

    #[error("{0}")]
    CodeGen(String),

    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Jit(String),

    #[error("{0}")]
    Io(String),
}

impl From<Diagnostic> for CompilerError {
    fn from(diag: Diagnostic) -> Self {
        CompilerError::Diagnostic(diag)
    }
}

pub use backend::OptLevel;
pub use jit::SessionStore;
pub use pipeline::{PhaseClock, PhaseTiming, PipelineOptions};
