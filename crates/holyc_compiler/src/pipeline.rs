//! The compiler pipeline facade.
//!
//! One function per driver command, each running the phases it needs with
//! optional per-phase timing. Phases never recover internally: the first
//! failing phase ends the run with its diagnostic.

use crate::emit::emit_ir;
use crate::hir::dump_module;
use crate::ir::printer::print_module;
use crate::lowering::lower_to_hir;
use crate::CompilerError;
use holyc_frontend::parser::parse;
use holyc_frontend::preprocessor::{run_preprocessor, PreprocessorOptions};
use holyc_frontend::sema::analyze;
use holyc_frontend::{dump_typed, ExecutionMode};
use std::time::Instant;

/// Wall-clock seconds spent in one pipeline phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTiming {
    pub name: String,
    pub seconds: f64,
}

/// Collects phase timings when the driver asked for them.
pub struct PhaseClock<'a> {
    timings: Option<&'a mut Vec<PhaseTiming>>,
}

impl<'a> PhaseClock<'a> {
    pub fn new(timings: Option<&'a mut Vec<PhaseTiming>>) -> Self {
        PhaseClock { timings }
    }

    pub fn disabled() -> Self {
        PhaseClock { timings: None }
    }

    pub fn time<T>(&mut self, name: &str, body: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = body();
        if let Some(timings) = self.timings.as_deref_mut() {
            timings.push(PhaseTiming {
                name: name.to_string(),
                seconds: start.elapsed().as_secs_f64(),
            });
        }
        result
    }
}

/// Options shared by every pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: ExecutionMode,
    pub strict_mode: bool,
    pub include_dirs: Vec<String>,
    pub diagnose_div_zero: bool,
}

impl PipelineOptions {
    pub fn new(mode: ExecutionMode) -> Self {
        PipelineOptions {
            mode,
            strict_mode: true,
            include_dirs: Vec::new(),
            diagnose_div_zero: false,
        }
    }

    fn preprocessor_options(&self) -> PreprocessorOptions {
        let mut options = PreprocessorOptions::new(self.mode);
        options.include_dirs = self.include_dirs.clone();
        options.diagnose_div_zero = self.diagnose_div_zero;
        options
    }
}

/// Preprocess only.
pub fn preprocess_source(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
    clock: &mut PhaseClock,
) -> Result<String, CompilerError> {
    let pp_options = options.preprocessor_options();
    clock
        .time("preprocess", || run_preprocessor(source, filename, &pp_options))
        .map_err(CompilerError::from)
}

/// Preprocess + parse + sema; returns `ok\n` on success.
pub fn check_source(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
    clock: &mut PhaseClock,
) -> Result<String, CompilerError> {
    let pp_options = options.preprocessor_options();
    let preprocessed = clock.time("preprocess", || run_preprocessor(source, filename, &pp_options))?;
    let parsed = clock.time("parse", || parse(&preprocessed, filename))?;
    clock.time("sema", || analyze(&parsed, filename, options.strict_mode))?;
    Ok("ok\n".to_string())
}

/// Preprocess + parse + sema, rendering the typed tree.
pub fn parse_and_dump_ast(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
    clock: &mut PhaseClock,
) -> Result<String, CompilerError> {
    let pp_options = options.preprocessor_options();
    let preprocessed = clock.time("preprocess", || run_preprocessor(source, filename, &pp_options))?;
    let parsed = clock.time("parse", || parse(&preprocessed, filename))?;
    let typed = clock.time("sema", || analyze(&parsed, filename, options.strict_mode))?;
    Ok(clock.time("ast-dump", || dump_typed(&typed)))
}

/// Full frontend + lowering, rendering the HIR module.
pub fn emit_hir_dump(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
    clock: &mut PhaseClock,
) -> Result<String, CompilerError> {
    let pp_options = options.preprocessor_options();
    let preprocessed = clock.time("preprocess", || run_preprocessor(source, filename, &pp_options))?;
    let parsed = clock.time("parse", || parse(&preprocessed, filename))?;
    let typed = clock.time("sema", || analyze(&parsed, filename, options.strict_mode))?;
    let hir = clock.time("hir-lower", || lower_to_hir(&typed, filename))?;
    Ok(clock.time("hir-dump", || dump_module(&hir)))
}

/// Full pipeline through IR emission, rendering textual IR.
pub fn emit_ir_text(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
    clock: &mut PhaseClock,
) -> Result<String, CompilerError> {
    let pp_options = options.preprocessor_options();
    let preprocessed = clock.time("preprocess", || run_preprocessor(source, filename, &pp_options))?;
    let parsed = clock.time("parse", || parse(&preprocessed, filename))?;
    let typed = clock.time("sema", || analyze(&parsed, filename, options.strict_mode))?;
    let hir = clock.time("hir-lower", || lower_to_hir(&typed, filename))?;
    let module = clock
        .time("ir-emit", || emit_ir(&hir, "holyc", ""))
        .map_err(CompilerError::CodeGen)?;
    Ok(print_module(&module))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> PipelineOptions {
        PipelineOptions::new(ExecutionMode::Jit)
    }

    #[test]
    fn check_reports_ok() {
        let out = check_source(
            "I64 Main() { return 0; }\n",
            "t.hc",
            &options(),
            &mut PhaseClock::disabled(),
        )
        .unwrap();
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn timings_cover_every_phase() {
        let mut timings = Vec::new();
        let mut clock = PhaseClock::new(Some(&mut timings));
        emit_ir_text("I64 Main() { return 0; }\n", "t.hc", &options(), &mut clock).unwrap();
        let names: Vec<&str> = timings.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["preprocess", "parse", "sema", "hir-lower", "ir-emit"]);
    }

    #[test]
    fn diagnostics_carry_through() {
        let err = check_source("U0 F() { continue; }", "t.hc", &options(), &mut PhaseClock::disabled())
            .unwrap_err();
        assert!(err.to_string().contains("no continue"));
    }
}
