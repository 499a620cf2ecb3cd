//! Command execution logic.
//!
//! Exit codes: 0 success, 1 diagnostic/phase failure, 2 usage or I/O error.
//! Diagnostics print to stderr in their canonical form; artifacts and
//! command output go to stdout only on success.

use crate::cli::{AnalyzeArgs, BuildArgs, JitArgs, ReplArgs};
use crate::timing;
use colored::Colorize;
use holyc_compiler::{backend, pipeline, PhaseClock, PhaseTiming, PipelineOptions, SessionStore};
use holyc_frontend::ExecutionMode;
use std::path::Path;
use std::process::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const STRICT_MODE_DEFAULT: bool = true;

pub fn version() -> i32 {
    println!("holyc {VERSION} (self-hosted-ir)");
    0
}

pub fn print_strict_mode() -> i32 {
    println!("{}", if STRICT_MODE_DEFAULT { "strict" } else { "permissive" });
    0
}

fn usage_error(message: impl std::fmt::Display) -> i32 {
    eprintln!("{} {message}", "error:".red().bold());
    2
}

fn read_source(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path)
        .map_err(|_| usage_error(format!("cannot read file: {}", path.display())))
}

fn pipeline_options(args: &AnalyzeArgs, default_mode: ExecutionMode) -> PipelineOptions {
    let mut options = PipelineOptions::new(args.mode_or(default_mode));
    options.strict_mode = args.strict_mode();
    options.diagnose_div_zero = args.pp_diagnose_div_zero;
    options
}

type PipelineFn =
    fn(&str, &str, &PipelineOptions, &mut PhaseClock) -> Result<String, holyc_compiler::CompilerError>;

/// Shared driver for check/preprocess/ast-dump/emit-hir: run a pipeline
/// function and print its output.
fn run_analysis(
    command: &str,
    args: &AnalyzeArgs,
    default_mode: ExecutionMode,
    run: PipelineFn,
) -> i32 {
    let source = match read_source(&args.input) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let options = pipeline_options(args, default_mode);
    let filename = args.input.display().to_string();
    let mut timings: Vec<PhaseTiming> = Vec::new();
    let result = {
        let mut clock = if args.wants_timings() {
            PhaseClock::new(Some(&mut timings))
        } else {
            PhaseClock::disabled()
        };
        run(&source, &filename, &options, &mut clock)
    };
    timing::report(command, args.wants_timings(), args.time_phases_json.as_deref(), &timings);

    match result {
        Ok(output) => {
            print!("{output}");
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

pub fn check(args: &AnalyzeArgs) -> i32 {
    run_analysis("check", args, ExecutionMode::Jit, pipeline::check_source)
}

pub fn preprocess(args: &AnalyzeArgs) -> i32 {
    run_analysis("preprocess", args, ExecutionMode::Jit, pipeline::preprocess_source)
}

pub fn ast_dump(args: &AnalyzeArgs) -> i32 {
    run_analysis("ast-dump", args, ExecutionMode::Jit, pipeline::parse_and_dump_ast)
}

pub fn emit_hir(args: &AnalyzeArgs) -> i32 {
    run_analysis("emit-hir", args, ExecutionMode::Jit, pipeline::emit_hir_dump)
}

pub fn emit_llvm(args: &AnalyzeArgs) -> i32 {
    let source = match read_source(&args.input) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let options = pipeline_options(args, ExecutionMode::Aot);
    let filename = args.input.display().to_string();
    let mut timings: Vec<PhaseTiming> = Vec::new();
    let result = {
        let mut clock = if args.wants_timings() {
            PhaseClock::new(Some(&mut timings))
        } else {
            PhaseClock::disabled()
        };
        pipeline::emit_ir_text(&source, &filename, &options, &mut clock).and_then(|ir| {
            clock
                .time("llvm-normalize", || backend::normalize_ir(&ir))
                .map_err(holyc_compiler::CompilerError::Backend)
        })
    };
    timing::report("emit-llvm", args.wants_timings(), args.time_phases_json.as_deref(), &timings);

    match result {
        Ok(output) => {
            print!("{output}");
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

pub fn jit(args: &JitArgs) -> i32 {
    if args.jit_backend != "llvm" {
        return usage_error(format!(
            "invalid --jit-backend value (expected llvm): {}",
            args.jit_backend
        ));
    }

    let source = match read_source(&args.input) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let store = SessionStore::global();
    let session_name = args.jit_session.clone().unwrap_or_default();
    // An explicitly named session persists across runs.
    let reset_after_run = args.jit_session.is_none();
    log::debug!(
        "jit: session='{}' reset_after_run={reset_after_run}",
        if session_name.is_empty() { "__default__" } else { &session_name }
    );

    let mut timings: Vec<PhaseTiming> = Vec::new();
    let wants_timings = args.time_phases || args.time_phases_json.is_some();
    let result = {
        let mut clock = if wants_timings {
            PhaseClock::new(Some(&mut timings))
        } else {
            PhaseClock::disabled()
        };

        let mut options = PipelineOptions::new(ExecutionMode::Jit);
        options.strict_mode = !args.permissive;
        options.diagnose_div_zero = args.pp_diagnose_div_zero;
        let filename = args.input.display().to_string();

        if args.jit_reset {
            clock.time("jit-session-reset", || {
                backend::reset_jit_session(store, &session_name)
            })
            .err();
        }

        pipeline::emit_ir_text(&source, &filename, &options, &mut clock).and_then(|ir| {
            clock
                .time("jit-exec", || {
                    backend::execute_ir_jit(
                        store,
                        &ir,
                        &session_name,
                        reset_after_run,
                        "main",
                        args.opt_level,
                    )
                })
                .map_err(holyc_compiler::CompilerError::Jit)
        })
    };
    timing::report("jit", wants_timings, args.time_phases_json.as_deref(), &timings);

    match result {
        Ok(output) => {
            print!("{output}");
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

pub fn repl(args: &ReplArgs) -> i32 {
    crate::repl::run_repl(!args.permissive, &args.jit_session, args.jit_reset, args.opt_level)
}

fn basename_no_ext(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "a".to_string())
}

/// Compile + link one input; shared by build and run.
fn build_executable(
    args: &BuildArgs,
    output_path: &Path,
    timings: Option<&mut Vec<PhaseTiming>>,
) -> i32 {
    let source = match read_source(&args.input) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let mut clock = PhaseClock::new(timings);
    let mut options = PipelineOptions::new(ExecutionMode::Aot);
    options.strict_mode = !args.permissive;
    options.diagnose_div_zero = args.pp_diagnose_div_zero;
    let filename = args.input.display().to_string();

    let ir = match pipeline::emit_ir_text(&source, &filename, &options, &mut clock) {
        Ok(ir) => ir,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    if std::fs::create_dir_all(&args.artifact_dir).is_err() {
        return usage_error(format!(
            "cannot create artifact directory: {}",
            args.artifact_dir.display()
        ));
    }

    let build_result = clock.time("aot-codegen-link", || {
        backend::build_executable_from_ir(
            &ir,
            &output_path.display().to_string(),
            &args.artifact_dir.display().to_string(),
            args.target.as_deref().unwrap_or(""),
            args.opt_level,
        )
    });
    if let Err(message) = build_result {
        eprintln!("{} {message}", "error:".red().bold());
        return 1;
    }

    if !args.keep_temps {
        let base = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "holyc-output".to_string());
        let _ = std::fs::remove_file(args.artifact_dir.join(format!("{base}.ll")));
        let _ = std::fs::remove_file(args.artifact_dir.join(format!("{base}.o")));
        let _ = std::fs::remove_file(args.artifact_dir.join("hc_runtime.c"));
    }
    0
}

pub fn build(args: &BuildArgs) -> i32 {
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| Path::new(&basename_no_ext(&args.input)).to_path_buf());

    let wants_timings = args.time_phases || args.time_phases_json.is_some();
    let mut timings: Vec<PhaseTiming> = Vec::new();
    let rc =
        build_executable(args, &output_path, wants_timings.then_some(&mut timings));
    timing::report("build", wants_timings, args.time_phases_json.as_deref(), &timings);
    if rc == 0 {
        println!("built {}", output_path.display());
    }
    rc
}

pub fn run(args: &BuildArgs) -> i32 {
    let output_path = args.output.clone().unwrap_or_else(|| {
        args.artifact_dir.join(format!("{}.run", basename_no_ext(&args.input)))
    });

    let wants_timings = args.time_phases || args.time_phases_json.is_some();
    let mut timings: Vec<PhaseTiming> = Vec::new();
    let rc = build_executable(args, &output_path, wants_timings.then_some(&mut timings));
    if rc != 0 {
        timing::report("run", wants_timings, args.time_phases_json.as_deref(), &timings);
        return rc;
    }

    let mut clock = PhaseClock::new(wants_timings.then_some(&mut timings));
    let status = clock.time("run-program", || Command::new(&output_path).status());
    timing::report("run", wants_timings, args.time_phases_json.as_deref(), &timings);

    let exit = match status {
        Ok(status) if status.success() => 0,
        Ok(status) => {
            eprintln!(
                "{} executed program failed with status {}",
                "error:".red().bold(),
                status.code().unwrap_or(-1)
            );
            1
        }
        Err(err) => {
            eprintln!("{} failed to execute {}: {err}", "error:".red().bold(), output_path.display());
            1
        }
    };

    if exit == 0 && !args.keep_temps {
        let _ = std::fs::remove_file(&output_path);
    }
    exit
}
