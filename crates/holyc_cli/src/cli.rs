//! CLI argument parsing and command definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use holyc_compiler::OptLevel;
use holyc_frontend::ExecutionMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "holyc")]
#[command(about = "HolyC compiler driver", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print compiler version
    #[arg(long)]
    pub version: bool,

    /// Print the strict-mode default
    #[arg(long)]
    pub print_strict_mode: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// `--mode` gate for `#ifjit`/`#ifaot`.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ModeArg {
    Jit,
    Aot,
}

impl ModeArg {
    pub fn to_mode(self) -> ExecutionMode {
        match self {
            ModeArg::Jit => ExecutionMode::Jit,
            ModeArg::Aot => ExecutionMode::Aot,
        }
    }
}

/// Flags shared by the analysis-style commands.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input HolyC source file
    pub input: PathBuf,

    /// Execution mode gate (jit or aot)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Enable strict semantic mode (the default)
    #[arg(long)]
    pub strict: bool,

    /// Accept the historical compatibility modifiers
    #[arg(long, conflicts_with = "strict")]
    pub permissive: bool,

    /// Print a per-phase timing table to stderr
    #[arg(long)]
    pub time_phases: bool,

    /// Additionally write the phase timings as JSON
    #[arg(long, value_name = "PATH")]
    pub time_phases_json: Option<PathBuf>,

    /// Diagnose division by zero in #if arithmetic instead of folding to 0
    #[arg(long)]
    pub pp_diagnose_div_zero: bool,
}

impl AnalyzeArgs {
    pub fn strict_mode(&self) -> bool {
        !self.permissive
    }

    pub fn mode_or(&self, default: ExecutionMode) -> ExecutionMode {
        self.mode.map(ModeArg::to_mode).unwrap_or(default)
    }

    pub fn wants_timings(&self) -> bool {
        self.time_phases || self.time_phases_json.is_some()
    }
}

fn parse_opt_level(text: &str) -> Result<OptLevel, String> {
    OptLevel::parse(text)
        .ok_or_else(|| format!("invalid --opt-level value (expected 0|1|2|3|s|z): {text}"))
}

#[derive(Debug, Args)]
pub struct JitArgs {
    /// Input HolyC source file
    pub input: PathBuf,

    /// Enable strict semantic mode (the default)
    #[arg(long)]
    pub strict: bool,

    /// Accept the historical compatibility modifiers
    #[arg(long, conflicts_with = "strict")]
    pub permissive: bool,

    /// Named JIT session; suppresses reset-after-run
    #[arg(long, value_name = "NAME")]
    pub jit_session: Option<String>,

    /// Reset the session before running
    #[arg(long)]
    pub jit_reset: bool,

    /// JIT backend selection
    #[arg(long, value_name = "BACKEND", default_value = "llvm")]
    pub jit_backend: String,

    /// Optimization level
    #[arg(long, value_name = "LEVEL", value_parser = parse_opt_level, default_value = "2")]
    pub opt_level: OptLevel,

    /// Print a per-phase timing table to stderr
    #[arg(long)]
    pub time_phases: bool,

    /// Additionally write the phase timings as JSON
    #[arg(long, value_name = "PATH")]
    pub time_phases_json: Option<PathBuf>,

    /// Diagnose division by zero in #if arithmetic instead of folding to 0
    #[arg(long)]
    pub pp_diagnose_div_zero: bool,
}

#[derive(Debug, Args)]
pub struct ReplArgs {
    /// Enable strict semantic mode (the default)
    #[arg(long)]
    pub strict: bool,

    /// Accept the historical compatibility modifiers
    #[arg(long, conflicts_with = "strict")]
    pub permissive: bool,

    /// Named JIT session backing the REPL
    #[arg(long, value_name = "NAME", default_value = "__repl__")]
    pub jit_session: String,

    /// Reset the session before starting
    #[arg(long)]
    pub jit_reset: bool,

    /// Optimization level
    #[arg(long, value_name = "LEVEL", value_parser = parse_opt_level, default_value = "1")]
    pub opt_level: OptLevel,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Input HolyC source file
    pub input: PathBuf,

    /// Output executable path
    #[arg(short = 'o', value_name = "OUT")]
    pub output: Option<PathBuf>,

    /// Target triple handed to the system toolchain
    #[arg(long, value_name = "TRIPLE")]
    pub target: Option<String>,

    /// Directory for intermediate artifacts
    #[arg(long, value_name = "DIR", default_value = ".holyc-artifacts")]
    pub artifact_dir: PathBuf,

    /// Keep the .ll/.o intermediates after a successful link
    #[arg(long)]
    pub keep_temps: bool,

    /// Enable strict semantic mode (the default)
    #[arg(long)]
    pub strict: bool,

    /// Accept the historical compatibility modifiers
    #[arg(long, conflicts_with = "strict")]
    pub permissive: bool,

    /// Optimization level
    #[arg(long, value_name = "LEVEL", value_parser = parse_opt_level, default_value = "2")]
    pub opt_level: OptLevel,

    /// Print a per-phase timing table to stderr
    #[arg(long)]
    pub time_phases: bool,

    /// Additionally write the phase timings as JSON
    #[arg(long, value_name = "PATH")]
    pub time_phases_json: Option<PathBuf>,

    /// Diagnose division by zero in #if arithmetic instead of folding to 0
    #[arg(long)]
    pub pp_diagnose_div_zero: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and semantic-check only
    Check(AnalyzeArgs),

    /// Print preprocessed HolyC
    Preprocess(AnalyzeArgs),

    /// Parse HolyC and print the typed AST
    AstDump(AnalyzeArgs),

    /// Emit the lowered HIR dump
    EmitHir(AnalyzeArgs),

    /// Emit textual IR, normalized through the backend
    EmitLlvm(AnalyzeArgs),

    /// Execute main in-process and print its integer result
    Jit(JitArgs),

    /// Start the interactive JIT-backed REPL
    Repl(ReplArgs),

    /// Build an executable via the backend and system toolchain
    Build(BuildArgs),

    /// Build and execute
    Run(BuildArgs),
}
