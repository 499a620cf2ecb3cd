//! HolyC compiler driver.
//!
//! Pipeline commands (check, preprocess, ast-dump, emit-hir, emit-llvm)
//! print their phase output; jit/repl execute through the in-process
//! engine; build/run go through the backend and the system toolchain.

mod cli;
mod commands;
mod repl;
mod timing;

use clap::Parser;
use cli::{Cli, Commands};
use std::process;

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if cli.version {
        process::exit(commands::version());
    }
    if cli.print_strict_mode {
        process::exit(commands::print_strict_mode());
    }

    let Some(command) = &cli.command else {
        // Nothing asked: print help like any other usage problem, but a
        // bare invocation is not an error.
        let _ = <Cli as clap::CommandFactory>::command().print_help();
        println!();
        process::exit(0);
    };

    let code = match command {
        Commands::Check(args) => commands::check(args),
        Commands::Preprocess(args) => commands::preprocess(args),
        Commands::AstDump(args) => commands::ast_dump(args),
        Commands::EmitHir(args) => commands::emit_hir(args),
        Commands::EmitLlvm(args) => commands::emit_llvm(args),
        Commands::Jit(args) => commands::jit(args),
        Commands::Repl(args) => commands::repl(args),
        Commands::Build(args) => commands::build(args),
        Commands::Run(args) => commands::run(args),
    };
    process::exit(code);
}
