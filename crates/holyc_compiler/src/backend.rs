//! Backend operations over text IR.
//!
//! The driver-facing contract: normalize (parse → verify → print), build an
//! executable (object emission plus a system-toolchain link against the
//! bundled runtime source), and the JIT session operations. All operations
//! consume the textual IR produced by emission, never in-memory modules, so
//! the printed form is the single interchange format.

use crate::ir::{parser::parse_module, printer::print_module, verify::verify_module};
use crate::jit::{interp, SessionStore};
use crate::runtime;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Optimization level requested on the command line. The self-hosted engine
/// executes unoptimized IR; for AOT builds the level maps onto the system
/// compiler's `-O` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
    Os,
    Oz,
}

impl OptLevel {
    pub fn parse(text: &str) -> Option<OptLevel> {
        match text {
            "0" => Some(OptLevel::O0),
            "1" => Some(OptLevel::O1),
            "2" => Some(OptLevel::O2),
            "3" => Some(OptLevel::O3),
            "s" => Some(OptLevel::Os),
            "z" => Some(OptLevel::Oz),
            _ => None,
        }
    }

    fn clang_flag(self) -> &'static str {
        match self {
            OptLevel::O0 => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
            OptLevel::O3 => "-O3",
            OptLevel::Os => "-Os",
            OptLevel::Oz => "-Oz",
        }
    }
}

/// The C runtime source linked into AOT builds; the same semantics the JIT
/// engine's Rust shims implement in-process.
const RUNTIME_C_SOURCE: &str = include_str!("../runtime/hc_runtime.c");

/// Parse, verify, and reprint text IR.
pub fn normalize_ir(ir_text: &str) -> Result<String, String> {
    let module = parse_module(ir_text)?;
    verify_module(&module)?;
    Ok(print_module(&module))
}

fn artifact_base_name(output_path: &str) -> String {
    Path::new(output_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "holyc-output".to_string())
}

fn run_tool(args: &[String]) -> Result<(), String> {
    let Some((program, rest)) = args.split_first() else {
        return Err("tool invocation failed: empty command".to_string());
    };
    let status = Command::new(program)
        .args(rest)
        .status()
        .map_err(|err| format!("failed to spawn {program}: {err}"))?;
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(format!("{program} exited with status {code}")),
        None => Err(format!("{program} terminated by signal")),
    }
}

/// Compile text IR to an object file and link it with the runtime into an
/// executable at `output_path`.
pub fn build_executable_from_ir(
    ir_text: &str,
    output_path: &str,
    artifact_dir: &str,
    target_triple: &str,
    opt_level: OptLevel,
) -> Result<(), String> {
    let module = parse_module(ir_text)?;
    verify_module(&module)?;
    let normalized = print_module(&module);

    let artifact_dir =
        if artifact_dir.is_empty() { PathBuf::from(".") } else { PathBuf::from(artifact_dir) };
    std::fs::create_dir_all(&artifact_dir)
        .map_err(|_| format!("failed to create artifact directory: {}", artifact_dir.display()))?;

    let base = artifact_base_name(output_path);
    let ll_path = artifact_dir.join(format!("{base}.ll"));
    let obj_path = artifact_dir.join(format!("{base}.o"));
    let runtime_path = artifact_dir.join("hc_runtime.c");

    std::fs::write(&ll_path, &normalized)
        .map_err(|_| format!("failed to write IR file: {}", ll_path.display()))?;
    std::fs::write(&runtime_path, RUNTIME_C_SOURCE)
        .map_err(|_| format!("failed to write runtime source: {}", runtime_path.display()))?;

    let mut compile_args = vec!["clang".to_string()];
    if !target_triple.is_empty() {
        compile_args.push(format!("--target={target_triple}"));
    }
    compile_args.extend([
        opt_level.clang_flag().to_string(),
        "-c".to_string(),
        ll_path.display().to_string(),
        "-o".to_string(),
        obj_path.display().to_string(),
    ]);
    run_tool(&compile_args).map_err(|msg| format!("object emission failed: {msg}"))?;

    let mut link_args = vec!["clang".to_string()];
    if !target_triple.is_empty() {
        link_args.push(format!("--target={target_triple}"));
    }
    link_args.extend([
        opt_level.clang_flag().to_string(),
        obj_path.display().to_string(),
        runtime_path.display().to_string(),
        "-lpthread".to_string(),
        "-o".to_string(),
        output_path.to_string(),
    ]);
    run_tool(&link_args).map_err(|msg| format!("link step failed: {msg}"))?;

    Ok(())
}

/// Parse, verify, and install a module into the named session without
/// executing anything.
pub fn load_ir_jit(
    store: &SessionStore,
    ir_text: &str,
    session_name: &str,
    opt_level: OptLevel,
) -> Result<(), String> {
    let _ = opt_level;
    let module = parse_module(ir_text)?;
    verify_module(&module)?;
    let session = store.get_or_create(session_name);
    session.install_module(module)
}

/// Install a module and invoke `entry` through the host-compatible thunk;
/// waits for spawned tasks before returning the integer result.
pub fn execute_ir_jit(
    store: &SessionStore,
    ir_text: &str,
    session_name: &str,
    reset_after_run: bool,
    entry_symbol: &str,
    opt_level: OptLevel,
) -> Result<String, String> {
    let _ = opt_level;
    if reset_after_run {
        store.remove(session_name);
    }

    let cleanup = |result: Result<String, String>| {
        if reset_after_run {
            store.remove(session_name);
        }
        result
    };

    if entry_symbol.is_empty() {
        return cleanup(Err("jit: missing entry target".to_string()));
    }

    let module = match parse_module(ir_text).and_then(|module| {
        verify_module(&module)?;
        Ok(module)
    }) {
        Ok(module) => module,
        Err(message) => return cleanup(Err(message)),
    };

    if module.function(entry_symbol).map_or(true, |f| f.is_declaration()) {
        return cleanup(Err(format!("jit: missing entry symbol '{entry_symbol}'")));
    }

    let session = store.get_or_create(session_name);
    if let Err(message) = session.install_module(module) {
        return cleanup(Err(message));
    }

    let result = interp::execute_entry(&session, entry_symbol);
    // Spawn() launches detached tasks; wait for completion before the
    // session may be torn down.
    runtime::hc_spawn_wait_all();

    cleanup(result.map(|rc| format!("{rc}\n")))
}

/// Drain spawned tasks and drop everything bound to the session name.
pub fn reset_jit_session(store: &SessionStore, session_name: &str) -> Result<(), String> {
    store.remove(session_name);
    Ok(())
}
