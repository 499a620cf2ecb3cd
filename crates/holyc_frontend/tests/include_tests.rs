//! Preprocessor tests that need real files: include resolution, nesting,
//! and cycle detection.

use holyc_frontend::preprocessor::{run_preprocessor, PreprocessorOptions};
use holyc_frontend::ExecutionMode;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_DIR_ID: AtomicU32 = AtomicU32::new(0);

fn scratch_dir(label: &str) -> PathBuf {
    let id = NEXT_DIR_ID.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "holyc-include-tests-{}-{label}-{id}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn options() -> PreprocessorOptions {
    PreprocessorOptions::new(ExecutionMode::Jit)
}

#[test]
fn include_resolves_relative_to_including_file() {
    let dir = scratch_dir("relative");
    std::fs::write(dir.join("lib.hc"), "I64 helper;\n").unwrap();
    std::fs::write(dir.join("main.hc"), "#include \"lib.hc\"\nI64 x;\n").unwrap();

    let source = std::fs::read_to_string(dir.join("main.hc")).unwrap();
    let out = run_preprocessor(&source, &dir.join("main.hc").display().to_string(), &options())
        .unwrap();
    assert_eq!(out, "I64 helper;\nI64 x;\n");
}

#[test]
fn include_searches_configured_roots() {
    let dir = scratch_dir("roots");
    let include_root = dir.join("include");
    std::fs::create_dir_all(&include_root).unwrap();
    std::fs::write(include_root.join("shared.hc"), "I64 shared;\n").unwrap();
    std::fs::write(dir.join("main.hc"), "#include \"shared.hc\"\n").unwrap();

    let mut options = options();
    options.include_dirs.push(include_root.display().to_string());
    let source = std::fs::read_to_string(dir.join("main.hc")).unwrap();
    let out = run_preprocessor(&source, &dir.join("main.hc").display().to_string(), &options)
        .unwrap();
    assert_eq!(out, "I64 shared;\n");
}

#[test]
fn missing_include_reports_search_roots() {
    let dir = scratch_dir("missing");
    std::fs::write(dir.join("main.hc"), "#include \"nowhere.hc\"\n").unwrap();

    let source = std::fs::read_to_string(dir.join("main.hc")).unwrap();
    let err = run_preprocessor(&source, &dir.join("main.hc").display().to_string(), &options())
        .unwrap_err();
    assert_eq!(err.code, "HC1007");
    assert!(err.message.contains("include not found: nowhere.hc"));
    assert!(err.remediation.contains("searched include roots in order"));
}

#[test]
fn include_cycle_lists_full_chain() {
    let dir = scratch_dir("cycle");
    std::fs::write(dir.join("a.hc"), "#include \"b.hc\"\n").unwrap();
    std::fs::write(dir.join("b.hc"), "#include \"a.hc\"\n").unwrap();

    let source = std::fs::read_to_string(dir.join("a.hc")).unwrap();
    let err = run_preprocessor(&source, &dir.join("a.hc").display().to_string(), &options())
        .unwrap_err();
    assert_eq!(err.code, "HC1023");
    assert!(err.message.contains("include cycle detected"));

    // The remediation carries the canonical chain a -> b -> a.
    let chain = &err.remediation;
    let first_a = chain.find("a.hc").expect("chain names a.hc");
    let b_pos = chain.find("b.hc").expect("chain names b.hc");
    let second_a = chain.rfind("a.hc").expect("chain closes with a.hc");
    assert!(first_a < b_pos && b_pos < second_a);
    assert!(chain.contains(" -> "));
}

#[test]
fn macros_span_included_files() {
    let dir = scratch_dir("macros");
    std::fs::write(dir.join("defs.hc"), "#define LIMIT 8\n").unwrap();
    std::fs::write(dir.join("main.hc"), "#include \"defs.hc\"\nI64 cap = LIMIT;\n").unwrap();

    let source = std::fs::read_to_string(dir.join("main.hc")).unwrap();
    let out = run_preprocessor(&source, &dir.join("main.hc").display().to_string(), &options())
        .unwrap();
    assert_eq!(out, "I64 cap = 8;\n");
}

#[test]
fn include_depth_is_bounded() {
    let dir = scratch_dir("depth");
    // Each file includes the next; depth 70 exceeds the 64 cap without
    // forming a cycle.
    for i in 0..70 {
        let body = format!("#include \"f{}.hc\"\n", i + 1);
        std::fs::write(dir.join(format!("f{i}.hc")), body).unwrap();
    }
    std::fs::write(dir.join("f70.hc"), "I64 leaf;\n").unwrap();

    let source = std::fs::read_to_string(dir.join("f0.hc")).unwrap();
    let err = run_preprocessor(&source, &dir.join("f0.hc").display().to_string(), &options())
        .unwrap_err();
    assert_eq!(err.code, "HC1001");
}
