//! IR emission tests: the pipeline through `emit_ir_text`, checked against
//! the printed module text and the backend's normalize contract.

use holyc_compiler::pipeline::{emit_ir_text, PhaseClock, PipelineOptions};
use holyc_compiler::backend::normalize_ir;
use holyc_frontend::ExecutionMode;

fn emit(source: &str) -> String {
    let options = PipelineOptions::new(ExecutionMode::Jit);
    emit_ir_text(source, "test.hc", &options, &mut PhaseClock::disabled()).expect("emit failure")
}

fn emit_err(source: &str) -> String {
    let options = PipelineOptions::new(ExecutionMode::Jit);
    emit_ir_text(source, "test.hc", &options, &mut PhaseClock::disabled())
        .expect_err("expected emission failure")
        .to_string()
}

#[test]
fn const_initializers_fold_into_globals() {
    let ir = emit("I64 g = 2 + 3 * 4;\nI64 Main() { return g; }\n");
    assert!(ir.contains("@g = global i64 14"), "ir:\n{ir}");
}

#[test]
fn address_of_initializer_uses_ptrtoint() {
    let ir = emit("I64 base = 5;\nI64 addr = &base;\nI64 Main() { return 0; }\n");
    assert!(ir.contains("@addr = global i64 ptrtoint (ptr @base to i64)"), "ir:\n{ir}");
}

#[test]
fn static_global_gets_internal_linkage() {
    let ir = emit("static I64 hidden = 3;\nI64 Main() { return hidden; }\n");
    assert!(ir.contains("@hidden = internal global i64 3"), "ir:\n{ir}");
}

#[test]
fn string_literals_dedupe_by_decoded_text() {
    let ir = emit("U8 *a = \"twin\";\nU8 *b = \"twin\";\nI64 Main() { return 0; }\n");
    let occurrences = ir.matches("c\"twin\\00\"").count();
    assert_eq!(occurrences, 1, "ir:\n{ir}");
}

#[test]
fn host_main_wrapper_is_emitted() {
    let ir = emit("I64 Main() { return 0; }\n");
    assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv)"), "ir:\n{ir}");
    assert!(ir.contains("call i64 @Main()"), "ir:\n{ir}");
}

#[test]
fn main_wrapper_skipped_without_holy_main() {
    let ir = emit("I64 Helper() { return 1; }\n");
    assert!(!ir.contains("@main("), "ir:\n{ir}");
}

#[test]
fn reflection_table_rows_match_fields() {
    let ir = emit("class CPoint { I64 x; I64 y \"fmt\" 8; };\nI64 Main() { return 0; }\n");
    assert!(ir.contains("%hc.CPoint = type <{ i64, i64 }>"), "ir:\n{ir}");
    assert!(
        ir.contains("@.hc.reflection = private unnamed_addr constant [2 x { ptr, ptr, ptr, ptr }]"),
        "ir:\n{ir}"
    );
    assert!(ir.contains("call void @hc_register_reflection_table"), "ir:\n{ir}");
}

#[test]
fn union_layout_collapses_to_widest_member() {
    let ir = emit("union UView { I64 wide; U8 narrow; };\nI64 Main() { return 0; }\n");
    assert!(ir.contains("%hc.UView = type <{ i64 }>"), "ir:\n{ir}");
}

#[test]
fn switch_null_case_inherits_last_end_plus_one() {
    let ir = emit(
        "I64 Main() { I64 x = 2; switch (x) { case 1: return 10; case: return 20; } return -1; }\n",
    );
    // The null-case test compares against 2 = last_end + 1.
    assert!(ir.contains("icmp eq i64 %t1, 1"), "ir:\n{ir}");
    assert!(ir.contains("icmp eq i64 %t1, 2"), "ir:\n{ir}");
}

#[test]
fn try_catch_emits_setjmp_frame_protocol() {
    let ir = emit("I64 Main() { try { throw(7); } catch { return 1; } return 0; }\n");
    assert!(ir.contains("call void @hc_try_push(ptr %t0)"), "ir:\n{ir}");
    assert!(ir.contains("call i32 @_setjmp(ptr %t0)"), "ir:\n{ir}");
    assert!(ir.contains("call void @hc_throw_i64(i64 7)"), "ir:\n{ir}");
    assert!(ir.contains("unreachable"), "ir:\n{ir}");
    assert!(ir.contains("call void @hc_try_pop(ptr %t0)"), "ir:\n{ir}");
}

#[test]
fn print_packs_arguments_into_i64_array() {
    let ir = emit("I64 Main() { \"%d %s\\n\", 42, \"x\"; return 0; }\n");
    assert!(ir.contains("call void @hc_print_fmt(ptr"), "ir:\n{ir}");
    assert!(ir.contains("alloca [2 x i64]"), "ir:\n{ir}");
}

#[test]
fn char_print_uses_put_char() {
    let ir = emit("I64 Main() { 'A'; return 0; }\n");
    assert!(ir.contains("call void @hc_put_char(i64 65)"), "ir:\n{ir}");
}

#[test]
fn float_print_argument_is_bitcast() {
    let ir = emit("I64 Main(I64 x) { \"%f\\n\", x; return 0; }\n");
    assert!(ir.contains("sitofp i64"), "ir:\n{ir}");
    assert!(ir.contains("bitcast double"), "ir:\n{ir}");
}

#[test]
fn lock_lowers_to_seq_cst_atomics() {
    let ir = emit("I64 shared;\nI64 Main() { lock { shared += 2; shared++; } return 0; }\n");
    assert!(ir.contains("atomicrmw add ptr @shared, i64 2 seq_cst"), "ir:\n{ir}");
    assert!(ir.contains("atomicrmw add ptr @shared, i64 1 seq_cst"), "ir:\n{ir}");
}

#[test]
fn inline_asm_linearizes_constraints() {
    let ir = emit("I64 Main(I64 x) { asm(\"mov %0\", \"r\", x, \"{rax}\"); return 0; }\n");
    assert!(ir.contains("call void asm sideeffect \"mov %0\", \"r,~{rax}\"(i64"), "ir:\n{ir}");
}

#[test]
fn inline_asm_outputs_become_results() {
    let ir = emit("I64 Main() { asm(\"rdtsc\", \"=r\"); return 0; }\n");
    assert!(ir.contains("call i64 asm sideeffect \"rdtsc\", \"=r\"()"), "ir:\n{ir}");
}

#[test]
fn linkage_decl_becomes_external_global() {
    let ir = emit("extern I64 outside;\nI64 Main() { return outside; }\n");
    assert!(ir.contains("@outside = external global i64"), "ir:\n{ir}");
}

#[test]
fn goto_materializes_label_blocks() {
    let ir = emit("I64 Main() { goto done; done: return 1; }\n");
    assert!(ir.contains("br label %label.done"), "ir:\n{ir}");
    assert!(ir.contains("label.done:"), "ir:\n{ir}");
}

#[test]
fn break_outside_loop_is_rejected() {
    let err = emit_err("I64 Main() { break; return 0; }\n");
    assert!(err.contains("break used outside switch/loop"), "err: {err}");
}

#[test]
fn emitted_ir_normalizes_to_a_fixed_point() {
    let ir = emit(
        "class CPoint { I64 x; I64 y; };\n\
         I64 g = 7;\n\
         I64 Add(I64 a, I64 b) { return a + b; }\n\
         I64 Main() { CPoint p; p.x = g; return Add(p.x, 2); }\n",
    );
    let once = normalize_ir(&ir).expect("normalize");
    let twice = normalize_ir(&once).expect("re-normalize");
    assert_eq!(once, twice);
}

#[test]
fn accepted_print_formats_emit_verified_modules() {
    // Property: every format sema accepts must emit a module that passes
    // verification.
    let cases = [
        ("\"%d\\n\", 1;", true),
        ("\"%5.2f\\n\", tS;", true),
        ("\"%z\\n\", 1, \"a\\0b\\0\";", true),
        ("\"%*d\\n\", 4, 7;", true),
        ("\"100%%\\n\";", true),
    ];
    for (stmt, _) in cases {
        let source = format!("I64 Main() {{ {stmt} return 0; }}\n");
        let ir = emit(&source);
        normalize_ir(&ir).unwrap_or_else(|err| panic!("format {stmt} failed verify: {err}"));
    }
}
