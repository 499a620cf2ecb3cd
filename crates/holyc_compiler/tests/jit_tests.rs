//! End-to-end execution tests: source through the pipeline into a session
//! and out through the execution engine.

use holyc_compiler::backend::{execute_ir_jit, load_ir_jit, reset_jit_session, OptLevel};
use holyc_compiler::pipeline::{emit_ir_text, PhaseClock, PipelineOptions};
use holyc_compiler::{runtime, SessionStore};
use holyc_frontend::ExecutionMode;

fn emit(source: &str) -> String {
    let options = PipelineOptions::new(ExecutionMode::Jit);
    emit_ir_text(source, "test.hc", &options, &mut PhaseClock::disabled()).expect("emit failure")
}

/// One-shot execution in an isolated session store.
fn run_main(source: &str) -> Result<String, String> {
    let store = SessionStore::new();
    let ir = emit(source);
    execute_ir_jit(&store, &ir, "", true, "main", OptLevel::O2)
}

#[test]
fn add_function_returns_42() {
    let source = "I64 Add(I64 a, I64 b) { return a + b; }\nI64 Main() { return Add(40, 2); }\n";
    assert_eq!(run_main(source).unwrap(), "42\n");
}

#[test]
fn lane_round_trip_returns_255() {
    let source = "I64 Main() {\n  I64 v = 0;\n  v.u8[0] = 0xAA;\n  v.u8[1] = 0x55;\n  return v.u8[0] + v.u8[1];\n}\n";
    assert_eq!(run_main(source).unwrap(), "255\n");
}

#[test]
fn lane_write_preserves_other_lanes() {
    let source = "I64 Main() {\n  I64 v = 0;\n  v.u16[0] = 0x1234;\n  v.u8[0] = 0xFF;\n  return v.u16[0];\n}\n";
    // Low byte replaced, high byte of the u16 lane preserved.
    assert_eq!(run_main(source).unwrap(), format!("{}\n", 0x12FF));
}

#[test]
fn signed_lane_load_sign_extends() {
    let source = "I64 Main() { I64 v = 0; v.i8[0] = 0xFF; return v.i8[0]; }\n";
    assert_eq!(run_main(source).unwrap(), "-1\n");
}

#[test]
fn try_catch_returns_payload() {
    let source = "I64 Main() {\n  try { throw(7); }\n  catch { return hc_exception_payload(); }\n  return -1;\n}\n";
    assert_eq!(run_main(source).unwrap(), "7\n");
}

#[test]
fn nested_throw_reaches_inner_then_outer() {
    let source = "I64 Main() {\n  I64 r = 0;\n  try {\n    try { throw(3); }\n    catch { r = hc_exception_payload(); throw(4); }\n  }\n  catch { r = r * 10 + hc_exception_payload(); }\n  return r;\n}\n";
    assert_eq!(run_main(source).unwrap(), "34\n");
}

#[test]
fn throw_unwinds_across_function_calls() {
    let source = "U0 Deep() { throw(9); }\nI64 Main() {\n  try { Deep(); return -1; }\n  catch { return hc_exception_payload(); }\n  return -2;\n}\n";
    assert_eq!(run_main(source).unwrap(), "9\n");
}

#[test]
fn uncaught_throw_is_a_fatal_error() {
    let source = "I64 Main() { throw(5); return 0; }\n";
    let err = run_main(source).unwrap_err();
    assert!(err.contains("uncaught HolyC exception payload=5"), "err: {err}");
}

#[test]
fn global_const_initializer_is_visible() {
    let source = "I64 g = 2 + 3 * 4;\nI64 Main() { return g; }\n";
    assert_eq!(run_main(source).unwrap(), "14\n");
}

#[test]
fn globals_are_mutable_across_calls() {
    let source = "I64 counter = 0;\nU0 Bump() { counter = counter + 1; return; }\nI64 Main() { Bump(); Bump(); Bump(); return counter; }\n";
    assert_eq!(run_main(source).unwrap(), "3\n");
}

#[test]
fn for_loop_and_compound_assign() {
    let source = "I64 Main() {\n  I64 sum = 0;\n  I64 i;\n  for (i = 1; i <= 10; i++) sum += i;\n  return sum;\n}\n";
    assert_eq!(run_main(source).unwrap(), "55\n");
}

#[test]
fn while_break_and_do_while() {
    let source = "I64 Main() {\n  I64 n = 0;\n  while (1) { n++; if (n == 4) break; }\n  do { n++; } while (n < 10);\n  return n;\n}\n";
    assert_eq!(run_main(source).unwrap(), "10\n");
}

#[test]
fn goto_backward_loop() {
    let source = "I64 Main() {\n  I64 n = 5;\n  I64 acc = 1;\nagain:\n  acc = acc * n;\n  n = n - 1;\n  if (n > 0) goto again;\n  return acc;\n}\n";
    assert_eq!(run_main(source).unwrap(), "120\n");
}

#[test]
fn switch_single_null_range_default() {
    let source = "I64 Classify(I64 x) {\n  switch (x) {\n    case 1: return 10;\n    case: return 20;\n    case 5...7: return 30;\n    default: return 40;\n  }\n  return -1;\n}\nI64 Main() {\n  return Classify(2) * 1000 + Classify(6) * 100 + Classify(1) * 10 + Classify(9);\n}\n";
    assert_eq!(run_main(source).unwrap(), "23140\n");
}

#[test]
fn recursion_computes_factorial() {
    let source = "I64 Fact(I64 n) { if (n <= 1) return 1; return n * Fact(n - 1); }\nI64 Main() { return Fact(5); }\n";
    assert_eq!(run_main(source).unwrap(), "120\n");
}

#[test]
fn pointers_and_members() {
    let source = "class CPoint { I64 x; I64 y; };\nI64 Main() {\n  CPoint p;\n  CPoint *q;\n  q = &p;\n  q->x = 3;\n  q->y = 4;\n  return q->x * 10 + p.y;\n}\n";
    assert_eq!(run_main(source).unwrap(), "34\n");
}

#[test]
fn pointer_indexing_through_malloc() {
    let source = "I64 Main() {\n  I64 *buf;\n  buf = hc_malloc(32);\n  buf[0] = 7;\n  buf[3] = 9;\n  I64 r = buf[0] + buf[3];\n  hc_free(buf);\n  return r;\n}\n";
    assert_eq!(run_main(source).unwrap(), "16\n");
}

#[test]
fn default_arguments_fill_at_call_sites() {
    let source = "I64 Scale(I64 v, I64 by=3) { return v * by; }\nI64 Main() { return Scale(5) + Scale(5, 2); }\n";
    assert_eq!(run_main(source).unwrap(), "25\n");
}

#[test]
fn indirect_call_through_function_pointer() {
    let source = "I64 Twice(I64 v) { return v * 2; }\nI64 Main() {\n  I64 *fp;\n  fp = &Twice;\n  return fp(21);\n}\n";
    assert_eq!(run_main(source).unwrap(), "42\n");
}

#[test]
fn division_and_remainder() {
    let source = "I64 Main() { return 7 / 2 * 10 + 7 % 2; }\n";
    assert_eq!(run_main(source).unwrap(), "31\n");
}

#[test]
fn comparison_results_are_numeric() {
    let source = "I64 Main() { return (3 < 5) + (5 < 3) * 10 + (2 == 2) * 100; }\n";
    assert_eq!(run_main(source).unwrap(), "101\n");
}

#[test]
fn print_statement_executes() {
    let source = "I64 Main() { \"jit says %d\\n\", 42; return 0; }\n";
    assert_eq!(run_main(source).unwrap(), "0\n");
}

#[test]
fn lock_block_updates_shared_counter() {
    let source = "I64 shared = 10;\nI64 Main() { lock { shared += 5; shared++; } return shared; }\n";
    assert_eq!(run_main(source).unwrap(), "16\n");
}

#[test]
fn reflection_hash_find_reaches_member_metadata() {
    let source = "class CVec { I64 x id 7; I64 y; };\nI64 Main() {\n  CHashClass *c;\n  c = HashFind(\"CVec\", NULL, HTT_CLASS);\n  if (!c) return -1;\n  CMemberLst *m;\n  m = c->member_lst_and_root;\n  if (!m) return -2;\n  return MemberMetaData(\"id\", m);\n}\n";
    assert_eq!(run_main(source).unwrap(), "7\n");
}

#[test]
fn spawned_tasks_drain_before_return() {
    let source = "I64 done = 0;\nU0 Worker(U8 *arg) { lock { done++; } return; }\nI64 Main() {\n  Spawn(&Worker, NULL);\n  Spawn(&Worker, NULL);\n  return 0;\n}\n";
    assert_eq!(run_main(source).unwrap(), "0\n");
    assert_eq!(runtime::spawn_inflight(), 0);
}

#[test]
fn sessions_persist_and_resolve_across_modules() {
    let store = SessionStore::new();

    let decl_ir = emit("I64 Add(I64 a, I64 b) { return a + b; }\n");
    load_ir_jit(&store, &decl_ir, "cell", OptLevel::O1).unwrap();

    let exec_source = "I64 Add(I64 a, I64 b);\nI64 __repl_exec_1() { return Add(2, 3); }\n";
    let exec_ir = emit(exec_source);
    let out = execute_ir_jit(&store, &exec_ir, "cell", false, "__repl_exec_1", OptLevel::O1).unwrap();
    assert_eq!(out, "5\n");

    // The session survives the run; a later cell still sees Add.
    let exec2 = emit("I64 Add(I64 a, I64 b);\nI64 __repl_exec_2() { return Add(20, 1); }\n");
    let out = execute_ir_jit(&store, &exec2, "cell", false, "__repl_exec_2", OptLevel::O1).unwrap();
    assert_eq!(out, "21\n");

    reset_jit_session(&store, "cell").unwrap();
    let exec3 = emit("I64 Add(I64 a, I64 b);\nI64 __repl_exec_3() { return Add(1, 1); }\n");
    let err =
        execute_ir_jit(&store, &exec3, "cell", false, "__repl_exec_3", OptLevel::O1).unwrap_err();
    assert!(err.contains("symbol not found: Add"), "err: {err}");
}

#[test]
fn missing_entry_symbol_is_an_error() {
    let store = SessionStore::new();
    let ir = emit("I64 Helper() { return 1; }\n");
    let err = execute_ir_jit(&store, &ir, "", true, "main", OptLevel::O2).unwrap_err();
    assert!(err.contains("missing entry symbol 'main'"), "err: {err}");
}

#[test]
fn failed_install_keeps_session_usable() {
    let store = SessionStore::new();
    let good = emit("I64 Val() { return 6; }\n");
    load_ir_jit(&store, &good, "s", OptLevel::O1).unwrap();

    let bad = "define i64 @Broken() {\nentry:\n  br label %missing\n}\n";
    assert!(load_ir_jit(&store, bad, "s", OptLevel::O1).is_err());

    let exec = emit("I64 Val();\nI64 __repl_exec_1() { return Val(); }\n");
    let out = execute_ir_jit(&store, &exec, "s", false, "__repl_exec_1", OptLevel::O1).unwrap();
    assert_eq!(out, "6\n");
}

#[test]
fn chained_comparison_types_execute_as_bool() {
    // Bool(chained) is recognized by sema but behaves as Bool.
    let source = "I64 Main() { I64 r; r = 1 < 2 < 3; return r; }\n";
    assert_eq!(run_main(source).unwrap(), "1\n");
}

#[test]
fn casts_between_widths_sign_extend() {
    let source = "I64 Main() { I8 small = 0xFF; return small(I64); }\n";
    assert_eq!(run_main(source).unwrap(), "-1\n");
}

#[test]
fn runtime_abi_version_is_exposed() {
    let source = "I64 Main() { return hc_runtime_abi_version() >> 32; }\n";
    assert_eq!(run_main(source).unwrap(), "1\n");
}
