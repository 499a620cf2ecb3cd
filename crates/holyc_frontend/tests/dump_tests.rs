//! Pipeline determinism tests over the typed-AST dump.

use holyc_frontend::parser::parse;
use holyc_frontend::sema::analyze;
use holyc_frontend::dump_typed;

const SAMPLE: &str = "\
class CPoint { I64 x; I64 y; };\n\
I64 g = 4;\n\
I64 Add(I64 a, I64 b = 2) { return a + b; }\n\
I64 Main() {\n\
  CPoint p;\n\
  p.x = g;\n\
  I64 i;\n\
  for (i = 0; i < 3; i++) p.y += Add(i);\n\
  \"sum %d\\n\", p.y;\n\
  return p.x + p.y;\n\
}\n";

fn dump_of(source: &str) -> String {
    let parsed = parse(source, "sample.hc").expect("parse");
    let typed = analyze(&parsed, "sample.hc", true).expect("sema");
    dump_typed(&typed)
}

#[test]
fn dump_is_a_fixed_point_across_runs() {
    let first = dump_of(SAMPLE);
    let second = dump_of(SAMPLE);
    assert_eq!(first, second);
}

#[test]
fn dump_carries_kinds_text_and_types() {
    let dump = dump_of(SAMPLE);
    assert!(dump.starts_with("Program: sample.hc\n"), "dump:\n{dump}");
    assert!(dump.contains("FunctionDecl: I64 Add"), "dump:\n{dump}");
    assert!(dump.contains("Literal: 4 [type=I64]"), "dump:\n{dump}");
    assert!(dump.contains("[type=CPoint]"), "dump:\n{dump}");
    assert!(dump.contains("PrintStmt"), "dump:\n{dump}");
}

#[test]
fn reanalyzing_the_same_tree_is_idempotent() {
    let parsed = parse(SAMPLE, "sample.hc").expect("parse");
    let first = analyze(&parsed, "sample.hc", true).expect("sema");
    let second = analyze(&parsed, "sample.hc", true).expect("sema");
    assert_eq!(first, second);
}
