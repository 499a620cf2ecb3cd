//! Interactive JIT-backed REPL.
//!
//! Each submitted cell is preprocessed and parsed, then classified as
//! declaration-only or executable-only. Declaration cells extend a
//! persistent prelude catalog (typedefs, class declarations, linkage
//! declarations, `extern` projections of globals, and function prototypes)
//! and are loaded into the session; executable cells are wrapped in a
//! generated `I64 __repl_exec_N()` and run. Failures leave the session and
//! catalog untouched.

use holyc_compiler::{backend, pipeline, OptLevel, PhaseClock, PipelineOptions, SessionStore};
use holyc_frontend::parser::parse;
use holyc_frontend::preprocessor::{run_preprocessor, PreprocessorOptions};
use holyc_frontend::{ExecutionMode, Node, NodeKind};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{BufRead, IsTerminal};

pub fn run_repl(strict_mode: bool, jit_session: &str, jit_reset: bool, opt_level: OptLevel) -> i32 {
    let session_name =
        if jit_session.is_empty() { "__repl__".to_string() } else { jit_session.to_string() };
    let mut engine =
        ReplEngine::new(strict_mode, session_name, opt_level, SessionStore::global());
    if jit_reset && !engine.reset() {
        return 1;
    }

    let interactive = std::io::stdin().is_terminal();
    let mut editor = if interactive { DefaultEditor::new().ok() } else { None };

    let mut explicit_multiline = false;
    let mut multiline_buffer = String::new();
    let mut pending_input = String::new();

    let stdin = std::io::stdin();
    let mut piped_lines = if editor.is_none() { Some(stdin.lock().lines()) } else { None };

    loop {
        let continuation = explicit_multiline || !pending_input.trim().is_empty();
        let prompt = if continuation { "...> " } else { "holyc> " };

        let line = match editor.as_mut() {
            Some(editor) => match editor.readline(prompt) {
                Ok(line) => {
                    let _ = editor.add_history_entry(&line);
                    line
                }
                Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
                Err(_) => break,
            },
            None => match piped_lines.as_mut().and_then(Iterator::next) {
                Some(Ok(line)) => line,
                _ => break,
            },
        };

        let trimmed = line.trim().to_string();

        if explicit_multiline {
            if trimmed == ":}" {
                let cell = std::mem::take(&mut multiline_buffer);
                explicit_multiline = false;
                engine.process_cell(&cell, "<repl-multiline>");
                continue;
            }
            multiline_buffer.push_str(&line);
            multiline_buffer.push('\n');
            continue;
        }

        if pending_input.is_empty() && trimmed == ":{" {
            explicit_multiline = true;
            multiline_buffer.clear();
            continue;
        }

        if pending_input.is_empty() && trimmed.starts_with(':') {
            match trimmed.as_str() {
                ":quit" | ":q" => break,
                ":help" => {
                    print_help();
                    continue;
                }
                ":reset" => {
                    engine.reset();
                    continue;
                }
                ":strict" => {
                    engine.strict_mode = true;
                    continue;
                }
                ":permissive" => {
                    engine.strict_mode = false;
                    continue;
                }
                _ if trimmed.starts_with(":load") => {
                    let path = trimmed[5..].trim();
                    if path.is_empty() {
                        eprintln!("error: :load requires a file path");
                        continue;
                    }
                    match std::fs::read_to_string(path) {
                        Ok(contents) => {
                            engine.process_cell(&contents, path);
                        }
                        Err(_) => eprintln!("error: cannot read file: {path}"),
                    }
                    continue;
                }
                other => {
                    eprintln!("error: unknown REPL command: {other}");
                    continue;
                }
            }
        }

        if trimmed.is_empty() && pending_input.is_empty() {
            continue;
        }

        pending_input.push_str(&line);
        pending_input.push('\n');
        match analyze_input_readiness(&pending_input) {
            InputReadiness::Empty => {
                pending_input.clear();
            }
            InputReadiness::Incomplete => {}
            InputReadiness::Complete | InputReadiness::Invalid => {
                let cell = std::mem::take(&mut pending_input);
                engine.process_cell(&cell, "<repl>");
            }
        }
    }

    if explicit_multiline && !multiline_buffer.trim().is_empty() {
        eprintln!("error: unterminated multiline input; use :}} to execute the cell");
        return 1;
    }
    if !pending_input.trim().is_empty() {
        if analyze_input_readiness(&pending_input) == InputReadiness::Incomplete {
            eprintln!("error: unterminated input; keep typing or terminate constructs before EOF");
            return 1;
        }
        engine.process_cell(&pending_input, "<repl-eof>");
    }

    0
}

fn print_help() {
    println!(
        "REPL commands:\n\
         \x20 :help           Show this help\n\
         \x20 :quit | :q      Exit REPL\n\
         \x20 :reset          Clear JIT session and declaration context\n\
         \x20 :strict         Enable strict semantic mode\n\
         \x20 :permissive     Enable permissive semantic mode\n\
         \x20 :load <file>    Load and execute a HolyC file as one REPL cell\n\
         \x20 (auto)          Incomplete input continues on ...> prompt\n\
         \x20 :{{ ... :}}       Enter/exit multiline input mode"
    );
}

// ---------------------------------------------------------------------------
// Cell classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Empty,
    Declaration,
    Executable,
    Mixed,
}

fn is_declaration_top_level(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::FunctionDecl
            | NodeKind::VarDecl
            | NodeKind::VarDeclList
            | NodeKind::TypeAliasDecl
            | NodeKind::ClassDecl
            | NodeKind::LinkageDecl
            | NodeKind::StartLabel
            | NodeKind::EndLabel
    )
}

fn classify_cell(program: &Node) -> CellKind {
    let mut has_declaration = false;
    let mut has_executable = false;
    for child in &program.children {
        if child.kind == NodeKind::EmptyStmt {
            continue;
        }
        if is_declaration_top_level(child.kind) {
            has_declaration = true;
        } else {
            has_executable = true;
        }
    }
    match (has_declaration, has_executable) {
        (false, false) => CellKind::Empty,
        (true, true) => CellKind::Mixed,
        (true, false) => CellKind::Declaration,
        (false, true) => CellKind::Executable,
    }
}

fn is_single_expression_cell(program: &Node) -> bool {
    let mut expression_stmt = false;
    for child in &program.children {
        if child.kind == NodeKind::EmptyStmt {
            continue;
        }
        if expression_stmt || child.kind != NodeKind::ExprStmt {
            return false;
        }
        expression_stmt = true;
    }
    expression_stmt
}

// ---------------------------------------------------------------------------
// Input readiness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputReadiness {
    Empty,
    Incomplete,
    Complete,
    Invalid,
}

fn has_unclosed_lexical_scope(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    let mut in_string = false;
    let mut quote = 0u8;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut escaped = false;

    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        let next = if i + 1 < bytes.len() { bytes[i + 1] } else { 0 };

        if in_line_comment {
            if c == b'\n' {
                in_line_comment = false;
            }
            i += 1;
            continue;
        }
        if in_block_comment {
            if c == b'*' && next == b'/' {
                in_block_comment = false;
                i += 1;
            }
            i += 1;
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == quote {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            b'/' if next == b'/' => {
                in_line_comment = true;
                i += 1;
            }
            b'/' if next == b'*' => {
                in_block_comment = true;
                i += 1;
            }
            b'"' | b'\'' => {
                in_string = true;
                quote = c;
                escaped = false;
            }
            b'(' => paren += 1,
            b')' => paren -= 1,
            b'{' => brace += 1,
            b'}' => brace -= 1,
            b'[' => bracket += 1,
            b']' => bracket -= 1,
            _ => {}
        }
        i += 1;
    }

    in_string || in_block_comment || paren > 0 || brace > 0 || bracket > 0
}

fn parse_diagnostic_location(message: &str) -> Option<(usize, usize)> {
    let bytes = message.as_bytes();
    let mut found = None;
    let mut i = 0usize;
    while i + 4 < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }
        let line_begin = i + 1;
        let mut line_end = line_begin;
        while line_end < bytes.len() && bytes[line_end].is_ascii_digit() {
            line_end += 1;
        }
        if line_end == line_begin || line_end >= bytes.len() || bytes[line_end] != b':' {
            i += 1;
            continue;
        }
        let col_begin = line_end + 1;
        let mut col_end = col_begin;
        while col_end < bytes.len() && bytes[col_end].is_ascii_digit() {
            col_end += 1;
        }
        if col_end == col_begin || col_end >= bytes.len() || bytes[col_end] != b':' {
            i += 1;
            continue;
        }

        let line = message[line_begin..line_end].parse().unwrap_or(0);
        let col = message[col_begin..col_end].parse().unwrap_or(0);
        found = Some((line, col));
        i += 1;
    }
    found
}

fn line_length(text: &str, one_based_line: usize) -> usize {
    text.lines().nth(one_based_line.saturating_sub(1)).map(str::len).unwrap_or(0)
}

fn looks_like_incomplete_diagnostic(source: &str, diagnostic: &str) -> bool {
    let line_count = source.lines().count();
    let trimmed = source.trim();
    let last_char = trimmed.chars().last().unwrap_or('\0');
    let location = parse_diagnostic_location(diagnostic);

    let location_is_eof = || match location {
        None => true,
        Some((line, col)) => {
            line == 0 || line > line_count || (line == line_count && col > line_length(source, line))
        }
    };

    let last_char_suggests_continuation = matches!(
        last_char,
        ',' | '(' | '[' | '{' | '=' | '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '!' | '<'
            | '>' | '?' | ':'
    );

    if diagnostic.contains("unterminated block comment") || diagnostic.contains("unterminated string")
    {
        return true;
    }

    if diagnostic.contains("unexpected token in expression") {
        return location_is_eof() || last_char_suggests_continuation;
    }

    if diagnostic.contains("expected ") {
        if diagnostic.contains("expected ';'") && last_char != ';' && last_char != '}' {
            return true;
        }
        if diagnostic.contains("expected '}'") && last_char != '}' {
            return true;
        }
        if diagnostic.contains("expected ')'") && last_char != ')' {
            return true;
        }
        if diagnostic.contains("expected ']'") && last_char != ']' {
            return true;
        }
        return location_is_eof();
    }

    false
}

fn analyze_input_readiness(source: &str) -> InputReadiness {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return InputReadiness::Empty;
    }

    if has_unclosed_lexical_scope(source) {
        return InputReadiness::Incomplete;
    }

    if !trimmed.starts_with('#') {
        let last = trimmed.chars().last().unwrap_or('\0');
        if last != ';' && last != '}' {
            return InputReadiness::Incomplete;
        }
    }

    let options = PreprocessorOptions::new(ExecutionMode::Jit);
    match run_preprocessor(source, "<repl>", &options)
        .map_err(|diag| diag.to_string())
        .and_then(|preprocessed| {
            parse(&preprocessed, "<repl>").map_err(|diag| diag.to_string())
        }) {
        Ok(_) => InputReadiness::Complete,
        Err(message) => {
            if looks_like_incomplete_diagnostic(source, &message) {
                InputReadiness::Incomplete
            } else {
                InputReadiness::Invalid
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Declaration catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeclCatalog {
    type_decls: Vec<String>,
    class_decls: Vec<String>,
    linkage_decls: Vec<String>,
    function_protos: Vec<String>,
    global_decls: Vec<String>,
}

impl DeclCatalog {
    fn add(bucket: &mut Vec<String>, decl: String) {
        if !decl.is_empty() && !bucket.contains(&decl) {
            bucket.push(decl);
        }
    }

    fn build_prelude(&self) -> String {
        let mut out = String::new();
        for decl in self
            .type_decls
            .iter()
            .chain(&self.class_decls)
            .chain(&self.linkage_decls)
            .chain(&self.function_protos)
            .chain(&self.global_decls)
        {
            out.push_str(decl);
            out.push('\n');
        }
        out
    }

    fn clear(&mut self) {
        self.type_decls.clear();
        self.class_decls.clear();
        self.linkage_decls.clear();
        self.function_protos.clear();
        self.global_decls.clear();
    }
}

fn has_modifier(decl_text: &str, modifier: &str) -> bool {
    decl_text.split_whitespace().any(|token| token == modifier)
}

fn build_function_prototype(fn_node: &Node) -> String {
    let mut out = String::new();
    out.push_str(fn_node.text.trim());
    out.push('(');
    if let Some(params) = fn_node.find_child(NodeKind::ParamList) {
        let mut first = true;
        for param in &params.children {
            if param.kind != NodeKind::Param {
                continue;
            }
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(param.text.trim());
            if let Some(default) = param.find_child(NodeKind::DefaultArg) {
                if !default.text.trim().is_empty() {
                    out.push_str(" = ");
                    out.push_str(default.text.trim());
                }
            }
        }
    }
    out.push_str(");");
    out
}

fn build_extern_var_decl(var_decl: &Node) -> String {
    let decl = var_decl.text.trim();
    if decl.is_empty() || has_modifier(decl, "static") {
        return String::new();
    }
    let first = decl.split_whitespace().next().unwrap_or("");
    if ["extern", "import", "_extern", "_import", "export", "_export"].contains(&first) {
        return format!("{decl};");
    }
    format!("extern {decl};")
}

fn build_type_alias_decl(alias: &Node) -> String {
    let text = alias.text.trim();
    if text.is_empty() {
        return String::new();
    }
    format!("typedef {text};")
}

fn build_linkage_decl(linkage: &Node) -> String {
    let Some(payload) = linkage.children.first() else {
        return String::new();
    };
    let payload = payload.text.trim();
    if payload.is_empty() {
        return String::new();
    }
    format!("{} {payload};", linkage.text.trim())
}

fn render_class_decl(class_decl: &Node, indent: usize) -> String {
    let base_indent = " ".repeat(indent);
    let has_body_items =
        class_decl.children.iter().any(|child| child.kind != NodeKind::VarDecl);
    if !has_body_items {
        return format!("{base_indent}{};", class_decl.text.trim());
    }

    let mut out = format!("{base_indent}{} {{\n", class_decl.text.trim());
    for child in &class_decl.children {
        match child.kind {
            NodeKind::VarDecl => {}
            NodeKind::FieldDecl => {
                out.push_str(&base_indent);
                out.push_str("  ");
                out.push_str(child.text.trim());
                out.push_str(";\n");
            }
            NodeKind::TypeAliasDecl => {
                out.push_str(&base_indent);
                out.push_str("  ");
                out.push_str(&build_type_alias_decl(child));
                out.push('\n');
            }
            NodeKind::ClassDecl => {
                out.push_str(&render_class_decl(child, indent + 2));
                out.push('\n');
            }
            _ => {}
        }
    }
    out.push_str(&base_indent);
    out.push_str("};");
    out
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct ReplEngine {
    strict_mode: bool,
    session_name: String,
    opt_level: OptLevel,
    store: &'static SessionStore,
    cell_id: u64,
    catalog: DeclCatalog,
}

impl ReplEngine {
    fn new(
        strict_mode: bool,
        session_name: String,
        opt_level: OptLevel,
        store: &'static SessionStore,
    ) -> ReplEngine {
        ReplEngine {
            strict_mode,
            session_name,
            opt_level,
            store,
            cell_id: 0,
            catalog: DeclCatalog::default(),
        }
    }

    fn reset(&mut self) -> bool {
        if let Err(message) = backend::reset_jit_session(self.store, &self.session_name) {
            eprintln!("{message}");
            return false;
        }
        self.catalog.clear();
        self.cell_id = 0;
        true
    }

    fn process_cell(&mut self, cell_text: &str, origin: &str) -> bool {
        if cell_text.trim().is_empty() {
            return true;
        }

        let options = PreprocessorOptions::new(ExecutionMode::Jit);
        let parsed = run_preprocessor(cell_text, origin, &options)
            .and_then(|preprocessed| parse(&preprocessed, origin));
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(diag) => {
                eprintln!("{diag}");
                return false;
            }
        };

        match classify_cell(&parsed) {
            CellKind::Empty => true,
            CellKind::Mixed => {
                eprintln!(
                    "error: REPL cell cannot mix top-level declarations and executable \
                     statements; split into separate inputs"
                );
                false
            }
            CellKind::Declaration => self.process_declaration_cell(cell_text, &parsed),
            CellKind::Executable => self.process_executable_cell(cell_text, &parsed),
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::new(ExecutionMode::Jit);
        options.strict_mode = self.strict_mode;
        options
    }

    fn process_declaration_cell(&mut self, cell_text: &str, parsed: &Node) -> bool {
        let prelude = self.catalog.build_prelude();
        let mut unit = prelude.clone();
        if !prelude.is_empty() {
            unit.push('\n');
        }
        unit.push_str(cell_text);
        unit.push('\n');

        let filename = format!("<repl-decl-{}>", self.cell_id + 1);
        let ir = match pipeline::emit_ir_text(
            &unit,
            &filename,
            &self.pipeline_options(),
            &mut PhaseClock::disabled(),
        ) {
            Ok(ir) => ir,
            Err(err) => {
                eprintln!("{err}");
                return false;
            }
        };

        if let Err(message) =
            backend::load_ir_jit(self.store, &ir, &self.session_name, self.opt_level)
        {
            eprintln!("{message}");
            return false;
        }

        self.index_declarations(parsed);
        self.cell_id += 1;
        true
    }

    fn process_executable_cell(&mut self, cell_text: &str, parsed: &Node) -> bool {
        let mut expression_mode = is_single_expression_cell(parsed);
        let entry_name = format!("__repl_exec_{}", self.cell_id + 1);

        let prelude = self.catalog.build_prelude();
        let mut unit = prelude.clone();
        if !prelude.is_empty() {
            unit.push('\n');
        }
        unit.push_str(&format!("I64 {entry_name}()\n{{\n"));

        if expression_mode {
            let mut expression = cell_text.trim().to_string();
            if expression.ends_with(';') {
                expression.pop();
                let expression = expression.trim_end();
                unit.push_str(&format!("  return {expression};\n"));
            } else {
                expression_mode = false;
            }
        }
        if !expression_mode {
            unit.push_str(cell_text);
            if !cell_text.ends_with('\n') {
                unit.push('\n');
            }
            unit.push_str("  return 0;\n");
        }
        unit.push_str("}\n");

        let filename = format!("<repl-exec-{}>", self.cell_id + 1);
        let ir = match pipeline::emit_ir_text(
            &unit,
            &filename,
            &self.pipeline_options(),
            &mut PhaseClock::disabled(),
        ) {
            Ok(ir) => ir,
            Err(err) => {
                eprintln!("{err}");
                return false;
            }
        };

        let result = backend::execute_ir_jit(
            self.store,
            &ir,
            &self.session_name,
            false,
            &entry_name,
            self.opt_level,
        );
        match result {
            Ok(output) => {
                if expression_mode {
                    print!("{output}");
                }
                self.cell_id += 1;
                true
            }
            Err(message) => {
                eprintln!("{message}");
                false
            }
        }
    }

    fn index_declarations(&mut self, program: &Node) {
        for child in &program.children {
            match child.kind {
                NodeKind::TypeAliasDecl => {
                    DeclCatalog::add(&mut self.catalog.type_decls, build_type_alias_decl(child));
                }
                NodeKind::ClassDecl => {
                    DeclCatalog::add(&mut self.catalog.class_decls, render_class_decl(child, 0));
                    for class_child in &child.children {
                        if class_child.kind == NodeKind::VarDecl {
                            DeclCatalog::add(
                                &mut self.catalog.global_decls,
                                build_extern_var_decl(class_child),
                            );
                        }
                    }
                }
                NodeKind::LinkageDecl => {
                    DeclCatalog::add(&mut self.catalog.linkage_decls, build_linkage_decl(child));
                }
                NodeKind::FunctionDecl => {
                    if !has_modifier(&child.text, "static") {
                        DeclCatalog::add(
                            &mut self.catalog.function_protos,
                            build_function_prototype(child),
                        );
                    }
                }
                NodeKind::VarDecl => {
                    DeclCatalog::add(&mut self.catalog.global_decls, build_extern_var_decl(child));
                }
                NodeKind::VarDeclList => {
                    for var_child in &child.children {
                        if var_child.kind == NodeKind::VarDecl {
                            DeclCatalog::add(
                                &mut self.catalog.global_decls,
                                build_extern_var_decl(var_child),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_cell(source: &str) -> Node {
        let options = PreprocessorOptions::new(ExecutionMode::Jit);
        let preprocessed = run_preprocessor(source, "<repl>", &options).unwrap();
        parse(&preprocessed, "<repl>").unwrap()
    }

    #[test]
    fn classifies_declaration_cells() {
        let program = parse_cell("I64 Add(I64 a, I64 b) { return a+b; }");
        assert_eq!(classify_cell(&program), CellKind::Declaration);
        let program = parse_cell("Add(2,3);");
        assert_eq!(classify_cell(&program), CellKind::Executable);
        let program = parse_cell("I64 x; x = 1;");
        assert_eq!(classify_cell(&program), CellKind::Mixed);
    }

    #[test]
    fn single_expression_detection() {
        assert!(is_single_expression_cell(&parse_cell("1 + 2;")));
        assert!(!is_single_expression_cell(&parse_cell("\"x\";")));
        assert!(!is_single_expression_cell(&parse_cell("F(); G();")));
    }

    #[test]
    fn readiness_detects_unbalanced_input() {
        assert_eq!(analyze_input_readiness("I64 F() {\n"), InputReadiness::Incomplete);
        assert_eq!(analyze_input_readiness("1 + \n"), InputReadiness::Incomplete);
        assert_eq!(analyze_input_readiness("1 + 2;\n"), InputReadiness::Complete);
        assert_eq!(analyze_input_readiness("\"open\n"), InputReadiness::Incomplete);
        assert_eq!(analyze_input_readiness("   \n"), InputReadiness::Empty);
    }

    #[test]
    fn prototype_rendering_keeps_defaults() {
        let program = parse_cell("U0 Beep(I64 tone=440, U8 *msg=\"hi\") { return; }");
        let proto = build_function_prototype(&program.children[0]);
        assert_eq!(proto, "U0 Beep(I64 tone = 440, U8 * msg = \"hi\");");
    }

    #[test]
    fn extern_projection_skips_statics() {
        let program = parse_cell("static I64 hidden = 2;");
        assert_eq!(build_extern_var_decl(&program.children[0]), "");
        let program = parse_cell("I64 counter = 2;");
        assert_eq!(build_extern_var_decl(&program.children[0]), "extern I64 counter;");
    }

    #[test]
    fn class_rendering_round_trips_through_parser() {
        let program = parse_cell("class CPoint { I64 x; I64 y; };");
        let rendered = render_class_decl(&program.children[0], 0);
        assert!(rendered.starts_with("class CPoint {"));
        let reparsed = parse_cell(&rendered);
        assert_eq!(reparsed.children[0].kind, NodeKind::ClassDecl);
    }
}
