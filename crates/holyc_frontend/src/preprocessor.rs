//! HolyC preprocessor.
//!
//! Handles `#include`, `#define`, conditional compilation, `#assert`, the
//! `#ifjit`/`#ifaot` mode gates, and the restricted `#exe` interpreter.
//! Output is the expanded source text; any failure is a `HC1xxx` diagnostic.
//!
//! Directive lines begin with `#` after optional leading whitespace. Text on
//! active lines is macro-expanded; quoted strings and char literals pass
//! through verbatim. A file with no directives and no macro references comes
//! out byte-for-byte identical.

use crate::diagnostics::Diagnostic;
use crate::ExecutionMode;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Configuration for a preprocessor run.
#[derive(Debug, Clone)]
pub struct PreprocessorOptions {
    pub mode: ExecutionMode,
    /// Include roots searched after the including file's directory.
    pub include_dirs: Vec<String>,
    /// Report `HC1011` on `#if` division/modulo by zero instead of silently
    /// folding to 0. Off by default for compatibility.
    pub diagnose_div_zero: bool,
}

impl PreprocessorOptions {
    pub fn new(mode: ExecutionMode) -> Self {
        PreprocessorOptions { mode, include_dirs: Vec::new(), diagnose_div_zero: false }
    }
}

/// Run the preprocessor over one logical file.
pub fn run_preprocessor(
    source: &str,
    filename: &str,
    options: &PreprocessorOptions,
) -> Result<String, Diagnostic> {
    let mut pp = Preprocessor {
        jit_mode: options.mode == ExecutionMode::Jit,
        include_dirs: options.include_dirs.clone(),
        diagnose_div_zero: options.diagnose_div_zero,
        macros: HashMap::new(),
    };
    let mut include_stack = vec![canonical_path(filename)];
    pp.process_file(source, filename, 0, &mut include_stack)
}

#[derive(Debug, Clone, Default)]
struct MacroDef {
    function_like: bool,
    params: Vec<String>,
    body: String,
}

#[derive(Debug, Clone, Copy)]
struct CondFrame {
    parent_active: bool,
    branch_taken: bool,
    current_active: bool,
}

struct Preprocessor {
    jit_mode: bool,
    include_dirs: Vec<String>,
    diagnose_div_zero: bool,
    macros: HashMap<String, MacroDef>,
}

fn fail(code: &str, file: &str, line: u32, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(code, file, line, 1, message)
}

fn fail_expr(code: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(code, "preprocessor", 0, 0, message)
}

impl Preprocessor {
    fn process_file(
        &mut self,
        source: &str,
        file: &str,
        depth: u32,
        include_stack: &mut Vec<String>,
    ) -> Result<String, Diagnostic> {
        if depth > 64 {
            return Err(fail("HC1001", file, 1, "preprocessor include depth exceeded")
                .with_help("reduce include nesting or break include cycles"));
        }

        let mut cond: Vec<CondFrame> = Vec::new();
        let mut out = String::new();
        let mut lines = source.lines();
        let mut line_no = 0u32;

        while let Some(line) = lines.next() {
            line_no += 1;
            let trimmed = line.trim_start();

            if trimmed.starts_with('#') {
                let mut directive = trimmed.to_string();
                let directive_line_no = line_no;
                if is_exe_directive_line(&directive) {
                    while !has_closed_exe_body(&directive) {
                        let Some(continued) = lines.next() else {
                            return Err(fail(
                                "HC1018",
                                file,
                                directive_line_no,
                                "unterminated #exe block",
                            ));
                        };
                        line_no += 1;
                        directive.push('\n');
                        directive.push_str(continued);
                    }
                }
                self.handle_directive(
                    &directive,
                    file,
                    directive_line_no,
                    depth,
                    include_stack,
                    &mut cond,
                    &mut out,
                )?;
                continue;
            }

            if !is_active(&cond) {
                continue;
            }

            let mut active = HashSet::new();
            out.push_str(&self.expand_text(line, file, line_no, &mut active)?);
            out.push('\n');
        }

        if !cond.is_empty() {
            return Err(fail("HC1002", file, line_no, "missing #endif")
                .with_help("ensure every #if/#ifdef/#ifndef block is closed"));
        }

        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_directive(
        &mut self,
        line: &str,
        file: &str,
        line_no: u32,
        depth: u32,
        include_stack: &mut Vec<String>,
        cond: &mut Vec<CondFrame>,
        out: &mut String,
    ) -> Result<(), Diagnostic> {
        let body = line.strip_prefix('#').ok_or_else(|| {
            fail("HC1003", file, line_no, "malformed directive line")
        })?;
        let body = body.trim_start();
        let directive: String =
            body.chars().take_while(|c| !c.is_whitespace() && *c != '{').collect();
        let rest = body[directive.len()..].to_string();

        match directive.as_str() {
            "ifdef" => {
                let name = rest.split_whitespace().next().unwrap_or("").to_string();
                push_cond(cond, self.macros.contains_key(&name));
                Ok(())
            }
            "ifndef" => {
                let name = rest.split_whitespace().next().unwrap_or("").to_string();
                push_cond(cond, !self.macros.contains_key(&name));
                Ok(())
            }
            "if" => {
                let value = self.eval_if_expr(&rest)?;
                push_cond(cond, value);
                Ok(())
            }
            "ifjit" => {
                push_cond(cond, self.jit_mode);
                Ok(())
            }
            "ifaot" => {
                push_cond(cond, !self.jit_mode);
                Ok(())
            }
            "else" => {
                let top = cond
                    .last_mut()
                    .ok_or_else(|| fail("HC1004", file, line_no, "stray #else"))?;
                top.current_active = top.parent_active && !top.branch_taken;
                top.branch_taken = true;
                Ok(())
            }
            "elif" => {
                if cond.is_empty() {
                    return Err(fail("HC1005", file, line_no, "stray #elif"));
                }
                let (parent_active, branch_taken) = {
                    let top = cond.last().expect("checked non-empty");
                    (top.parent_active, top.branch_taken)
                };
                if !parent_active || branch_taken {
                    cond.last_mut().expect("checked non-empty").current_active = false;
                    return Ok(());
                }
                let matched = self.eval_if_expr(&rest)?;
                let top = cond.last_mut().expect("checked non-empty");
                top.current_active = matched;
                if matched {
                    top.branch_taken = true;
                }
                Ok(())
            }
            "endif" => {
                if cond.pop().is_none() {
                    return Err(fail("HC1006", file, line_no, "stray #endif"));
                }
                Ok(())
            }
            _ if !is_active(cond) => Ok(()),
            "define" => self.parse_define(rest.trim(), file, line_no),
            "include" => {
                let target = extract_quoted(rest.trim(), file, line_no, "#include")?;
                let include_path = self.resolve_include_path(file, &target, line_no)?;
                let canonical_include = canonical_path(&include_path);
                if let Some(cycle_start) =
                    include_stack.iter().position(|p| *p == canonical_include)
                {
                    let mut trace = include_stack[cycle_start..].join(" -> ");
                    trace.push_str(" -> ");
                    trace.push_str(&canonical_include);
                    return Err(fail(
                        "HC1023",
                        file,
                        line_no,
                        format!("include cycle detected: {target}"),
                    )
                    .with_help(trace));
                }

                let contents = std::fs::read_to_string(&include_path).map_err(|_| {
                    fail("HC1007", file, line_no, format!("include not found: {target}"))
                        .with_help("verify include search roots and file path")
                })?;
                log::trace!("including {include_path} from {file}:{line_no}");

                include_stack.push(canonical_include);
                let expanded =
                    self.process_file(&contents, &include_path, depth + 1, include_stack)?;
                include_stack.pop();
                out.push_str(&expanded);
                Ok(())
            }
            "exe" => {
                let expanded = self.evaluate_exe(rest.trim(), file, line_no)?;
                out.push_str(&expanded);
                Ok(())
            }
            "assert" => {
                if !self.eval_if_expr(&rest)? {
                    return Err(fail("HC1008", file, line_no, "#assert failed"));
                }
                Ok(())
            }
            _ => Err(fail("HC1009", file, line_no, format!("unsupported directive #{directive}"))),
        }
    }

    fn parse_define(&mut self, rest: &str, file: &str, line_no: u32) -> Result<(), Diagnostic> {
        if rest.is_empty() {
            return Err(fail("HC1026", file, line_no, "#define requires a macro name"));
        }

        let bytes = rest.as_bytes();
        if !is_ident_start(bytes[0]) {
            return Err(fail("HC1027", file, line_no, "invalid macro name in #define"));
        }
        let mut i = 1;
        while i < bytes.len() && is_ident_continue(bytes[i]) {
            i += 1;
        }
        let name = rest[..i].to_string();

        let mut def = MacroDef::default();
        if i < bytes.len() && bytes[i] == b'(' {
            def.function_like = true;
            i += 1;
            let mut current = String::new();
            let mut expect_param = true;
            while i < bytes.len() && bytes[i] != b')' {
                let c = bytes[i];
                if c.is_ascii_whitespace() {
                    i += 1;
                    continue;
                }
                if c == b',' {
                    if expect_param {
                        return Err(fail(
                            "HC1028",
                            file,
                            line_no,
                            format!("empty parameter in function-like macro: {name}"),
                        ));
                    }
                    def.params.push(std::mem::take(&mut current));
                    expect_param = true;
                    i += 1;
                    continue;
                }
                if !is_ident_start(c) {
                    return Err(fail(
                        "HC1029",
                        file,
                        line_no,
                        format!("invalid function-like macro parameter list for: {name}"),
                    ));
                }
                current.clear();
                current.push(c as char);
                i += 1;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    current.push(bytes[i] as char);
                    i += 1;
                }
                expect_param = false;
            }
            if i >= bytes.len() || bytes[i] != b')' {
                return Err(fail(
                    "HC1030",
                    file,
                    line_no,
                    format!("unterminated function-like macro definition for: {name}"),
                ));
            }
            if !current.is_empty() {
                def.params.push(current);
            } else if !expect_param {
                return Err(fail(
                    "HC1031",
                    file,
                    line_no,
                    format!("malformed function-like macro parameter list for: {name}"),
                ));
            }
            i += 1;
            def.body = rest[i..].trim().to_string();
            self.macros.insert(name, def);
            return Ok(());
        }

        def.body = rest[i..].trim().to_string();
        self.macros.insert(name, def);
        Ok(())
    }

    fn expand_text(
        &self,
        text: &str,
        file: &str,
        line_no: u32,
        active_macros: &mut HashSet<String>,
    ) -> Result<String, Diagnostic> {
        let bytes = text.as_bytes();
        let mut out = String::new();
        let mut i = 0usize;
        while i < bytes.len() {
            let c = bytes[i];
            if c == b'"' || c == b'\'' {
                let quote = c;
                out.push(c as char);
                i += 1;
                while i < bytes.len() {
                    let qc = bytes[i];
                    out.push(qc as char);
                    i += 1;
                    if qc == b'\\' && i < bytes.len() {
                        out.push(bytes[i] as char);
                        i += 1;
                        continue;
                    }
                    if qc == quote {
                        break;
                    }
                }
                continue;
            }

            if is_ident_start(c) {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_continue(bytes[j]) {
                    j += 1;
                }
                let ident = &text[i..j];

                match ident {
                    "__FILE__" => out.push_str(&format!("\"{file}\"")),
                    "__DIR__" => out.push_str(&format!("\"{}\"", dirname(file))),
                    "__DATE__" => out.push_str("\"1970-01-01\""),
                    "__TIME__" => out.push_str("\"00:00:00\""),
                    "__LINE__" => out.push_str(&line_no.to_string()),
                    "__CMD_LINE__" => out.push('0'),
                    _ => {
                        if let Some(def) = self.macros.get(ident) {
                            if active_macros.contains(ident) {
                                out.push_str(ident);
                                i = j;
                                continue;
                            }

                            if def.function_like {
                                let mut open = j;
                                while open < bytes.len() && bytes[open].is_ascii_whitespace() {
                                    open += 1;
                                }
                                if open >= bytes.len() || bytes[open] != b'(' {
                                    out.push_str(ident);
                                    i = j;
                                    continue;
                                }

                                let (args, call_end) =
                                    parse_macro_call_args(text, open, file, line_no)?;
                                if args.len() != def.params.len() {
                                    return Err(fail(
                                        "HC1032",
                                        file,
                                        line_no,
                                        format!(
                                            "wrong argument count for macro {ident} (expected {}, got {})",
                                            def.params.len(),
                                            args.len()
                                        ),
                                    ));
                                }

                                let substituted = substitute_macro_params(def, &args);
                                active_macros.insert(ident.to_string());
                                let expanded =
                                    self.expand_text(&substituted, file, line_no, active_macros)?;
                                active_macros.remove(ident);
                                out.push_str(&expanded);
                                i = call_end + 1;
                                continue;
                            }

                            active_macros.insert(ident.to_string());
                            let expanded =
                                self.expand_text(&def.body, file, line_no, active_macros)?;
                            active_macros.remove(ident);
                            out.push_str(&expanded);
                        } else {
                            out.push_str(ident);
                        }
                    }
                }
                i = j;
                continue;
            }

            out.push(c as char);
            i += 1;
        }

        Ok(out)
    }

    fn eval_if_expr(&self, expr: &str) -> Result<bool, Diagnostic> {
        Ok(self.eval_if_expr_value(expr, 0)? != 0)
    }

    fn eval_if_expr_value(&self, expr: &str, depth: u32) -> Result<i64, Diagnostic> {
        if depth > 64 {
            return Err(fail_expr("HC1010", "#if expression recursion depth exceeded"));
        }
        let tokens = tokenize_if_expr(expr)?;
        let mut eval = IfExprEval { pp: self, tokens, index: 0, depth };
        let result = eval.parse_logical_or()?;
        if eval.peek().kind != IfTokKind::End {
            return Err(fail_expr("HC1017", "trailing tokens in #if expression"));
        }
        Ok(result)
    }

    fn resolve_include_path(
        &self,
        including_file: &str,
        target: &str,
        line_no: u32,
    ) -> Result<String, Diagnostic> {
        let mut roots = vec![dirname(including_file)];
        roots.extend(self.include_dirs.iter().cloned());

        for root in &roots {
            let candidate = join_path(root, target);
            if Path::new(&candidate).exists() {
                return Ok(candidate);
            }
        }

        let mut remediation = String::from("searched include roots in order:");
        for root in &roots {
            remediation.push(' ');
            remediation.push_str(root);
        }
        Err(fail("HC1007", including_file, line_no, format!("include not found: {target}"))
            .with_help(remediation))
    }

    fn evaluate_exe(&self, body: &str, file: &str, line_no: u32) -> Result<String, Diagnostic> {
        let mut exe = ExeInterp { pp: self, source: body.trim(), pos: 0, file, line_no };
        let mut output = String::new();
        exe.parse_block(true, &mut output)?;
        exe.skip_ws();
        if !exe.at_end() {
            return Err(fail("HC1024", file, line_no, "trailing tokens after #exe block"));
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// #if expression evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfTokKind {
    End,
    Number,
    Identifier,
    LParen,
    RParen,
    Op,
}

#[derive(Debug, Clone)]
struct IfTok {
    kind: IfTokKind,
    text: String,
}

fn tokenize_if_expr(input: &str) -> Result<Vec<IfTok>, Diagnostic> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let begin = i;
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(IfTok { kind: IfTokKind::Number, text: input[begin..i].to_string() });
            continue;
        }

        if is_ident_start(c) {
            let begin = i;
            i += 1;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            tokens.push(IfTok { kind: IfTokKind::Identifier, text: input[begin..i].to_string() });
            continue;
        }

        if c == b'(' {
            tokens.push(IfTok { kind: IfTokKind::LParen, text: "(".to_string() });
            i += 1;
            continue;
        }
        if c == b')' {
            tokens.push(IfTok { kind: IfTokKind::RParen, text: ")".to_string() });
            i += 1;
            continue;
        }

        if i + 1 < bytes.len() {
            let two = &input[i..i + 2];
            if ["||", "&&", "==", "!=", "<=", ">=", "<<", ">>"].contains(&two) {
                tokens.push(IfTok { kind: IfTokKind::Op, text: two.to_string() });
                i += 2;
                continue;
            }
        }

        if b"!~+-*/%|^&<>".contains(&c) {
            tokens.push(IfTok { kind: IfTokKind::Op, text: (c as char).to_string() });
            i += 1;
            continue;
        }

        return Err(fail_expr(
            "HC1016",
            format!("unsupported token in #if expression: '{}'", c as char),
        ));
    }

    tokens.push(IfTok { kind: IfTokKind::End, text: String::new() });
    Ok(tokens)
}

struct IfExprEval<'a> {
    pp: &'a Preprocessor,
    tokens: Vec<IfTok>,
    index: usize,
    depth: u32,
}

impl IfExprEval<'_> {
    fn peek(&self) -> &IfTok {
        &self.tokens[self.index]
    }

    fn match_op(&mut self, op: &str) -> bool {
        if self.peek().kind == IfTokKind::Op && self.peek().text == op {
            self.index += 1;
            return true;
        }
        false
    }

    fn match_kind(&mut self, kind: IfTokKind) -> bool {
        if self.peek().kind == kind {
            self.index += 1;
            return true;
        }
        false
    }

    fn parse_number(text: &str) -> i64 {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        parse_int_base0(&cleaned).unwrap_or(0)
    }

    fn identifier_value(&self, name: &str) -> Result<i64, Diagnostic> {
        match name {
            "TRUE" | "true" => return Ok(1),
            "FALSE" | "false" => return Ok(0),
            _ => {}
        }
        let Some(def) = self.pp.macros.get(name) else {
            return Ok(0);
        };
        if def.function_like {
            return Ok(0);
        }
        self.pp.eval_if_expr_value(&def.body, self.depth + 1)
    }

    fn parse_primary(&mut self) -> Result<i64, Diagnostic> {
        if self.match_kind(IfTokKind::LParen) {
            let value = self.parse_logical_or()?;
            if !self.match_kind(IfTokKind::RParen) {
                return Err(fail_expr("HC1012", "expected ')' in #if expression"));
            }
            return Ok(value);
        }

        if self.peek().kind == IfTokKind::Number {
            let text = self.peek().text.clone();
            self.index += 1;
            return Ok(Self::parse_number(&text));
        }

        if self.peek().kind == IfTokKind::Identifier {
            let name = self.peek().text.clone();
            self.index += 1;

            if name == "defined" {
                let target;
                if self.match_kind(IfTokKind::LParen) {
                    if self.peek().kind != IfTokKind::Identifier {
                        return Err(fail_expr("HC1013", "expected identifier after defined("));
                    }
                    target = self.peek().text.clone();
                    self.index += 1;
                    if !self.match_kind(IfTokKind::RParen) {
                        return Err(fail_expr("HC1014", "expected ')' after defined(name)"));
                    }
                } else {
                    if self.peek().kind != IfTokKind::Identifier {
                        return Err(fail_expr("HC1015", "expected identifier after defined"));
                    }
                    target = self.peek().text.clone();
                    self.index += 1;
                }
                return Ok(if self.pp.macros.contains_key(&target) { 1 } else { 0 });
            }

            return self.identifier_value(&name);
        }

        Err(fail_expr("HC1016", "malformed #if expression"))
    }

    fn parse_unary(&mut self) -> Result<i64, Diagnostic> {
        if self.match_op("!") {
            return Ok(if self.parse_unary()? == 0 { 1 } else { 0 });
        }
        if self.match_op("+") {
            return self.parse_unary();
        }
        if self.match_op("-") {
            return Ok(self.parse_unary()?.wrapping_neg());
        }
        if self.match_op("~") {
            return Ok(!self.parse_unary()?);
        }
        self.parse_primary()
    }

    fn div_zero(&self) -> Result<i64, Diagnostic> {
        if self.pp.diagnose_div_zero {
            Err(fail_expr("HC1011", "division or modulo by zero in #if expression"))
        } else {
            Ok(0)
        }
    }

    fn parse_mul(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_unary()?;
        loop {
            if self.match_op("*") {
                value = value.wrapping_mul(self.parse_unary()?);
                continue;
            }
            if self.match_op("/") {
                let rhs = self.parse_unary()?;
                if rhs == 0 {
                    return self.div_zero();
                }
                value = value.wrapping_div(rhs);
                continue;
            }
            if self.match_op("%") {
                let rhs = self.parse_unary()?;
                if rhs == 0 {
                    return self.div_zero();
                }
                value = value.wrapping_rem(rhs);
                continue;
            }
            break;
        }
        Ok(value)
    }

    fn parse_add(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_mul()?;
        loop {
            if self.match_op("+") {
                value = value.wrapping_add(self.parse_mul()?);
                continue;
            }
            if self.match_op("-") {
                value = value.wrapping_sub(self.parse_mul()?);
                continue;
            }
            break;
        }
        Ok(value)
    }

    fn parse_shift(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_add()?;
        loop {
            if self.match_op("<<") {
                value = value.wrapping_shl(self.parse_add()? as u32);
                continue;
            }
            if self.match_op(">>") {
                value = value.wrapping_shr(self.parse_add()? as u32);
                continue;
            }
            break;
        }
        Ok(value)
    }

    fn parse_relational(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_shift()?;
        loop {
            if self.match_op("<") {
                value = i64::from(value < self.parse_shift()?);
                continue;
            }
            if self.match_op(">") {
                value = i64::from(value > self.parse_shift()?);
                continue;
            }
            if self.match_op("<=") {
                value = i64::from(value <= self.parse_shift()?);
                continue;
            }
            if self.match_op(">=") {
                value = i64::from(value >= self.parse_shift()?);
                continue;
            }
            break;
        }
        Ok(value)
    }

    fn parse_equality(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_relational()?;
        loop {
            if self.match_op("==") {
                value = i64::from(value == self.parse_relational()?);
                continue;
            }
            if self.match_op("!=") {
                value = i64::from(value != self.parse_relational()?);
                continue;
            }
            break;
        }
        Ok(value)
    }

    fn parse_bitand(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_equality()?;
        while self.match_op("&") {
            value &= self.parse_equality()?;
        }
        Ok(value)
    }

    fn parse_bitxor(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_bitand()?;
        while self.match_op("^") {
            value ^= self.parse_bitand()?;
        }
        Ok(value)
    }

    fn parse_bitor(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_bitxor()?;
        while self.match_op("|") {
            value |= self.parse_bitxor()?;
        }
        Ok(value)
    }

    fn parse_logical_and(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_bitor()?;
        while self.match_op("&&") {
            let rhs = self.parse_bitor()?;
            value = i64::from(value != 0 && rhs != 0);
        }
        Ok(value)
    }

    fn parse_logical_or(&mut self) -> Result<i64, Diagnostic> {
        let mut value = self.parse_logical_and()?;
        while self.match_op("||") {
            let rhs = self.parse_logical_and()?;
            value = i64::from(value != 0 || rhs != 0);
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Macro invocation helpers
// ---------------------------------------------------------------------------

/// Parse the argument list of a function-like macro call. Arguments balance
/// parentheses and honor string/char literals; returns the arguments and the
/// index of the closing paren.
fn parse_macro_call_args(
    text: &str,
    open_paren: usize,
    file: &str,
    line_no: u32,
) -> Result<(Vec<String>, usize), Diagnostic> {
    let bytes = text.as_bytes();
    if open_paren >= bytes.len() || bytes[open_paren] != b'(' {
        return Err(fail("HC1033", file, line_no, "internal macro call parse error"));
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 1i32;
    let mut saw_any = false;
    let mut i = open_paren + 1;
    while i < bytes.len() {
        let c = bytes[i];

        if c == b'"' || c == b'\'' {
            saw_any = true;
            let quote = c;
            current.push(c as char);
            i += 1;
            while i < bytes.len() {
                let qc = bytes[i];
                current.push(qc as char);
                i += 1;
                if qc == b'\\' && i < bytes.len() {
                    current.push(bytes[i] as char);
                    i += 1;
                    continue;
                }
                if qc == quote {
                    break;
                }
            }
            continue;
        }

        if c == b'(' {
            saw_any = true;
            depth += 1;
            current.push('(');
            i += 1;
            continue;
        }
        if c == b')' {
            depth -= 1;
            if depth == 0 {
                let trimmed = current.trim().to_string();
                if saw_any {
                    args.push(trimmed);
                }
                return Ok((args, i));
            }
            current.push(')');
            i += 1;
            continue;
        }
        if c == b',' && depth == 1 {
            args.push(current.trim().to_string());
            current.clear();
            saw_any = true;
            i += 1;
            continue;
        }

        if !c.is_ascii_whitespace() {
            saw_any = true;
        }
        current.push(c as char);
        i += 1;
    }

    Err(fail("HC1034", file, line_no, "unterminated macro invocation"))
}

/// Walk the macro body, replacing identifier tokens that match a parameter;
/// strings and chars pass through verbatim.
fn substitute_macro_params(def: &MacroDef, args: &[String]) -> String {
    let param_map: HashMap<&str, &str> = def
        .params
        .iter()
        .zip(args.iter())
        .map(|(p, a)| (p.as_str(), a.as_str()))
        .collect();

    let bytes = def.body.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' || c == b'\'' {
            let quote = c;
            out.push(c as char);
            i += 1;
            while i < bytes.len() {
                let qc = bytes[i];
                out.push(qc as char);
                i += 1;
                if qc == b'\\' && i < bytes.len() {
                    out.push(bytes[i] as char);
                    i += 1;
                    continue;
                }
                if qc == quote {
                    break;
                }
            }
            continue;
        }

        if is_ident_start(c) {
            let mut j = i + 1;
            while j < bytes.len() && is_ident_continue(bytes[j]) {
                j += 1;
            }
            let ident = &def.body[i..j];
            match param_map.get(ident) {
                Some(arg) => out.push_str(arg),
                None => out.push_str(ident),
            }
            i = j;
            continue;
        }

        out.push(c as char);
        i += 1;
    }

    out
}

// ---------------------------------------------------------------------------
// #exe mini-interpreter
// ---------------------------------------------------------------------------

struct ExeInterp<'a> {
    pp: &'a Preprocessor,
    source: &'a str,
    pos: usize,
    file: &'a str,
    line_no: u32,
}

impl ExeInterp<'_> {
    fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn skip_ws(&mut self) {
        while !self.at_end() && self.bytes()[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn fail(&self, code: &str, message: impl Into<String>) -> Diagnostic {
        fail(code, self.file, self.line_no, message)
    }

    fn parse_identifier(&mut self) -> Result<String, Diagnostic> {
        self.skip_ws();
        if self.at_end() || !is_ident_start(self.bytes()[self.pos]) {
            return Err(self.fail("HC1020", "expected identifier in #exe block"));
        }
        let begin = self.pos;
        self.pos += 1;
        while !self.at_end() && is_ident_continue(self.bytes()[self.pos]) {
            self.pos += 1;
        }
        Ok(self.source[begin..self.pos].to_string())
    }

    fn parse_balanced(&mut self, open: u8, close: u8, context: &str) -> Result<String, Diagnostic> {
        self.skip_ws();
        if self.at_end() || self.bytes()[self.pos] != open {
            return Err(
                self.fail("HC1020", format!("expected '{}' for {context}", open as char))
            );
        }
        self.pos += 1;
        let mut inner = String::new();
        let mut depth = 1i32;
        while !self.at_end() {
            let c = self.bytes()[self.pos];
            self.pos += 1;
            if c == b'"' || c == b'\'' {
                inner.push(c as char);
                let quote = c;
                while !self.at_end() {
                    let qc = self.bytes()[self.pos];
                    self.pos += 1;
                    inner.push(qc as char);
                    if qc == b'\\' && !self.at_end() {
                        inner.push(self.bytes()[self.pos] as char);
                        self.pos += 1;
                        continue;
                    }
                    if qc == quote {
                        break;
                    }
                }
                continue;
            }
            if c == open {
                depth += 1;
                inner.push(c as char);
                continue;
            }
            if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
                inner.push(c as char);
                continue;
            }
            inner.push(c as char);
        }
        Err(self.fail("HC1020", format!("unterminated {context} in #exe block")))
    }

    fn split_args(&self, payload: &str) -> Result<Vec<String>, Diagnostic> {
        let bytes = payload.as_bytes();
        let mut args = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0i32;
        let mut bracket_depth = 0i32;
        let mut brace_depth = 0i32;
        let mut saw_token = false;
        let mut i = 0usize;
        while i < bytes.len() {
            let c = bytes[i];
            if c == b'"' || c == b'\'' {
                saw_token = true;
                let quote = c;
                current.push(c as char);
                i += 1;
                while i < bytes.len() {
                    let qc = bytes[i];
                    current.push(qc as char);
                    if qc == b'\\' && i + 1 < bytes.len() {
                        i += 1;
                        current.push(bytes[i] as char);
                    } else if qc == quote {
                        break;
                    }
                    i += 1;
                }
                i += 1;
                continue;
            }
            match c {
                b'(' => {
                    paren_depth += 1;
                    saw_token = true;
                    current.push('(');
                }
                b')' => {
                    paren_depth -= 1;
                    saw_token = true;
                    current.push(')');
                }
                b'[' => {
                    bracket_depth += 1;
                    saw_token = true;
                    current.push('[');
                }
                b']' => {
                    bracket_depth -= 1;
                    saw_token = true;
                    current.push(']');
                }
                b'{' => {
                    brace_depth += 1;
                    saw_token = true;
                    current.push('{');
                }
                b'}' => {
                    brace_depth -= 1;
                    saw_token = true;
                    current.push('}');
                }
                b',' if paren_depth == 0 && bracket_depth == 0 && brace_depth == 0 => {
                    let trimmed = current.trim().to_string();
                    if trimmed.is_empty() {
                        return Err(self.fail("HC1020", "empty argument in #exe call"));
                    }
                    args.push(trimmed);
                    current.clear();
                    saw_token = false;
                    i += 1;
                    continue;
                }
                _ => {
                    if !c.is_ascii_whitespace() {
                        saw_token = true;
                    }
                    current.push(c as char);
                }
            }
            i += 1;
        }
        let tail = current.trim().to_string();
        if !tail.is_empty() {
            args.push(tail);
        } else if saw_token {
            return Err(self.fail("HC1020", "empty trailing argument in #exe call"));
        }
        Ok(args)
    }

    fn evaluate_stream_arg(&self, arg: &str) -> Result<String, Diagnostic> {
        let mut active = HashSet::new();
        let expanded = self
            .pp
            .expand_text(arg, self.file, self.line_no, &mut active)?
            .trim()
            .to_string();
        if expanded.is_empty() {
            return Ok(String::new());
        }
        if let Some(concatenated) = parse_concatenated_string_literals(&expanded) {
            return Ok(concatenated);
        }
        Ok(expanded)
    }

    fn evaluate_condition(&self, condition: &str) -> Result<bool, Diagnostic> {
        let mut active = HashSet::new();
        let expanded = self.pp.expand_text(condition, self.file, self.line_no, &mut active)?;
        Ok(self.pp.eval_if_expr_value(&expanded, 0)? != 0)
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        if !self.source[self.pos..].starts_with(keyword) {
            return false;
        }
        let next = self.pos + keyword.len();
        if next < self.source.len() && is_ident_continue(self.bytes()[next]) {
            return false;
        }
        self.pos = next;
        true
    }

    fn parse_block(&mut self, execute: bool, output: &mut String) -> Result<(), Diagnostic> {
        self.skip_ws();
        if self.at_end() || self.bytes()[self.pos] != b'{' {
            return Err(self.fail("HC1018", "#exe requires a braced block body"));
        }
        self.pos += 1;
        loop {
            self.skip_ws();
            if self.at_end() {
                return Err(self.fail("HC1018", "unterminated #exe block"));
            }
            if self.bytes()[self.pos] == b'}' {
                self.pos += 1;
                return Ok(());
            }
            self.parse_stmt(execute, output)?;
        }
    }

    fn parse_stmt(&mut self, execute: bool, output: &mut String) -> Result<(), Diagnostic> {
        self.skip_ws();
        if self.at_end() {
            return Err(self.fail("HC1018", "unterminated #exe block"));
        }

        if self.bytes()[self.pos] == b';' {
            self.pos += 1;
            return Ok(());
        }
        if self.bytes()[self.pos] == b'{' {
            return self.parse_block(execute, output);
        }

        if self.match_keyword("if") {
            let condition = self.parse_balanced(b'(', b')', "if condition")?;
            let condition_true = if execute { self.evaluate_condition(&condition)? } else { false };
            self.parse_stmt(execute && condition_true, output)?;
            if self.match_keyword("else") {
                self.parse_stmt(execute && !condition_true, output)?;
            }
            return Ok(());
        }

        let callee = self.parse_identifier()?;
        let payload = self.parse_balanced(b'(', b')', "call arguments")?;
        let args = self.split_args(&payload)?;
        self.skip_ws();
        if self.at_end() || self.bytes()[self.pos] != b';' {
            return Err(self.fail("HC1024", "#exe call must end with ';'"));
        }
        self.pos += 1;
        if !execute {
            return Ok(());
        }

        match callee.as_str() {
            "StreamPrint" | "StreamDoc" | "StreamExePrint" => {
                if args.len() != 1 {
                    return Err(self.fail(
                        "HC1025",
                        format!("{callee} in #exe currently supports a single argument"),
                    ));
                }
                output.push_str(&self.evaluate_stream_arg(&args[0])?);
                Ok(())
            }
            "Option" | "Cd" => Ok(()),
            _ => Err(self.fail("HC1019", format!("unsupported #exe call: {callee}"))),
        }
    }
}

/// Parse `"a" "b"` into `ab` with backslash escapes decoded; `None` when the
/// text is not purely a sequence of string literals.
fn parse_concatenated_string_literals(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    let mut saw_literal = false;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    while i < bytes.len() && bytes[i] == b'"' {
        saw_literal = true;
        i += 1;
        let mut raw = String::new();
        while i < bytes.len() {
            let c = bytes[i];
            i += 1;
            if c == b'\\' && i < bytes.len() {
                raw.push('\\');
                raw.push(bytes[i] as char);
                i += 1;
                continue;
            }
            if c == b'"' {
                break;
            }
            raw.push(c as char);
        }
        out.push_str(&unescape(&raw));
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
    }

    if saw_literal && i == bytes.len() {
        Some(out)
    } else {
        None
    }
}

fn unescape(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c != b'\\' || i + 1 >= bytes.len() {
            out.push(c as char);
            i += 1;
            continue;
        }
        i += 1;
        match bytes[i] {
            b'n' => out.push('\n'),
            b't' => out.push('\t'),
            b'\\' => out.push('\\'),
            b'"' => out.push('"'),
            other => out.push(other as char),
        }
        i += 1;
    }
    out
}

fn extract_quoted(
    text: &str,
    file: &str,
    line_no: u32,
    directive: &str,
) -> Result<String, Diagnostic> {
    let first = text.find('"');
    let last = text.rfind('"');
    match (first, last) {
        (Some(first), Some(last)) if first != last => Ok(text[first + 1..last].to_string()),
        _ => Err(fail("HC1022", file, line_no, format!("{directive} expects quoted path"))
            .with_help(format!("use {directive} \"relative/path\""))),
    }
}

fn is_exe_directive_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("#exe") else {
        return false;
    };
    match rest.bytes().next() {
        None => true,
        Some(c) => c.is_ascii_whitespace() || c == b'{',
    }
}

fn has_closed_exe_body(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return false;
    }
    let mut i = 4usize;
    let mut saw_open = false;
    let mut depth = 0i32;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c == b'"' || c == b'\'' {
            let quote = c;
            while i < bytes.len() {
                let qc = bytes[i];
                i += 1;
                if qc == b'\\' && i < bytes.len() {
                    i += 1;
                    continue;
                }
                if qc == quote {
                    break;
                }
            }
            continue;
        }
        if c == b'{' {
            saw_open = true;
            depth += 1;
            continue;
        }
        if c == b'}' && depth > 0 {
            depth -= 1;
        }
    }
    saw_open && depth == 0
}

fn push_cond(cond: &mut Vec<CondFrame>, condition_true: bool) {
    let parent_active = is_active(cond);
    cond.push(CondFrame {
        parent_active,
        branch_taken: condition_true,
        current_active: parent_active && condition_true,
    });
}

fn is_active(cond: &[CondFrame]) -> bool {
    cond.last().map_or(true, |top| top.current_active)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Parse an integer literal with C base rules (`0x…`, leading-`0` octal,
/// decimal), falling back through unsigned range. Shared with switch-case
/// and IR-literal parsing.
pub fn parse_int_base0(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or(digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(bin) = digits.strip_prefix("0b").or(digits.strip_prefix("0B")) {
        (2, bin)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if digits.is_empty() {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    let signed = magnitude as i64;
    Some(if negative { signed.wrapping_neg() } else { signed })
}

fn dirname(path: &str) -> String {
    match path.rfind(['/', '\\']) {
        None => ".".to_string(),
        Some(0) => path[..1].to_string(),
        Some(slash) => path[..slash].to_string(),
    }
}

fn join_path(base: &str, leaf: &str) -> String {
    if leaf.is_empty() {
        return base.to_string();
    }
    if leaf.starts_with('/') || leaf.starts_with('\\') {
        return leaf.to_string();
    }
    if base.is_empty() || base == "." {
        return leaf.to_string();
    }
    if base.ends_with('/') || base.ends_with('\\') {
        return format!("{base}{leaf}");
    }
    format!("{base}/{leaf}")
}

fn canonical_path(path: &str) -> String {
    std::fs::canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(source: &str) -> Result<String, Diagnostic> {
        run_preprocessor(source, "test.hc", &PreprocessorOptions::new(ExecutionMode::Jit))
    }

    #[test]
    fn plain_source_is_unchanged() {
        let source = "I64 Main() {\n  return 0;\n}\n";
        assert_eq!(pp(source).unwrap(), source);
    }

    #[test]
    fn object_macro_expands_outside_strings() {
        let out = pp("#define N 3\nI64 x = N; \"N\";\n").unwrap();
        assert_eq!(out, "I64 x = 3; \"N\";\n");
    }

    #[test]
    fn function_macro_with_nested_args() {
        let out = pp("#define ADD(a, b) (a + b)\nI64 x = ADD(f(1, 2), 3);\n").unwrap();
        assert_eq!(out, "I64 x = (f(1, 2) + 3);\n");
    }

    #[test]
    fn function_macro_arity_mismatch() {
        let err = pp("#define ADD(a, b) (a + b)\nI64 x = ADD(1);\n").unwrap_err();
        assert_eq!(err.code, "HC1032");
    }

    #[test]
    fn self_referencing_macro_does_not_recurse() {
        let out = pp("#define X X + 1\nI64 y = X;\n").unwrap();
        assert_eq!(out, "I64 y = X + 1;\n");
    }

    #[test]
    fn conditional_arms() {
        let out = pp("#if 0\nA\n#elif 1\nB\n#else\nC\n#endif\n").unwrap();
        assert_eq!(out, "B\n");
    }

    #[test]
    fn mode_gates() {
        let jit = pp("#ifjit\nJ\n#endif\n#ifaot\nA\n#endif\n").unwrap();
        assert_eq!(jit, "J\n");
        let aot = run_preprocessor(
            "#ifjit\nJ\n#endif\n#ifaot\nA\n#endif\n",
            "test.hc",
            &PreprocessorOptions::new(ExecutionMode::Aot),
        )
        .unwrap();
        assert_eq!(aot, "A\n");
    }

    #[test]
    fn if_arithmetic_matches_twos_complement() {
        let cases: &[(&str, bool)] = &[
            ("1 + 2 * 3 == 7", true),
            ("(1 + 2) * 3 == 9", true),
            ("1 << 4 == 16", true),
            ("-1 < 0", true),
            ("~0 == -1", true),
            ("7 / 2 == 3 && 7 % 2 == 1", true),
            ("defined(FOO)", false),
            ("UNDEFINED_NAME == 0", true),
            ("TRUE && !FALSE", true),
        ];
        for (expr, expected) in cases {
            let source = format!("#if {expr}\nyes\n#endif\n");
            let out = pp(&source).unwrap();
            assert_eq!(!out.is_empty(), *expected, "expr: {expr}");
        }
    }

    #[test]
    fn division_by_zero_defaults_to_zero() {
        let out = pp("#if 1 / 0\nyes\n#else\nno\n#endif\n").unwrap();
        assert_eq!(out, "no\n");
    }

    #[test]
    fn division_by_zero_diagnosed_when_enabled() {
        let mut options = PreprocessorOptions::new(ExecutionMode::Jit);
        options.diagnose_div_zero = true;
        let err = run_preprocessor("#if 1 / 0\nyes\n#endif\n", "test.hc", &options).unwrap_err();
        assert_eq!(err.code, "HC1011");
    }

    #[test]
    fn assert_directive() {
        assert!(pp("#assert 1 + 1 == 2\n").is_ok());
        let err = pp("#assert 0\n").unwrap_err();
        assert_eq!(err.code, "HC1008");
    }

    #[test]
    fn builtin_expansions_are_deterministic() {
        let out = pp("U8 *d = __DATE__; U8 *t = __TIME__; I64 l = __LINE__;\n").unwrap();
        assert_eq!(out, "U8 *d = \"1970-01-01\"; U8 *t = \"00:00:00\"; I64 l = 1;\n");
    }

    #[test]
    fn exe_stream_print() {
        let out = pp("#exe { StreamPrint(\"I64 v = 7;\\n\"); }\n").unwrap();
        assert_eq!(out, "I64 v = 7;\n");
    }

    #[test]
    fn exe_if_else() {
        let out =
            pp("#exe { if (1) StreamPrint(\"a\"); else StreamPrint(\"b\"); Option(1, 2); }\n")
                .unwrap();
        assert_eq!(out, "a");
    }

    #[test]
    fn exe_rejects_unknown_call() {
        let err = pp("#exe { Mystery(1); }\n").unwrap_err();
        assert_eq!(err.code, "HC1019");
    }

    #[test]
    fn exe_multiline_body() {
        let out = pp("#exe {\n  StreamPrint(\"x\");\n}\n").unwrap();
        assert_eq!(out, "x");
    }

    #[test]
    fn unsupported_directive() {
        let err = pp("#pragma once\n").unwrap_err();
        assert_eq!(err.code, "HC1009");
    }

    #[test]
    fn missing_endif() {
        let err = pp("#if 1\nX\n").unwrap_err();
        assert_eq!(err.code, "HC1002");
    }

    #[test]
    fn int_literal_bases() {
        assert_eq!(parse_int_base0("0x10"), Some(16));
        assert_eq!(parse_int_base0("010"), Some(8));
        assert_eq!(parse_int_base0("10"), Some(10));
        assert_eq!(parse_int_base0("-5"), Some(-5));
        assert_eq!(parse_int_base0("0b101"), Some(5));
        assert_eq!(parse_int_base0("12u"), None);
    }
}
