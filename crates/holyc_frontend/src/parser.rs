//! Recursive-descent HolyC parser.
//!
//! Single-token lookahead plus a handful of bounded forward scans that
//! disambiguate the C-family ambiguities: function declarations vs
//! statements, variable declarations vs expressions, and cast expressions vs
//! parenthesized operands. The output is an untyped [`Node`] tree.

use crate::ast::{Node, NodeKind};
use crate::diagnostics::Diagnostic;
use crate::lexer::{Lexer, Token, TokenKind};

type ParseResult<T> = Result<T, Diagnostic>;

const ASSIGN_OPS: &[&str] = &["=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>="];

const BUILTIN_TYPES: &[&str] =
    &["U0", "I8", "U8", "I16", "U16", "I32", "U32", "I64", "U64", "F64", "Bool"];

const DECL_MODIFIERS: &[&str] = &[
    "extern", "import", "_extern", "_import", "export", "_export", "public", "interrupt", "noreg",
    "reg", "no_warn", "static",
];

const LINKAGE_KEYWORDS: &[&str] = &["extern", "import", "_extern", "_import", "export", "_export"];

const LANE_SELECTORS: &[&str] = &[
    "i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "I8", "U8", "I16", "U16", "I32", "U32",
    "I64", "U64",
];

/// Lex and parse a full translation unit.
pub fn parse(source: &str, filename: &str) -> ParseResult<Node> {
    let tokens = Lexer::new(source, filename).tokenize()?;
    Parser::new(tokens, filename).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    filename: String,
    idx: usize,
    anon_aggregate_counter: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Parser { tokens, filename: filename.to_string(), idx: 0, anon_aggregate_counter: 0 }
    }

    pub fn parse_program(&mut self) -> ParseResult<Node> {
        let mut program = Node::new(NodeKind::Program, self.filename.clone());
        while !self.is_end() {
            let item = self.parse_top_level()?;
            program.children.push(item);
        }
        Ok(program)
    }

    fn is_end(&self) -> bool {
        self.peek(0).kind == TokenKind::End
    }

    fn peek(&self, offset: usize) -> &Token {
        let want = self.idx + offset;
        if want >= self.tokens.len() {
            self.tokens.last().expect("token stream always ends with End")
        } else {
            &self.tokens[want]
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.peek(0).clone();
        if !self.is_end() {
            self.idx += 1;
        }
        token
    }

    fn matches(&mut self, text: &str) -> bool {
        if self.peek(0).text == text {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, text: &str) -> ParseResult<Token> {
        if self.peek(0).text != text {
            return Err(self.token_error(self.peek(0).clone(), &format!("expected '{text}'")));
        }
        Ok(self.advance())
    }

    fn token_error(&self, token: Token, message: &str) -> Diagnostic {
        Diagnostic::error("HC2100", &self.filename, token.line, token.column, message)
    }

    fn parse_top_level(&mut self) -> ParseResult<Node> {
        if self.looks_like_function_decl() {
            return self.parse_function_decl();
        }
        self.parse_statement()
    }

    /// A top-level item is a function declaration when a prefix of
    /// type/modifier tokens followed by an identifier immediately precedes a
    /// balanced `(...)` that terminates in `{` or `;`.
    fn looks_like_function_decl(&self) -> bool {
        if self.is_end() {
            return false;
        }

        let mut i = self.idx;
        let mut saw_type = false;
        let mut saw_name = false;

        while i < self.tokens.len() {
            let t = &self.tokens[i];
            if t.kind == TokenKind::Keyword {
                saw_type = true;
                i += 1;
                continue;
            }
            if t.kind == TokenKind::Identifier {
                if !saw_type {
                    saw_type = true;
                    i += 1;
                    continue;
                }
                saw_name = true;
                i += 1;
                break;
            }
            if t.text == "*" || t.text == "&" {
                i += 1;
                continue;
            }
            return false;
        }

        if !saw_type || !saw_name || i >= self.tokens.len() || self.tokens[i].text != "(" {
            return false;
        }

        let mut depth = 0i32;
        while i < self.tokens.len() {
            if self.tokens[i].text == "(" {
                depth += 1;
            } else if self.tokens[i].text == ")" {
                depth -= 1;
                if depth == 0 {
                    i += 1;
                    break;
                }
            }
            i += 1;
        }

        if i >= self.tokens.len() {
            return false;
        }
        self.tokens[i].text == "{" || self.tokens[i].text == ";"
    }

    fn parse_function_decl(&mut self) -> ParseResult<Node> {
        let start = self.peek(0).clone();
        let mut sig = Vec::new();
        while self.peek(0).kind != TokenKind::End && self.peek(0).text != "(" {
            sig.push(self.advance().text);
        }
        if sig.is_empty() {
            return Err(self.token_error(self.peek(0).clone(), "expected function signature"));
        }

        let mut fn_node = Node::at(NodeKind::FunctionDecl, sig.join(" "), start.line, start.column);
        self.expect("(")?;
        fn_node.children.push(self.parse_param_list()?);
        self.expect(")")?;

        if self.matches(";") {
            attach_decl_parts(&mut fn_node, &sig);
            return Ok(fn_node);
        }

        fn_node.children.push(self.parse_block()?);
        attach_decl_parts(&mut fn_node, &sig);
        Ok(fn_node)
    }

    fn parse_param_list(&mut self) -> ParseResult<Node> {
        let mut params = Node::new(NodeKind::ParamList, "");

        if self.peek(0).text == ")" {
            return Ok(params);
        }

        while !self.is_end() {
            if self.peek(0).text == ")" {
                break;
            }

            let mut left: Vec<String> = Vec::new();
            let mut right: Vec<Token> = Vec::new();
            let mut has_default = false;
            let mut nested = 0i32;

            while !self.is_end() {
                let text = self.peek(0).text.clone();
                if text == "(" || text == "[" || text == "{" {
                    nested += 1;
                    left.push(self.advance().text);
                    continue;
                }
                if text == ")" || text == "]" || text == "}" {
                    if nested == 0 && text == ")" {
                        break;
                    }
                    if nested > 0 {
                        nested -= 1;
                    }
                    left.push(self.advance().text);
                    continue;
                }
                if nested == 0 && text == "," {
                    break;
                }
                if nested == 0 && text == "=" {
                    has_default = true;
                    self.advance();
                    break;
                }
                left.push(self.advance().text);
            }

            nested = 0;
            while has_default && !self.is_end() {
                let text = self.peek(0).text.clone();
                if text == "(" || text == "[" || text == "{" {
                    nested += 1;
                    right.push(self.advance());
                    continue;
                }
                if text == ")" || text == "]" || text == "}" {
                    if nested == 0 && text == ")" {
                        break;
                    }
                    if nested > 0 {
                        nested -= 1;
                    }
                    right.push(self.advance());
                    continue;
                }
                if nested == 0 && text == "," {
                    break;
                }
                right.push(self.advance());
            }

            let mut param = Node::new(NodeKind::Param, left.join(" "));
            attach_decl_parts(&mut param, &left);
            if has_default {
                if right.is_empty() {
                    return Err(self
                        .token_error(self.peek(0).clone(), "expected default argument expression"));
                }
                let joined: Vec<String> = right.iter().map(|t| t.text.clone()).collect();
                let default_expr = self.parse_expression_from_tokens(right)?;
                let mut default_node = Node::new(NodeKind::DefaultArg, joined.join(" "));
                default_node.children.push(default_expr);
                param.children.push(default_node);
            }
            params.children.push(param);

            if !self.matches(",") {
                break;
            }
        }

        Ok(params)
    }

    fn parse_block(&mut self) -> ParseResult<Node> {
        let mut block = Node::new(NodeKind::Block, "");
        self.expect("{")?;
        while !self.is_end() && self.peek(0).text != "}" {
            let stmt = self.parse_statement()?;
            block.children.push(stmt);
        }
        self.expect("}")?;
        Ok(block)
    }

    fn parse_statement(&mut self) -> ParseResult<Node> {
        let start = self.peek(0).clone();

        if start.text == "{" {
            return self.parse_block();
        }

        if self.matches(";") {
            return Ok(Node::new(NodeKind::EmptyStmt, ""));
        }

        if self.matches("typedef") {
            return self.parse_type_alias_decl();
        }

        if LINKAGE_KEYWORDS.contains(&self.peek(0).text.as_str()) {
            return self.parse_linkage_decl();
        }

        if self.looks_like_var_decl() {
            return self.parse_var_decl();
        }

        if self.matches("switch") {
            return self.parse_switch();
        }

        if self.matches("case") {
            return self.parse_case();
        }

        if self.matches("default") {
            let mut node = Node::at(NodeKind::DefaultClause, "", start.line, start.column);
            self.expect(":")?;
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        if self.matches("start") {
            self.expect(":")?;
            return Ok(Node::at(NodeKind::StartLabel, "start", start.line, start.column));
        }

        if self.matches("end") {
            self.expect(":")?;
            return Ok(Node::at(NodeKind::EndLabel, "end", start.line, start.column));
        }

        if self.matches("if") {
            let mut node = Node::at(NodeKind::If, "", start.line, start.column);
            self.expect("(")?;
            node.children.push(self.parse_expression()?);
            self.expect(")")?;
            node.children.push(self.parse_statement()?);
            if self.matches("else") {
                node.children.push(self.parse_statement()?);
            }
            return Ok(node);
        }

        if self.matches("for") {
            let mut node = Node::at(NodeKind::For, "", start.line, start.column);
            self.expect("(")?;
            if self.peek(0).text != ";" {
                node.children.push(self.parse_expression()?);
            } else {
                node.children.push(Node::new(NodeKind::ForInit, ""));
            }
            self.expect(";")?;
            if self.peek(0).text != ";" {
                node.children.push(self.parse_expression()?);
            } else {
                node.children.push(Node::new(NodeKind::ForCond, ""));
            }
            self.expect(";")?;
            if self.peek(0).text != ")" {
                node.children.push(self.parse_expression()?);
            } else {
                node.children.push(Node::new(NodeKind::ForInc, ""));
            }
            self.expect(")")?;
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        if self.matches("while") {
            let mut node = Node::at(NodeKind::While, "", start.line, start.column);
            self.expect("(")?;
            node.children.push(self.parse_expression()?);
            self.expect(")")?;
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        if self.matches("do") {
            let mut node = Node::at(NodeKind::DoWhile, "", start.line, start.column);
            node.children.push(self.parse_statement()?);
            self.expect("while")?;
            self.expect("(")?;
            node.children.push(self.parse_expression()?);
            self.expect(")")?;
            self.expect(";")?;
            return Ok(node);
        }

        if self.matches("return") {
            let mut node = Node::at(NodeKind::Return, "", start.line, start.column);
            if !self.matches(";") {
                node.children.push(self.parse_expression()?);
                self.expect(";")?;
            }
            return Ok(node);
        }

        if self.matches("break") {
            self.expect(";")?;
            return Ok(Node::at(NodeKind::Break, "", start.line, start.column));
        }

        if self.peek(0).text == "continue" {
            return Err(
                self.token_error(self.peek(0).clone(), "HolyC has no continue; use goto")
            );
        }

        if self.matches("goto") {
            let target = self.advance().text;
            self.expect(";")?;
            return Ok(Node::at(NodeKind::Goto, target, start.line, start.column));
        }

        if self.matches("try") {
            let mut node = Node::at(NodeKind::Try, "", start.line, start.column);
            node.children.push(self.parse_statement()?);
            self.expect("catch")?;
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        if self.matches("throw") {
            let mut node = Node::at(NodeKind::Throw, "", start.line, start.column);
            self.expect("(")?;
            node.children.push(self.parse_expression()?);
            self.expect(")")?;
            self.expect(";")?;
            return Ok(node);
        }

        if self.matches("lock") {
            let mut node = Node::at(NodeKind::Lock, "", start.line, start.column);
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        if self.matches("asm") {
            return self.parse_inline_asm(start.line, start.column);
        }

        if self.peek(0).kind == TokenKind::Keyword
            && (self.peek(0).text == "class" || self.peek(0).text == "union")
        {
            return self.parse_class_decl();
        }

        if self.peek(0).kind == TokenKind::String || self.peek(0).kind == TokenKind::Char {
            return self.parse_print_stmt(start.line, start.column);
        }

        if self.peek(0).kind == TokenKind::Identifier && self.peek(1).text == ":" {
            let label = self.advance().text;
            self.expect(":")?;
            let mut node = Node::at(NodeKind::Label, label, start.line, start.column);
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        let mut stmt = Node::at(NodeKind::ExprStmt, "", start.line, start.column);
        stmt.children.push(self.parse_expression()?);
        self.expect(";")?;
        Ok(stmt)
    }

    fn parse_print_stmt(&mut self, line: u32, column: u32) -> ParseResult<Node> {
        let mut stmt = Node::at(NodeKind::PrintStmt, "", line, column);
        stmt.children.push(self.parse_assign()?);
        if self.peek(0).text != ";" && self.peek(0).text != "," {
            // HolyC permits an implicit second print expression after the
            // first literal, e.g. `"" fmt,*arg;` for dynamic forwarding.
            stmt.children.push(self.parse_assign()?);
        }
        while self.matches(",") {
            stmt.children.push(self.parse_assign()?);
        }
        self.expect(";")?;
        Ok(stmt)
    }

    fn parse_class_decl(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let mut node = Node::at(NodeKind::ClassDecl, keyword.text, keyword.line, keyword.column);
        if self.peek(0).kind == TokenKind::Identifier {
            node.text.push(' ');
            node.text.push_str(&self.advance().text);
        }

        if self.matches("{") {
            while !self.is_end() && self.peek(0).text != "}" {
                if self.peek(0).kind == TokenKind::Keyword
                    && (self.peek(0).text == "class" || self.peek(0).text == "union")
                {
                    let nested = self.parse_class_decl()?;
                    node.children.push(nested);
                    continue;
                }

                if self.matches("typedef") {
                    let alias = self.parse_type_alias_decl()?;
                    node.children.push(alias);
                    continue;
                }

                if self.matches(";") {
                    continue;
                }

                let mut field_tokens = Vec::new();
                let mut nested = 0i32;
                while !self.is_end() {
                    let text = self.peek(0).text.clone();
                    if text == "{" || text == "(" || text == "[" {
                        nested += 1;
                    } else if text == "}" || text == ")" || text == "]" {
                        if nested == 0 && text == "}" {
                            break;
                        }
                        if nested > 0 {
                            nested -= 1;
                        }
                    }
                    if nested == 0 && text == ";" {
                        break;
                    }
                    field_tokens.push(self.advance().text);
                }

                if !field_tokens.is_empty() {
                    node.children.push(build_field_decl_node(&field_tokens));
                }
                self.matches(";");
            }
            self.expect("}")?;
        }

        if !self.matches(";") {
            let mut aggregate_name = extract_aggregate_name(&node.text);
            if aggregate_name.is_empty() {
                self.anon_aggregate_counter += 1;
                aggregate_name = format!("__anon_aggregate_{}", self.anon_aggregate_counter);
                node.text.push(' ');
                node.text.push_str(&aggregate_name);
            }

            while !self.is_end() {
                let mut decl_tokens = Vec::new();
                while !self.is_end()
                    && self.peek(0).text != ";"
                    && self.peek(0).text != ","
                    && self.peek(0).text != "="
                {
                    decl_tokens.push(self.advance().text);
                }
                if decl_tokens.is_empty() {
                    return Err(
                        self.token_error(self.peek(0).clone(), "expected trailing declarator")
                    );
                }

                let mut full_decl_tokens = vec![aggregate_name.clone()];
                full_decl_tokens.extend(decl_tokens);

                let mut trailing = Node::new(NodeKind::VarDecl, full_decl_tokens.join(" "));
                attach_decl_parts(&mut trailing, &full_decl_tokens);
                if self.matches("=") {
                    trailing.children.push(self.parse_assign()?);
                }
                node.children.push(trailing);

                if self.matches(",") {
                    continue;
                }
                self.expect(";")?;
                break;
            }
        }

        Ok(node)
    }

    fn parse_type_alias_decl(&mut self) -> ParseResult<Node> {
        let mut parts = Vec::new();
        while !self.is_end() && self.peek(0).text != ";" {
            parts.push(self.advance().text);
        }
        if parts.len() < 2 {
            return Err(self.token_error(self.peek(0).clone(), "expected typedef declaration"));
        }
        let decl = Node::new(NodeKind::TypeAliasDecl, parts.join(" "));
        self.expect(";")?;
        Ok(decl)
    }

    fn parse_inline_asm(&mut self, line: u32, column: u32) -> ParseResult<Node> {
        let mut stmt = Node::at(NodeKind::Asm, "", line, column);

        if self.matches("{") {
            let mut depth = 1i32;
            let mut body_tokens = Vec::new();
            while !self.is_end() && depth > 0 {
                if self.peek(0).text == "{" {
                    depth += 1;
                } else if self.peek(0).text == "}" {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                }
                body_tokens.push(self.advance().text);
            }
            stmt.text = body_tokens.join(" ");
            self.matches(";");
            return Ok(stmt);
        }

        self.expect("(")?;
        while !self.is_end() && self.peek(0).text != ")" {
            let mut arg_tokens: Vec<Token> = Vec::new();
            let mut nested = 0i32;
            while !self.is_end() {
                let text = self.peek(0).text.clone();
                if text == "(" || text == "[" || text == "{" {
                    nested += 1;
                } else if text == ")" || text == "]" || text == "}" {
                    if nested == 0 && text == ")" {
                        break;
                    }
                    if nested > 0 {
                        nested -= 1;
                    }
                }
                if nested == 0 && text == "," {
                    break;
                }
                arg_tokens.push(self.advance());
            }

            if !arg_tokens.is_empty() {
                let joined: Vec<String> = arg_tokens.iter().map(|t| t.text.clone()).collect();
                let mut arg = Node::new(NodeKind::AsmArg, joined.join(" "));
                arg.children.push(self.parse_expression_from_tokens(arg_tokens)?);
                stmt.children.push(arg);
            }

            if !self.matches(",") {
                break;
            }
        }

        self.expect(")")?;
        self.expect(";")?;
        if let Some(first) = stmt.children.first() {
            stmt.text = first.text.clone();
        }
        Ok(stmt)
    }

    fn parse_linkage_decl(&mut self) -> ParseResult<Node> {
        let keyword = self.advance();
        let mut decl = Node::at(NodeKind::LinkageDecl, keyword.text, keyword.line, keyword.column);

        let mut payload = Vec::new();
        while !self.is_end() && self.peek(0).text != ";" {
            payload.push(self.advance().text);
        }
        if payload.is_empty() {
            return Err(
                self.token_error(self.peek(0).clone(), "expected linkage declaration payload")
            );
        }
        decl.children.push(Node::new(NodeKind::DeclSpec, payload.join(" ")));
        self.expect(";")?;
        Ok(decl)
    }

    fn parse_var_decl(&mut self) -> ParseResult<Node> {
        if self.has_top_level_comma_in_decl() {
            return self.parse_var_decl_list();
        }

        let start = self.peek(0).clone();
        let mut left = Vec::new();
        while !self.is_end() && self.peek(0).text != ";" && self.peek(0).text != "=" {
            left.push(self.advance().text);
        }
        if left.len() < 2 {
            return Err(self.token_error(self.peek(0).clone(), "expected variable declaration"));
        }

        let mut decl = Node::at(NodeKind::VarDecl, left.join(" "), start.line, start.column);
        attach_decl_parts(&mut decl, &left);
        if self.matches("=") {
            decl.children.push(self.parse_expression()?);
        }
        self.expect(";")?;
        Ok(decl)
    }

    fn parse_var_decl_list(&mut self) -> ParseResult<Node> {
        let mut list = Node::new(NodeKind::VarDeclList, "");
        let mut base_tokens: Vec<String> = Vec::new();

        while !self.is_end() {
            let mut decl_tokens = Vec::new();
            while !self.is_end()
                && self.peek(0).text != ";"
                && self.peek(0).text != ","
                && self.peek(0).text != "="
            {
                decl_tokens.push(self.advance().text);
            }

            if decl_tokens.is_empty() {
                return Err(self.token_error(self.peek(0).clone(), "expected variable declarator"));
            }

            let full_decl_tokens = if base_tokens.is_empty() {
                if decl_tokens.len() < 2 {
                    return Err(
                        self.token_error(self.peek(0).clone(), "expected variable declaration")
                    );
                }
                base_tokens = extract_base_decl_tokens_for_list(&decl_tokens);
                decl_tokens
            } else {
                let mut full = base_tokens.clone();
                full.extend(decl_tokens);
                full
            };

            let mut decl = Node::new(NodeKind::VarDecl, full_decl_tokens.join(" "));
            attach_decl_parts(&mut decl, &full_decl_tokens);
            if self.matches("=") {
                // ',' separates declarators here, so the initializer stops at
                // assignment-expression precedence.
                decl.children.push(self.parse_assign()?);
            }
            list.children.push(decl);

            if self.matches(",") {
                continue;
            }
            self.expect(";")?;
            break;
        }

        Ok(list)
    }

    fn has_top_level_comma_in_decl(&self) -> bool {
        let mut depth = 0i32;
        for token in &self.tokens[self.idx..] {
            let text = token.text.as_str();
            if text == "{" || text == "(" || text == "[" {
                depth += 1;
            } else if text == "}" || text == ")" || text == "]" {
                if depth > 0 {
                    depth -= 1;
                }
            }
            if depth == 0 && text == ";" {
                return false;
            }
            if depth == 0 && text == "," {
                return true;
            }
        }
        false
    }

    fn parse_switch(&mut self) -> ParseResult<Node> {
        let mut node = Node::new(NodeKind::Switch, "");
        self.expect("(")?;
        node.children.push(self.parse_expression()?);
        self.expect(")")?;
        node.children.push(self.parse_statement()?);
        Ok(node)
    }

    fn parse_case(&mut self) -> ParseResult<Node> {
        let mut node = Node::new(NodeKind::CaseClause, "");
        if self.matches(":") {
            node.text = "null-case".to_string();
            node.children.push(self.parse_statement()?);
            return Ok(node);
        }

        node.children.push(self.parse_expression()?);
        if self.matches("...") {
            node.text = "range-case".to_string();
            node.children.push(self.parse_expression()?);
        }
        self.expect(":")?;
        node.children.push(self.parse_statement()?);
        Ok(node)
    }

    pub fn parse_expression(&mut self) -> ParseResult<Node> {
        self.parse_comma()
    }

    fn parse_comma(&mut self) -> ParseResult<Node> {
        let mut lhs = self.parse_assign()?;
        while self.matches(",") {
            let rhs = self.parse_assign()?;
            let mut merged = Node::new(NodeKind::Comma, ",");
            merged.children.push(lhs);
            merged.children.push(rhs);
            lhs = merged;
        }
        Ok(lhs)
    }

    fn parse_assign(&mut self) -> ParseResult<Node> {
        let lhs = self.parse_logical_or()?;
        if self.peek(0).text == "?" {
            return Err(self.token_error(self.peek(0).clone(), "HolyC has no ?: operator"));
        }

        if ASSIGN_OPS.contains(&self.peek(0).text.as_str()) {
            let op = self.advance().text;
            let rhs = self.parse_assign()?;
            let mut out = Node::new(NodeKind::Assign, op);
            out.children.push(lhs);
            out.children.push(rhs);
            return Ok(out);
        }
        Ok(lhs)
    }

    fn parse_binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Parser) -> ParseResult<Node>,
    ) -> ParseResult<Node> {
        let mut lhs = next(self)?;
        while ops.contains(&self.peek(0).text.as_str()) {
            let op = self.advance().text;
            let rhs = next(self)?;
            let mut out = Node::new(NodeKind::Binary, op);
            out.children.push(lhs);
            out.children.push(rhs);
            lhs = out;
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["||"], Parser::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["&&"], Parser::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["|"], Parser::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["^"], Parser::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["&"], Parser::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["==", "!="], Parser::parse_relational)
    }

    fn parse_relational(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["<", ">", "<=", ">="], Parser::parse_shift)
    }

    fn parse_shift(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["<<", ">>"], Parser::parse_add)
    }

    fn parse_add(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["+", "-"], Parser::parse_mul)
    }

    fn parse_mul(&mut self) -> ParseResult<Node> {
        self.parse_binary_level(&["*", "/", "%"], Parser::parse_unary)
    }

    fn parse_unary(&mut self) -> ParseResult<Node> {
        let text = self.peek(0).text.clone();
        if ["+", "-", "!", "~", "&", "*", "++", "--"].contains(&text.as_str()) {
            let op = self.advance().text;
            let mut node = Node::new(NodeKind::Unary, op);
            node.children.push(self.parse_unary()?);
            return Ok(node);
        }

        if self.looks_like_cast_type() {
            self.expect("(")?;
            let mut cast_type_tokens = Vec::new();
            while !self.is_end() && self.peek(0).text != ")" {
                cast_type_tokens.push(self.advance().text);
            }
            self.expect(")")?;
            let mut node = Node::new(NodeKind::Cast, cast_type_tokens.join(" "));
            node.children.push(self.parse_unary()?);
            return Ok(node);
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Node> {
        let mut base = self.parse_primary()?;
        loop {
            if self.peek(0).text == "(" && self.looks_like_postfix_cast(&base) {
                self.expect("(")?;
                let mut cast_type_tokens = Vec::new();
                while !self.is_end() && self.peek(0).text != ")" {
                    cast_type_tokens.push(self.advance().text);
                }
                self.expect(")")?;
                let mut out = Node::new(NodeKind::Cast, cast_type_tokens.join(" "));
                out.children.push(base);
                base = out;
                continue;
            }

            if self.matches("(") {
                let mut call = Node::new(NodeKind::Call, "");
                call.children.push(base);
                call.children.push(self.parse_call_args()?);
                self.expect(")")?;
                base = call;
                continue;
            }

            if self.peek(0).text == "." || self.peek(0).text == "->" {
                self.advance();
                let member = self.advance();
                if LANE_SELECTORS.contains(&member.text.as_str()) && self.matches("[") {
                    let mut out = Node::new(NodeKind::Lane, member.text);
                    out.children.push(base);
                    out.children.push(self.parse_expression()?);
                    self.expect("]")?;
                    base = out;
                    continue;
                }
                let mut out = Node::new(NodeKind::Member, member.text);
                out.children.push(base);
                base = out;
                continue;
            }

            if self.matches("[") {
                let mut out = Node::new(NodeKind::Index, "[]");
                out.children.push(base);
                out.children.push(self.parse_expression()?);
                self.expect("]")?;
                base = out;
                continue;
            }

            if self.peek(0).text == "++" || self.peek(0).text == "--" {
                let op = self.advance().text;
                let mut out = Node::new(NodeKind::Postfix, op);
                out.children.push(base);
                base = out;
                continue;
            }

            break;
        }
        Ok(base)
    }

    fn parse_call_args(&mut self) -> ParseResult<Node> {
        let mut args = Node::new(NodeKind::CallArgs, "");

        if self.peek(0).text == ")" {
            return Ok(args);
        }

        let mut need_arg = true;
        while !self.is_end() && self.peek(0).text != ")" {
            if self.peek(0).text == "," {
                args.children.push(Node::new(NodeKind::EmptyArg, ""));
                self.advance();
                need_arg = true;
                continue;
            }

            args.children.push(self.parse_assign()?);
            need_arg = false;

            if self.matches(",") {
                need_arg = true;
                continue;
            }
            break;
        }

        if need_arg && self.peek(0).text == ")" && !args.children.is_empty() {
            args.children.push(Node::new(NodeKind::EmptyArg, ""));
        }

        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Node> {
        if self.matches("(") {
            let node = self.parse_expression()?;
            self.expect(")")?;
            return Ok(node);
        }

        let token = self.advance();
        match token.kind {
            TokenKind::Identifier | TokenKind::Keyword => {
                Ok(Node::at(NodeKind::Identifier, token.text, token.line, token.column))
            }
            TokenKind::String => {
                // Adjacent string literals concatenate.
                let mut merged = token.text;
                while self.peek(0).kind == TokenKind::String {
                    let next = self.advance().text;
                    if merged.ends_with('"') && next.starts_with('"') {
                        merged.pop();
                        merged.push_str(&next[1..]);
                    } else {
                        merged.push_str(&next);
                    }
                }
                Ok(Node::at(NodeKind::Literal, merged, token.line, token.column))
            }
            TokenKind::Number | TokenKind::Char => {
                Ok(Node::at(NodeKind::Literal, token.text, token.line, token.column))
            }
            TokenKind::Punct if token.text == "$" => {
                Ok(Node::at(NodeKind::Dollar, token.text, token.line, token.column))
            }
            _ => Err(self.token_error(token, "unexpected token in expression")),
        }
    }

    fn parse_expression_from_tokens(&mut self, tokens: Vec<Token>) -> ParseResult<Node> {
        if tokens.is_empty() {
            return Err(self.token_error(self.peek(0).clone(), "expected expression"));
        }
        let last = tokens.last().expect("non-empty").clone();
        let mut inner = tokens;
        inner.push(Token::end(last.line, last.column));

        let mut nested = Parser::new(inner, &self.filename);
        let expr = nested.parse_expression()?;
        if !nested.is_end() {
            return Err(nested.token_error(nested.peek(0).clone(), "unexpected token in expression"));
        }
        Ok(expr)
    }

    fn looks_like_var_decl(&self) -> bool {
        let mut i = self.idx;
        while i < self.tokens.len()
            && self.tokens[i].kind == TokenKind::Keyword
            && DECL_MODIFIERS.contains(&self.tokens[i].text.as_str())
        {
            i += 1;
        }

        if i >= self.tokens.len() {
            return false;
        }

        let t = &self.tokens[i];
        let is_type_token = t.kind == TokenKind::Identifier
            || (t.kind == TokenKind::Keyword
                && (BUILTIN_TYPES.contains(&t.text.as_str())
                    || t.text == "class"
                    || t.text == "union"));
        if !is_type_token {
            return false;
        }
        i += 1;

        while i < self.tokens.len() && (self.tokens[i].text == "*" || self.tokens[i].text == "&") {
            i += 1;
        }

        if i + 3 < self.tokens.len()
            && self.tokens[i].text == "("
            && (self.tokens[i + 1].text == "*" || self.tokens[i + 1].text == "&")
            && self.tokens[i + 2].kind == TokenKind::Identifier
            && self.tokens[i + 3].text == ")"
        {
            // Function-pointer declarator `(*name)(…)`.
            i += 4;
            if i >= self.tokens.len() || self.tokens[i].text != "(" {
                return false;
            }
            let mut depth = 0i32;
            while i < self.tokens.len() {
                if self.tokens[i].text == "(" {
                    depth += 1;
                } else if self.tokens[i].text == ")" {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                i += 1;
            }
        } else if i < self.tokens.len() && self.tokens[i].kind == TokenKind::Identifier {
            i += 1;
        } else {
            return false;
        }

        while i < self.tokens.len() && self.tokens[i].text == "[" {
            let mut depth = 0i32;
            while i < self.tokens.len() {
                if self.tokens[i].text == "[" {
                    depth += 1;
                } else if self.tokens[i].text == "]" {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                i += 1;
            }
        }

        i < self.tokens.len()
            && (self.tokens[i].text == ";"
                || self.tokens[i].text == "="
                || self.tokens[i].text == ",")
    }

    fn looks_like_cast_type(&self) -> bool {
        if self.peek(0).text != "(" {
            return false;
        }

        let mut i = self.idx + 1;
        let mut saw_any = false;
        while i < self.tokens.len() {
            let t = &self.tokens[i];
            if t.text == ")" {
                let next_i = i + 1;
                if !saw_any || next_i >= self.tokens.len() {
                    return false;
                }
                let next = &self.tokens[next_i];
                if ["(", "+", "-", "!", "~", "&", "*", "++", "--"].contains(&next.text.as_str()) {
                    return true;
                }
                return matches!(
                    next.kind,
                    TokenKind::Identifier
                        | TokenKind::Keyword
                        | TokenKind::Number
                        | TokenKind::String
                        | TokenKind::Char
                );
            }
            if t.text == "*" || t.text == "&" || t.text == "::" {
                i += 1;
                continue;
            }
            if t.kind == TokenKind::Identifier
                || (t.kind == TokenKind::Keyword
                    && (BUILTIN_TYPES.contains(&t.text.as_str())
                        || t.text == "class"
                        || t.text == "union"))
            {
                saw_any = true;
                i += 1;
                continue;
            }
            return false;
        }
        false
    }

    fn looks_like_postfix_cast(&self, base: &Node) -> bool {
        if self.peek(0).text != "(" {
            return false;
        }

        let mut i = self.idx + 1;
        let mut saw_any = false;
        let mut saw_keyword_type = false;
        let mut saw_pointer_marker = false;
        let mut saw_identifier = false;
        let mut saw_core_type_token = false;

        while i < self.tokens.len() {
            let t = &self.tokens[i];
            if t.text == ")" {
                if !saw_any {
                    return false;
                }
                if saw_keyword_type || saw_pointer_marker {
                    return true;
                }
                return base.kind != NodeKind::Identifier && saw_identifier;
            }

            if [",", "[", "]", "{", "}", ";", "..."].contains(&t.text.as_str()) {
                return false;
            }

            if t.text == "*" || t.text == "&" || t.text == "::" {
                if !saw_core_type_token {
                    return false;
                }
                saw_any = true;
                saw_pointer_marker = true;
                i += 1;
                continue;
            }

            if t.kind == TokenKind::Keyword
                && (BUILTIN_TYPES.contains(&t.text.as_str())
                    || t.text == "class"
                    || t.text == "union")
            {
                saw_any = true;
                saw_keyword_type = true;
                saw_core_type_token = true;
                i += 1;
                continue;
            }

            if t.kind == TokenKind::Identifier {
                saw_any = true;
                saw_identifier = true;
                saw_core_type_token = true;
                i += 1;
                continue;
            }

            return false;
        }

        false
    }
}

/// Whether a joined token is a bare identifier.
fn is_identifier_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split declaration tokens into `DeclType` and `DeclName` children. Handles
/// both trailing declarators and the function-pointer form `(*name)(…)`.
pub(crate) fn attach_decl_parts(decl: &mut Node, decl_tokens: &[String]) {
    if decl_tokens.is_empty() {
        return;
    }

    let mut name_index = None;

    for i in 0..decl_tokens.len().saturating_sub(3) {
        if decl_tokens[i] == "("
            && (decl_tokens[i + 1] == "*" || decl_tokens[i + 1] == "&")
            && is_identifier_token(&decl_tokens[i + 2])
            && decl_tokens[i + 3] == ")"
        {
            name_index = Some(i + 2);
            break;
        }
    }

    if name_index.is_none() {
        for idx in (0..decl_tokens.len()).rev() {
            if !is_identifier_token(&decl_tokens[idx]) {
                continue;
            }
            if idx > 0 && decl_tokens[idx - 1] == "::" {
                continue;
            }
            name_index = Some(idx);
            break;
        }
    }

    let Some(name_index) = name_index else {
        return;
    };

    let type_tokens = &decl_tokens[..name_index];
    decl.children.push(Node::new(NodeKind::DeclType, type_tokens.join(" ")));
    decl.children.push(Node::new(NodeKind::DeclName, decl_tokens[name_index].clone()));
}

/// For `I64 a = 1, b, *c;` the base type tokens shared by later declarators;
/// pointer stars bind to the individual declarator.
fn extract_base_decl_tokens_for_list(first_decl_tokens: &[String]) -> Vec<String> {
    if first_decl_tokens.is_empty() {
        return Vec::new();
    }

    let mut name_index = None;
    for idx in (0..first_decl_tokens.len()).rev() {
        if is_identifier_token(&first_decl_tokens[idx]) {
            name_index = Some(idx);
            break;
        }
    }

    let Some(name_index) = name_index else {
        if first_decl_tokens.len() == 1 {
            return first_decl_tokens.to_vec();
        }
        return first_decl_tokens[..first_decl_tokens.len() - 1].to_vec();
    };

    let mut base_end = name_index;
    while base_end > 0
        && (first_decl_tokens[base_end - 1] == "*" || first_decl_tokens[base_end - 1] == "&")
    {
        base_end -= 1;
    }
    if base_end == 0 {
        base_end = 1;
    }
    first_decl_tokens[..base_end].to_vec()
}

fn extract_aggregate_name(class_text: &str) -> String {
    let mut parts = class_text.split_whitespace();
    let keyword = parts.next().unwrap_or("");
    let name = parts.next().unwrap_or("");
    if (keyword == "class" || keyword == "union") && !name.is_empty() {
        name.to_string()
    } else {
        String::new()
    }
}

/// Split class field tokens into declaration and trailing metadata tokens.
/// `I64 count "fmt" 8` keeps `I64 count` as the field and the rest as
/// `FieldMetaTokens` for the reflection table.
fn build_field_decl_node(field_tokens: &[String]) -> Node {
    if field_tokens.is_empty() {
        return Node::new(NodeKind::FieldDecl, "");
    }

    let mut name_index = None;
    if field_tokens.len() > 1 && is_identifier_token(&field_tokens[1]) {
        name_index = Some(1);
    } else {
        for (i, token) in field_tokens.iter().enumerate() {
            if !is_identifier_token(token) {
                continue;
            }
            if i > 0
                && (field_tokens[i - 1] == "*"
                    || field_tokens[i - 1] == "&"
                    || field_tokens[i - 1] == "(")
            {
                name_index = Some(i);
                break;
            }
        }
    }
    if name_index.is_none() {
        name_index = field_tokens.iter().position(|t| is_identifier_token(t));
    }

    let mut split = field_tokens.len();
    if let Some(name_index) = name_index {
        split = name_index + 1;
        while split < field_tokens.len() {
            if field_tokens[split] == "[" {
                let mut depth = 0i32;
                while split < field_tokens.len() {
                    if field_tokens[split] == "[" {
                        depth += 1;
                    } else if field_tokens[split] == "]" {
                        depth -= 1;
                        if depth == 0 {
                            split += 1;
                            break;
                        }
                    }
                    split += 1;
                }
                continue;
            }
            if field_tokens[split] == "(" {
                let mut depth = 0i32;
                while split < field_tokens.len() {
                    if field_tokens[split] == "(" {
                        depth += 1;
                    } else if field_tokens[split] == ")" {
                        depth -= 1;
                        if depth == 0 {
                            split += 1;
                            break;
                        }
                    }
                    split += 1;
                }
                continue;
            }
            break;
        }
    }

    if split == field_tokens.len() {
        let mut field = Node::new(NodeKind::FieldDecl, field_tokens.join(" "));
        attach_decl_parts(&mut field, field_tokens);
        return field;
    }

    let decl_tokens = &field_tokens[..split];
    let meta_tokens = &field_tokens[split..];
    let mut field = Node::new(NodeKind::FieldDecl, decl_tokens.join(" "));
    attach_decl_parts(&mut field, decl_tokens);
    field.children.push(Node::new(NodeKind::FieldMetaTokens, meta_tokens.join(" ")));
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Node {
        parse(source, "test.hc").expect("parse failure")
    }

    #[test]
    fn function_decl_shape() {
        let program = parse_ok("I64 Add(I64 a, I64 b) { return a + b; }");
        assert_eq!(program.children.len(), 1);
        let fn_decl = &program.children[0];
        assert_eq!(fn_decl.kind, NodeKind::FunctionDecl);
        assert_eq!(fn_decl.text, "I64 Add");
        assert_eq!(fn_decl.find_child(NodeKind::DeclName).unwrap().text, "Add");
        assert_eq!(fn_decl.find_child(NodeKind::DeclType).unwrap().text, "I64");
        let params = fn_decl.find_child(NodeKind::ParamList).unwrap();
        assert_eq!(params.children.len(), 2);
    }

    #[test]
    fn default_argument_parses_expression() {
        let program = parse_ok("U0 F(I64 x=2+3);");
        let param = &program.children[0].find_child(NodeKind::ParamList).unwrap().children[0];
        let default = param.find_child(NodeKind::DefaultArg).unwrap();
        assert_eq!(default.text, "2 + 3");
        assert_eq!(default.children[0].kind, NodeKind::Binary);
    }

    #[test]
    fn rejects_continue_and_ternary() {
        let err = parse("U0 F() { continue; }", "t.hc").unwrap_err();
        assert!(err.message.contains("no continue"));
        let err = parse("U0 F() { I64 x; x = 1 ? 2 : 3; }", "t.hc").unwrap_err();
        assert!(err.message.contains("no ?:"));
    }

    #[test]
    fn sparse_call_arguments() {
        let program = parse_ok("U0 F() { G(1,,3); }");
        let expr = &program.children[0].find_child(NodeKind::Block).unwrap().children[0];
        let call = &expr.children[0];
        assert_eq!(call.kind, NodeKind::Call);
        let args = &call.children[1];
        assert_eq!(args.children.len(), 3);
        assert_eq!(args.children[1].kind, NodeKind::EmptyArg);
    }

    #[test]
    fn trailing_comma_yields_empty_arg() {
        let program = parse_ok("U0 F() { G(1,); }");
        let expr = &program.children[0].find_child(NodeKind::Block).unwrap().children[0];
        let args = &expr.children[0].children[1];
        assert_eq!(args.children.len(), 2);
        assert_eq!(args.children[1].kind, NodeKind::EmptyArg);
    }

    #[test]
    fn prefix_cast_lookahead() {
        let program = parse_ok("U0 F() { I64 x; x = (U8*)x; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let assign = &block.children[1].children[0];
        assert_eq!(assign.kind, NodeKind::Assign);
        let cast = &assign.children[1];
        assert_eq!(cast.kind, NodeKind::Cast);
        assert_eq!(cast.text, "U8 *");
    }

    #[test]
    fn postfix_cast_lookahead() {
        let program = parse_ok("U0 F() { I64 x; x = 3(U8); }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let cast = &block.children[1].children[0].children[1];
        assert_eq!(cast.kind, NodeKind::Cast);
        assert_eq!(cast.text, "U8");
        assert_eq!(cast.children[0].kind, NodeKind::Literal);
    }

    #[test]
    fn call_not_mistaken_for_postfix_cast() {
        let program = parse_ok("U0 F() { G(x); }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        assert_eq!(block.children[0].children[0].kind, NodeKind::Call);
    }

    #[test]
    fn lane_access_after_member_dot() {
        let program = parse_ok("U0 F() { I64 v; v.u8[1] = 5; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let assign = &block.children[1].children[0];
        let lane = &assign.children[0];
        assert_eq!(lane.kind, NodeKind::Lane);
        assert_eq!(lane.text, "u8");
    }

    #[test]
    fn switch_with_ranges_and_null_cases() {
        let program = parse_ok(
            "U0 F(I64 x) { switch (x) { case 1: break; case 3...5: break; case: break; default: break; } }",
        );
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let switch = &block.children[0];
        assert_eq!(switch.kind, NodeKind::Switch);
        let body = &switch.children[1];
        let kinds: Vec<&str> =
            body.children.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(kinds, vec!["", "range-case", "null-case", ""]);
    }

    #[test]
    fn class_with_trailing_declarator_and_meta() {
        let program = parse_ok("class CPoint { I64 x \"fmt\" 4; I64 y; } origin;");
        let class_decl = &program.children[0];
        assert_eq!(class_decl.kind, NodeKind::ClassDecl);
        assert_eq!(class_decl.text, "class CPoint");
        let field = &class_decl.children[0];
        assert_eq!(field.kind, NodeKind::FieldDecl);
        assert_eq!(field.find_child(NodeKind::FieldMetaTokens).unwrap().text, "\"fmt\" 4");
        let trailing = class_decl.find_child(NodeKind::VarDecl).unwrap();
        assert_eq!(trailing.find_child(NodeKind::DeclName).unwrap().text, "origin");
    }

    #[test]
    fn anonymous_class_gets_generated_name() {
        let program = parse_ok("class { I64 a; } blob;");
        let class_decl = &program.children[0];
        assert!(class_decl.text.starts_with("class __anon_aggregate_"));
    }

    #[test]
    fn var_decl_list_shares_base_type() {
        let program = parse_ok("U0 F() { I64 a = 1, *b, c; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let list = &block.children[0];
        assert_eq!(list.kind, NodeKind::VarDeclList);
        assert_eq!(list.children.len(), 3);
        assert_eq!(list.children[1].text, "I64 * b");
        assert_eq!(list.children[2].text, "I64 c");
    }

    #[test]
    fn print_statement_forms() {
        let program = parse_ok("U0 F() { \"%d\\n\", 42; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let print = &block.children[0];
        assert_eq!(print.kind, NodeKind::PrintStmt);
        assert_eq!(print.children.len(), 2);

        let program = parse_ok("U0 F(U8 *fmt) { \"\" fmt, 1; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let print = &block.children[0];
        assert_eq!(print.children.len(), 3);
        assert_eq!(print.children[1].kind, NodeKind::Identifier);
    }

    #[test]
    fn inline_asm_forms() {
        let program = parse_ok("U0 F() { asm { NOP }; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        assert_eq!(block.children[0].kind, NodeKind::Asm);
        assert_eq!(block.children[0].text, "NOP");

        let program = parse_ok("U0 F(I64 x) { asm(\"mov %0\", \"r\", x); }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let stmt = &block.children[0];
        assert_eq!(stmt.children.len(), 3);
        assert_eq!(stmt.children[0].kind, NodeKind::AsmArg);
    }

    #[test]
    fn string_adjacency_concatenates() {
        let program = parse_ok("U0 F(U8 *s) { s = \"a\" \"b\"; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let assign = &block.children[0].children[0];
        assert_eq!(assign.children[1].text, "\"ab\"");
    }

    #[test]
    fn linkage_statement_form() {
        let program = parse_ok("extern I64 x;");
        let decl = &program.children[0];
        assert_eq!(decl.kind, NodeKind::LinkageDecl);
        assert_eq!(decl.text, "extern");
        assert_eq!(decl.children[0].text, "I64 x");
    }

    #[test]
    fn goto_and_labels() {
        let program = parse_ok("U0 F() { goto done; done: return; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        assert_eq!(block.children[0].kind, NodeKind::Goto);
        assert_eq!(block.children[0].text, "done");
        assert_eq!(block.children[1].kind, NodeKind::Label);
        assert_eq!(block.children[1].text, "done");
    }

    #[test]
    fn function_pointer_declarator() {
        let program = parse_ok("U0 F() { I64 (*fp)(I64) ; }");
        let block = program.children[0].find_child(NodeKind::Block).unwrap();
        let decl = &block.children[0];
        assert_eq!(decl.kind, NodeKind::VarDecl);
        assert_eq!(decl.find_child(NodeKind::DeclName).unwrap().text, "fp");
    }
}
