//! Parser for the textual IR subset the printer emits.
//!
//! The backend contract is parse → verify → print over text IR, so this
//! parser accepts everything [`super::printer`] produces (plus flexible
//! whitespace). Anything outside that subset is a parse error carrying the
//! offending line.

use super::module::{
    Block, Callee, Const, Function, Global, Inst, IrLinkage, Module, Op, Param, Term, Value,
};
use super::types::{BinOp, CastOp, ICmpPred, RmwOp, Type};
use std::collections::HashMap;

pub fn parse_module(text: &str) -> Result<Module, String> {
    Parser::new(text).parse()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    /// `%name`
    Local(String),
    /// `@name`
    GlobalRef(String),
    Int(i64),
    /// `"…"` or `c"…"` payload bytes.
    Str(Vec<u8>),
    Punct(char),
}

fn tokenize_line(line: &str) -> Result<Vec<Tok>, String> {
    let bytes = line.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0usize;

    let read_name = |bytes: &[u8], mut j: usize| -> (String, usize) {
        let start = j;
        while j < bytes.len()
            && (bytes[j].is_ascii_alphanumeric()
                || bytes[j] == b'_'
                || bytes[j] == b'.'
                || bytes[j] == b'$')
        {
            j += 1;
        }
        (String::from_utf8_lossy(&bytes[start..j]).into_owned(), j)
    };

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == b';' {
            break;
        }
        if c == b'%' || c == b'@' {
            let (name, j) = read_name(bytes, i + 1);
            if name.is_empty() {
                return Err(format!("bad symbol reference in line: {line}"));
            }
            if c == b'%' {
                toks.push(Tok::Local(name));
            } else {
                toks.push(Tok::GlobalRef(name));
            }
            i = j;
            continue;
        }
        if c == b'c' && i + 1 < bytes.len() && bytes[i + 1] == b'"' {
            let (payload, j) = read_quoted(bytes, i + 1)?;
            toks.push(Tok::Str(payload));
            i = j;
            continue;
        }
        if c == b'"' {
            let (payload, j) = read_quoted(bytes, i)?;
            toks.push(Tok::Str(payload));
            i = j;
            continue;
        }
        if c == b'-' || c.is_ascii_digit() {
            let start = i;
            if c == b'-' {
                i += 1;
            }
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let text = &line[start..i];
            // A bare identifier starting with a digit is impossible here.
            let parsed = text
                .parse::<i64>()
                .or_else(|_| text.parse::<u64>().map(|v| v as i64))
                .map_err(|_| format!("bad integer '{text}' in line: {line}"))?;
            toks.push(Tok::Int(parsed));
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let (name, j) = read_name(bytes, i);
            toks.push(Tok::Word(name));
            i = j;
            continue;
        }
        if b",(){}[]<>=:*".contains(&c) {
            toks.push(Tok::Punct(c as char));
            i += 1;
            continue;
        }
        return Err(format!("unsupported character '{}' in line: {line}", c as char));
    }
    Ok(toks)
}

/// Read an LLVM quoted string starting at the opening quote; `\XX` pairs are
/// hex escapes. Returns payload and the index past the closing quote.
fn read_quoted(bytes: &[u8], open: usize) -> Result<(Vec<u8>, usize), String> {
    debug_assert_eq!(bytes[open], b'"');
    let mut out = Vec::new();
    let mut i = open + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' {
            return Ok((out, i + 1));
        }
        if c == b'\\' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(decoded) => {
                    out.push(decoded);
                    i += 3;
                    continue;
                }
                None => return Err("bad escape in quoted string".to_string()),
            }
        }
        out.push(c);
        i += 1;
    }
    Err("unterminated quoted string".to_string())
}

struct Line {
    toks: Vec<Tok>,
    raw: String,
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
}

struct Cursor<'a> {
    toks: &'a [Tok],
    idx: usize,
    raw: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a Line) -> Cursor<'a> {
        Cursor { toks: &line.toks, idx: 0, raw: &line.raw }
    }

    fn err(&self, what: &str) -> String {
        format!("{what} in line: {}", self.raw)
    }

    fn peek(&self) -> Option<&'a Tok> {
        self.toks.get(self.idx)
    }

    fn next(&mut self) -> Option<&'a Tok> {
        let tok = self.toks.get(self.idx);
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.idx >= self.toks.len()
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Word(w)) if w == word) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn eat_punct(&mut self, punct: char) -> bool {
        if matches!(self.peek(), Some(Tok::Punct(p)) if *p == punct) {
            self.idx += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, punct: char) -> Result<(), String> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{punct}'")))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), String> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{word}'")))
        }
    }

    fn parse_type(&mut self) -> Result<Type, String> {
        if self.eat_punct('[') {
            let len = match self.next() {
                Some(Tok::Int(len)) if *len >= 0 => *len as u64,
                _ => return Err(self.err("expected array length")),
            };
            self.expect_word("x")?;
            let elem = self.parse_type()?;
            self.expect_punct(']')?;
            return Ok(Type::Array(Box::new(elem), len));
        }
        if self.eat_punct('{') {
            let mut fields = Vec::new();
            if !self.eat_punct('}') {
                loop {
                    fields.push(self.parse_type()?);
                    if self.eat_punct('}') {
                        break;
                    }
                    self.expect_punct(',')?;
                }
            }
            return Ok(Type::Tuple(fields));
        }
        match self.next() {
            Some(Tok::Word(w)) => match w.as_str() {
                "void" => Ok(Type::Void),
                "i1" => Ok(Type::I1),
                "i8" => Ok(Type::I8),
                "i16" => Ok(Type::I16),
                "i32" => Ok(Type::I32),
                "i64" => Ok(Type::I64),
                "double" => Ok(Type::F64),
                "ptr" => Ok(Type::Ptr),
                other => Err(self.err(&format!("unsupported type '{other}'"))),
            },
            Some(Tok::Local(name)) => Ok(Type::Struct(name.clone())),
            _ => Err(self.err("expected type")),
        }
    }

    fn parse_value(&mut self, params: &HashMap<String, u32>, ty: &Type) -> Result<Value, String> {
        match self.next() {
            Some(Tok::Local(name)) => local_value(name, params)
                .ok_or_else(|| self.err(&format!("unknown local value %{name}"))),
            Some(Tok::GlobalRef(name)) => Ok(Value::Global(name.clone())),
            Some(Tok::Int(v)) => Ok(Value::ConstInt(ty.clone(), *v)),
            Some(Tok::Word(w)) if w == "null" => Ok(Value::NullPtr),
            _ => Err(self.err("expected value")),
        }
    }

    fn parse_typed_value(
        &mut self,
        params: &HashMap<String, u32>,
    ) -> Result<(Type, Value), String> {
        let ty = self.parse_type()?;
        let value = self.parse_value(params, &ty)?;
        Ok((ty, value))
    }

    fn parse_const(&mut self, ty: &Type) -> Result<Const, String> {
        if let Some(Tok::Str(bytes)) = self.peek() {
            let bytes = bytes.clone();
            self.idx += 1;
            return Ok(Const::Bytes(bytes));
        }
        if let Some(Tok::Int(v)) = self.peek() {
            let v = *v;
            self.idx += 1;
            return Ok(Const::Int(ty.clone(), v));
        }
        if let Some(Tok::GlobalRef(name)) = self.peek() {
            let name = name.clone();
            self.idx += 1;
            return Ok(Const::GlobalRef(name));
        }
        if self.eat_word("null") {
            return Ok(Const::Null);
        }
        if self.eat_word("zeroinitializer") {
            return Ok(Const::Zero(ty.clone()));
        }
        if self.eat_word("ptrtoint") {
            self.expect_punct('(')?;
            self.expect_word("ptr")?;
            let inner = self.parse_const(&Type::Ptr)?;
            self.expect_word("to")?;
            let to = self.parse_type()?;
            self.expect_punct(')')?;
            return Ok(Const::PtrToInt(Box::new(inner), to));
        }
        if self.eat_word("inttoptr") {
            self.expect_punct('(')?;
            let from = self.parse_type()?;
            let inner = self.parse_const(&from)?;
            self.expect_word("to")?;
            self.expect_word("ptr")?;
            self.expect_punct(')')?;
            return Ok(Const::IntToPtr(Box::new(inner)));
        }
        if self.eat_punct('[') {
            let Type::Array(elem_ty, _) = ty else {
                return Err(self.err("array constant for non-array type"));
            };
            let mut items = Vec::new();
            if !self.eat_punct(']') {
                loop {
                    let item_ty = self.parse_type()?;
                    items.push(self.parse_const(&item_ty)?);
                    if self.eat_punct(']') {
                        break;
                    }
                    self.expect_punct(',')?;
                }
            }
            return Ok(Const::Array((**elem_ty).clone(), items));
        }
        if self.eat_punct('{') {
            let mut tys = Vec::new();
            let mut fields = Vec::new();
            if !self.eat_punct('}') {
                loop {
                    let field_ty = self.parse_type()?;
                    let field = self.parse_const(&field_ty)?;
                    tys.push(field_ty);
                    fields.push(field);
                    if self.eat_punct('}') {
                        break;
                    }
                    self.expect_punct(',')?;
                }
            }
            return Ok(Const::Struct(tys, fields));
        }
        Err(self.err("expected constant"))
    }
}

fn local_value(name: &str, params: &HashMap<String, u32>) -> Option<Value> {
    if let Some(index) = params.get(name) {
        return Some(Value::Arg(*index));
    }
    let id_text = name.strip_prefix('t')?;
    let id: u32 = id_text.parse().ok()?;
    Some(Value::Local(id))
}

impl Parser {
    fn new(text: &str) -> Parser {
        let lines = text
            .lines()
            .map(|raw| Line { toks: tokenize_line(raw).unwrap_or_default(), raw: raw.to_string() })
            .collect();
        Parser { lines, pos: 0 }
    }

    fn parse(&mut self) -> Result<Module, String> {
        let mut module = Module::new("holyc");

        // Retokenize eagerly so tokenizer errors surface with their line.
        for line in &self.lines {
            tokenize_line(&line.raw)?;
        }

        while self.pos < self.lines.len() {
            if self.lines[self.pos].toks.is_empty() {
                self.pos += 1;
                continue;
            }

            let first = self.lines[self.pos].toks[0].clone();
            match first {
                Tok::Word(w) if w == "source_filename" || w == "target" => {
                    self.pos += 1;
                }
                Tok::Local(_) => {
                    let mut cursor = Cursor::new(&self.lines[self.pos]);
                    let def = Self::parse_struct_line(&mut cursor)?;
                    module.structs.push(def);
                    self.pos += 1;
                }
                Tok::GlobalRef(_) => {
                    let mut cursor = Cursor::new(&self.lines[self.pos]);
                    let global = Self::parse_global(&mut cursor)?;
                    module.globals.push(global);
                    self.pos += 1;
                }
                Tok::Word(w) if w == "declare" => {
                    let mut cursor = Cursor::new(&self.lines[self.pos]);
                    let func = Self::parse_declare(&mut cursor)?;
                    module.functions.push(func);
                    self.pos += 1;
                }
                Tok::Word(w) if w == "define" => {
                    let func = self.parse_define()?;
                    module.functions.push(func);
                }
                _ => {
                    return Err(format!(
                        "unsupported top-level line: {}",
                        self.lines[self.pos].raw
                    ));
                }
            }
        }

        Ok(module)
    }

    fn parse_struct_line(cursor: &mut Cursor) -> Result<super::module::StructDef, String> {
        let Some(Tok::Local(name)) = cursor.next() else {
            return Err(cursor.err("expected struct name"));
        };
        let name = name.clone();
        cursor.expect_punct('=')?;
        cursor.expect_word("type")?;
        cursor.expect_punct('<')?;
        cursor.expect_punct('{')?;
        let mut fields = Vec::new();
        if !cursor.eat_punct('}') {
            loop {
                fields.push(cursor.parse_type()?);
                if cursor.eat_punct('}') {
                    break;
                }
                cursor.expect_punct(',')?;
            }
        }
        cursor.expect_punct('>')?;
        Ok(super::module::StructDef { name, fields })
    }

    fn parse_global(cursor: &mut Cursor) -> Result<Global, String> {
        let Some(Tok::GlobalRef(name)) = cursor.next() else {
            return Err(cursor.err("expected global name"));
        };
        let name = name.clone();
        cursor.expect_punct('=')?;

        let mut linkage = IrLinkage::External;
        let mut unnamed_addr = false;
        let mut external_decl = false;
        loop {
            if cursor.eat_word("external") {
                external_decl = true;
                continue;
            }
            if cursor.eat_word("private") {
                linkage = IrLinkage::Private;
                continue;
            }
            if cursor.eat_word("internal") {
                linkage = IrLinkage::Internal;
                continue;
            }
            if cursor.eat_word("unnamed_addr") {
                unnamed_addr = true;
                continue;
            }
            break;
        }

        let is_const = if cursor.eat_word("constant") {
            true
        } else {
            cursor.expect_word("global")?;
            false
        };

        let ty = cursor.parse_type()?;
        if external_decl {
            return Ok(Global { name, ty, linkage, is_const, unnamed_addr, init: None });
        }
        let init = cursor.parse_const(&ty)?;
        Ok(Global { name, ty, linkage, is_const, unnamed_addr, init: Some(init) })
    }

    fn parse_declare(cursor: &mut Cursor) -> Result<Function, String> {
        cursor.expect_word("declare")?;
        let ret = cursor.parse_type()?;
        let Some(Tok::GlobalRef(name)) = cursor.next() else {
            return Err(cursor.err("expected function name"));
        };
        let name = name.clone();
        cursor.expect_punct('(')?;
        let mut params = Vec::new();
        if !cursor.eat_punct(')') {
            loop {
                let ty = cursor.parse_type()?;
                // Parameter names are optional in declarations.
                if let Some(Tok::Local(pname)) = cursor.peek() {
                    let pname = pname.clone();
                    cursor.next();
                    params.push(Param { ty, name: pname });
                } else {
                    params.push(Param { ty, name: format!("p{}", params.len()) });
                }
                if cursor.eat_punct(')') {
                    break;
                }
                cursor.expect_punct(',')?;
            }
        }
        Ok(Function { name, ret, params, linkage: IrLinkage::External, blocks: Vec::new() })
    }

    fn parse_define(&mut self) -> Result<Function, String> {
        let header = &self.lines[self.pos];
        let mut cursor = Cursor::new(header);
        cursor.expect_word("define")?;
        let mut linkage = IrLinkage::External;
        if cursor.eat_word("internal") {
            linkage = IrLinkage::Internal;
        } else if cursor.eat_word("private") {
            linkage = IrLinkage::Private;
        }
        let ret = cursor.parse_type()?;
        let Some(Tok::GlobalRef(name)) = cursor.next() else {
            return Err(cursor.err("expected function name"));
        };
        let name = name.clone();
        cursor.expect_punct('(')?;
        let mut params = Vec::new();
        let mut param_map = HashMap::new();
        if !cursor.eat_punct(')') {
            loop {
                let ty = cursor.parse_type()?;
                let Some(Tok::Local(pname)) = cursor.next() else {
                    return Err(cursor.err("expected parameter name"));
                };
                param_map.insert(pname.clone(), params.len() as u32);
                params.push(Param { ty, name: pname.clone() });
                if cursor.eat_punct(')') {
                    break;
                }
                cursor.expect_punct(',')?;
            }
        }
        cursor.expect_punct('{')?;
        self.pos += 1;

        let mut func = Function { name, ret, params, linkage, blocks: Vec::new() };

        loop {
            if self.pos >= self.lines.len() {
                return Err(format!("missing '}}' at end of function @{}", func.name));
            }
            let line = &self.lines[self.pos];
            if line.toks.is_empty() {
                self.pos += 1;
                continue;
            }
            let mut cursor = Cursor::new(line);
            if cursor.eat_punct('}') {
                self.pos += 1;
                break;
            }

            // `label:` opens a block.
            if line.toks.len() == 2 {
                if let (Tok::Word(label), Tok::Punct(':')) = (&line.toks[0], &line.toks[1]) {
                    func.blocks.push(Block::new(label.clone()));
                    self.pos += 1;
                    continue;
                }
            }

            if func.blocks.is_empty() {
                func.blocks.push(Block::new("entry"));
            }
            let parsed = Self::parse_body_line(&mut cursor, &param_map)?;
            let block = func.blocks.last_mut().expect("pushed above");
            match parsed {
                BodyLine::Inst(inst) => block.insts.push(inst),
                BodyLine::Term(term) => {
                    if block.term.is_none() {
                        block.term = Some(term);
                    }
                }
            }
            self.pos += 1;
        }

        Ok(func)
    }

    fn parse_body_line(
        cursor: &mut Cursor,
        params: &HashMap<String, u32>,
    ) -> Result<BodyLine, String> {
        // Terminators first.
        if cursor.eat_word("ret") {
            if cursor.eat_word("void") {
                return Ok(BodyLine::Term(Term::Ret(None)));
            }
            let (ty, value) = cursor.parse_typed_value(params)?;
            return Ok(BodyLine::Term(Term::Ret(Some((ty, value)))));
        }
        if cursor.eat_word("br") {
            if cursor.eat_word("label") {
                let Some(Tok::Local(label)) = cursor.next() else {
                    return Err(cursor.err("expected branch target"));
                };
                return Ok(BodyLine::Term(Term::Br(label.clone())));
            }
            cursor.expect_word("i1")?;
            let cond = cursor.parse_value(params, &Type::I1)?;
            cursor.expect_punct(',')?;
            cursor.expect_word("label")?;
            let Some(Tok::Local(then_label)) = cursor.next() else {
                return Err(cursor.err("expected branch target"));
            };
            let then_label = then_label.clone();
            cursor.expect_punct(',')?;
            cursor.expect_word("label")?;
            let Some(Tok::Local(else_label)) = cursor.next() else {
                return Err(cursor.err("expected branch target"));
            };
            return Ok(BodyLine::Term(Term::CondBr {
                cond,
                then_label,
                else_label: else_label.clone(),
            }));
        }
        if cursor.eat_word("unreachable") {
            return Ok(BodyLine::Term(Term::Unreachable));
        }

        // `%tN = <op>` or a bare void call / store.
        let mut id = None;
        if let Some(Tok::Local(name)) = cursor.peek() {
            let name = name.clone();
            cursor.next();
            cursor.expect_punct('=')?;
            let stripped = name
                .strip_prefix('t')
                .and_then(|rest| rest.parse::<u32>().ok())
                .ok_or_else(|| cursor.err(&format!("unsupported result name %{name}")))?;
            id = Some(stripped);
        }

        let op = Self::parse_op(cursor, params)?;
        Ok(BodyLine::Inst(Inst { id, op }))
    }

    fn parse_op(cursor: &mut Cursor, params: &HashMap<String, u32>) -> Result<Op, String> {
        const BIN_OPS: &[(&str, BinOp)] = &[
            ("add", BinOp::Add),
            ("sub", BinOp::Sub),
            ("mul", BinOp::Mul),
            ("sdiv", BinOp::SDiv),
            ("srem", BinOp::SRem),
            ("and", BinOp::And),
            ("or", BinOp::Or),
            ("xor", BinOp::Xor),
            ("shl", BinOp::Shl),
            ("lshr", BinOp::LShr),
            ("ashr", BinOp::AShr),
        ];
        const CAST_OPS: &[(&str, CastOp)] = &[
            ("sext", CastOp::SExt),
            ("zext", CastOp::ZExt),
            ("trunc", CastOp::Trunc),
            ("ptrtoint", CastOp::PtrToInt),
            ("inttoptr", CastOp::IntToPtr),
            ("bitcast", CastOp::Bitcast),
            ("sitofp", CastOp::SIToFP),
            ("fptosi", CastOp::FPToSI),
        ];

        if cursor.eat_word("alloca") {
            let ty = cursor.parse_type()?;
            return Ok(Op::Alloca { ty });
        }
        if cursor.eat_word("load") {
            let ty = cursor.parse_type()?;
            cursor.expect_punct(',')?;
            cursor.expect_word("ptr")?;
            let ptr = cursor.parse_value(params, &Type::Ptr)?;
            return Ok(Op::Load { ty, ptr });
        }
        if cursor.eat_word("store") {
            let (ty, val) = cursor.parse_typed_value(params)?;
            cursor.expect_punct(',')?;
            cursor.expect_word("ptr")?;
            let ptr = cursor.parse_value(params, &Type::Ptr)?;
            return Ok(Op::Store { ty, val, ptr });
        }
        if cursor.eat_word("icmp") {
            let pred = match cursor.next() {
                Some(Tok::Word(w)) => match w.as_str() {
                    "eq" => ICmpPred::Eq,
                    "ne" => ICmpPred::Ne,
                    "slt" => ICmpPred::Slt,
                    "sgt" => ICmpPred::Sgt,
                    "sle" => ICmpPred::Sle,
                    "sge" => ICmpPred::Sge,
                    other => return Err(cursor.err(&format!("unsupported predicate '{other}'"))),
                },
                _ => return Err(cursor.err("expected icmp predicate")),
            };
            let (ty, lhs) = cursor.parse_typed_value(params)?;
            cursor.expect_punct(',')?;
            let rhs = cursor.parse_value(params, &ty)?;
            return Ok(Op::ICmp { pred, ty, lhs, rhs });
        }
        if cursor.eat_word("getelementptr") {
            let inbounds = cursor.eat_word("inbounds");
            let elem = cursor.parse_type()?;
            cursor.expect_punct(',')?;
            cursor.expect_word("ptr")?;
            let base = cursor.parse_value(params, &Type::Ptr)?;
            let mut indices = Vec::new();
            while cursor.eat_punct(',') {
                let (idx_ty, idx) = cursor.parse_typed_value(params)?;
                indices.push((idx_ty, idx));
            }
            return Ok(Op::Gep { elem, base, indices, inbounds });
        }
        if cursor.eat_word("call") {
            let ret = cursor.parse_type()?;
            let callee = if cursor.eat_word("asm") {
                cursor.eat_word("sideeffect");
                let Some(Tok::Str(template)) = cursor.next() else {
                    return Err(cursor.err("expected asm template"));
                };
                let template = String::from_utf8_lossy(template).into_owned();
                cursor.expect_punct(',')?;
                let Some(Tok::Str(constraints)) = cursor.next() else {
                    return Err(cursor.err("expected asm constraint string"));
                };
                Callee::Asm {
                    template,
                    constraints: String::from_utf8_lossy(constraints).into_owned(),
                }
            } else {
                match cursor.peek() {
                    Some(Tok::GlobalRef(name)) => {
                        let name = name.clone();
                        cursor.next();
                        Callee::Direct(name)
                    }
                    Some(Tok::Local(_)) => {
                        let target = cursor.parse_value(params, &Type::Ptr)?;
                        Callee::Indirect(target)
                    }
                    _ => return Err(cursor.err("expected call target")),
                }
            };
            cursor.expect_punct('(')?;
            let mut args = Vec::new();
            if !cursor.eat_punct(')') {
                loop {
                    let (ty, value) = cursor.parse_typed_value(params)?;
                    args.push((ty, value));
                    if cursor.eat_punct(')') {
                        break;
                    }
                    cursor.expect_punct(',')?;
                }
            }
            return Ok(Op::Call { callee, ret, args });
        }
        if cursor.eat_word("atomicrmw") {
            let op = match cursor.next() {
                Some(Tok::Word(w)) => match w.as_str() {
                    "xchg" => RmwOp::Xchg,
                    "add" => RmwOp::Add,
                    "sub" => RmwOp::Sub,
                    "and" => RmwOp::And,
                    "or" => RmwOp::Or,
                    "xor" => RmwOp::Xor,
                    other => return Err(cursor.err(&format!("unsupported atomicrmw op '{other}'"))),
                },
                _ => return Err(cursor.err("expected atomicrmw operation")),
            };
            cursor.expect_word("ptr")?;
            let ptr = cursor.parse_value(params, &Type::Ptr)?;
            cursor.expect_punct(',')?;
            let (ty, val) = cursor.parse_typed_value(params)?;
            cursor.expect_word("seq_cst")?;
            return Ok(Op::AtomicRmw { op, ty, ptr, val });
        }

        for (word, op) in BIN_OPS {
            if cursor.eat_word(word) {
                let (ty, lhs) = cursor.parse_typed_value(params)?;
                cursor.expect_punct(',')?;
                let rhs = cursor.parse_value(params, &ty)?;
                return Ok(Op::Bin { op: *op, ty, lhs, rhs });
            }
        }
        for (word, op) in CAST_OPS {
            if cursor.eat_word(word) {
                let (from, val) = cursor.parse_typed_value(params)?;
                cursor.expect_word("to")?;
                let to = cursor.parse_type()?;
                return Ok(Op::Cast { op: *op, from, to, val });
            }
        }

        Err(cursor.err("unsupported instruction"))
    }
}

enum BodyLine {
    Inst(Inst),
    Term(Term),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::printer::print_module;

    const SAMPLE: &str = r#"
; ModuleID = 'holyc'
source_filename = "holyc"

%hc.CPoint = type <{ i64, i64 }>

@g = global i64 5
@s = internal global i64 ptrtoint (ptr @g to i64)
@e = external global i64
@.str.0 = private unnamed_addr constant [3 x i8] c"hi\00"

declare void @hc_print_fmt(ptr, ptr, i64)

define i64 @Main(i64 %a) {
entry:
  %t0 = alloca i64
  store i64 %a, ptr %t0
  %t1 = load i64, ptr %t0
  %t2 = add i64 %t1, 1
  %t3 = icmp eq i64 %t2, 0
  br i1 %t3, label %if.then, label %if.end

if.then:
  ret i64 0

if.end:
  %t4 = call i64 @Main(i64 %t2)
  ret i64 %t4
}
"#;

    #[test]
    fn parses_sample_module() {
        let module = parse_module(SAMPLE).expect("parse");
        assert_eq!(module.structs.len(), 1);
        assert_eq!(module.globals.len(), 4);
        assert!(module.global("e").unwrap().init.is_none());
        let main = module.function("Main").unwrap();
        assert_eq!(main.blocks.len(), 3);
        assert_eq!(main.params.len(), 1);
    }

    #[test]
    fn print_parse_print_is_stable() {
        let module = parse_module(SAMPLE).expect("parse");
        let printed = print_module(&module);
        let reparsed = parse_module(&printed).expect("reparse");
        assert_eq!(print_module(&reparsed), printed);
    }

    #[test]
    fn rejects_unknown_instruction() {
        let bad = "define void @f() {\nentry:\n  fence seq_cst\n  ret void\n}\n";
        assert!(parse_module(bad).is_err());
    }

    #[test]
    fn parses_asm_and_atomicrmw() {
        let text = concat!(
            "define void @f(i64 %x) {\n",
            "entry:\n",
            "  %t0 = alloca i64\n",
            "  %t1 = atomicrmw add ptr %t0, i64 1 seq_cst\n",
            "  call void asm sideeffect \"NOP\", \"~{memory}\"()\n",
            "  ret void\n",
            "}\n"
        );
        let module = parse_module(text).expect("parse");
        let f = module.function("f").unwrap();
        assert!(matches!(f.blocks[0].insts[1].op, Op::AtomicRmw { .. }));
        assert!(matches!(
            f.blocks[0].insts[2].op,
            Op::Call { callee: Callee::Asm { .. }, .. }
        ));
    }
}
