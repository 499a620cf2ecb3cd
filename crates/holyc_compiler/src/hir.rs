//! High-level intermediate representation.
//!
//! The HIR is the closed, codegen-ready form of a program: the parser's many
//! node kinds are funneled into a small set of statement and expression
//! variants, default arguments are resolved, exception regions are numbered,
//! and reflection metadata is collected into a flat table. Ownership is a
//! strict tree; the only cross-references are by name (labels, functions).

use holyc_frontend::{Linkage, Ty};
use std::fmt::Write as _;

/// Closed expression kind set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HirExprKind {
    IntLiteral,
    StringLiteral,
    Dollar,
    Var,
    Assign,
    Unary,
    Binary,
    Call,
    Cast,
    Postfix,
    Lane,
    Member,
    Index,
    Comma,
}

/// An HIR expression: kind tag, operator/symbol payload, ordered children,
/// and the type sema resolved for it.
#[derive(Debug, Clone, PartialEq)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub text: String,
    pub children: Vec<HirExpr>,
    pub ty: Ty,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, text: impl Into<String>, ty: Ty) -> Self {
        HirExpr { kind, text: text.into(), children: Vec::new(), ty }
    }

    pub fn with_children(mut self, children: Vec<HirExpr>) -> Self {
        self.children = children;
        self
    }

    pub fn int_literal(text: impl Into<String>) -> Self {
        HirExpr::new(HirExprKind::IntLiteral, text, Ty::I64)
    }
}

/// Storage class of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Auto,
    Local,
    StaticLocal,
    Global,
    StaticGlobal,
}

impl StorageClass {
    pub fn name(self) -> &'static str {
        match self {
            StorageClass::Auto => "auto",
            StorageClass::Local => "local",
            StorageClass::StaticLocal => "static-local",
            StorageClass::Global => "global",
            StorageClass::StaticGlobal => "static-global",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirVarDecl {
    pub name: String,
    pub ty: Ty,
    pub storage: StorageClass,
    pub is_global: bool,
    pub has_const_initializer: bool,
    pub init: Option<HirExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirAssign {
    pub target: String,
    /// `=`, `+=`, … — the compound token from the source.
    pub op: String,
    pub value: HirExpr,
    pub ty: Option<Ty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirPrint {
    pub format: HirExpr,
    /// The raw literal text when the format is a string/char literal.
    pub literal: Option<String>,
    pub args: Vec<HirExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirTryCatch {
    pub try_body: Vec<HirStmt>,
    pub catch_body: Vec<HirStmt>,
    /// Depth-first positive id, unique within the function.
    pub region_id: i32,
    /// Enclosing region id, or -1 at function root.
    pub parent_region_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Single,
    Range,
    /// `case:` — inherits `last_end + 1` at emission time.
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub kind: CaseKind,
    pub begin: i64,
    pub end: i64,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirSwitch {
    pub cond: HirExpr,
    pub cases: Vec<SwitchCase>,
    pub default_body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirIf {
    pub cond: HirExpr,
    pub then_body: Vec<HirStmt>,
    pub else_body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirLoop {
    pub cond: HirExpr,
    pub body: Vec<HirStmt>,
}

/// One inline-asm slot: constraint string plus the operand expression for
/// input constraints (outputs and clobbers carry none).
#[derive(Debug, Clone, PartialEq)]
pub struct AsmOperand {
    pub constraint: String,
    pub value: Option<HirExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirInlineAsm {
    pub template: String,
    pub operands: Vec<AsmOperand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirMetadataDecl {
    pub name: String,
    pub payload: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirLinkageDecl {
    pub kind: String,
    pub symbol: String,
}

/// Closed statement variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum HirStmt {
    VarDecl(HirVarDecl),
    Assign(HirAssign),
    Return(Option<HirExpr>),
    Expr(HirExpr),
    NoParenCall { name: String, ty: Ty },
    Print(HirPrint),
    Lock(Vec<HirStmt>),
    Throw { payload: HirExpr, region_id: i32 },
    TryCatch(HirTryCatch),
    Break,
    Switch(HirSwitch),
    If(HirIf),
    While(HirLoop),
    DoWhile(HirLoop),
    Label(String),
    Goto(String),
    InlineAsm(HirInlineAsm),
    MetadataDecl(HirMetadataDecl),
    LinkageDecl(HirLinkageDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub name: String,
    pub return_ty: Ty,
    pub linkage: Linkage,
    pub params: Vec<(Ty, String)>,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunctionDecl {
    pub name: String,
    pub return_ty: Ty,
    pub linkage: Linkage,
    pub params: Vec<(Ty, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirReflectionField {
    pub aggregate_name: String,
    pub field_name: String,
    pub field_type: String,
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HirReflectionTable {
    pub type_aliases: Vec<String>,
    pub fields: Vec<HirReflectionField>,
}

/// A lowered compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HirModule {
    pub top_level_items: Vec<HirStmt>,
    pub functions: Vec<HirFunction>,
    pub function_decls: Vec<HirFunctionDecl>,
    pub reflection: HirReflectionTable,
}

impl HirModule {
    /// Union aggregate names, read off the metadata headers.
    pub fn union_aggregates(&self) -> Vec<String> {
        self.top_level_items
            .iter()
            .filter_map(|item| match item {
                HirStmt::MetadataDecl(meta) if meta.name.starts_with("union ") => {
                    let (_, name) = holyc_frontend::decl::split_typed_name(&meta.name);
                    if name.is_empty() {
                        None
                    } else {
                        Some(name)
                    }
                }
                _ => None,
            })
            .collect()
    }
}

// --- dump -------------------------------------------------------------------

pub fn dump_module(module: &HirModule) -> String {
    let mut out = String::from("HIRModule\n");
    for item in &module.top_level_items {
        dump_stmt(item, 1, &mut out);
    }
    for fn_def in &module.functions {
        let _ = writeln!(out, "  Function: {} -> {}", fn_def.name, fn_def.return_ty);
        for (ty, name) in &fn_def.params {
            let _ = writeln!(out, "    Param: {ty} {name}");
        }
        for stmt in &fn_def.body {
            dump_stmt(stmt, 2, &mut out);
        }
    }

    out.push_str("  Reflection\n");
    for alias in &module.reflection.type_aliases {
        let _ = writeln!(out, "    TypeAlias: {alias}");
    }
    for field in &module.reflection.fields {
        let _ = write!(
            out,
            "    Field: {}.{} : {}",
            field.aggregate_name, field.field_name, field.field_type
        );
        if !field.annotations.is_empty() {
            let _ = write!(out, " [meta={}]", field.annotations.join(","));
        }
        out.push('\n');
    }
    out
}

fn indent(depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
}

fn dump_stmt(stmt: &HirStmt, depth: usize, out: &mut String) {
    indent(depth, out);
    match stmt {
        HirStmt::VarDecl(decl) => {
            let _ = write!(out, "VarDecl: {} [type={}] [storage={}]", decl.name, decl.ty,
                decl.storage.name());
            if decl.is_global {
                out.push_str(" [global]");
            }
            if decl.has_const_initializer {
                out.push_str(" [const-init]");
            }
            out.push('\n');
            if let Some(init) = &decl.init {
                dump_expr(init, depth + 1, out);
            }
        }
        HirStmt::Assign(assign) => {
            let _ = writeln!(out, "Assign: {} {}", assign.target, assign.op);
            dump_expr(&assign.value, depth + 1, out);
        }
        HirStmt::Return(value) => {
            out.push_str("Return\n");
            if let Some(value) = value {
                dump_expr(value, depth + 1, out);
            }
        }
        HirStmt::Expr(expr) => {
            out.push_str("Expr\n");
            dump_expr(expr, depth + 1, out);
        }
        HirStmt::NoParenCall { name, ty } => {
            let _ = writeln!(out, "NoParenCall: {name} [type={ty}]");
        }
        HirStmt::Print(print) => {
            out.push_str("Print\n");
            dump_expr(&print.format, depth + 1, out);
            for arg in &print.args {
                dump_expr(arg, depth + 1, out);
            }
        }
        HirStmt::Lock(body) => {
            out.push_str("Lock\n");
            for item in body {
                dump_stmt(item, depth + 1, out);
            }
        }
        HirStmt::Throw { payload, region_id } => {
            if *region_id >= 0 {
                let _ = writeln!(out, "Throw [region={region_id}]");
            } else {
                out.push_str("Throw\n");
            }
            dump_expr(payload, depth + 1, out);
        }
        HirStmt::TryCatch(try_catch) => {
            let _ = write!(out, "TryCatch [region={}]", try_catch.region_id);
            if try_catch.parent_region_id >= 0 {
                let _ = write!(out, " [parent-region={}]", try_catch.parent_region_id);
            }
            out.push('\n');
            for item in &try_catch.try_body {
                dump_stmt(item, depth + 1, out);
            }
            for item in &try_catch.catch_body {
                dump_stmt(item, depth + 1, out);
            }
        }
        HirStmt::Break => out.push_str("Break\n"),
        HirStmt::Switch(switch) => {
            out.push_str("Switch\n");
            dump_expr(&switch.cond, depth + 1, out);
            for case in &switch.cases {
                indent(depth + 1, out);
                match case.kind {
                    CaseKind::Single => {
                        let _ = writeln!(out, "Case: {}", case.begin);
                    }
                    CaseKind::Range => {
                        let _ = writeln!(out, "Case: {}...{}", case.begin, case.end);
                    }
                    CaseKind::Null => out.push_str("Case: (null)\n"),
                }
                for item in &case.body {
                    dump_stmt(item, depth + 2, out);
                }
            }
            if !switch.default_body.is_empty() {
                indent(depth + 1, out);
                out.push_str("Default\n");
                for item in &switch.default_body {
                    dump_stmt(item, depth + 2, out);
                }
            }
        }
        HirStmt::If(if_stmt) => {
            out.push_str("If\n");
            dump_expr(&if_stmt.cond, depth + 1, out);
            for item in &if_stmt.then_body {
                dump_stmt(item, depth + 1, out);
            }
            for item in &if_stmt.else_body {
                dump_stmt(item, depth + 1, out);
            }
        }
        HirStmt::While(loop_stmt) => {
            out.push_str("While\n");
            dump_expr(&loop_stmt.cond, depth + 1, out);
            for item in &loop_stmt.body {
                dump_stmt(item, depth + 1, out);
            }
        }
        HirStmt::DoWhile(loop_stmt) => {
            out.push_str("DoWhile\n");
            dump_expr(&loop_stmt.cond, depth + 1, out);
            for item in &loop_stmt.body {
                dump_stmt(item, depth + 1, out);
            }
        }
        HirStmt::Label(name) => {
            let _ = writeln!(out, "Label: {name}");
        }
        HirStmt::Goto(target) => {
            let _ = writeln!(out, "Goto: {target}");
        }
        HirStmt::InlineAsm(asm_stmt) => {
            let _ = writeln!(out, "InlineAsm: {}", asm_stmt.template);
            for operand in &asm_stmt.operands {
                indent(depth + 1, out);
                let _ = writeln!(out, "Constraint: {}", operand.constraint);
                if let Some(value) = &operand.value {
                    dump_expr(value, depth + 2, out);
                }
            }
        }
        HirStmt::MetadataDecl(meta) => {
            let _ = writeln!(out, "MetadataDecl: {}", meta.name);
            for line in &meta.payload {
                indent(depth + 1, out);
                let _ = writeln!(out, "Payload: {line}");
            }
        }
        HirStmt::LinkageDecl(linkage) => {
            let _ = writeln!(out, "LinkageDecl: {} {}", linkage.kind, linkage.symbol);
        }
    }
}

fn expr_kind_name(kind: HirExprKind) -> &'static str {
    match kind {
        HirExprKind::IntLiteral => "int-literal",
        HirExprKind::StringLiteral => "string-literal",
        HirExprKind::Dollar => "dollar",
        HirExprKind::Var => "var",
        HirExprKind::Assign => "assign",
        HirExprKind::Unary => "unary",
        HirExprKind::Binary => "binary",
        HirExprKind::Call => "call",
        HirExprKind::Cast => "cast",
        HirExprKind::Postfix => "postfix",
        HirExprKind::Lane => "lane",
        HirExprKind::Member => "member",
        HirExprKind::Index => "index",
        HirExprKind::Comma => "comma",
    }
}

fn dump_expr(expr: &HirExpr, depth: usize, out: &mut String) {
    indent(depth, out);
    let _ = write!(out, "Expr({})", expr_kind_name(expr.kind));
    if !expr.text.is_empty() {
        let _ = write!(out, ": {}", expr.text);
    }
    let _ = writeln!(out, " [type={}]", expr.ty);
    for child in &expr.children {
        dump_expr(child, depth + 1, out);
    }
}
