//! AST → HIR lowering.
//!
//! Consumes the typed tree and produces an [`HirModule`]. Signatures are
//! collected first so call sites can resolve default arguments (including
//! the `lastclass` sentinel); `for` loops, switch clauses, try/catch regions
//! and inline-asm operand lists are normalized into their closed HIR shapes.

use crate::hir::*;
use holyc_frontend::decl::{
    function_linkage, has_decl_modifier, is_import_linkage, split_typed_name, strip_decl_modifiers,
    typed_name_from_node, var_initializer,
};
use holyc_frontend::literals::{
    asm_constraint_needs_operand, asm_constraint_text, is_string_literal_text,
    parse_char_literal, quote_string_literal,
};
use holyc_frontend::preprocessor::parse_int_base0;
use holyc_frontend::{Diagnostic, Linkage, NodeKind, Ty, TypedNode};
use std::collections::HashMap;

type LowerResult<T> = Result<T, Diagnostic>;

const LINKAGE_DIRECTIVES: &[&str] =
    &["extern", "import", "_extern", "_import", "export", "_export"];

/// Lower a sema-checked program into HIR.
pub fn lower_to_hir(program: &TypedNode, filename: &str) -> LowerResult<HirModule> {
    let mut lowerer = HirLowerer::new(filename);
    lowerer.lower_module(program)
}

#[derive(Debug, Clone)]
struct LoweredParam {
    ty: Ty,
    name: String,
    has_default: bool,
    default_expr: Option<TypedNode>,
}

#[derive(Debug, Clone)]
struct LoweredSig {
    return_ty: Ty,
    params: Vec<LoweredParam>,
    linkage: Linkage,
    imported: bool,
}

struct HirLowerer {
    filename: String,
    functions: HashMap<String, LoweredSig>,
    function_order: Vec<String>,
    next_exception_region_id: i32,
    exception_region_stack: Vec<i32>,
}

impl HirLowerer {
    fn new(filename: &str) -> Self {
        HirLowerer {
            filename: filename.to_string(),
            functions: HashMap::new(),
            function_order: Vec::new(),
            next_exception_region_id: 1,
            exception_region_stack: Vec::new(),
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> Diagnostic {
        Diagnostic::error("HC4001", &self.filename, 0, 0, msg.to_string())
    }

    fn lower_module(&mut self, program: &TypedNode) -> LowerResult<HirModule> {
        self.collect_function_signatures(program)?;

        let mut module = HirModule::default();

        for child in &program.children {
            match child.kind {
                NodeKind::FunctionDecl => {
                    if child.find_child(NodeKind::Block).is_none() {
                        continue;
                    }
                    let lowered = self.lower_function(child)?;
                    module.functions.push(lowered);
                }

                NodeKind::ClassDecl => {
                    collect_class_reflection(child, &mut module.reflection);
                    let payload = child
                        .children
                        .iter()
                        .filter(|meta| meta.kind != NodeKind::VarDecl)
                        .map(|meta| meta.text.clone())
                        .collect();
                    module.top_level_items.push(HirStmt::MetadataDecl(HirMetadataDecl {
                        name: child.text.clone(),
                        payload,
                    }));

                    for trailing in &child.children {
                        if trailing.kind == NodeKind::VarDecl {
                            self.lower_stmt(trailing, &mut module.top_level_items, true)?;
                        }
                    }
                }

                NodeKind::TypeAliasDecl => {
                    module.reflection.type_aliases.push(child.text.clone());
                    module.top_level_items.push(HirStmt::MetadataDecl(HirMetadataDecl {
                        name: "typedef".to_string(),
                        payload: vec![child.text.clone()],
                    }));
                }

                NodeKind::LinkageDecl => {
                    let symbol =
                        child.children.first().map(|c| c.text.clone()).unwrap_or_default();
                    module.top_level_items.push(HirStmt::LinkageDecl(HirLinkageDecl {
                        kind: child.text.clone(),
                        symbol,
                    }));
                }

                NodeKind::ExprStmt
                    if child
                        .children
                        .first()
                        .is_some_and(|expr| expr.kind == NodeKind::Identifier) =>
                {
                    let directive = &child.children[0].text;
                    if LINKAGE_DIRECTIVES.contains(&directive.as_str()) {
                        module.top_level_items.push(HirStmt::LinkageDecl(HirLinkageDecl {
                            kind: directive.clone(),
                            symbol: String::new(),
                        }));
                    } else {
                        self.lower_stmt(child, &mut module.top_level_items, true)?;
                    }
                }

                NodeKind::StartLabel | NodeKind::EndLabel => {
                    module.top_level_items.push(HirStmt::MetadataDecl(HirMetadataDecl {
                        name: child.kind.to_string(),
                        payload: Vec::new(),
                    }));
                }

                _ => {
                    self.lower_stmt(child, &mut module.top_level_items, true)?;
                }
            }
        }

        module.function_decls.reserve(self.function_order.len());
        for fn_name in &self.function_order {
            let Some(sig) = self.functions.get(fn_name) else {
                continue;
            };
            module.function_decls.push(HirFunctionDecl {
                name: fn_name.clone(),
                return_ty: sig.return_ty.clone(),
                linkage: sig.linkage,
                params: sig.params.iter().map(|p| (p.ty.clone(), p.name.clone())).collect(),
            });
        }
        Ok(module)
    }

    fn collect_function_signatures(&mut self, program: &TypedNode) -> LowerResult<()> {
        for child in &program.children {
            if child.kind != NodeKind::FunctionDecl {
                continue;
            }

            let (ret_text, fn_name) = typed_name_from_node(child);
            if fn_name.is_empty() {
                return Err(
                    self.error(format!("invalid function declaration in lowering: {}", child.text))
                );
            }

            let mut sig = LoweredSig {
                return_ty: Ty::parse(&strip_decl_modifiers(&ret_text)),
                params: Vec::new(),
                linkage: function_linkage(&ret_text),
                imported: is_import_linkage(&ret_text),
            };

            if let Some(params) = child.find_child(NodeKind::ParamList) {
                for p in &params.children {
                    let (param_text, param_name) = typed_name_from_node(p);
                    if param_name.is_empty() {
                        return Err(
                            self.error(format!("invalid function parameter in lowering: {}", p.text))
                        );
                    }
                    let default = p.find_child(NodeKind::DefaultArg);
                    let default_expr = match default {
                        Some(default_node) => {
                            let Some(expr) = default_node.children.first() else {
                                return Err(self.error(format!(
                                    "invalid default argument expression in lowering: {}",
                                    p.text
                                )));
                            };
                            Some(expr.clone())
                        }
                        None => None,
                    };
                    sig.params.push(LoweredParam {
                        ty: Ty::parse(&strip_decl_modifiers(&param_text)),
                        name: param_name,
                        has_default: default.is_some(),
                        default_expr,
                    });
                }
            }

            let has_body = child.find_child(NodeKind::Block).is_some();
            match self.functions.get(&fn_name) {
                None => {
                    self.functions.insert(fn_name.clone(), sig.clone());
                    self.function_order.push(fn_name.clone());
                }
                Some(existing) => {
                    let same = existing.return_ty == sig.return_ty
                        && existing.params.len() == sig.params.len()
                        && existing
                            .params
                            .iter()
                            .zip(sig.params.iter())
                            .all(|(a, b)| a.ty == b.ty && a.name == b.name);
                    if !same {
                        return Err(self
                            .error(format!("conflicting function declaration in lowering: {fn_name}")));
                    }
                    if existing.linkage != sig.linkage {
                        return Err(
                            self.error(format!("conflicting function linkage in lowering: {fn_name}"))
                        );
                    }
                }
            }

            if has_body && sig.imported {
                return Err(self.error(format!(
                    "import linkage function cannot have a definition in lowering: {fn_name}"
                )));
            }
        }
        Ok(())
    }

    fn lower_function(&mut self, fn_node: &TypedNode) -> LowerResult<HirFunction> {
        let (ret_text, fn_name) = typed_name_from_node(fn_node);
        if fn_name.is_empty() {
            return Err(self.error(format!("invalid function in HIR lowering: {}", fn_node.text)));
        }

        let linkage = match self.functions.get(&fn_name) {
            Some(sig) => sig.linkage,
            None => function_linkage(&ret_text),
        };
        let mut out = HirFunction {
            name: fn_name,
            return_ty: Ty::parse(&strip_decl_modifiers(&ret_text)),
            linkage,
            params: Vec::new(),
            body: Vec::new(),
        };
        self.next_exception_region_id = 1;
        self.exception_region_stack.clear();

        if let Some(params) = fn_node.find_child(NodeKind::ParamList) {
            for p in &params.children {
                let (p_text, p_name) = typed_name_from_node(p);
                if p_name.is_empty() {
                    return Err(self.error(format!("invalid parameter in HIR lowering: {}", p.text)));
                }
                out.params.push((Ty::parse(&strip_decl_modifiers(&p_text)), p_name));
            }
        }

        let Some(body) = fn_node.find_child(NodeKind::Block) else {
            return Err(
                self.error(format!("missing function body in HIR lowering: {}", fn_node.text))
            );
        };

        for stmt in &body.children {
            self.lower_stmt(stmt, &mut out.body, false)?;
        }
        Ok(out)
    }

    fn lower_stmt(
        &mut self,
        stmt: &TypedNode,
        out: &mut Vec<HirStmt>,
        top_level: bool,
    ) -> LowerResult<()> {
        match stmt.kind {
            NodeKind::EmptyStmt => Ok(()),

            NodeKind::VarDeclList => {
                for child in &stmt.children {
                    if child.kind == NodeKind::VarDecl {
                        self.lower_stmt(child, out, top_level)?;
                    }
                }
                Ok(())
            }

            NodeKind::Lock => {
                let mut body = Vec::new();
                for child in &stmt.children {
                    self.lower_stmt(child, &mut body, false)?;
                }
                out.push(HirStmt::Lock(body));
                Ok(())
            }

            NodeKind::VarDecl => {
                let (ty_text, name) = typed_name_from_node(stmt);
                let is_static = has_decl_modifier(&stmt.text, "static");
                let storage = match (top_level, is_static) {
                    (true, true) => StorageClass::StaticGlobal,
                    (true, false) => StorageClass::Global,
                    (false, true) => StorageClass::StaticLocal,
                    (false, false) => StorageClass::Local,
                };
                let init = var_initializer(stmt);
                let lowered_init = match init {
                    Some(init) => Some(self.lower_expr(init)?),
                    None => None,
                };
                out.push(HirStmt::VarDecl(HirVarDecl {
                    name,
                    ty: Ty::parse(&strip_decl_modifiers(&ty_text)),
                    storage,
                    is_global: top_level,
                    has_const_initializer: init.is_some_and(is_const_initializer_expr),
                    init: lowered_init,
                }));
                Ok(())
            }

            NodeKind::Return => {
                let value = match stmt.children.first() {
                    Some(expr) => Some(self.lower_expr(expr)?),
                    None => None,
                };
                out.push(HirStmt::Return(value));
                Ok(())
            }

            NodeKind::Break => {
                out.push(HirStmt::Break);
                Ok(())
            }

            NodeKind::Throw => {
                let region_id = self.exception_region_stack.last().copied().unwrap_or(-1);
                let Some(payload) = stmt.children.first() else {
                    return Err(self.error("throw requires payload expression in lowering"));
                };
                let payload = self.lower_expr(payload)?;
                out.push(HirStmt::Throw { payload, region_id });
                Ok(())
            }

            NodeKind::Asm => self.lower_inline_asm(stmt, out),

            NodeKind::Try => {
                let parent_region_id = self.exception_region_stack.last().copied().unwrap_or(-1);
                let region_id = self.next_exception_region_id;
                self.next_exception_region_id += 1;

                let mut try_body = Vec::new();
                self.exception_region_stack.push(region_id);
                if let Some(body) = stmt.children.first() {
                    self.lower_stmt(body, &mut try_body, false)?;
                }
                self.exception_region_stack.pop();

                // The catch body runs with the parent region on the stack, so
                // a throw inside catch escapes to the outer region.
                let mut catch_body = Vec::new();
                if let Some(handler) = stmt.children.get(1) {
                    if parent_region_id >= 0 {
                        self.exception_region_stack.push(parent_region_id);
                        self.lower_stmt(handler, &mut catch_body, false)?;
                        self.exception_region_stack.pop();
                    } else {
                        self.lower_stmt(handler, &mut catch_body, false)?;
                    }
                }

                out.push(HirStmt::TryCatch(HirTryCatch {
                    try_body,
                    catch_body,
                    region_id,
                    parent_region_id,
                }));
                Ok(())
            }

            NodeKind::If => {
                let cond = match stmt.children.first() {
                    Some(cond) => self.lower_expr(cond)?,
                    None => HirExpr::int_literal("1"),
                };
                let mut then_body = Vec::new();
                if let Some(then_stmt) = stmt.children.get(1) {
                    self.lower_stmt(then_stmt, &mut then_body, false)?;
                }
                let mut else_body = Vec::new();
                if let Some(else_stmt) = stmt.children.get(2) {
                    self.lower_stmt(else_stmt, &mut else_body, false)?;
                }
                out.push(HirStmt::If(HirIf { cond, then_body, else_body }));
                Ok(())
            }

            NodeKind::While => {
                let cond = match stmt.children.first() {
                    Some(cond) => self.lower_expr(cond)?,
                    None => HirExpr::int_literal("1"),
                };
                let mut body = Vec::new();
                if let Some(body_stmt) = stmt.children.get(1) {
                    self.lower_stmt(body_stmt, &mut body, false)?;
                }
                out.push(HirStmt::While(HirLoop { cond, body }));
                Ok(())
            }

            NodeKind::DoWhile => {
                let mut body = Vec::new();
                if let Some(body_stmt) = stmt.children.first() {
                    self.lower_stmt(body_stmt, &mut body, false)?;
                }
                let cond = match stmt.children.get(1) {
                    Some(cond) => self.lower_expr(cond)?,
                    None => HirExpr::int_literal("1"),
                };
                out.push(HirStmt::DoWhile(HirLoop { cond, body }));
                Ok(())
            }

            NodeKind::For => {
                if let Some(init) = stmt.children.first() {
                    if init.kind != NodeKind::ForInit {
                        self.lower_expr_as_stmt(init, out)?;
                    }
                }

                let cond = match stmt.children.get(1) {
                    Some(cond) if cond.kind != NodeKind::ForCond => self.lower_expr(cond)?,
                    _ => HirExpr::int_literal("1"),
                };

                let mut body = Vec::new();
                if let Some(body_stmt) = stmt.children.get(3) {
                    self.lower_stmt(body_stmt, &mut body, false)?;
                }
                if let Some(inc) = stmt.children.get(2) {
                    if inc.kind != NodeKind::ForInc {
                        self.lower_expr_as_stmt(inc, &mut body)?;
                    }
                }

                out.push(HirStmt::While(HirLoop { cond, body }));
                Ok(())
            }

            NodeKind::Switch => self.lower_switch(stmt, out),

            NodeKind::Label => {
                out.push(HirStmt::Label(stmt.text.clone()));
                if let Some(inner) = stmt.children.first() {
                    self.lower_stmt(inner, out, false)?;
                }
                Ok(())
            }

            NodeKind::Goto => {
                out.push(HirStmt::Goto(stmt.text.clone()));
                Ok(())
            }

            NodeKind::ClassDecl => {
                out.push(HirStmt::MetadataDecl(HirMetadataDecl {
                    name: stmt.text.clone(),
                    payload: stmt.children.iter().map(|meta| meta.text.clone()).collect(),
                }));
                Ok(())
            }

            NodeKind::TypeAliasDecl => {
                out.push(HirStmt::MetadataDecl(HirMetadataDecl {
                    name: "typedef".to_string(),
                    payload: vec![stmt.text.clone()],
                }));
                Ok(())
            }

            NodeKind::LinkageDecl => {
                let symbol = stmt.children.first().map(|c| c.text.clone()).unwrap_or_default();
                out.push(HirStmt::LinkageDecl(HirLinkageDecl {
                    kind: stmt.text.clone(),
                    symbol,
                }));
                Ok(())
            }

            NodeKind::NoParenCallStmt => {
                let Some(callee) = stmt.children.first() else {
                    return Err(self.error("invalid no-paren call statement"));
                };
                if callee.kind != NodeKind::Identifier {
                    return Err(self.error("invalid no-paren call statement"));
                }
                out.push(HirStmt::NoParenCall {
                    name: callee.text.clone(),
                    ty: stmt.ty_or_i64(),
                });
                Ok(())
            }

            NodeKind::PrintStmt => {
                if stmt.children.is_empty() {
                    return Err(self.error("invalid print statement in lowering"));
                }
                // Normalize the dynamic-forwarding form `"" fmt,*args`.
                let (format_index, arg_begin) = if stmt.children.len() > 1
                    && stmt.children[0].kind == NodeKind::Literal
                    && stmt.children[0].text.trim() == "\"\""
                {
                    (1usize, 2usize)
                } else {
                    (0usize, 1usize)
                };

                let format_node = &stmt.children[format_index];
                let format = self.lower_expr(format_node)?;
                let literal = if format_node.kind == NodeKind::Literal {
                    Some(format_node.text.clone())
                } else {
                    None
                };
                let mut args = Vec::with_capacity(stmt.children.len().saturating_sub(arg_begin));
                for arg in &stmt.children[arg_begin..] {
                    args.push(self.lower_expr(arg)?);
                }
                out.push(HirStmt::Print(HirPrint { format, literal, args }));
                Ok(())
            }

            NodeKind::ExprStmt => {
                let Some(expr) = stmt.children.first() else {
                    return Ok(());
                };
                self.lower_expr_as_stmt(expr, out)
            }

            NodeKind::Block => {
                for child in &stmt.children {
                    self.lower_stmt(child, out, false)?;
                }
                Ok(())
            }

            // Parser markers for HolyC switch compatibility; not emitted as
            // executable statements.
            NodeKind::StartLabel | NodeKind::EndLabel => Ok(()),

            other => Err(self.error(format!("unsupported statement in lowering: {other}"))),
        }
    }

    fn lower_switch(&mut self, stmt: &TypedNode, out: &mut Vec<HirStmt>) -> LowerResult<()> {
        let cond = match stmt.children.first() {
            Some(cond) => self.lower_expr(cond)?,
            None => HirExpr::int_literal("0"),
        };

        let mut switch = HirSwitch { cond, cases: Vec::new(), default_body: Vec::new() };

        if let Some(body) = stmt.children.get(1) {
            if body.kind == NodeKind::Block {
                for item in &body.children {
                    match item.kind {
                        NodeKind::CaseClause => {
                            let kind = match item.text.as_str() {
                                "null-case" => CaseKind::Null,
                                "range-case" => CaseKind::Range,
                                _ => CaseKind::Single,
                            };

                            let mut begin = 0i64;
                            let mut end = 0i64;
                            if !item.children.is_empty() {
                                if kind != CaseKind::Null {
                                    begin = self.parse_const_int_expr(&item.children[0])?;
                                    end = begin;
                                }
                                if kind == CaseKind::Range && item.children.len() > 1 {
                                    end = self.parse_const_int_expr(&item.children[1])?;
                                }
                            }

                            let mut body_stmts = Vec::new();
                            if let Some(first_stmt) = item.children.last() {
                                self.lower_stmt(first_stmt, &mut body_stmts, false)?;
                            }
                            switch.cases.push(SwitchCase { kind, begin, end, body: body_stmts });
                        }

                        NodeKind::DefaultClause => {
                            if let Some(inner) = item.children.first() {
                                self.lower_stmt(inner, &mut switch.default_body, false)?;
                            }
                        }

                        _ => {
                            // Statements between clauses attach to the case
                            // in flight, or to the default body before one.
                            match switch.cases.last_mut() {
                                Some(case) => self.lower_stmt(item, &mut case.body, false)?,
                                None => self.lower_stmt(item, &mut switch.default_body, false)?,
                            }
                        }
                    }
                }
            }
        }

        out.push(HirStmt::Switch(switch));
        Ok(())
    }

    fn lower_inline_asm(&mut self, stmt: &TypedNode, out: &mut Vec<HirStmt>) -> LowerResult<()> {
        let mut template = stmt.text.clone();
        let mut operands: Vec<AsmOperand> = Vec::new();

        if !stmt.children.is_empty() {
            if let Some(template_expr) = stmt.children[0].children.first() {
                template = template_expr.text.clone();
            }

            let mut awaiting_operand = false;
            for arg in &stmt.children[1..] {
                let Some(arg_expr) = arg.children.first() else {
                    return Err(self.error("invalid inline asm argument in HIR lowering"));
                };
                if is_string_literal_text(&arg_expr.text) {
                    if awaiting_operand {
                        let last = operands.last().expect("awaiting implies a prior constraint");
                        return Err(self.error(format!(
                            "inline asm input constraint requires operand in HIR lowering: {}",
                            asm_constraint_text(&last.constraint)
                        )));
                    }
                    awaiting_operand = asm_constraint_needs_operand(&arg_expr.text);
                    operands.push(AsmOperand { constraint: arg_expr.text.clone(), value: None });
                    continue;
                }

                if !awaiting_operand || operands.is_empty() {
                    return Err(
                        self.error("inline asm operand must follow input constraint in HIR lowering")
                    );
                }
                let value = self.lower_expr(arg_expr)?;
                operands.last_mut().expect("checked non-empty").value = Some(value);
                awaiting_operand = false;
            }

            if awaiting_operand {
                let last = operands.last().expect("awaiting implies a prior constraint");
                return Err(self.error(format!(
                    "inline asm input constraint requires operand in HIR lowering: {}",
                    asm_constraint_text(&last.constraint)
                )));
            }
        }

        out.push(HirStmt::InlineAsm(HirInlineAsm { template, operands }));
        Ok(())
    }

    fn lower_expr_as_stmt(&mut self, expr: &TypedNode, out: &mut Vec<HirStmt>) -> LowerResult<()> {
        if expr.kind == NodeKind::Assign
            && expr.children.len() == 2
            && expr.children[0].kind == NodeKind::Identifier
        {
            let value = self.lower_expr(&expr.children[1])?;
            out.push(HirStmt::Assign(HirAssign {
                target: expr.children[0].text.clone(),
                op: expr.text.clone(),
                value,
                ty: expr.ty.clone(),
            }));
            return Ok(());
        }

        let lowered = self.lower_expr(expr)?;
        out.push(HirStmt::Expr(lowered));
        Ok(())
    }

    fn lower_expr(&mut self, expr: &TypedNode) -> LowerResult<HirExpr> {
        match expr.kind {
            NodeKind::Literal => {
                if expr.text.as_bytes().first().is_some_and(|c| c.is_ascii_digit()) {
                    return Ok(HirExpr::int_literal(expr.text.clone()));
                }
                if expr.text.starts_with('\'') {
                    return Ok(HirExpr::int_literal(parse_char_literal(&expr.text).to_string()));
                }
                if expr.text.starts_with('"') {
                    return Ok(HirExpr::new(
                        HirExprKind::StringLiteral,
                        expr.text.clone(),
                        Ty::u8_ptr(),
                    ));
                }
                Err(self.error(format!("unsupported literal in lowering: {}", expr.text)))
            }

            NodeKind::Dollar => Ok(HirExpr::new(
                HirExprKind::Dollar,
                if expr.text.is_empty() { "$" } else { &expr.text },
                Ty::I64,
            )),

            NodeKind::Identifier => {
                Ok(HirExpr::new(HirExprKind::Var, expr.text.clone(), expr.ty_or_i64()))
            }

            NodeKind::Assign => {
                if expr.children.len() != 2 {
                    return Err(self.error("invalid assignment expression in lowering"));
                }
                let lhs = self.lower_expr(&expr.children[0])?;
                let rhs = self.lower_expr(&expr.children[1])?;
                Ok(HirExpr::new(HirExprKind::Assign, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![lhs, rhs]))
            }

            NodeKind::Unary => {
                if expr.children.len() != 1 {
                    return Err(self.error("invalid unary expression in lowering"));
                }
                let operand = self.lower_expr(&expr.children[0])?;
                Ok(HirExpr::new(HirExprKind::Unary, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![operand]))
            }

            NodeKind::Binary => {
                if expr.children.len() != 2 {
                    return Err(self.error("invalid binary expression in lowering"));
                }
                let lhs = self.lower_expr(&expr.children[0])?;
                let rhs = self.lower_expr(&expr.children[1])?;
                Ok(HirExpr::new(HirExprKind::Binary, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![lhs, rhs]))
            }

            NodeKind::Cast => {
                if expr.children.len() != 1 {
                    return Err(self.error("invalid cast expression in lowering"));
                }
                let value = self.lower_expr(&expr.children[0])?;
                Ok(HirExpr::new(HirExprKind::Cast, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![value]))
            }

            NodeKind::Postfix => {
                if expr.children.len() != 1 {
                    return Err(self.error("invalid postfix expression in lowering"));
                }
                let operand = self.lower_expr(&expr.children[0])?;
                Ok(HirExpr::new(HirExprKind::Postfix, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![operand]))
            }

            NodeKind::Lane => {
                if expr.children.len() != 2 {
                    return Err(self.error("invalid lane expression in lowering"));
                }
                let base = self.lower_expr(&expr.children[0])?;
                let index = self.lower_expr(&expr.children[1])?;
                Ok(HirExpr::new(HirExprKind::Lane, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![base, index]))
            }

            NodeKind::Member => {
                if expr.children.len() != 1 {
                    return Err(self.error("invalid member expression in lowering"));
                }
                let base = self.lower_expr(&expr.children[0])?;
                Ok(HirExpr::new(HirExprKind::Member, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![base]))
            }

            NodeKind::Index => {
                if expr.children.len() != 2 {
                    return Err(self.error("invalid index expression in lowering"));
                }
                let base = self.lower_expr(&expr.children[0])?;
                let index = self.lower_expr(&expr.children[1])?;
                Ok(HirExpr::new(HirExprKind::Index, expr.text.clone(), expr.ty_or_i64())
                    .with_children(vec![base, index]))
            }

            NodeKind::Call => self.lower_call_expr(expr),

            NodeKind::Comma => {
                if expr.children.is_empty() {
                    return Err(self.error("invalid empty comma expression in lowering"));
                }
                let mut children = Vec::with_capacity(expr.children.len());
                for child in &expr.children {
                    children.push(self.lower_expr(child)?);
                }
                Ok(HirExpr::new(HirExprKind::Comma, ",", expr.ty_or_i64()).with_children(children))
            }

            other => Err(self.error(format!("unsupported expression in lowering: {other}"))),
        }
    }

    fn lower_call_expr(&mut self, expr: &TypedNode) -> LowerResult<HirExpr> {
        if expr.children.len() < 2 {
            return Err(self.error("invalid call expression in lowering"));
        }
        if expr.children[1].kind != NodeKind::CallArgs {
            return Err(self.error("invalid call argument list in lowering"));
        }

        let callee_expr = &expr.children[0];
        let arg_list = &expr.children[1];

        let mut direct_call = false;
        if callee_expr.kind == NodeKind::Identifier {
            if self.functions.contains_key(&callee_expr.text) {
                direct_call = true;
            } else {
                let callee_ty = callee_expr.ty_or_i64();
                let typed_callable_pointer =
                    callee_ty.is_pointer() || matches!(callee_ty.kind, holyc_frontend::TyKind::Fn(_));
                if !typed_callable_pointer {
                    // Synthesize an external signature from the call site; the
                    // arity is inferred from the arguments.
                    let mut params = Vec::new();
                    for (arg_idx, arg) in arg_list.children.iter().enumerate() {
                        if arg.kind == NodeKind::EmptyArg {
                            return Err(self.error(format!(
                                "cannot synthesize signature for default-argument call: {}",
                                callee_expr.text
                            )));
                        }
                        params.push(LoweredParam {
                            ty: arg.ty_or_i64(),
                            name: format!("p{arg_idx}"),
                            has_default: false,
                            default_expr: None,
                        });
                    }
                    self.functions.insert(
                        callee_expr.text.clone(),
                        LoweredSig {
                            return_ty: expr.ty_or_i64(),
                            params,
                            linkage: Linkage::External,
                            imported: false,
                        },
                    );
                    self.function_order.push(callee_expr.text.clone());
                    direct_call = true;
                }
            }
        }

        if !direct_call {
            let mut call = HirExpr::new(HirExprKind::Call, "", expr.ty_or_i64());
            call.children.push(self.lower_expr(callee_expr)?);
            for arg in &arg_list.children {
                if arg.kind == NodeKind::EmptyArg {
                    return Err(self.error("indirect call does not support sparse/default arguments"));
                }
                call.children.push(self.lower_expr(arg)?);
            }
            return Ok(call);
        }

        let fn_name = callee_expr.text.clone();
        let sig = self.functions.get(&fn_name).cloned().expect("checked direct call");

        let mut call = HirExpr::new(HirExprKind::Call, fn_name.clone(), expr.ty_or_i64());
        let mut resolved_arg_types: Vec<Ty> = Vec::with_capacity(sig.params.len());

        let mut param_idx = 0usize;
        for arg in &arg_list.children {
            if param_idx >= sig.params.len() {
                return Err(self.error(format!("too many arguments in lowering call: {fn_name}")));
            }

            if arg.kind == NodeKind::EmptyArg {
                let param = &sig.params[param_idx];
                if !param.has_default {
                    return Err(self.error(format!(
                        "missing default argument during lowering for function: {fn_name}"
                    )));
                }
                call.children.push(self.resolve_default_arg(
                    param,
                    param_idx,
                    &resolved_arg_types,
                    &fn_name,
                )?);
                resolved_arg_types.push(param.ty.clone());
                param_idx += 1;
                continue;
            }

            call.children.push(self.lower_expr(arg)?);
            resolved_arg_types
                .push(arg.ty.clone().unwrap_or_else(|| sig.params[param_idx].ty.clone()));
            param_idx += 1;
        }

        while param_idx < sig.params.len() {
            let param = &sig.params[param_idx];
            if !param.has_default {
                return Err(self.error(format!(
                    "missing required trailing argument during lowering for function: {fn_name}"
                )));
            }
            call.children.push(self.resolve_default_arg(
                param,
                param_idx,
                &resolved_arg_types,
                &fn_name,
            )?);
            resolved_arg_types.push(param.ty.clone());
            param_idx += 1;
        }

        Ok(call)
    }

    fn resolve_default_arg(
        &mut self,
        param: &LoweredParam,
        param_idx: usize,
        resolved_arg_types: &[Ty],
        fn_name: &str,
    ) -> LowerResult<HirExpr> {
        let Some(default_expr) = &param.default_expr else {
            return Err(
                self.error(format!("missing default argument during lowering for function: {fn_name}"))
            );
        };

        if is_lastclass_default(default_expr) {
            if param_idx == 0 || resolved_arg_types.is_empty() {
                return Err(
                    self.error(format!("lastclass default requires a previous argument type: {fn_name}"))
                );
            }
            let lastclass = resolved_arg_types[param_idx - 1].base_name();
            return Ok(HirExpr::new(
                HirExprKind::StringLiteral,
                quote_string_literal(&lastclass),
                Ty::u8_ptr(),
            ));
        }

        self.lower_expr(default_expr)
    }

    fn parse_const_int_expr(&self, node: &TypedNode) -> LowerResult<i64> {
        if node.kind != NodeKind::Literal {
            return Err(self.error("switch case requires literal constants"));
        }
        if node.text.starts_with('\'') {
            return Ok(parse_char_literal(&node.text));
        }
        parse_int_base0(&node.text)
            .ok_or_else(|| self.error(format!("invalid integer literal: {}", node.text)))
    }
}

fn is_lastclass_default(expr: &TypedNode) -> bool {
    expr.kind == NodeKind::Identifier && expr.text == "lastclass"
}

fn is_const_initializer_expr(node: &TypedNode) -> bool {
    match node.kind {
        NodeKind::Literal => true,
        NodeKind::Unary | NodeKind::Cast => {
            node.children.len() == 1 && is_const_initializer_expr(&node.children[0])
        }
        NodeKind::Binary => {
            node.children.len() == 2
                && is_const_initializer_expr(&node.children[0])
                && is_const_initializer_expr(&node.children[1])
        }
        NodeKind::Comma => {
            !node.children.is_empty() && node.children.iter().all(is_const_initializer_expr)
        }
        _ => false,
    }
}

fn collect_class_reflection(class_node: &TypedNode, table: &mut HirReflectionTable) {
    let (_, class_name) = split_typed_name(&class_node.text);
    if class_name.is_empty() {
        return;
    }

    for field in &class_node.children {
        if field.kind != NodeKind::FieldDecl {
            continue;
        }
        let (field_type, field_name) = typed_name_from_node(field);
        if field_name.is_empty() {
            continue;
        }

        let normalized = strip_decl_modifiers(&field_type);
        let annotations = field
            .find_child(NodeKind::FieldMetaTokens)
            .map(|meta| meta.text.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        table.fields.push(HirReflectionField {
            aggregate_name: class_name.clone(),
            field_name,
            field_type: if normalized.is_empty() { "I64".to_string() } else { normalized },
            annotations,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holyc_frontend::parser::parse;
    use holyc_frontend::sema::analyze;

    fn lower(source: &str) -> HirModule {
        let program = parse(source, "test.hc").expect("parse");
        let typed = analyze(&program, "test.hc", true).expect("sema");
        lower_to_hir(&typed, "test.hc").expect("lower")
    }

    fn body_of<'m>(module: &'m HirModule, name: &str) -> &'m [HirStmt] {
        &module.functions.iter().find(|f| f.name == name).expect("function").body
    }

    #[test]
    fn for_loop_normalizes_to_while() {
        let module = lower("U0 F() { I64 i; for (i = 0; i < 3; i++) { \"x\"; } }");
        let body = body_of(&module, "F");
        // decl, init assign, while
        assert!(matches!(body[1], HirStmt::Assign(_)));
        let HirStmt::While(loop_stmt) = &body[2] else {
            panic!("expected While, got {:?}", body[2]);
        };
        // increment lands at the end of the loop body
        assert!(matches!(loop_stmt.body.last(), Some(HirStmt::Expr(e)) if e.kind == HirExprKind::Postfix));
    }

    #[test]
    fn for_loop_missing_cond_becomes_true() {
        let module = lower("U0 F() { for (;;) break; }");
        let HirStmt::While(loop_stmt) = &body_of(&module, "F")[0] else {
            panic!("expected While");
        };
        assert_eq!(loop_stmt.cond.text, "1");
    }

    #[test]
    fn nested_try_regions_are_depth_first() {
        let module = lower(
            "U0 F() { try { try { throw(1); } catch { throw(2); } } catch { return; } }",
        );
        let HirStmt::TryCatch(outer) = &body_of(&module, "F")[0] else {
            panic!("expected TryCatch");
        };
        assert_eq!(outer.region_id, 1);
        assert_eq!(outer.parent_region_id, -1);
        let HirStmt::TryCatch(inner) = &outer.try_body[0] else {
            panic!("expected nested TryCatch");
        };
        assert_eq!(inner.region_id, 2);
        assert_eq!(inner.parent_region_id, 1);
        // A throw inside the inner catch targets the outer region.
        let HirStmt::Throw { region_id, .. } = &inner.catch_body[0] else {
            panic!("expected Throw");
        };
        assert_eq!(*region_id, 1);
    }

    #[test]
    fn switch_cases_become_records() {
        let module = lower(
            "U0 F(I64 x) { switch (x) { case 1: \"a\"; case 3...5: \"b\"; case: \"c\"; default: \"d\"; } }",
        );
        let HirStmt::Switch(switch) = &body_of(&module, "F")[0] else {
            panic!("expected Switch");
        };
        assert_eq!(switch.cases.len(), 3);
        assert_eq!(switch.cases[0].kind, CaseKind::Single);
        assert_eq!(switch.cases[0].begin, 1);
        assert_eq!(switch.cases[1].kind, CaseKind::Range);
        assert_eq!((switch.cases[1].begin, switch.cases[1].end), (3, 5));
        assert_eq!(switch.cases[2].kind, CaseKind::Null);
        assert!(!switch.default_body.is_empty());
    }

    #[test]
    fn default_arguments_fill_in() {
        let module = lower("I64 G(I64 a, I64 b=7) { return a+b; } U0 F() { G(1); G(2,); }");
        let body = body_of(&module, "F");
        for stmt in body.iter().take(2) {
            let HirStmt::Expr(call) = stmt else { panic!("expected call") };
            assert_eq!(call.children.len(), 2);
            assert_eq!(call.children[1].text, "7");
        }
    }

    #[test]
    fn lastclass_default_resolves_to_type_name() {
        let module = lower(
            "class CPoint { I64 x; } \
             U0 Rep(U8 *p, U8 *cls=lastclass) { return; } \
             U0 F(CPoint *pt) { Rep(pt); }",
        );
        let body = body_of(&module, "F");
        let HirStmt::Expr(call) = &body[0] else { panic!("expected call") };
        assert_eq!(call.children[1].kind, HirExprKind::StringLiteral);
        assert_eq!(call.children[1].text, "\"CPoint\"");
    }

    #[test]
    fn opaque_callee_synthesizes_signature() {
        // `job` types as the opaque `FsCtx`, so the lowerer synthesizes an
        // external signature from the call site.
        let module = lower("U0 F(FsCtx job) { job(1, 2); }");
        let decl = module
            .function_decls
            .iter()
            .find(|d| d.name == "job")
            .expect("synthesized decl");
        assert_eq!(decl.params.len(), 2);
    }

    #[test]
    fn class_decl_feeds_reflection_table() {
        let module = lower("class CPoint { I64 x \"fmt\" 8; I64 y; } CPoint origin;");
        assert_eq!(module.reflection.fields.len(), 2);
        let field = &module.reflection.fields[0];
        assert_eq!(field.aggregate_name, "CPoint");
        assert_eq!(field.field_name, "x");
        assert_eq!(field.annotations, vec!["\"fmt\"", "8"]);
        assert!(module
            .top_level_items
            .iter()
            .any(|item| matches!(item, HirStmt::VarDecl(d) if d.name == "origin" && d.is_global)));
    }

    #[test]
    fn const_initializer_detection() {
        let module = lower("I64 a = 2 + 3 * 4; I64 b = a;");
        let decls: Vec<&HirVarDecl> = module
            .top_level_items
            .iter()
            .filter_map(|item| match item {
                HirStmt::VarDecl(d) => Some(d),
                _ => None,
            })
            .collect();
        assert!(decls[0].has_const_initializer);
        assert!(!decls[1].has_const_initializer);
    }

    #[test]
    fn print_forwarding_shifts_format() {
        let module = lower("U0 F(U8 *fmt) { \"\" fmt, 1; }");
        let HirStmt::Print(print) = &body_of(&module, "F")[0] else {
            panic!("expected Print");
        };
        assert_eq!(print.format.kind, HirExprKind::Var);
        assert_eq!(print.args.len(), 1);
        assert!(print.literal.is_none());
    }

    #[test]
    fn function_decl_invariant_holds() {
        let module = lower("I64 Add(I64 a, I64 b) { return a + b; } I64 Main() { return Add(1, 2); }");
        for fn_def in &module.functions {
            let decl = module
                .function_decls
                .iter()
                .find(|d| d.name == fn_def.name)
                .expect("every function has a matching decl");
            assert_eq!(decl.return_ty, fn_def.return_ty);
            assert_eq!(decl.params, fn_def.params);
        }
    }
}
