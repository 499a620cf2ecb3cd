//! Semantic analysis.
//!
//! Walks the parsed tree depth-first and produces a [`TypedNode`] tree whose
//! `ty` fields are filled in. Responsibilities: two-pass symbol collection,
//! strict-mode modifier validation, expression typing, call and print-format
//! checking, control-flow legality (including goto analysis), and aggregate
//! layout computation. Running the analysis twice over the same input yields
//! identical types on every node.

use crate::ast::{Node, NodeKind, TypedNode};
use crate::decl::{
    function_linkage, has_decl_modifier, is_import_linkage, is_permissive_only_modifier,
    split_typed_name, strip_decl_modifiers, typed_name_from_node, var_initializer, Linkage,
};
use crate::diagnostics::Diagnostic;
use crate::literals::{
    asm_constraint_needs_operand, asm_constraint_text, decode_quoted_string, is_char_literal_text,
    is_string_literal_text,
};
use crate::preprocessor::parse_int_base0;
use crate::printfmt::{expected_arg_count, parse_format_atoms, FormatAtom};
use crate::types::{can_implicit_convert, promote_integer_result, LaneInfo, Ty, TyKind, ValueClass};
use std::collections::{HashMap, HashSet};

type SemaResult<T> = Result<T, Diagnostic>;

/// A parameter of a collected function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub ty: Ty,
    pub name: String,
    pub has_default: bool,
}

/// A collected function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub return_ty: Ty,
    pub name: String,
    pub params: Vec<ParamSig>,
    pub linkage: Linkage,
    pub imported: bool,
}

/// Analyze a parsed program, producing the typed tree.
pub fn analyze(program: &Node, filename: &str, strict_mode: bool) -> SemaResult<TypedNode> {
    let mut typed = TypedNode::from_parsed(program);
    let mut analyzer = SemanticAnalyzer::new(filename, strict_mode);
    analyzer.analyze(&mut typed)?;
    Ok(typed)
}

#[derive(Debug, Clone, Copy)]
struct LabelInfo {
    index: i32,
    depth: i32,
}

#[derive(Debug, Clone)]
struct GotoInfo {
    target: String,
    index: i32,
    depth: i32,
}

#[derive(Debug, Clone)]
struct InitDeclInfo {
    name: String,
    index: i32,
    depth: i32,
}

struct SemanticAnalyzer {
    filename: String,
    strict_mode: bool,
    current_return_ty: Option<Ty>,
    in_function: bool,
    functions: HashMap<String, FunctionSig>,
    function_definitions: HashSet<String>,
    global_symbols: HashMap<String, Ty>,
    imported_symbols: HashMap<String, Ty>,
    class_members: HashMap<String, HashMap<String, Ty>>,
    class_field_offsets: HashMap<String, HashMap<String, usize>>,
    class_layout_sizes: HashMap<String, usize>,
    scopes: Vec<HashMap<String, Ty>>,
    labels: HashSet<String>,
    goto_targets: Vec<String>,
    label_positions: HashMap<String, LabelInfo>,
    goto_infos: Vec<GotoInfo>,
    init_decl_infos: Vec<InitDeclInfo>,
}

impl SemanticAnalyzer {
    fn new(filename: &str, strict_mode: bool) -> Self {
        SemanticAnalyzer {
            filename: filename.to_string(),
            strict_mode,
            current_return_ty: None,
            in_function: false,
            functions: HashMap::new(),
            function_definitions: HashSet::new(),
            global_symbols: HashMap::new(),
            imported_symbols: HashMap::new(),
            class_members: HashMap::new(),
            class_field_offsets: HashMap::new(),
            class_layout_sizes: HashMap::new(),
            scopes: Vec::new(),
            labels: HashSet::new(),
            goto_targets: Vec::new(),
            label_positions: HashMap::new(),
            goto_infos: Vec::new(),
            init_decl_infos: Vec::new(),
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> Diagnostic {
        Diagnostic::error("HC3001", &self.filename, 0, 0, format!("semantic error: {msg}"))
    }

    fn analyze(&mut self, program: &mut TypedNode) -> SemaResult<()> {
        if program.kind != NodeKind::Program {
            return Err(self.error("internal semantic error: expected program node"));
        }

        self.bootstrap_templeos_builtins();
        self.collect_function_signatures(program)?;
        self.collect_global_symbols(program)?;
        log::debug!(
            "sema: {} functions, {} globals collected for {}",
            self.functions.len(),
            self.global_symbols.len(),
            self.filename
        );

        // Children are analyzed by index to keep the borrow local per child.
        for i in 0..program.children.len() {
            let mut child = std::mem::replace(
                &mut program.children[i],
                TypedNode::from_parsed(&Node::new(NodeKind::EmptyStmt, "")),
            );
            self.analyze_top_level(&mut child)?;
            program.children[i] = child;
        }
        Ok(())
    }

    fn aggregate_size_of(&self, ty: &Ty) -> usize {
        ty.estimated_size(|name| self.class_layout_sizes.get(name).copied())
    }

    fn validate_decl_modifiers(&self, decl_text: &str, context: &str) -> SemaResult<()> {
        if !self.strict_mode {
            return Ok(());
        }
        for token in decl_text.split_whitespace() {
            if is_permissive_only_modifier(token) {
                return Err(self.error(format!(
                    "strict mode rejects compatibility modifier '{token}' in {context}; \
                     pass --permissive to enable it"
                )));
            }
        }
        Ok(())
    }

    fn validate_linkage_kind(&self, linkage_kind: &str, context: &str) -> SemaResult<()> {
        if !self.strict_mode {
            return Ok(());
        }
        if linkage_kind == "_extern" || linkage_kind == "_import" || linkage_kind == "_export" {
            return Err(self.error(format!(
                "strict mode rejects compatibility linkage '{linkage_kind}' in {context}; \
                 pass --permissive to enable it"
            )));
        }
        Ok(())
    }

    fn resolve_decl_ty(&self, decl_text: &str) -> Ty {
        let stripped = strip_decl_modifiers(decl_text);
        Ty::parse(&stripped)
    }

    // TempleOS shim surface so historical sources resolve their ambient
    // symbols without a full kernel image.
    fn bootstrap_templeos_builtins(&mut self) {
        let globals: &[(&str, &str)] = &[
            ("TRUE", "Bool"),
            ("FALSE", "Bool"),
            ("NULL", "U8 *"),
            ("YorN", "Bool"),
            ("tS", "F64"),
            ("RED", "I64"),
            ("HTT_CLASS", "I64"),
            ("Fs", "FsCtx *"),
            ("Gs", "FsCtx *"),
        ];
        for (name, ty) in globals {
            self.global_symbols.entry((*name).to_string()).or_insert_with(|| Ty::parse(ty));
        }

        if !self.class_members.contains_key("FsCtx") {
            let members = [
                ("except_ch", "I64", 0usize),
                ("except_callers", "U8 **", 8),
                ("catch_except", "Bool", 16),
                ("hash_table", "U8 *", 24),
            ];
            let fields = self.class_members.entry("FsCtx".to_string()).or_default();
            let offsets = self.class_field_offsets.entry("FsCtx".to_string()).or_default();
            for (name, ty, offset) in members {
                fields.insert(name.to_string(), Ty::parse(ty));
                offsets.insert(name.to_string(), offset);
            }
            self.class_layout_sizes.insert("FsCtx".to_string(), 32);
        }

        if !self.class_members.contains_key("CHashClass") {
            let fields = self.class_members.entry("CHashClass".to_string()).or_default();
            fields.insert("member_lst_and_root".to_string(), Ty::parse("CMemberLst *"));
            self.class_field_offsets
                .entry("CHashClass".to_string())
                .or_default()
                .insert("member_lst_and_root".to_string(), 0);
            self.class_layout_sizes.insert("CHashClass".to_string(), 8);
        }

        if !self.class_members.contains_key("CMemberLst") {
            let members =
                [("str", "U8 *", 0usize), ("offset", "I64", 8), ("next", "CMemberLst *", 16)];
            let fields = self.class_members.entry("CMemberLst".to_string()).or_default();
            let offsets = self.class_field_offsets.entry("CMemberLst".to_string()).or_default();
            for (name, ty, offset) in members {
                fields.insert(name.to_string(), Ty::parse(ty));
                offsets.insert(name.to_string(), offset);
            }
            self.class_layout_sizes.insert("CMemberLst".to_string(), 24);
        }

        let builtins: &[(&str, &str, &[(&str, &str, bool)])] = &[
            ("PressAKey", "U0", &[]),
            ("ClassRep", "U0", &[("U8 *", "ptr", false)]),
            ("ClassRepD", "U0", &[("U8 *", "ptr", false)]),
            (
                "HashFind",
                "CHashClass *",
                &[("U8 *", "name", false), ("U8 *", "table", false), ("I64", "kind", false)],
            ),
            ("MemberMetaData", "I64", &[("U8 *", "key", false), ("CMemberLst *", "ml", false)]),
            ("MemberMetaFind", "I64", &[("U8 *", "key", false), ("CMemberLst *", "ml", false)]),
            (
                "JobQue",
                "CJob *",
                &[
                    ("U8 *", "fn", false),
                    ("U8 *", "arg", false),
                    ("I64", "cpu", false),
                    ("I64", "flags", false),
                ],
            ),
            ("JobResGet", "I64", &[("CJob *", "job", false)]),
            (
                "CallStkGrow",
                "I64",
                &[
                    ("I64", "stack_min", false),
                    ("I64", "stack_max", false),
                    ("U8 *", "fn", false),
                    ("I64", "a0", true),
                    ("I64", "a1", true),
                    ("I64", "a2", true),
                ],
            ),
            // Runtime ABI surface; calls resolve against the engine's shims.
            ("hc_runtime_abi_version", "I64", &[]),
            ("hc_print_str", "U0", &[("U8 *", "text", false)]),
            ("hc_put_char", "U0", &[("I64", "ch", false)]),
            ("hc_exception_payload", "I64", &[]),
            ("hc_exception_active", "I64", &[]),
            ("hc_try_depth", "I64", &[]),
            ("hc_malloc", "U8 *", &[("I64", "size", false)]),
            ("hc_free", "U0", &[("U8 *", "ptr", false)]),
            (
                "hc_memcpy",
                "U8 *",
                &[("U8 *", "dst", false), ("U8 *", "src", false), ("I64", "size", false)],
            ),
            (
                "hc_memset",
                "U8 *",
                &[("U8 *", "dst", false), ("I64", "value", false), ("I64", "size", false)],
            ),
            ("hc_spawn_wait_all", "U0", &[]),
            ("hc_task_spawn", "I64", &[("U8 *", "command", false)]),
            (
                "Spawn",
                "CTask *",
                &[
                    ("U8 *", "fn", false),
                    ("U8 *", "data", true),
                    ("U8 *", "task_name", true),
                    ("I64", "target_cpu", true),
                    ("CTask *", "parent", true),
                    ("I64", "stk_size", true),
                    ("I64", "flags", true),
                ],
            ),
        ];
        for (name, ret, params) in builtins {
            if self.functions.contains_key(*name) {
                continue;
            }
            let sig = FunctionSig {
                return_ty: Ty::parse(ret),
                name: (*name).to_string(),
                params: params
                    .iter()
                    .map(|(ty, pname, has_default)| ParamSig {
                        ty: Ty::parse(ty),
                        name: (*pname).to_string(),
                        has_default: *has_default,
                    })
                    .collect(),
                linkage: Linkage::External,
                imported: false,
            };
            self.functions.insert((*name).to_string(), sig);
        }
    }

    fn collect_function_signatures(&mut self, program: &TypedNode) -> SemaResult<()> {
        for child in &program.children {
            if child.kind != NodeKind::FunctionDecl {
                continue;
            }

            let (ret_text, fn_name) = typed_name_from_node(child);
            if fn_name.is_empty() {
                return Err(self.error(format!("invalid function declaration: {}", child.text)));
            }
            self.validate_decl_modifiers(&ret_text, "function declaration")?;

            let mut sig = FunctionSig {
                return_ty: self.resolve_decl_ty(&ret_text),
                name: fn_name.clone(),
                params: Vec::new(),
                linkage: function_linkage(&ret_text),
                imported: is_import_linkage(&ret_text),
            };

            if let Some(params) = child.find_child(NodeKind::ParamList) {
                for p in &params.children {
                    let (param_text, param_name) = typed_name_from_node(p);
                    if param_name.is_empty() {
                        return Err(
                            self.error(format!("invalid parameter declaration: {}", p.text))
                        );
                    }
                    self.validate_decl_modifiers(&param_text, "parameter declaration")?;
                    sig.params.push(ParamSig {
                        ty: self.resolve_decl_ty(&param_text),
                        name: param_name,
                        has_default: p.find_child(NodeKind::DefaultArg).is_some(),
                    });
                }
            }

            let has_body = child.find_child(NodeKind::Block).is_some();
            if has_body && sig.imported {
                return Err(
                    self.error(format!("import linkage function cannot have a definition: {fn_name}"))
                );
            }

            match self.functions.get(&fn_name) {
                None => {
                    self.functions.insert(fn_name.clone(), sig);
                }
                Some(existing) => {
                    if !same_signature(existing, &sig) {
                        return Err(
                            self.error(format!("conflicting function declaration for: {fn_name}"))
                        );
                    }
                    if existing.linkage != sig.linkage {
                        return Err(
                            self.error(format!("conflicting function linkage for: {fn_name}"))
                        );
                    }
                    if existing.imported != sig.imported && has_body {
                        return Err(self.error(format!(
                            "conflicting import linkage declaration for: {fn_name}"
                        )));
                    }
                }
            }

            if has_body && !self.function_definitions.insert(fn_name.clone()) {
                return Err(self.error(format!("duplicate function definition for: {fn_name}")));
            }
        }
        Ok(())
    }

    fn collect_global_symbols(&mut self, program: &TypedNode) -> SemaResult<()> {
        for child in &program.children {
            match child.kind {
                NodeKind::VarDecl => {
                    self.collect_global_var(child)?;
                }
                NodeKind::VarDeclList => {
                    for item in &child.children {
                        if item.kind == NodeKind::VarDecl {
                            self.collect_global_var(item)?;
                        }
                    }
                }
                NodeKind::LinkageDecl => {
                    let Some(spec) = child.children.first() else {
                        continue;
                    };
                    self.validate_linkage_kind(&child.text, "linkage declaration")?;
                    let (decl_text, name) = split_typed_name(&spec.text);
                    if name.is_empty() {
                        continue;
                    }
                    self.validate_decl_modifiers(&decl_text, "linkage declaration")?;
                    let ty = self.resolve_decl_ty(&decl_text);
                    self.declare_imported(&name, ty, &child.text)?;
                }
                NodeKind::ClassDecl => {
                    self.collect_class(child)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_global_var(&mut self, node: &TypedNode) -> SemaResult<()> {
        let (decl_text, name) = typed_name_from_node(node);
        if name.is_empty() {
            return Err(self.error(format!("invalid global variable declaration: {}", node.text)));
        }
        self.validate_decl_modifiers(&decl_text, "global variable declaration")?;
        let ty = self.resolve_decl_ty(&decl_text);
        self.declare_global(&name, ty)
    }

    fn collect_class(&mut self, child: &TypedNode) -> SemaResult<()> {
        let (_, class_name) = split_typed_name(&child.text);
        if class_name.is_empty() {
            return Ok(());
        }
        if self.class_members.contains_key(&class_name) {
            return Err(self.error(format!("duplicate class/union declaration: {class_name}")));
        }
        let is_union = child.text.starts_with("union ");

        let mut members = HashMap::new();
        let mut offsets = HashMap::new();
        let mut layout_size = 0usize;
        let mut running_offset = 0usize;
        for field in &child.children {
            if field.kind != NodeKind::FieldDecl {
                continue;
            }
            let (field_text, field_name) = typed_name_from_node(field);
            if field_name.is_empty() {
                continue;
            }
            self.validate_decl_modifiers(&field_text, "field declaration")?;
            if members.contains_key(&field_name) {
                return Err(self.error(format!("duplicate field in {class_name}: {field_name}")));
            }
            let field_ty = self.resolve_decl_ty(&field_text);
            let field_size = self.aggregate_size_of(&field_ty);
            members.insert(field_name.clone(), field_ty);
            if is_union {
                offsets.insert(field_name, 0);
                layout_size = layout_size.max(field_size);
            } else {
                offsets.insert(field_name, running_offset);
                running_offset += field_size;
                layout_size = running_offset;
            }
        }
        self.class_members.insert(class_name.clone(), members);
        self.class_field_offsets.insert(class_name.clone(), offsets);
        self.class_layout_sizes.insert(class_name.clone(), layout_size);

        for trailing in &child.children {
            if trailing.kind != NodeKind::VarDecl {
                continue;
            }
            let (decl_text, name) = typed_name_from_node(trailing);
            if name.is_empty() {
                return Err(
                    self.error(format!("invalid global variable declaration: {}", trailing.text))
                );
            }
            let ty = if decl_text.is_empty() {
                Ty::new(TyKind::Named(class_name.clone()))
            } else {
                self.resolve_decl_ty(&decl_text)
            };
            self.declare_global(&name, ty)?;
        }
        Ok(())
    }

    fn analyze_top_level(&mut self, node: &mut TypedNode) -> SemaResult<()> {
        match node.kind {
            NodeKind::FunctionDecl => self.analyze_function(node),
            NodeKind::VarDecl => self.analyze_var_decl(node),
            NodeKind::VarDeclList => {
                for item in &mut node.children {
                    if item.kind == NodeKind::VarDecl {
                        self.analyze_var_decl(item)?;
                    }
                }
                Ok(())
            }
            NodeKind::LinkageDecl | NodeKind::TypeAliasDecl => Ok(()),
            NodeKind::ClassDecl => {
                for trailing in &mut node.children {
                    if trailing.kind == NodeKind::VarDecl {
                        self.analyze_var_decl(trailing)?;
                    }
                }
                Ok(())
            }
            _ => self.analyze_statement(node),
        }
    }

    fn analyze_function(&mut self, fn_node: &mut TypedNode) -> SemaResult<()> {
        let (ret_text, fn_name) = typed_name_from_node(fn_node);
        if fn_name.is_empty() {
            return Err(self.error("invalid function name"));
        }
        self.validate_decl_modifiers(&ret_text, "function declaration")?;

        self.labels.clear();
        self.goto_targets.clear();
        self.label_positions.clear();
        self.goto_infos.clear();
        self.init_decl_infos.clear();

        let body_index = fn_node.children.iter().position(|c| c.kind == NodeKind::Block);
        if let Some(body_index) = body_index {
            self.collect_labels(&fn_node.children[body_index])?;
            let mut next_index = 0i32;
            self.collect_goto_legality_info(&fn_node.children[body_index], 0, &mut next_index);
        }

        self.current_return_ty = Some(self.resolve_decl_ty(&ret_text));
        self.in_function = true;
        self.push_scope();

        if let Some(sig) = self.functions.get(&fn_name).cloned() {
            for param in &sig.params {
                self.declare_local(&param.name, param.ty.clone())?;
            }
        }

        if let Some(body_index) = body_index {
            let mut body = std::mem::replace(
                &mut fn_node.children[body_index],
                TypedNode::from_parsed(&Node::new(NodeKind::EmptyStmt, "")),
            );
            let result = self.analyze_statement(&mut body);
            fn_node.children[body_index] = body;
            result?;
        }

        for target in self.goto_targets.clone() {
            if !self.labels.contains(&target) {
                return Err(self.error(format!("goto target label not found in function: {target}")));
            }
        }
        self.validate_goto_legality()?;

        self.pop_scope();
        self.in_function = false;
        self.current_return_ty = None;
        Ok(())
    }

    fn collect_labels(&mut self, node: &TypedNode) -> SemaResult<()> {
        if node.kind == NodeKind::Label && !self.labels.insert(node.text.clone()) {
            return Err(self.error(format!("duplicate label in function: {}", node.text)));
        }
        for child in &node.children {
            self.collect_labels(child)?;
        }
        Ok(())
    }

    fn collect_goto_legality_info(&mut self, node: &TypedNode, depth: i32, next_index: &mut i32) {
        if node.kind == NodeKind::Block {
            for child in &node.children {
                self.collect_goto_legality_info(child, depth + 1, next_index);
            }
            return;
        }

        let mut this_index = -1;
        if node.kind.is_statement() {
            this_index = *next_index;
            *next_index += 1;
        }

        match node.kind {
            NodeKind::Label => {
                self.label_positions
                    .insert(node.text.clone(), LabelInfo { index: this_index, depth });
            }
            NodeKind::Goto => {
                self.goto_targets.push(node.text.clone());
                self.goto_infos.push(GotoInfo {
                    target: node.text.clone(),
                    index: this_index,
                    depth,
                });
            }
            NodeKind::VarDecl if var_initializer(node).is_some() => {
                let (_, name) = typed_name_from_node(node);
                self.init_decl_infos.push(InitDeclInfo {
                    name: if name.is_empty() { node.text.clone() } else { name },
                    index: this_index,
                    depth,
                });
            }
            _ => {}
        }

        for child in &node.children {
            self.collect_goto_legality_info(child, depth, next_index);
        }
    }

    fn validate_goto_legality(&self) -> SemaResult<()> {
        for g in &self.goto_infos {
            let Some(label) = self.label_positions.get(&g.target) else {
                continue;
            };

            if label.depth > g.depth {
                return Err(self.error(format!("goto jumps into deeper scope: {}", g.target)));
            }

            if label.index > g.index {
                for init in &self.init_decl_infos {
                    if init.index > g.index && init.index < label.index {
                        return Err(self.error(format!(
                            "goto jumps across initialized declaration: {}",
                            init.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn analyze_statement(&mut self, node: &mut TypedNode) -> SemaResult<()> {
        match node.kind {
            NodeKind::Block => {
                self.push_scope();
                let mut result = Ok(());
                for child in &mut node.children {
                    result = self.analyze_statement(child);
                    if result.is_err() {
                        break;
                    }
                }
                self.pop_scope();
                result
            }

            NodeKind::VarDecl => self.analyze_var_decl(node),

            NodeKind::VarDeclList => {
                for item in &mut node.children {
                    if item.kind == NodeKind::VarDecl {
                        self.analyze_var_decl(item)?;
                    }
                }
                Ok(())
            }

            NodeKind::PrintStmt => self.analyze_print_stmt(node),

            NodeKind::ExprStmt => {
                if node.children.is_empty() {
                    return Ok(());
                }

                if node.children[0].kind == NodeKind::Identifier {
                    let name = node.children[0].text.clone();
                    if let Some(sig) = self.functions.get(&name) {
                        if !sig.params.iter().all(|p| p.has_default) {
                            return Err(self.error(format!(
                                "function call without parentheses requires defaults for all \
                                 params: {name}"
                            )));
                        }
                        node.kind = NodeKind::NoParenCallStmt;
                        node.ty = Some(sig.return_ty.clone());
                        return Ok(());
                    }
                }

                let ty = self.analyze_expr_child(node, 0)?;
                node.ty = Some(ty);
                Ok(())
            }

            NodeKind::If | NodeKind::While => {
                if !node.children.is_empty() {
                    self.analyze_expr_child(node, 0)?;
                }
                for i in 1..node.children.len() {
                    let mut child = take_child(node, i);
                    let result = self.analyze_statement(&mut child);
                    node.children[i] = child;
                    result?;
                }
                Ok(())
            }

            NodeKind::For => {
                for i in 0..node.children.len() {
                    let kind = node.children[i].kind;
                    if matches!(kind, NodeKind::ForInit | NodeKind::ForCond | NodeKind::ForInc) {
                        continue;
                    }
                    if kind == NodeKind::Block || kind.is_statement() {
                        let mut child = take_child(node, i);
                        let result = self.analyze_statement(&mut child);
                        node.children[i] = child;
                        result?;
                    } else {
                        self.analyze_expr_child(node, i)?;
                    }
                }
                Ok(())
            }

            NodeKind::DoWhile => {
                if !node.children.is_empty() {
                    let mut child = take_child(node, 0);
                    let result = self.analyze_statement(&mut child);
                    node.children[0] = child;
                    result?;
                }
                if node.children.len() > 1 {
                    self.analyze_expr_child(node, 1)?;
                }
                Ok(())
            }

            NodeKind::Switch => {
                if !node.children.is_empty() {
                    self.analyze_expr_child(node, 0)?;
                }
                if node.children.len() > 1 {
                    let mut child = take_child(node, 1);
                    let result = self.analyze_statement(&mut child);
                    node.children[1] = child;
                    result?;
                }
                Ok(())
            }

            NodeKind::CaseClause => {
                for i in 0..node.children.len() {
                    let kind = node.children[i].kind;
                    if kind.is_statement() || kind == NodeKind::Block {
                        let mut child = take_child(node, i);
                        let result = self.analyze_statement(&mut child);
                        node.children[i] = child;
                        result?;
                    } else {
                        self.analyze_expr_child(node, i)?;
                    }
                }
                Ok(())
            }

            NodeKind::DefaultClause | NodeKind::Lock => {
                for i in 0..node.children.len() {
                    let mut child = take_child(node, i);
                    let result = self.analyze_statement(&mut child);
                    node.children[i] = child;
                    result?;
                }
                Ok(())
            }

            NodeKind::Asm => self.analyze_asm_stmt(node),

            NodeKind::LinkageDecl | NodeKind::TypeAliasDecl => Ok(()),

            NodeKind::Try => {
                if node.children.len() != 2 {
                    return Err(self.error("try statement requires both try and catch bodies"));
                }
                for i in 0..2 {
                    let mut child = take_child(node, i);
                    let result = self.analyze_statement(&mut child);
                    node.children[i] = child;
                    result?;
                }
                Ok(())
            }

            NodeKind::Throw => {
                if node.children.len() != 1 {
                    return Err(self.error("throw requires exactly one payload expression"));
                }
                let payload_ty = self.analyze_expr_child(node, 0)?;
                if !is_throwable(&payload_ty) {
                    return Err(
                        self.error(format!("throw payload must be integral-like, got: {payload_ty}"))
                    );
                }
                node.ty = Some(Ty::I64);
                Ok(())
            }

            NodeKind::Goto => Ok(()),

            NodeKind::Return => {
                if !node.children.is_empty() {
                    let expr_ty = self.analyze_expr_child(node, 0)?;
                    if let Some(expected) = &self.current_return_ty {
                        if !can_implicit_convert(&expr_ty, expected) {
                            return Err(self.error(format!(
                                "return type mismatch: cannot convert {expr_ty} to {expected}"
                            )));
                        }
                    }
                    node.ty = Some(expr_ty);
                } else {
                    node.ty = Some(Ty::U0);
                }
                Ok(())
            }

            NodeKind::Label => {
                if !node.children.is_empty() {
                    let mut child = take_child(node, 0);
                    let result = self.analyze_statement(&mut child);
                    node.children[0] = child;
                    result?;
                }
                Ok(())
            }

            _ => Ok(()),
        }
    }

    fn analyze_asm_stmt(&mut self, node: &mut TypedNode) -> SemaResult<()> {
        if node.text.is_empty() {
            return Err(self.error("inline asm requires non-empty body/template"));
        }

        if node.children.is_empty() {
            if node.text.trim().is_empty() {
                return Err(self.error("inline asm block body cannot be empty"));
            }
            return Ok(());
        }

        let mut awaiting_operand = false;
        let mut awaiting_constraint = String::new();

        for i in 0..node.children.len() {
            if node.children[i].kind != NodeKind::AsmArg {
                return Err(self.error("inline asm argument node must be AsmArg"));
            }
            if node.children[i].text.trim().is_empty() {
                return Err(self.error("inline asm argument cannot be empty"));
            }
            if node.children[i].children.len() != 1 {
                return Err(self.error("inline asm argument must parse as an expression"));
            }

            let arg_ty = {
                let arg = &mut node.children[i];
                let mut expr = take_child(arg, 0);
                let result = self.analyze_expr(&mut expr);
                arg.children[0] = expr;
                result?
            };
            node.children[i].ty = Some(arg_ty);
            let arg_expr_text = node.children[i].children[0].text.clone();

            if i == 0 {
                if !is_string_literal_text(&arg_expr_text) {
                    return Err(self.error("inline asm first argument must be a string-literal template"));
                }
                continue;
            }

            if is_string_literal_text(&arg_expr_text) {
                if awaiting_operand {
                    return Err(self.error(format!(
                        "inline asm input constraint requires operand expression: {awaiting_constraint}"
                    )));
                }
                if asm_constraint_needs_operand(&arg_expr_text) {
                    awaiting_operand = true;
                    awaiting_constraint = asm_constraint_text(&arg_expr_text);
                } else {
                    awaiting_operand = false;
                    awaiting_constraint.clear();
                }
                continue;
            }

            if !awaiting_operand {
                return Err(
                    self.error("inline asm operand expression must follow an input constraint string")
                );
            }
            awaiting_operand = false;
            awaiting_constraint.clear();
        }

        if awaiting_operand {
            return Err(self.error(format!(
                "inline asm input constraint requires operand expression: {awaiting_constraint}"
            )));
        }
        Ok(())
    }

    fn analyze_print_stmt(&mut self, node: &mut TypedNode) -> SemaResult<()> {
        if node.children.is_empty() {
            return Err(self.error("print statement requires a format expression"));
        }

        let format_ty = self.analyze_expr_child(node, 0)?;
        let format_kind = node.children[0].kind;
        let format_text = node.children[0].text.clone();

        let mut arg_types = Vec::with_capacity(node.children.len().saturating_sub(1));
        for i in 1..node.children.len() {
            arg_types.push(self.analyze_expr_child(node, i)?);
        }

        if format_kind != NodeKind::Literal {
            if format_ty.class() != ValueClass::Pointer && !format_ty.is_opaque() {
                return Err(
                    self.error(format!("dynamic print format must be pointer-like, got: {format_ty}"))
                );
            }
            node.ty = Some(Ty::U0);
            return Ok(());
        }

        if is_char_literal_text(&format_text) {
            if !arg_types.is_empty() {
                return Err(self.error("char-literal print form does not take format arguments"));
            }
            node.ty = Some(Ty::U0);
            return Ok(());
        }

        if !is_string_literal_text(&format_text) {
            return Err(self.error("print format must be a string or char literal"));
        }

        if format_text.trim() == "\"\"" && !arg_types.is_empty() {
            let dyn_fmt = &arg_types[0];
            if dyn_fmt.class() != ValueClass::Pointer && !dyn_fmt.is_opaque() {
                return Err(self.error(format!(
                    "dynamic print format expression must be pointer-like, got: {dyn_fmt}"
                )));
            }
            node.ty = Some(Ty::U0);
            return Ok(());
        }

        let atoms = parse_format_atoms(&decode_quoted_string(&format_text))
            .map_err(|msg| self.error(msg))?;

        let expected_args = expected_arg_count(&atoms);
        if expected_args != arg_types.len() {
            return Err(self.error(format!(
                "print argument count mismatch: format expects {expected_args}, got {}",
                arg_types.len()
            )));
        }

        let mut arg_index = 0usize;
        for atom in &atoms {
            if atom.width_from_arg {
                let width = &arg_types[arg_index];
                if !width.is_integral() && !width.is_opaque() {
                    return Err(self.error(format!(
                        "print width argument {} must be integral-like, got: {width}",
                        arg_index + 1
                    )));
                }
                arg_index += 1;
            }
            if atom.precision_from_arg {
                let precision = &arg_types[arg_index];
                if !precision.is_integral() && !precision.is_opaque() {
                    return Err(self.error(format!(
                        "print precision argument {} must be integral-like, got: {precision}",
                        arg_index + 1
                    )));
                }
                arg_index += 1;
            }

            if atom.conv == 'z' {
                let idx_ty = &arg_types[arg_index];
                if !print_spec_accepts(atom, idx_ty) {
                    return Err(self.error(format!(
                        "print argument {} has incompatible type {idx_ty} for conversion '%z'",
                        arg_index + 1
                    )));
                }
                let table_ty = &arg_types[arg_index + 1];
                if table_ty.class() != ValueClass::Pointer && !table_ty.is_opaque() {
                    return Err(self.error(format!(
                        "print argument {} must be pointer-like for conversion '%z'",
                        arg_index + 2
                    )));
                }
                arg_index += 2;
                continue;
            }

            let arg_ty = &arg_types[arg_index];
            if !print_spec_accepts(atom, arg_ty) {
                return Err(self.error(format!(
                    "print argument {} has incompatible type {arg_ty} for conversion '%{}'",
                    arg_index + 1,
                    atom.conv
                )));
            }
            arg_index += 1;
        }

        node.ty = Some(Ty::U0);
        Ok(())
    }

    fn analyze_var_decl(&mut self, node: &mut TypedNode) -> SemaResult<()> {
        let (decl_text, name) = typed_name_from_node(node);
        if name.is_empty() {
            return Err(self.error(format!("invalid variable declaration: {}", node.text)));
        }
        self.validate_decl_modifiers(&decl_text, "variable declaration")?;
        let resolved_ty = self.resolve_decl_ty(&decl_text);

        if self.in_function {
            self.declare_local(&name, resolved_ty.clone())?;
        } else {
            match self.global_symbols.get(&name) {
                None => self.declare_global(&name, resolved_ty.clone())?,
                Some(existing) if *existing != resolved_ty => {
                    return Err(
                        self.error(format!("conflicting global declaration type for: {name}"))
                    );
                }
                Some(_) => {}
            }
        }
        node.ty = Some(resolved_ty.clone());

        let init_index = node
            .children
            .iter()
            .position(|c| c.kind != NodeKind::DeclType && c.kind != NodeKind::DeclName);
        if let Some(init_index) = init_index {
            let init_ty = self.analyze_expr_child(node, init_index)?;
            if !can_implicit_convert(&init_ty, &resolved_ty) {
                return Err(self.error(format!(
                    "initializer type mismatch for {name}: cannot convert {init_ty} to {resolved_ty}"
                )));
            }
        }
        Ok(())
    }

    fn analyze_expr_child(&mut self, node: &mut TypedNode, index: usize) -> SemaResult<Ty> {
        let mut child = take_child(node, index);
        let result = self.analyze_expr(&mut child);
        node.children[index] = child;
        result
    }

    fn analyze_expr(&mut self, node: &mut TypedNode) -> SemaResult<Ty> {
        let ty = self.analyze_expr_inner(node)?;
        node.ty = Some(ty.clone());
        Ok(ty)
    }

    fn analyze_expr_inner(&mut self, node: &mut TypedNode) -> SemaResult<Ty> {
        match node.kind {
            NodeKind::Identifier => {
                if let Some(ty) = self.lookup(&node.text) {
                    return Ok(ty);
                }
                if let Some(sig) = self.functions.get(&node.text) {
                    return Ok(Ty::fn_value(sig.return_ty.clone()));
                }
                Err(self.error(format!("unknown identifier: {}", node.text)))
            }

            NodeKind::Literal => {
                let ty = if node.text.starts_with('"') {
                    Ty::u8_ptr()
                } else if node.text.starts_with('\'') {
                    Ty::I64
                } else if node.text.contains('.') {
                    Ty::F64
                } else {
                    Ty::I64
                };
                Ok(ty)
            }

            NodeKind::Dollar => Ok(Ty::I64),

            NodeKind::Unary => {
                if node.children.is_empty() {
                    return Ok(Ty::I64);
                }
                let child_ty = self.analyze_expr_child(node, 0)?;
                match node.text.as_str() {
                    "!" => {
                        if !child_ty.is_numeric()
                            && child_ty.class() != ValueClass::Pointer
                            && !child_ty.is_opaque()
                        {
                            return Err(self.error("operator ! requires scalar operand"));
                        }
                        Ok(Ty::BOOL)
                    }
                    "&" => Ok(child_ty.pointer_to()),
                    "*" => {
                        if child_ty.class() != ValueClass::Pointer && !child_ty.is_opaque() {
                            return Err(self.error("operator * requires pointer operand"));
                        }
                        Ok(child_ty.deref())
                    }
                    "~" => {
                        if !child_ty.is_integral() && !child_ty.is_opaque() {
                            return Err(self.error("operator ~ requires integer-like operand"));
                        }
                        Ok(child_ty)
                    }
                    "+" | "-" => {
                        if !child_ty.is_numeric() && !child_ty.is_opaque() {
                            return Err(
                                self.error(format!("unary {} requires numeric operand", node.text))
                            );
                        }
                        Ok(child_ty)
                    }
                    "++" | "--" => {
                        if !child_ty.is_numeric()
                            && child_ty.class() != ValueClass::Pointer
                            && !child_ty.is_opaque()
                        {
                            return Err(self.error(format!(
                                "operator {} requires numeric or pointer operand",
                                node.text
                            )));
                        }
                        Ok(child_ty)
                    }
                    _ => Ok(child_ty),
                }
            }

            NodeKind::Cast => {
                if !node.children.is_empty() {
                    self.analyze_expr_child(node, 0)?;
                }
                Ok(Ty::parse(&node.text))
            }

            NodeKind::Postfix => {
                if node.children.is_empty() {
                    return Ok(Ty::I64);
                }
                let operand_ty = self.analyze_expr_child(node, 0)?;
                if !operand_ty.is_numeric()
                    && operand_ty.class() != ValueClass::Pointer
                    && !operand_ty.is_opaque()
                {
                    return Err(self.error("postfix operator requires numeric or pointer operand"));
                }
                Ok(operand_ty)
            }

            NodeKind::Assign => {
                if node.children.len() != 2 {
                    return Ok(Ty::I64);
                }
                let lhs_ty = self.analyze_expr_child(node, 0)?;
                let rhs_ty = self.analyze_expr_child(node, 1)?;
                if !can_implicit_convert(&rhs_ty, &lhs_ty) {
                    return Err(self.error(format!(
                        "assignment type mismatch: cannot convert {rhs_ty} to {lhs_ty}"
                    )));
                }
                Ok(lhs_ty)
            }

            NodeKind::Binary => self.analyze_binary_expr(node),

            NodeKind::Comma => {
                let mut last_ty = Ty::I64;
                for i in 0..node.children.len() {
                    last_ty = self.analyze_expr_child(node, i)?;
                }
                Ok(last_ty)
            }

            NodeKind::Call => self.analyze_call_expr(node),

            NodeKind::Lane => self.analyze_lane_expr(node),

            NodeKind::Member => {
                if !node.children.is_empty() {
                    let base_ty = self.analyze_expr_child(node, 0)?;
                    let aggregate_name = base_ty.base_name();
                    if let Some(members) = self.class_members.get(&aggregate_name) {
                        let Some(member_ty) = members.get(&node.text) else {
                            return Err(self.error(format!(
                                "unknown member '{}' on {aggregate_name}",
                                node.text
                            )));
                        };
                        return Ok(member_ty.clone());
                    }
                }
                Ok(Ty::I64)
            }

            NodeKind::Index => {
                if node.children.len() == 2 {
                    self.analyze_expr_child(node, 0)?;
                    self.analyze_expr_child(node, 1)?;
                }
                Ok(Ty::I64)
            }

            _ => Ok(Ty::I64),
        }
    }

    fn analyze_binary_expr(&mut self, node: &mut TypedNode) -> SemaResult<Ty> {
        if node.children.len() != 2 {
            return Err(self.error("invalid binary expression"));
        }

        let lhs_ty = self.analyze_expr_child(node, 0)?;
        let rhs_ty = self.analyze_expr_child(node, 1)?;
        let op = node.text.clone();

        if is_relational_op(&op) || op == "==" || op == "!=" {
            if !can_implicit_convert(&lhs_ty, &rhs_ty) && !can_implicit_convert(&rhs_ty, &lhs_ty) {
                return Err(self.error(format!(
                    "comparison requires implicitly comparable operands: {lhs_ty} vs {rhs_ty}"
                )));
            }
            // A comparison whose lhs is itself a comparison keeps HolyC's
            // chained-comparison tag.
            if node.children[0].kind == NodeKind::Binary
                && is_relational_op(&node.children[0].text)
            {
                return Ok(Ty::new(TyKind::BoolChained));
            }
            return Ok(Ty::BOOL);
        }

        if op == "&&" || op == "||" {
            let scalar = |ty: &Ty| {
                ty.is_numeric() || ty.class() == ValueClass::Pointer || ty.is_opaque()
            };
            if !scalar(&lhs_ty) || !scalar(&rhs_ty) {
                return Err(self.error("logical operators require scalar operands"));
            }
            return Ok(Ty::BOOL);
        }

        if !can_implicit_convert(&lhs_ty, &rhs_ty) && !can_implicit_convert(&rhs_ty, &lhs_ty) {
            return Err(self.error(format!(
                "binary operator {op} requires compatible operands: {lhs_ty} vs {rhs_ty}"
            )));
        }

        if matches!(op.as_str(), "+" | "-" | "*" | "/" | "%") {
            let lhs_ptr = lhs_ty.class() == ValueClass::Pointer;
            let rhs_ptr = rhs_ty.class() == ValueClass::Pointer;
            if lhs_ptr || rhs_ptr {
                return match op.as_str() {
                    "+" => {
                        if lhs_ptr && rhs_ty.is_integral() {
                            Ok(lhs_ty)
                        } else if rhs_ptr && lhs_ty.is_integral() {
                            Ok(rhs_ty)
                        } else {
                            Err(self
                                .error("pointer addition requires one pointer and one integer operand"))
                        }
                    }
                    "-" => {
                        if lhs_ptr && rhs_ty.is_integral() {
                            Ok(lhs_ty)
                        } else if lhs_ptr && rhs_ptr {
                            Ok(Ty::I64)
                        } else {
                            Err(self
                                .error("pointer subtraction requires pointer-int or pointer-pointer"))
                        }
                    }
                    _ => Err(self.error("pointer arithmetic supports only + and -")),
                };
            }
            return Ok(promote_integer_result(&lhs_ty, &rhs_ty));
        }

        if matches!(op.as_str(), "&" | "|" | "^" | "<<" | ">>") {
            if !lhs_ty.is_integral() || !rhs_ty.is_integral() {
                return Err(self.error("bitwise/shift operators require integral operands"));
            }
            return Ok(promote_integer_result(&lhs_ty, &rhs_ty));
        }

        Ok(promote_integer_result(&lhs_ty, &rhs_ty))
    }

    fn analyze_call_expr(&mut self, node: &mut TypedNode) -> SemaResult<Ty> {
        if node.children.len() < 2 {
            return Err(self.error("invalid call expression"));
        }
        if node.children[1].kind != NodeKind::CallArgs {
            return Err(self.error("invalid call argument list"));
        }

        let callee_is_ident = node.children[0].kind == NodeKind::Identifier;
        let callee_name = node.children[0].text.clone();
        let direct_named_call = callee_is_ident
            && self.functions.contains_key(&callee_name)
            && self.lookup_local_only(&callee_name).is_none();

        if direct_named_call {
            let sig = self.functions.get(&callee_name).cloned().expect("checked contains_key");
            let arg_count = node.children[1].children.len();
            let mut param_i = 0usize;

            for arg_index in 0..arg_count {
                if param_i >= sig.params.len() {
                    return Err(self.error(format!("too many arguments for function: {callee_name}")));
                }

                if node.children[1].children[arg_index].kind == NodeKind::EmptyArg {
                    if !sig.params[param_i].has_default {
                        return Err(self.error(format!(
                            "missing argument without default at position {} in call to {callee_name}",
                            param_i + 1
                        )));
                    }
                } else {
                    let arg_ty = {
                        let args = &mut node.children[1];
                        let mut arg = take_child(args, arg_index);
                        let result = self.analyze_expr(&mut arg);
                        args.children[arg_index] = arg;
                        result?
                    };
                    if !can_implicit_convert(&arg_ty, &sig.params[param_i].ty) {
                        return Err(self.error(format!(
                            "argument type mismatch at position {} in call to {callee_name}: \
                             cannot convert {arg_ty} to {}",
                            param_i + 1,
                            sig.params[param_i].ty
                        )));
                    }
                }
                param_i += 1;
            }

            while param_i < sig.params.len() {
                if !sig.params[param_i].has_default {
                    return Err(self.error(format!(
                        "missing required argument at position {} in call to {callee_name}",
                        param_i + 1
                    )));
                }
                param_i += 1;
            }

            return Ok(sig.return_ty);
        }

        let callee_ty = self.analyze_expr_child(node, 0)?;
        let callee_callable = callee_ty.class() == ValueClass::Pointer
            || callee_ty.is_opaque()
            || matches!(callee_ty.kind, TyKind::Fn(_));
        if !callee_callable {
            return Err(self.error(format!("call target is not callable: {callee_ty}")));
        }

        let arg_count = node.children[1].children.len();
        for arg_index in 0..arg_count {
            if node.children[1].children[arg_index].kind == NodeKind::EmptyArg {
                return Err(
                    self.error("sparse/default call arguments require a direct named function")
                );
            }
            let args = &mut node.children[1];
            let mut arg = take_child(args, arg_index);
            let result = self.analyze_expr(&mut arg);
            args.children[arg_index] = arg;
            result?;
        }

        Ok(infer_call_return_ty(&callee_ty))
    }

    fn analyze_lane_expr(&mut self, node: &mut TypedNode) -> SemaResult<Ty> {
        if node.children.len() != 2 {
            return Err(self.error("lane access requires base and index expression"));
        }

        let base_ty = self.analyze_expr_child(node, 0)?;
        if !base_ty.is_integral() && !base_ty.is_opaque() {
            return Err(self.error(format!("lane base must be integral-like, got: {base_ty}")));
        }

        let index_ty = self.analyze_expr_child(node, 1)?;
        if !index_ty.is_integral() && !index_ty.is_opaque() {
            return Err(self.error(format!("lane index must be integral, got: {index_ty}")));
        }

        let Some(lane) = LaneInfo::parse(&node.text) else {
            return Err(self.error(format!("unknown lane selector: {}", node.text)));
        };

        if !base_ty.is_opaque() {
            let base_bits = base_ty.bits();
            if base_bits == 0 || lane.bits > base_bits {
                return Err(self.error(format!(
                    "lane selector '{}' is wider than base type {base_ty}",
                    node.text
                )));
            }

            let lane_count = base_bits / lane.bits;
            if lane_count == 0 {
                return Err(self.error(format!(
                    "invalid lane count for selector '{}' on {base_ty}",
                    node.text
                )));
            }

            let index_node = &node.children[1];
            if index_node.kind == NodeKind::Literal
                && !index_node.text.starts_with('"')
                && !index_node.text.starts_with('\'')
            {
                if let Some(lane_index) = parse_int_base0(&index_node.text) {
                    if lane_index < 0 || lane_index >= i64::from(lane_count) {
                        return Err(self.error(format!(
                            "lane index out of range for selector '{}': {lane_index}",
                            node.text
                        )));
                    }
                }
            }
        }

        Ok(lane.element_ty())
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_local(&mut self, name: &str, ty: Ty) -> SemaResult<()> {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        let top = self.scopes.last_mut().expect("pushed above");
        if top.contains_key(name) {
            return Err(self.error(format!("duplicate declaration: {name}")));
        }
        top.insert(name.to_string(), ty);
        Ok(())
    }

    fn declare_global(&mut self, name: &str, ty: Ty) -> SemaResult<()> {
        if self.global_symbols.contains_key(name) {
            return Err(self.error(format!("duplicate global declaration: {name}")));
        }
        if self.functions.contains_key(name) {
            return Err(self.error(format!("global declaration conflicts with function symbol: {name}")));
        }
        if let Some(imported_ty) = self.imported_symbols.get(name) {
            if *imported_ty != ty {
                return Err(self.error(format!(
                    "global declaration type conflicts with imported symbol: {name}"
                )));
            }
            self.imported_symbols.remove(name);
        }
        self.global_symbols.insert(name.to_string(), ty);
        Ok(())
    }

    fn declare_imported(&mut self, name: &str, ty: Ty, linkage_kind: &str) -> SemaResult<()> {
        if let Some(existing) = self.global_symbols.get(name) {
            if *existing != ty {
                return Err(
                    self.error(format!("imported symbol conflicts with global declaration: {name}"))
                );
            }
            return Ok(());
        }
        if self.functions.contains_key(name) {
            return Err(self.error(format!("imported symbol conflicts with function symbol: {name}")));
        }
        if !["extern", "_extern", "import", "_import", "export", "_export"]
            .contains(&linkage_kind)
        {
            return Err(self.error(format!("unsupported linkage declaration: {linkage_kind}")));
        }
        if let Some(existing) = self.imported_symbols.get(name) {
            if *existing != ty {
                return Err(self.error(format!("conflicting imported symbol declaration: {name}")));
            }
            return Ok(());
        }
        self.imported_symbols.insert(name.to_string(), ty);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Ty> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.get(name) {
                return Some(ty.clone());
            }
        }
        if let Some(ty) = self.global_symbols.get(name) {
            return Some(ty.clone());
        }
        self.imported_symbols.get(name).cloned()
    }

    fn lookup_local_only(&self, name: &str) -> Option<&Ty> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

fn take_child(node: &mut TypedNode, index: usize) -> TypedNode {
    std::mem::replace(
        &mut node.children[index],
        TypedNode::from_parsed(&Node::new(NodeKind::EmptyStmt, "")),
    )
}

fn is_relational_op(op: &str) -> bool {
    matches!(op, "<" | ">" | "<=" | ">=")
}

// The throw/catch runtime path transports an integer payload.
fn is_throwable(ty: &Ty) -> bool {
    ty.is_opaque() || ty.is_integral()
}

fn same_signature(a: &FunctionSig, b: &FunctionSig) -> bool {
    a.return_ty == b.return_ty
        && a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(b.params.iter())
            .all(|(pa, pb)| pa.ty == pb.ty && pa.name == pb.name)
}

fn print_spec_accepts(atom: &FormatAtom, arg_ty: &Ty) -> bool {
    if arg_ty.is_opaque() {
        return true;
    }
    match atom.conv {
        'd' | 'i' | 'c' => arg_ty.is_integral(),
        'u' | 'x' | 'X' | 'o' | 'b' | 'p' | 'P' | 'z' => {
            arg_ty.is_integral() || arg_ty.class() == ValueClass::Pointer
        }
        's' => arg_ty.class() == ValueClass::Pointer,
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => arg_ty.is_numeric(),
        _ => false,
    }
}

fn infer_call_return_ty(callee_ty: &Ty) -> Ty {
    if let TyKind::Fn(ret) = &callee_ty.kind {
        if callee_ty.ptr == 0 {
            return (**ret).clone();
        }
    }
    if callee_ty.class() == ValueClass::Pointer {
        return Ty::I64;
    }
    callee_ty.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(source: &str) -> SemaResult<TypedNode> {
        let program = parse(source, "test.hc").expect("parse failure");
        analyze(&program, "test.hc", true)
    }

    fn check_permissive(source: &str) -> SemaResult<TypedNode> {
        let program = parse(source, "test.hc").expect("parse failure");
        analyze(&program, "test.hc", false)
    }

    #[test]
    fn literal_typing() {
        let typed = check("U0 F() { \"%d %s %f\\n\", 1, \"x\", 2.5; }").unwrap();
        let block = typed.children[0].find_child(NodeKind::Block).unwrap();
        let print = &block.children[0];
        assert_eq!(print.children[0].ty.as_ref().unwrap().to_string(), "U8*");
        assert_eq!(print.children[1].ty.as_ref().unwrap().to_string(), "I64");
        assert_eq!(print.children[3].ty.as_ref().unwrap().to_string(), "F64");
    }

    #[test]
    fn unknown_identifier_rejected() {
        let err = check("U0 F() { I64 x; x = nope; }").unwrap_err();
        assert!(err.message.contains("unknown identifier: nope"));
    }

    #[test]
    fn chained_comparison_tag() {
        let typed = check("U0 F(I64 a, I64 b, I64 c) { I64 r; r = a < b < c; }").unwrap();
        let block = typed.children[0].find_child(NodeKind::Block).unwrap();
        let assign = &block.children[1].children[0];
        assert_eq!(assign.children[1].ty.as_ref().unwrap().to_string(), "Bool(chained)");
    }

    #[test]
    fn pointer_arithmetic_rules() {
        assert!(check("U0 F(U8 *p) { I64 d; d = p - p; }").is_ok());
        assert!(check("U0 F(U8 *p, I64 n) { U8 *q; q = p + n; }").is_ok());
        let err = check("U0 F(U8 *p, U8 *q) { I64 x; x = p * q; }").unwrap_err();
        assert!(err.message.contains("pointer arithmetic"));
    }

    #[test]
    fn strict_mode_rejects_compat_modifiers() {
        let err = check("public U0 F() { return; }").unwrap_err();
        assert!(err.message.contains("strict mode rejects compatibility modifier 'public'"));
        assert!(check_permissive("public U0 F() { return; }").is_ok());
    }

    #[test]
    fn print_format_argument_count() {
        let err = check("U0 F() { \"%d %d\\n\", 1; }").unwrap_err();
        assert!(err.message.contains("print argument count mismatch"));
    }

    #[test]
    fn print_format_type_mismatch() {
        let err = check("U0 Main() { \"%d\\n\", 3.14; return; }").unwrap_err();
        assert!(err.message.contains("incompatible type F64 for conversion '%d'"));
    }

    #[test]
    fn print_z_consumes_two_args() {
        assert!(check("U0 F(U8 *tab) { \"%z\\n\", 1, tab; }").is_ok());
        let err = check("U0 F() { \"%z\\n\", 1; }").unwrap_err();
        assert!(err.message.contains("print argument count mismatch"));
    }

    #[test]
    fn goto_across_initialized_declaration() {
        let err = check("U0 Main() {\n  goto past;\n  I64 x = 1;\npast:\n  return;\n}").unwrap_err();
        assert!(err.message.contains("goto jumps across initialized declaration: x"));
    }

    #[test]
    fn goto_into_deeper_scope() {
        let err = check("U0 F() { goto inner; { inner: return; } }").unwrap_err();
        assert!(err.message.contains("goto jumps into deeper scope"));
    }

    #[test]
    fn goto_unknown_label() {
        let err = check("U0 F() { goto nowhere; }").unwrap_err();
        assert!(err.message.contains("goto target label not found"));
    }

    #[test]
    fn backward_goto_over_initializer_is_legal() {
        assert!(check("U0 F() { I64 x = 1; again: x = x - 1; if (x) goto again; }").is_ok());
    }

    #[test]
    fn no_paren_call_requires_all_defaults() {
        let typed = check("U0 Beep(I64 tone=440) { return; } U0 F() { Beep; }").unwrap();
        let block = typed.children[1].find_child(NodeKind::Block).unwrap();
        assert_eq!(block.children[0].kind, NodeKind::NoParenCallStmt);

        let err = check("U0 Beep(I64 tone) { return; } U0 F() { Beep; }").unwrap_err();
        assert!(err.message.contains("requires defaults for all params"));
    }

    #[test]
    fn empty_arg_requires_default() {
        assert!(check("I64 G(I64 a, I64 b=2) { return a+b; } U0 F() { G(1,); }").is_ok());
        let err = check("I64 G(I64 a, I64 b) { return a+b; } U0 F() { G(1,); }").unwrap_err();
        assert!(err.message.contains("missing argument without default"));
    }

    #[test]
    fn trailing_defaults_may_be_omitted() {
        assert!(check("I64 G(I64 a, I64 b=2) { return a+b; } U0 F() { G(1); }").is_ok());
        let err = check("I64 G(I64 a, I64 b) { return a; } U0 F() { G(1); }").unwrap_err();
        assert!(err.message.contains("missing required argument"));
    }

    #[test]
    fn lane_width_and_index_checks() {
        assert!(check("U0 F() { I64 v; v.u8[7] = 1; }").is_ok());
        let err = check("U0 F() { I64 v; v.u8[8] = 1; }").unwrap_err();
        assert!(err.message.contains("lane index out of range"));
        let err = check("U0 F() { U8 v; I64 x; x = v.u16[0]; }").unwrap_err();
        assert!(err.message.contains("wider than base type"));
    }

    #[test]
    fn member_resolution_via_class_table() {
        let typed = check("class CPoint { I64 x; I64 y; } U0 F(CPoint *p) { I64 v; v = p->x; }")
            .unwrap();
        let block = typed.children[1].find_child(NodeKind::Block).unwrap();
        let assign = &block.children[1].children[0];
        assert_eq!(assign.children[1].ty.as_ref().unwrap().to_string(), "I64");

        let err = check("class CPoint { I64 x; } U0 F(CPoint *p) { I64 v; v = p->z; }").unwrap_err();
        assert!(err.message.contains("unknown member 'z' on CPoint"));
    }

    #[test]
    fn duplicate_field_rejected() {
        let err = check("class C { I64 a; I64 a; }").unwrap_err();
        assert!(err.message.contains("duplicate field in C: a"));
    }

    #[test]
    fn union_layout_is_max() {
        let program = parse("union U { I64 big; U8 small; }", "t.hc").unwrap();
        let mut typed = TypedNode::from_parsed(&program);
        let mut analyzer = SemanticAnalyzer::new("t.hc", true);
        analyzer.analyze(&mut typed).unwrap();
        assert_eq!(analyzer.class_layout_sizes.get("U"), Some(&8));
        assert_eq!(analyzer.class_field_offsets["U"]["small"], 0);
    }

    #[test]
    fn throw_requires_integral_payload() {
        assert!(check("U0 F() { throw(7); }").is_ok());
        let err = check("U0 F() { throw(1.5); }").unwrap_err();
        assert!(err.message.contains("throw payload must be integral-like"));
    }

    #[test]
    fn return_type_checked() {
        let err = check("U8 *F() { return 1.5; }").unwrap_err();
        assert!(err.message.contains("return type mismatch"));
    }

    #[test]
    fn builtins_are_visible() {
        assert!(check("U0 F() { I64 x; x = MemberMetaData(NULL, NULL); PressAKey; }").is_ok());
    }

    #[test]
    fn sema_is_idempotent() {
        let program =
            parse("I64 Add(I64 a, I64 b) { return a + b; } I64 Main() { return Add(40, 2); }", "t.hc")
                .unwrap();
        let first = analyze(&program, "t.hc", true).unwrap();
        let second = analyze(&program, "t.hc", true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn conflicting_redeclaration_rejected() {
        let err = check("I64 F(I64 a); U0 F(I64 a) { return; }").unwrap_err();
        assert!(err.message.contains("conflicting function declaration"));
    }

    #[test]
    fn dynamic_format_forwarding() {
        assert!(check("U0 F(U8 *fmt) { \"\" fmt, 1; }").is_ok());
        let err = check("U0 F() { \"\" 42, 1; }").unwrap_err();
        assert!(err.message.contains("dynamic print format expression must be pointer-like"));
    }
}
