//! HIR → IR emission.
//!
//! Translates an [`HirModule`] into the crate's LLVM-shaped [`ir::Module`]:
//! aggregate layouts, folded global constants, the reflection table, function
//! bodies as CFGs, lane bit-field read-modify-write sequences, setjmp-based
//! exception frames, print thunks, and the host `main` wrapper. The emitted
//! module is verified before it is returned.

use crate::hir::*;
use crate::ir::{
    BinOp, Callee, CastOp, Const, Function, FunctionBuilder, Global, ICmpPred, IrLinkage, Module,
    Param, RmwOp, StructDef, Type, Value,
};
use crate::runtime::{TRY_FRAME_SIZE, RUNTIME_REFLECTION_TABLE};
use holyc_frontend::decl::split_typed_name;
use holyc_frontend::literals::decode_quoted_string;
use holyc_frontend::preprocessor::parse_int_base0;
use holyc_frontend::printfmt::{expected_arg_count, parse_format_atoms, FormatAtom};
use holyc_frontend::types::LaneInfo;
use holyc_frontend::{Linkage, Ty, TyKind};
use std::collections::HashMap;

type EmitResult<T> = Result<T, String>;

/// Emit and verify an IR module for the lowered program.
pub fn emit_ir(hir: &HirModule, module_name: &str, target_triple: &str) -> EmitResult<Module> {
    let mut emitter = Emitter::new(module_name, target_triple);
    emitter.emit(hir)?;
    crate::ir::verify::verify_module(&emitter.module)?;
    Ok(emitter.module)
}

/// A value together with its IR type.
#[derive(Debug, Clone)]
struct TV {
    v: Value,
    ty: Type,
}

impl TV {
    fn new(v: Value, ty: Type) -> TV {
        TV { v, ty }
    }

    fn i64(v: Value) -> TV {
        TV { v, ty: Type::I64 }
    }
}

/// An addressable location: pointer plus pointee type.
#[derive(Debug, Clone)]
struct LV {
    ptr: Value,
    pointee: Type,
}

#[derive(Debug, Clone)]
struct AggregateMember {
    index: u32,
    ty: Type,
}

#[derive(Debug, Clone)]
struct AggregateLayout {
    struct_name: String,
    members: HashMap<String, AggregateMember>,
}

struct FunctionFrame {
    locals: HashMap<String, LV>,
    label_blocks: HashMap<String, String>,
    break_targets: Vec<String>,
}

struct Emitter {
    module: Module,
    /// Function name → (ret, param types); includes runtime declarations.
    signatures: HashMap<String, (Type, Vec<Type>)>,
    global_types: HashMap<String, Type>,
    global_constants: HashMap<String, Const>,
    aggregate_layouts: HashMap<String, AggregateLayout>,
    /// Decoded string text → global name.
    string_literals: HashMap<String, String>,
    next_string_id: u32,
    reflection_table: Option<(String, u64)>,
}

impl Emitter {
    fn new(module_name: &str, target_triple: &str) -> Emitter {
        let mut module = Module::new(module_name);
        module.target_triple = target_triple.to_string();
        Emitter {
            module,
            signatures: HashMap::new(),
            global_types: HashMap::new(),
            global_constants: HashMap::new(),
            aggregate_layouts: HashMap::new(),
            string_literals: HashMap::new(),
            next_string_id: 0,
            reflection_table: None,
        }
    }

    fn emit(&mut self, hir: &HirModule) -> EmitResult<()> {
        self.build_aggregate_layouts(hir)?;
        self.emit_top_level_items(&hir.top_level_items)?;
        self.emit_reflection_table(&hir.reflection)?;

        for decl in &hir.function_decls {
            self.declare_function(
                &decl.name,
                &decl.return_ty,
                &decl.params,
                decl.linkage,
            )?;
        }

        for fn_def in &hir.functions {
            if !self.signatures.contains_key(&fn_def.name) {
                return Err(format!("irbuilder emit: missing declared function: {}", fn_def.name));
            }
            let linkage = to_ir_linkage(fn_def.linkage);
            if let Some(func) = self.module.function_mut(&fn_def.name) {
                func.linkage = linkage;
            }
            self.build_function(fn_def)?;
        }

        self.emit_host_main_wrapper()?;
        Ok(())
    }

    // -- types ---------------------------------------------------------------

    fn to_ir_type(&self, ty: &Ty) -> Type {
        if ty.is_pointer() {
            return Type::Ptr;
        }
        match &ty.kind {
            TyKind::U0 => Type::Void,
            TyKind::Bool | TyKind::BoolChained => Type::I1,
            TyKind::I8 | TyKind::U8 => Type::I8,
            TyKind::I16 | TyKind::U16 => Type::I16,
            TyKind::I32 | TyKind::U32 => Type::I32,
            TyKind::Named(name) => match self.aggregate_layouts.get(name) {
                Some(layout) => Type::Struct(layout.struct_name.clone()),
                None => Type::I64,
            },
            // The execution model is 64-bit integer centric; F64 values live
            // in i64 storage and only print packing reinterprets them.
            _ => Type::I64,
        }
    }

    // -- aggregates ----------------------------------------------------------

    fn build_aggregate_layouts(&mut self, hir: &HirModule) -> EmitResult<()> {
        let mut order: Vec<String> = Vec::new();
        let mut fields_by_aggregate: HashMap<String, Vec<&HirReflectionField>> = HashMap::new();
        for field in &hir.reflection.fields {
            if !fields_by_aggregate.contains_key(&field.aggregate_name) {
                order.push(field.aggregate_name.clone());
            }
            fields_by_aggregate.entry(field.aggregate_name.clone()).or_default().push(field);
        }

        let unions = hir.union_aggregates();

        // Shells first so member types can refer to other aggregates.
        for name in &order {
            let struct_name = format!("hc.{name}");
            self.module.structs.push(StructDef { name: struct_name.clone(), fields: Vec::new() });
            self.aggregate_layouts.insert(
                name.clone(),
                AggregateLayout { struct_name, members: HashMap::new() },
            );
        }

        for name in &order {
            let fields = &fields_by_aggregate[name];
            let is_union = unions.contains(name);
            let struct_name = self.aggregate_layouts[name].struct_name.clone();

            let body;
            let mut members = HashMap::new();
            if fields.is_empty() {
                body = vec![Type::I8];
            } else if is_union {
                let mut storage_ty = self.to_ir_type(&Ty::parse(&fields[0].field_type));
                let mut storage_size = self.module.size_of(&storage_ty);
                for field in fields.iter() {
                    let field_ty = self.to_ir_type(&Ty::parse(&field.field_type));
                    let field_size = self.module.size_of(&field_ty);
                    if field_size > storage_size {
                        storage_ty = field_ty.clone();
                        storage_size = field_size;
                    }
                    members.insert(
                        field.field_name.clone(),
                        AggregateMember { index: 0, ty: field_ty },
                    );
                }
                body = vec![storage_ty];
            } else {
                let mut tys = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    let field_ty = self.to_ir_type(&Ty::parse(&field.field_type));
                    members.insert(
                        field.field_name.clone(),
                        AggregateMember { index: i as u32, ty: field_ty.clone() },
                    );
                    tys.push(field_ty);
                }
                body = tys;
            }

            if let Some(def) = self.module.structs.iter_mut().find(|s| s.name == struct_name) {
                def.fields = body;
            }
            if let Some(layout) = self.aggregate_layouts.get_mut(name) {
                layout.members = members;
            }
        }
        Ok(())
    }

    // -- globals -------------------------------------------------------------

    fn emit_top_level_items(&mut self, items: &[HirStmt]) -> EmitResult<()> {
        for item in items {
            match item {
                HirStmt::VarDecl(decl) => self.emit_global_variable(decl)?,
                HirStmt::LinkageDecl(linkage) => self.emit_linkage_decl(linkage)?,
                // Reflection metadata is represented separately and emitted
                // via the reflection table.
                HirStmt::MetadataDecl(_) => {}
                other => {
                    return Err(format!(
                        "irbuilder emit: unsupported top-level statement kind: {}",
                        stmt_kind_name(other)
                    ));
                }
            }
        }
        Ok(())
    }

    fn emit_global_variable(&mut self, decl: &HirVarDecl) -> EmitResult<()> {
        let ty = self.to_ir_type(&decl.ty);
        if !matches!(ty, Type::I1 | Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Ptr
            | Type::Struct(_) | Type::Array(..))
        {
            return Err(format!("irbuilder emit: unsupported global type for {}", decl.name));
        }

        let init = match &decl.init {
            Some(expr) => self.eval_global_const_expr(expr, &ty).map_err(|msg| {
                format!("irbuilder emit: global initializer for {} is not constant: {msg}", decl.name)
            })?,
            None => Const::Zero(ty.clone()),
        };

        let is_static = decl.storage == StorageClass::StaticGlobal;
        let linkage = if is_static { IrLinkage::Internal } else { IrLinkage::External };

        if let Some(existing) = self.module.globals.iter_mut().find(|g| g.name == decl.name) {
            if existing.ty != ty {
                return Err(format!(
                    "irbuilder emit: conflicting global declaration type for {}",
                    decl.name
                ));
            }
            if existing.init.is_some() {
                return Err(format!("irbuilder emit: duplicate global definition: {}", decl.name));
            }
            existing.init = Some(init.clone());
            existing.linkage = linkage;
        } else {
            self.module.globals.push(Global {
                name: decl.name.clone(),
                ty: ty.clone(),
                linkage,
                is_const: false,
                unnamed_addr: false,
                init: Some(init.clone()),
            });
        }
        self.global_types.insert(decl.name.clone(), ty);
        self.global_constants.insert(decl.name.clone(), init);
        Ok(())
    }

    fn emit_linkage_decl(&mut self, decl: &HirLinkageDecl) -> EmitResult<()> {
        const KINDS: &[&str] = &["extern", "import", "_extern", "_import", "export", "_export"];
        if !KINDS.contains(&decl.kind.as_str()) {
            return Err(format!("irbuilder emit: unsupported linkage directive: {}", decl.kind));
        }
        if decl.symbol.is_empty() {
            return Err("irbuilder emit: linkage declaration missing symbol payload".to_string());
        }

        let (decl_ty_text, decl_name) = split_typed_name(&decl.symbol);
        if decl_name.is_empty() {
            return Err(format!(
                "irbuilder emit: invalid linkage declaration payload: {}",
                decl.symbol
            ));
        }

        let ty = self.to_ir_type(&Ty::parse(&decl_ty_text));
        if !ty.is_integer() && !ty.is_pointer() {
            return Err(format!("irbuilder emit: unsupported linkage type for {decl_name}"));
        }

        match self.global_types.get(&decl_name) {
            Some(existing) if *existing != ty => Err(format!(
                "irbuilder emit: conflicting linkage declaration type for {decl_name}"
            )),
            Some(_) => Ok(()),
            None => {
                self.module.globals.push(Global {
                    name: decl_name.clone(),
                    ty: ty.clone(),
                    linkage: IrLinkage::External,
                    is_const: false,
                    unnamed_addr: false,
                    init: None,
                });
                self.global_types.insert(decl_name, ty);
                Ok(())
            }
        }
    }

    fn emit_reflection_table(&mut self, table: &HirReflectionTable) -> EmitResult<()> {
        if table.fields.is_empty() {
            return Ok(());
        }

        let row_ty = Type::Tuple(vec![Type::Ptr, Type::Ptr, Type::Ptr, Type::Ptr]);
        let mut rows = Vec::with_capacity(table.fields.len());
        for field in &table.fields {
            let aggregate = self.intern_decoded_string(field.aggregate_name.clone());
            let name = self.intern_decoded_string(field.field_name.clone());
            let field_ty = self.intern_decoded_string(field.field_type.clone());
            let annotations = self.intern_decoded_string(field.annotations.join(" "));
            rows.push(Const::Struct(
                vec![Type::Ptr, Type::Ptr, Type::Ptr, Type::Ptr],
                vec![
                    Const::GlobalRef(aggregate),
                    Const::GlobalRef(name),
                    Const::GlobalRef(field_ty),
                    Const::GlobalRef(annotations),
                ],
            ));
        }

        let table_ty = Type::Array(Box::new(row_ty.clone()), rows.len() as u64);
        self.module.globals.push(Global {
            name: RUNTIME_REFLECTION_TABLE.to_string(),
            ty: table_ty,
            linkage: IrLinkage::Private,
            is_const: true,
            unnamed_addr: true,
            init: Some(Const::Array(row_ty, rows)),
        });
        self.reflection_table =
            Some((RUNTIME_REFLECTION_TABLE.to_string(), table.fields.len() as u64));
        Ok(())
    }

    // -- functions -----------------------------------------------------------

    fn declare_function(
        &mut self,
        name: &str,
        return_ty: &Ty,
        params: &[(Ty, String)],
        linkage: Linkage,
    ) -> EmitResult<()> {
        let ret = self.to_ir_type(return_ty);
        let param_tys: Vec<Type> = params.iter().map(|(ty, _)| self.to_ir_type(ty)).collect();

        if let Some((existing_ret, existing_params)) = self.signatures.get(name) {
            if *existing_ret != ret || *existing_params != param_tys {
                return Err(format!("irbuilder emit: function redeclaration conflict: {name}"));
            }
            return Ok(());
        }

        self.module.functions.push(Function {
            name: name.to_string(),
            ret: ret.clone(),
            params: params
                .iter()
                .zip(param_tys.iter())
                .map(|((_, pname), ty)| Param { ty: ty.clone(), name: pname.clone() })
                .collect(),
            linkage: to_ir_linkage(linkage),
            blocks: Vec::new(),
        });
        self.signatures.insert(name.to_string(), (ret, param_tys));
        Ok(())
    }

    /// Declare a runtime shim if it has not been referenced yet.
    fn get_or_insert_runtime(&mut self, name: &str, ret: Type, params: &[Type]) -> EmitResult<()> {
        if let Some((existing_ret, existing_params)) = self.signatures.get(name) {
            if *existing_ret != ret || existing_params.as_slice() != params {
                return Err(format!("irbuilder emit: conflicting runtime signature for {name}"));
            }
            return Ok(());
        }
        self.module.functions.push(Function {
            name: name.to_string(),
            ret: ret.clone(),
            params: params
                .iter()
                .enumerate()
                .map(|(i, ty)| Param { ty: ty.clone(), name: format!("p{i}") })
                .collect(),
            linkage: IrLinkage::External,
            blocks: Vec::new(),
        });
        self.signatures.insert(name.to_string(), (ret, params.to_vec()));
        Ok(())
    }

    fn build_function(&mut self, fn_def: &HirFunction) -> EmitResult<()> {
        let shell = self
            .module
            .function(&fn_def.name)
            .cloned()
            .ok_or_else(|| format!("irbuilder emit: missing declared function: {}", fn_def.name))?;

        let mut builder = FunctionBuilder::new(shell);
        let mut frame = FunctionFrame {
            locals: HashMap::new(),
            label_blocks: HashMap::new(),
            break_targets: Vec::new(),
        };

        for index in 0..builder.param_count() {
            let param = builder.param(index).clone();
            let slot = builder.entry_alloca(param.ty.clone());
            builder.store(param.ty.clone(), Value::Arg(index as u32), slot.clone());
            frame.locals.insert(param.name.clone(), LV { ptr: slot, pointee: param.ty });
        }

        self.emit_stmt_list(&fn_def.body, &mut builder, &mut frame)?;

        if !builder.is_terminated() {
            let ret = builder.return_type().clone();
            match ret {
                Type::Void => builder.ret(None),
                ty if ty.is_integer() => builder.ret(Some((ty, Value::ConstInt(Type::I64, 0)))),
                Type::Ptr => builder.ret(Some((Type::Ptr, Value::NullPtr))),
                ty => builder.ret(Some((ty.clone(), Value::ConstInt(ty, 0)))),
            }
        }

        let built = builder.finish();
        if let Some(slot) = self.module.function_mut(&fn_def.name) {
            *slot = built;
        }
        Ok(())
    }

    fn emit_stmt_list(
        &mut self,
        stmts: &[HirStmt],
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        for stmt in stmts {
            if builder.is_terminated() && !matches!(stmt, HirStmt::Label(_)) {
                continue;
            }
            self.emit_stmt(stmt, builder, frame)?;
        }
        Ok(())
    }

    fn emit_stmt(
        &mut self,
        stmt: &HirStmt,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        match stmt {
            HirStmt::VarDecl(decl) => {
                let ty = self.to_ir_type(&decl.ty);
                let slot = builder.entry_alloca(ty.clone());
                frame
                    .locals
                    .insert(decl.name.clone(), LV { ptr: slot.clone(), pointee: ty.clone() });
                if let Some(init) = &decl.init {
                    let value = self.emit_expr(init, builder, frame)?;
                    let casted = self.cast_if_needed(builder, &value, &ty).ok_or_else(|| {
                        format!("irbuilder emit: variable initializer type mismatch for {}", decl.name)
                    })?;
                    builder.store(ty, casted, slot);
                }
                Ok(())
            }

            HirStmt::Assign(assign) => {
                let lv = self.resolve_named_lvalue(&assign.target, builder, frame)?;
                let rhs = self.emit_expr(&assign.value, builder, frame)?;

                let to_store = if assign.op == "=" {
                    rhs
                } else {
                    let current = builder.load(lv.pointee.clone(), lv.ptr.clone());
                    let current_tv = TV::new(current, lv.pointee.clone());
                    self.emit_binary_op(builder, &assign_op_to_binary(&assign.op), &current_tv, &rhs)?
                };

                let casted =
                    self.cast_if_needed(builder, &to_store, &lv.pointee).ok_or_else(|| {
                        format!("irbuilder emit: assignment type mismatch for {}", assign.target)
                    })?;
                builder.store(lv.pointee, casted, lv.ptr);
                Ok(())
            }

            HirStmt::Expr(expr) => {
                self.emit_expr(expr, builder, frame)?;
                Ok(())
            }

            HirStmt::NoParenCall { name, .. } => {
                let Some((ret, params)) = self.signatures.get(name).cloned() else {
                    return Err(format!("irbuilder emit: unknown function {name}"));
                };
                if !params.is_empty() {
                    return Err(format!(
                        "irbuilder emit: no-paren call requires zero-arg callee: {name}"
                    ));
                }
                builder.call(Callee::Direct(name.clone()), ret, Vec::new());
                Ok(())
            }

            HirStmt::Print(print) => self.emit_print(print, builder, frame),

            HirStmt::Lock(body) => self.emit_lock_stmt(body, builder, frame),

            HirStmt::If(if_stmt) => self.emit_if_stmt(if_stmt, builder, frame),

            HirStmt::While(loop_stmt) => self.emit_while_stmt(loop_stmt, builder, frame),

            HirStmt::DoWhile(loop_stmt) => self.emit_do_while_stmt(loop_stmt, builder, frame),

            HirStmt::Switch(switch) => self.emit_switch_stmt(switch, builder, frame),

            HirStmt::Break => {
                let Some(target) = frame.break_targets.last().cloned() else {
                    return Err("irbuilder emit: break used outside switch/loop".to_string());
                };
                builder.br(&target);
                Ok(())
            }

            HirStmt::Return(value) => {
                let ret_ty = builder.return_type().clone();
                if ret_ty.is_void() {
                    builder.ret(None);
                    return Ok(());
                }

                let tv = match value {
                    Some(expr) => self.emit_expr(expr, builder, frame)?,
                    None if ret_ty.is_pointer() => TV::new(Value::NullPtr, Type::Ptr),
                    None => TV::new(Value::ConstInt(ret_ty.clone(), 0), ret_ty.clone()),
                };
                let casted = self
                    .cast_if_needed(builder, &tv, &ret_ty)
                    .ok_or_else(|| "irbuilder emit: return type mismatch".to_string())?;
                builder.ret(Some((ret_ty, casted)));
                Ok(())
            }

            HirStmt::Throw { payload, .. } => {
                let tv = self.emit_expr(payload, builder, frame)?;
                let coerced = self
                    .coerce_i64(builder, &tv)
                    .ok_or_else(|| "irbuilder emit: throw payload must be integer-convertible".to_string())?;
                self.get_or_insert_runtime("hc_throw_i64", Type::Void, &[Type::I64])?;
                builder.call(
                    Callee::Direct("hc_throw_i64".to_string()),
                    Type::Void,
                    vec![(Type::I64, coerced)],
                );
                builder.unreachable();
                Ok(())
            }

            HirStmt::TryCatch(try_catch) => self.emit_try_catch(try_catch, builder, frame),

            HirStmt::Label(name) => {
                if name.is_empty() {
                    return Err("irbuilder emit: invalid empty label".to_string());
                }
                let label = self.get_or_create_label_block(name, builder, frame);
                if !builder.is_terminated() {
                    builder.br(&label);
                }
                builder.position_at_end(&label);
                Ok(())
            }

            HirStmt::Goto(target) => {
                if target.is_empty() {
                    return Err("irbuilder emit: invalid goto target".to_string());
                }
                let label = self.get_or_create_label_block(target, builder, frame);
                builder.br(&label);
                Ok(())
            }

            HirStmt::InlineAsm(asm_stmt) => self.emit_inline_asm(asm_stmt, builder, frame),

            HirStmt::MetadataDecl(_) | HirStmt::LinkageDecl(_) => Err(format!(
                "irbuilder emit: unsupported statement kind in primary backend: {}",
                stmt_kind_name(stmt)
            )),
        }
    }

    fn get_or_create_label_block(
        &mut self,
        label: &str,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> String {
        if let Some(existing) = frame.label_blocks.get(label) {
            return existing.clone();
        }
        let created = builder.create_block(&format!("label.{label}"));
        frame.label_blocks.insert(label.to_string(), created.clone());
        created
    }

    fn emit_if_stmt(
        &mut self,
        if_stmt: &HirIf,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let cond_tv = self.emit_expr(&if_stmt.cond, builder, frame)?;
        let cond = self
            .to_bool(builder, &cond_tv)
            .ok_or_else(|| "irbuilder emit: if condition is not bool-convertible".to_string())?;

        let then_bb = builder.create_block("if.then");
        let else_bb = builder.create_block("if.else");
        let end_bb = builder.create_block("if.end");

        builder.cond_br(cond, &then_bb, &else_bb);

        builder.position_at_end(&then_bb);
        self.emit_stmt_list(&if_stmt.then_body, builder, frame)?;
        if !builder.is_terminated() {
            builder.br(&end_bb);
        }

        builder.position_at_end(&else_bb);
        self.emit_stmt_list(&if_stmt.else_body, builder, frame)?;
        if !builder.is_terminated() {
            builder.br(&end_bb);
        }

        builder.position_at_end(&end_bb);
        Ok(())
    }

    fn emit_while_stmt(
        &mut self,
        loop_stmt: &HirLoop,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let cond_bb = builder.create_block("while.cond");
        let body_bb = builder.create_block("while.body");
        let end_bb = builder.create_block("while.end");

        builder.br(&cond_bb);

        builder.position_at_end(&cond_bb);
        let cond_tv = self.emit_expr(&loop_stmt.cond, builder, frame)?;
        let cond = self
            .to_bool(builder, &cond_tv)
            .ok_or_else(|| "irbuilder emit: while condition is not bool-convertible".to_string())?;
        builder.cond_br(cond, &body_bb, &end_bb);

        builder.position_at_end(&body_bb);
        frame.break_targets.push(end_bb.clone());
        let body_result = self.emit_stmt_list(&loop_stmt.body, builder, frame);
        frame.break_targets.pop();
        body_result?;
        if !builder.is_terminated() {
            builder.br(&cond_bb);
        }

        builder.position_at_end(&end_bb);
        Ok(())
    }

    fn emit_do_while_stmt(
        &mut self,
        loop_stmt: &HirLoop,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let body_bb = builder.create_block("do.body");
        let cond_bb = builder.create_block("do.cond");
        let end_bb = builder.create_block("do.end");

        builder.br(&body_bb);

        builder.position_at_end(&body_bb);
        frame.break_targets.push(end_bb.clone());
        let body_result = self.emit_stmt_list(&loop_stmt.body, builder, frame);
        frame.break_targets.pop();
        body_result?;
        if !builder.is_terminated() {
            builder.br(&cond_bb);
        }

        builder.position_at_end(&cond_bb);
        let cond_tv = self.emit_expr(&loop_stmt.cond, builder, frame)?;
        let cond = self.to_bool(builder, &cond_tv).ok_or_else(|| {
            "irbuilder emit: do-while condition is not bool-convertible".to_string()
        })?;
        builder.cond_br(cond, &body_bb, &end_bb);

        builder.position_at_end(&end_bb);
        Ok(())
    }

    fn emit_switch_stmt(
        &mut self,
        switch: &HirSwitch,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let cond_tv = self.emit_expr(&switch.cond, builder, frame)?;
        let cond = self.coerce_i64(builder, &cond_tv).ok_or_else(|| {
            "irbuilder emit: switch condition must be integer-convertible".to_string()
        })?;

        let end_bb = builder.create_block("sw.end");

        let case_bbs: Vec<String> = (0..switch.cases.len())
            .map(|i| builder.create_block(&format!("sw.case.{i}")))
            .collect();

        let default_bb = if switch.default_body.is_empty() {
            end_bb.clone()
        } else {
            builder.create_block("sw.default")
        };

        if case_bbs.is_empty() {
            builder.br(&default_bb);
        } else {
            let mut current_test = builder.create_block("sw.test");
            builder.br(&current_test);

            // Null-cases inherit last_end + 1 at emission time.
            let mut last_case_end: i64 = -1;
            for (i, case) in switch.cases.iter().enumerate() {
                builder.position_at_end(&current_test);

                let (begin, end) = match case.kind {
                    CaseKind::Null => {
                        let begin = last_case_end + 1;
                        (begin, begin)
                    }
                    CaseKind::Single => (case.begin, case.begin),
                    CaseKind::Range => (case.begin, case.end),
                };
                last_case_end = end;

                let false_target = if i + 1 < case_bbs.len() {
                    builder.create_block(&format!("sw.test.{}", i + 1))
                } else {
                    default_bb.clone()
                };

                let matched = if begin == end {
                    builder.icmp(ICmpPred::Eq, Type::I64, cond.clone(), Value::i64_const(begin))
                } else {
                    let ge = builder.icmp(
                        ICmpPred::Sge,
                        Type::I64,
                        cond.clone(),
                        Value::i64_const(begin),
                    );
                    let le =
                        builder.icmp(ICmpPred::Sle, Type::I64, cond.clone(), Value::i64_const(end));
                    builder.bin(BinOp::And, Type::I1, ge, le)
                };

                builder.cond_br(matched, &case_bbs[i], &false_target);

                if i + 1 < case_bbs.len() {
                    current_test = false_target;
                }
            }
        }

        if !switch.default_body.is_empty() {
            builder.position_at_end(&default_bb);
            frame.break_targets.push(end_bb.clone());
            let result = self.emit_stmt_list(&switch.default_body, builder, frame);
            frame.break_targets.pop();
            result?;
            if !builder.is_terminated() {
                builder.br(&end_bb);
            }
        }

        frame.break_targets.push(end_bb.clone());
        for (i, case) in switch.cases.iter().enumerate() {
            builder.position_at_end(&case_bbs[i]);
            let result = self.emit_stmt_list(&case.body, builder, frame);
            if result.is_err() {
                frame.break_targets.pop();
                return result;
            }

            if !builder.is_terminated() {
                if i + 1 < case_bbs.len() {
                    builder.br(&case_bbs[i + 1]);
                } else if !switch.default_body.is_empty() {
                    builder.br(&default_bb);
                } else {
                    builder.br(&end_bb);
                }
            }
        }
        frame.break_targets.pop();

        builder.position_at_end(&end_bb);
        Ok(())
    }

    fn emit_try_catch(
        &mut self,
        try_catch: &HirTryCatch,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        // Reserved as i64 words so the slot carries the runtime's jmp_buf
        // alignment requirement.
        let storage_ty = Type::Array(Box::new(Type::I64), (TRY_FRAME_SIZE / 8) as u64);
        let frame_ptr = builder.entry_alloca(storage_ty);

        self.get_or_insert_runtime("hc_try_push", Type::Void, &[Type::Ptr])?;
        self.get_or_insert_runtime("hc_try_pop", Type::Void, &[Type::Ptr])?;
        self.get_or_insert_runtime("_setjmp", Type::I32, &[Type::Ptr])?;

        builder.call(
            Callee::Direct("hc_try_push".to_string()),
            Type::Void,
            vec![(Type::Ptr, frame_ptr.clone())],
        );
        let sj_value = builder
            .call(
                Callee::Direct("_setjmp".to_string()),
                Type::I32,
                vec![(Type::Ptr, frame_ptr.clone())],
            )
            .expect("_setjmp returns i32");
        let run_try =
            builder.icmp(ICmpPred::Eq, Type::I32, sj_value, Value::ConstInt(Type::I32, 0));

        let try_bb = builder.create_block("try.body");
        let catch_bb = builder.create_block("catch.body");
        let end_bb = builder.create_block("try.end");

        builder.cond_br(run_try, &try_bb, &catch_bb);

        builder.position_at_end(&try_bb);
        self.emit_stmt_list(&try_catch.try_body, builder, frame)?;
        if !builder.is_terminated() {
            builder.call(
                Callee::Direct("hc_try_pop".to_string()),
                Type::Void,
                vec![(Type::Ptr, frame_ptr)],
            );
            builder.br(&end_bb);
        }

        builder.position_at_end(&catch_bb);
        self.emit_stmt_list(&try_catch.catch_body, builder, frame)?;
        if !builder.is_terminated() {
            builder.br(&end_bb);
        }

        builder.position_at_end(&end_bb);
        Ok(())
    }

    fn emit_inline_asm(
        &mut self,
        asm_stmt: &HirInlineAsm,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let mut template = asm_stmt.template.clone();
        if template.is_empty() {
            return Err("irbuilder emit: inline asm requires non-empty body/template".to_string());
        }
        if template.starts_with('"') && template.ends_with('"') && template.len() >= 2 {
            template = decode_quoted_string(&template);
        }

        let mut constraints: Vec<String> = Vec::new();
        let mut output_count = 0usize;
        let mut args: Vec<(Type, Value)> = Vec::new();

        for operand in &asm_stmt.operands {
            let mut constraint = operand.constraint.trim().to_string();
            if constraint.starts_with('"') && constraint.ends_with('"') && constraint.len() >= 2 {
                constraint = decode_quoted_string(&constraint);
            }
            if constraint.is_empty() {
                continue;
            }

            let is_output = constraint.starts_with('=');
            let is_clobber = constraint.starts_with('~');
            let is_legacy_register_only =
                constraint.len() >= 3 && constraint.starts_with('{') && constraint.ends_with('}');

            if is_output {
                if operand.value.is_some() {
                    return Err(
                        "irbuilder emit: inline asm output constraints do not take operand expressions"
                            .to_string(),
                    );
                }
                constraints.push(constraint);
                output_count += 1;
                continue;
            }

            if is_clobber || is_legacy_register_only {
                if operand.value.is_some() {
                    return Err(
                        "irbuilder emit: inline asm clobber constraints do not take operand expressions"
                            .to_string(),
                    );
                }
                constraints.push(if is_legacy_register_only {
                    format!("~{constraint}")
                } else {
                    constraint
                });
                continue;
            }

            constraints.push(constraint.clone());
            let Some(value_expr) = &operand.value else {
                return Err(format!(
                    "irbuilder emit: inline asm input constraint requires operand expression: {constraint}"
                ));
            };
            let tv = self.emit_expr(value_expr, builder, frame)?;
            let coerced = self.coerce_i64(builder, &tv).ok_or_else(|| {
                "irbuilder emit: inline asm operand must be integer/pointer-compatible".to_string()
            })?;
            args.push((Type::I64, coerced));
        }

        let ret = match output_count {
            0 => Type::Void,
            1 => Type::I64,
            n => Type::Tuple(vec![Type::I64; n]),
        };

        builder.call(
            Callee::Asm { template, constraints: constraints.join(",") },
            ret,
            args,
        );
        Ok(())
    }

    fn emit_lock_stmt(
        &mut self,
        body: &[HirStmt],
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        for nested in body {
            match nested {
                HirStmt::Assign(assign) => {
                    let lhs = HirExpr::new(
                        HirExprKind::Var,
                        assign.target.clone(),
                        assign.ty.clone().unwrap_or(Ty::I64),
                    );
                    self.emit_atomic_assign(&lhs, &assign.op, &assign.value, builder, frame)?;
                }

                HirStmt::Expr(expr) if expr.kind == HirExprKind::Assign
                    && expr.children.len() == 2 =>
                {
                    let op = expr.text.clone();
                    self.emit_atomic_assign(
                        &expr.children[0],
                        &op,
                        &expr.children[1],
                        builder,
                        frame,
                    )?;
                }

                HirStmt::Expr(expr)
                    if matches!(expr.kind, HirExprKind::Postfix | HirExprKind::Unary)
                        && expr.children.len() == 1
                        && (expr.text == "++" || expr.text == "--") =>
                {
                    self.emit_atomic_inc_dec(&expr.children[0], expr.text == "++", builder, frame)?;
                }

                other => {
                    return Err(format!(
                        "irbuilder emit: unsupported statement inside lock block: {}",
                        stmt_kind_name(other)
                    ));
                }
            }
        }
        Ok(())
    }

    fn emit_atomic_assign(
        &mut self,
        lhs_expr: &HirExpr,
        assign_op: &str,
        rhs_expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let lhs = self.emit_lvalue(lhs_expr, builder, frame)?;
        if !lhs.pointee.is_integer() {
            return Err("irbuilder emit: lock requires integer lvalue target".to_string());
        }

        let rhs = self.emit_expr(rhs_expr, builder, frame)?;
        let rhs_value = self
            .cast_if_needed(builder, &rhs, &lhs.pointee)
            .ok_or_else(|| "irbuilder emit: lock assignment rhs type mismatch".to_string())?;

        let rmw_op = match assign_op {
            "=" => RmwOp::Xchg,
            "+=" => RmwOp::Add,
            "-=" => RmwOp::Sub,
            "&=" => RmwOp::And,
            "|=" => RmwOp::Or,
            "^=" => RmwOp::Xor,
            other => {
                return Err(format!(
                    "irbuilder emit: unsupported lock assignment operator {other}"
                ));
            }
        };
        builder.atomic_rmw(rmw_op, lhs.pointee, lhs.ptr, rhs_value);
        Ok(())
    }

    fn emit_atomic_inc_dec(
        &mut self,
        lvalue_expr: &HirExpr,
        increment: bool,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let lhs = self.emit_lvalue(lvalue_expr, builder, frame)?;
        if !lhs.pointee.is_integer() {
            return Err("irbuilder emit: lock inc/dec requires integer lvalue target".to_string());
        }
        let one = Value::ConstInt(lhs.pointee.clone(), 1);
        builder.atomic_rmw(
            if increment { RmwOp::Add } else { RmwOp::Sub },
            lhs.pointee,
            lhs.ptr,
            one,
        );
        Ok(())
    }

    fn emit_print(
        &mut self,
        print: &HirPrint,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<()> {
        let literal = print.literal.clone().unwrap_or_default();

        if literal.starts_with('\'') {
            self.get_or_insert_runtime("hc_put_char", Type::Void, &[Type::I64])?;
            let ch = holyc_frontend::literals::parse_char_literal(&literal);
            builder.call(
                Callee::Direct("hc_put_char".to_string()),
                Type::Void,
                vec![(Type::I64, Value::i64_const(ch))],
            );
            return Ok(());
        }

        let format_ptr = if literal.starts_with('"') {
            self.get_or_create_string_literal(&literal)
        } else {
            let fmt_tv = self.emit_expr(&print.format, builder, frame)?;
            self.cast_if_needed(builder, &fmt_tv, &Type::Ptr)
                .ok_or_else(|| "irbuilder emit: print format must be pointer-like".to_string())?
        };

        let mut float_arg_mask = vec![false; print.args.len()];
        if literal.starts_with('"') {
            let atoms = parse_format_atoms(&decode_quoted_string(&literal))
                .map_err(|msg| format!("irbuilder emit: {msg}"))?;
            if expected_arg_count(&atoms) != print.args.len() {
                return Err(
                    "irbuilder emit: print argument count mismatch for format string".to_string()
                );
            }
            float_arg_mask = build_print_float_mask(&atoms);
        }

        let mut coerced_args = Vec::with_capacity(print.args.len());
        for (arg, expect_float) in print.args.iter().zip(float_arg_mask.iter()) {
            let tv = self.emit_expr(arg, builder, frame)?;
            let packed = self.pack_print_arg(builder, &tv, *expect_float).ok_or_else(|| {
                if *expect_float {
                    "irbuilder emit: print argument is not float-convertible".to_string()
                } else {
                    "irbuilder emit: print argument is not integer/pointer-convertible".to_string()
                }
            })?;
            coerced_args.push(packed);
        }

        let args_ptr = if coerced_args.is_empty() {
            Value::NullPtr
        } else {
            let array_ty = Type::Array(Box::new(Type::I64), coerced_args.len() as u64);
            let storage = builder.alloca(array_ty.clone());
            for (i, arg) in coerced_args.iter().enumerate() {
                let slot = builder.gep(
                    array_ty.clone(),
                    storage.clone(),
                    vec![
                        (Type::I64, Value::i64_const(0)),
                        (Type::I64, Value::i64_const(i as i64)),
                    ],
                    true,
                );
                builder.store(Type::I64, arg.clone(), slot);
            }
            builder.gep(
                array_ty,
                storage,
                vec![(Type::I64, Value::i64_const(0)), (Type::I64, Value::i64_const(0))],
                true,
            )
        };

        self.get_or_insert_runtime(
            "hc_print_fmt",
            Type::Void,
            &[Type::Ptr, Type::Ptr, Type::I64],
        )?;
        builder.call(
            Callee::Direct("hc_print_fmt".to_string()),
            Type::Void,
            vec![
                (Type::Ptr, format_ptr),
                (Type::Ptr, args_ptr),
                (Type::I64, Value::i64_const(coerced_args.len() as i64)),
            ],
        );
        Ok(())
    }

    fn emit_host_main_wrapper(&mut self) -> EmitResult<()> {
        if self.module.function("main").is_some() {
            return Ok(());
        }
        let Some(holy_main) = self.module.function("Main").cloned() else {
            return Ok(());
        };

        if holy_main.params.len() > 2 {
            return Err("irbuilder emit: Main() supports at most two host parameters".to_string());
        }
        if !holy_main.ret.is_void() && !holy_main.ret.is_integer() {
            return Err("irbuilder emit: Main return type is not integer/void".to_string());
        }

        let shell = Function {
            name: "main".to_string(),
            ret: Type::I32,
            params: vec![
                Param { ty: Type::I32, name: "argc".to_string() },
                Param { ty: Type::Ptr, name: "argv".to_string() },
            ],
            linkage: IrLinkage::External,
            blocks: Vec::new(),
        };
        let mut builder = FunctionBuilder::new(shell);

        if let Some((table_name, count)) = self.reflection_table.clone() {
            self.get_or_insert_runtime(
                "hc_register_reflection_table",
                Type::Void,
                &[Type::Ptr, Type::I64],
            )?;
            builder.call(
                Callee::Direct("hc_register_reflection_table".to_string()),
                Type::Void,
                vec![
                    (Type::Ptr, Value::Global(table_name)),
                    (Type::I64, Value::i64_const(count as i64)),
                ],
            );
        }

        let mut holy_args: Vec<(Type, Value)> = Vec::new();
        for (i, param) in holy_main.params.iter().enumerate() {
            let source = if holy_main.params.len() == 1 {
                if param.ty.is_pointer() {
                    TV::new(Value::Arg(1), Type::Ptr)
                } else {
                    TV::new(Value::Arg(0), Type::I32)
                }
            } else if i == 0 {
                TV::new(Value::Arg(0), Type::I32)
            } else {
                TV::new(Value::Arg(1), Type::Ptr)
            };
            let casted = self.cast_if_needed(&mut builder, &source, &param.ty).ok_or_else(|| {
                "irbuilder emit: Main parameter type is not host-call compatible".to_string()
            })?;
            holy_args.push((param.ty.clone(), casted));
        }

        let call = builder.call(
            Callee::Direct("Main".to_string()),
            holy_main.ret.clone(),
            holy_args,
        );
        match call {
            None => {
                builder.ret(Some((Type::I32, Value::ConstInt(Type::I32, 0))));
            }
            Some(value) => {
                let tv = TV::new(value, holy_main.ret.clone());
                let casted = self
                    .cast_if_needed(&mut builder, &tv, &Type::I32)
                    .ok_or_else(|| "irbuilder emit: Main return type is not integer/void".to_string())?;
                builder.ret(Some((Type::I32, casted)));
            }
        }

        self.module.functions.push(builder.finish());
        self.signatures.insert("main".to_string(), (Type::I32, vec![Type::I32, Type::Ptr]));
        Ok(())
    }

    // -- lvalues and expressions ---------------------------------------------

    fn resolve_named_lvalue(
        &mut self,
        name: &str,
        _builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<LV> {
        if let Some(lv) = frame.locals.get(name) {
            return Ok(lv.clone());
        }
        if let Some(ty) = self.global_types.get(name) {
            return Ok(LV { ptr: Value::Global(name.to_string()), pointee: ty.clone() });
        }
        Err(format!("irbuilder emit: assignment to unknown variable {name}"))
    }

    fn emit_lvalue(
        &mut self,
        expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<LV> {
        match expr.kind {
            HirExprKind::Var => {
                if let Some(lv) = frame.locals.get(&expr.text) {
                    return Ok(lv.clone());
                }
                if let Some(ty) = self.global_types.get(&expr.text) {
                    return Ok(LV { ptr: Value::Global(expr.text.clone()), pointee: ty.clone() });
                }
                if matches!(expr.ty.kind, TyKind::Fn(_)) && expr.ty.ptr == 0 {
                    return Err(format!("irbuilder emit: unknown function symbol {}", expr.text));
                }

                // Lazily externalize the symbol; the linker or session
                // resolves it later.
                let guessed = self.to_ir_type(&expr.ty);
                let guessed = if guessed.is_void() { Type::I64 } else { guessed };
                self.module.globals.push(Global {
                    name: expr.text.clone(),
                    ty: guessed.clone(),
                    linkage: IrLinkage::External,
                    is_const: false,
                    unnamed_addr: false,
                    init: None,
                });
                self.global_types.insert(expr.text.clone(), guessed.clone());
                Ok(LV { ptr: Value::Global(expr.text.clone()), pointee: guessed })
            }

            HirExprKind::Unary => {
                if expr.text != "*" || expr.children.len() != 1 {
                    return Err("irbuilder emit: unsupported unary lvalue operator".to_string());
                }
                let base = self.emit_expr(&expr.children[0], builder, frame)?;
                let pointee = self.to_ir_type(&expr.ty);
                let pointee = if pointee.is_void() { Type::I64 } else { pointee };
                let ptr = self
                    .cast_if_needed(builder, &base, &Type::Ptr)
                    .ok_or_else(|| "irbuilder emit: unary '*' requires pointer operand".to_string())?;
                Ok(LV { ptr, pointee })
            }

            HirExprKind::Member => {
                if expr.children.len() != 1 {
                    return Err("irbuilder emit: invalid member expression".to_string());
                }
                let base_expr = &expr.children[0];
                let aggregate_name = base_expr.ty.base_name();
                let layout = self.aggregate_layouts.get(&aggregate_name).cloned();

                let Some(layout) = layout else {
                    // No layout: treat the base address as the member address.
                    let member_ty = self.to_ir_type(&expr.ty);
                    let member_ty = if member_ty.is_void() { Type::I64 } else { member_ty };
                    let base_ptr = if base_expr.ty.is_pointer() {
                        let base = self.emit_expr(base_expr, builder, frame)?;
                        self.cast_if_needed(builder, &base, &Type::Ptr)
                            .ok_or_else(|| "irbuilder emit: invalid pointer member base".to_string())?
                    } else {
                        let base = self.emit_lvalue(base_expr, builder, frame)?;
                        base.ptr
                    };
                    return Ok(LV { ptr: base_ptr, pointee: member_ty });
                };

                let Some(member) = layout.members.get(&expr.text).cloned() else {
                    return Err(format!(
                        "irbuilder emit: unknown aggregate member {}",
                        expr.text
                    ));
                };

                let aggregate_ptr = if base_expr.ty.is_pointer() {
                    let base = self.emit_expr(base_expr, builder, frame)?;
                    self.cast_if_needed(builder, &base, &Type::Ptr).ok_or_else(|| {
                        "irbuilder emit: invalid aggregate member base pointer".to_string()
                    })?
                } else {
                    let base = self.emit_lvalue(base_expr, builder, frame)?;
                    base.ptr
                };

                let field_ptr = builder.gep(
                    Type::Struct(layout.struct_name.clone()),
                    aggregate_ptr,
                    vec![
                        (Type::I32, Value::i32_const(0)),
                        (Type::I32, Value::i32_const(member.index as i64)),
                    ],
                    true,
                );
                Ok(LV { ptr: field_ptr, pointee: member.ty })
            }

            HirExprKind::Index => {
                if expr.children.len() != 2 {
                    return Err("irbuilder emit: invalid index expression".to_string());
                }
                let base = self.emit_expr(&expr.children[0], builder, frame)?;
                let index = self.emit_expr(&expr.children[1], builder, frame)?;
                let index_i64 = self
                    .coerce_i64(builder, &index)
                    .ok_or_else(|| "irbuilder emit: index must be integer-convertible".to_string())?;

                let elem_ty = self.to_ir_type(&expr.ty);
                let elem_ty = if elem_ty.is_void() { Type::I64 } else { elem_ty };
                let base_ptr = self
                    .cast_if_needed(builder, &base, &Type::Ptr)
                    .ok_or_else(|| "irbuilder emit: index base must be pointer".to_string())?;
                let elem_ptr = builder.gep(
                    elem_ty.clone(),
                    base_ptr,
                    vec![(Type::I64, index_i64)],
                    false,
                );
                Ok(LV { ptr: elem_ptr, pointee: elem_ty })
            }

            _ => Err(format!(
                "irbuilder emit: expression is not assignable: {:?}",
                expr.kind
            )),
        }
    }

    fn emit_expr(
        &mut self,
        expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        match expr.kind {
            HirExprKind::IntLiteral => {
                let value = parse_int_base0(&expr.text)
                    .ok_or_else(|| format!("irbuilder emit: invalid integer literal: {}", expr.text))?;
                let ty = self.to_ir_type(&expr.ty);
                let ty = if ty.is_integer() { ty } else { Type::I64 };
                Ok(TV::new(Value::ConstInt(ty.clone(), value), ty))
            }

            HirExprKind::StringLiteral => {
                let ptr = self.get_or_create_string_literal(&expr.text);
                Ok(TV::new(ptr, Type::Ptr))
            }

            HirExprKind::Dollar => Ok(TV::i64(Value::i64_const(0))),

            HirExprKind::Var => {
                let lv = self.emit_lvalue(expr, builder, frame)?;
                let value = builder.load(lv.pointee.clone(), lv.ptr);
                Ok(TV::new(value, lv.pointee))
            }

            HirExprKind::Assign => {
                if expr.children.len() != 2 {
                    return Err("irbuilder emit: invalid assignment expression".to_string());
                }
                let op = expr.text.clone();
                self.emit_assign_expr(&expr.children[0], &op, &expr.children[1], builder, frame)
            }

            HirExprKind::Unary => self.emit_unary_expr(expr, builder, frame),

            HirExprKind::Binary => {
                if expr.children.len() != 2 {
                    return Err("irbuilder emit: invalid binary expression".to_string());
                }
                let lhs = self.emit_expr(&expr.children[0], builder, frame)?;
                let rhs = self.emit_expr(&expr.children[1], builder, frame)?;
                let value = self.emit_binary_op(builder, &expr.text, &lhs, &rhs)?;
                Ok(value)
            }

            HirExprKind::Call => self.emit_call_expr(expr, builder, frame),

            HirExprKind::Cast => {
                if expr.children.len() != 1 {
                    return Err("irbuilder emit: invalid cast expression".to_string());
                }
                let source = self.emit_expr(&expr.children[0], builder, frame)?;
                let target_ty = self.to_ir_type(&expr.ty);
                let target_ty = if target_ty.is_void() { Type::I64 } else { target_ty };
                let casted = self
                    .cast_if_needed(builder, &source, &target_ty)
                    .ok_or_else(|| "irbuilder emit: unsupported cast in primary backend".to_string())?;
                Ok(TV::new(casted, target_ty))
            }

            HirExprKind::Comma => {
                if expr.children.is_empty() {
                    return Err("irbuilder emit: invalid empty comma expression".to_string());
                }
                let mut last = None;
                for child in &expr.children {
                    last = Some(self.emit_expr(child, builder, frame)?);
                }
                Ok(last.expect("checked non-empty"))
            }

            HirExprKind::Postfix => {
                if expr.children.len() != 1 {
                    return Err("irbuilder emit: invalid postfix expression".to_string());
                }
                if expr.text != "++" && expr.text != "--" {
                    return Err(format!(
                        "irbuilder emit: unsupported postfix operator {}",
                        expr.text
                    ));
                }
                let lv = self.emit_lvalue(&expr.children[0], builder, frame)?;
                let old_value = builder.load(lv.pointee.clone(), lv.ptr.clone());
                let updated = self
                    .step_scalar(builder, &TV::new(old_value.clone(), lv.pointee.clone()), expr.text == "++")
                    .ok_or_else(|| {
                        "irbuilder emit: postfix requires integer/pointer lvalue".to_string()
                    })?;
                builder.store(lv.pointee.clone(), updated, lv.ptr);
                Ok(TV::new(old_value, lv.pointee))
            }

            HirExprKind::Lane => self.emit_lane_load(expr, builder, frame),

            HirExprKind::Member | HirExprKind::Index => {
                let lv = self.emit_lvalue(expr, builder, frame)?;
                let value = builder.load(lv.pointee.clone(), lv.ptr);
                Ok(TV::new(value, lv.pointee))
            }
        }
    }

    fn emit_unary_expr(
        &mut self,
        expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        if expr.children.len() != 1 {
            return Err("irbuilder emit: invalid unary expression".to_string());
        }

        match expr.text.as_str() {
            "++" | "--" => {
                let lv = self.emit_lvalue(&expr.children[0], builder, frame)?;
                let old_value = builder.load(lv.pointee.clone(), lv.ptr.clone());
                let updated = self
                    .step_scalar(builder, &TV::new(old_value, lv.pointee.clone()), expr.text == "++")
                    .ok_or_else(|| {
                        "irbuilder emit: unary inc/dec requires integer/pointer lvalue".to_string()
                    })?;
                builder.store(lv.pointee.clone(), updated.clone(), lv.ptr);
                Ok(TV::new(updated, lv.pointee))
            }

            "&" => {
                // A known function name wins over locals when taking an
                // address.
                if expr.children[0].kind == HirExprKind::Var
                    && self.signatures.contains_key(&expr.children[0].text)
                {
                    let target_ty = self.to_ir_type(&expr.ty);
                    let target_ty = if target_ty.is_void() { Type::Ptr } else { target_ty };
                    let fn_addr =
                        TV::new(Value::Global(expr.children[0].text.clone()), Type::Ptr);
                    let casted =
                        self.cast_if_needed(builder, &fn_addr, &target_ty).ok_or_else(|| {
                            "irbuilder emit: unary '&' function address type conversion failed"
                                .to_string()
                        })?;
                    return Ok(TV::new(casted, target_ty));
                }

                let lv = self.emit_lvalue(&expr.children[0], builder, frame)?;
                let target_ty = self.to_ir_type(&expr.ty);
                let target_ty = if target_ty.is_void() { Type::Ptr } else { target_ty };
                let addr = TV::new(lv.ptr, Type::Ptr);
                let casted = self.cast_if_needed(builder, &addr, &target_ty).ok_or_else(|| {
                    "irbuilder emit: unary '&' produced non-castable address".to_string()
                })?;
                Ok(TV::new(casted, target_ty))
            }

            "*" => {
                let lv = self.emit_lvalue(expr, builder, frame)?;
                let value = builder.load(lv.pointee.clone(), lv.ptr);
                Ok(TV::new(value, lv.pointee))
            }

            "+" => self.emit_expr(&expr.children[0], builder, frame),

            "-" => {
                let child = self.emit_expr(&expr.children[0], builder, frame)?;
                let operand = self
                    .coerce_i64(builder, &child)
                    .ok_or_else(|| "irbuilder emit: unary '-' requires integer operand".to_string())?;
                let value =
                    builder.bin(BinOp::Sub, Type::I64, Value::i64_const(0), operand);
                Ok(TV::i64(value))
            }

            "~" => {
                let child = self.emit_expr(&expr.children[0], builder, frame)?;
                let operand = self
                    .coerce_i64(builder, &child)
                    .ok_or_else(|| "irbuilder emit: unary '~' requires integer operand".to_string())?;
                let value =
                    builder.bin(BinOp::Xor, Type::I64, operand, Value::i64_const(-1));
                Ok(TV::i64(value))
            }

            "!" => {
                let child = self.emit_expr(&expr.children[0], builder, frame)?;
                let b = self.to_bool(builder, &child).ok_or_else(|| {
                    "irbuilder emit: unary '!' requires bool-convertible operand".to_string()
                })?;
                let flipped =
                    builder.bin(BinOp::Xor, Type::I1, b, Value::ConstInt(Type::I1, 1));
                let widened = builder.cast(CastOp::ZExt, Type::I1, Type::I64, flipped);
                Ok(TV::i64(widened))
            }

            other => Err(format!("irbuilder emit: unsupported unary operator {other}")),
        }
    }

    /// Increment/decrement a loaded scalar by one, preserving its type.
    fn step_scalar(&mut self, builder: &mut FunctionBuilder, tv: &TV, up: bool) -> Option<Value> {
        let op = if up { BinOp::Add } else { BinOp::Sub };
        if tv.ty.is_pointer() {
            let as_i64 = builder.cast(CastOp::PtrToInt, Type::Ptr, Type::I64, tv.v.clone());
            let next = builder.bin(op, Type::I64, as_i64, Value::i64_const(1));
            return Some(builder.cast(CastOp::IntToPtr, Type::I64, Type::Ptr, next));
        }
        let as_i64 = self.coerce_i64(builder, tv)?;
        let next = builder.bin(op, Type::I64, as_i64, Value::i64_const(1));
        self.cast_if_needed(builder, &TV::i64(next), &tv.ty)
    }

    fn emit_assign_expr(
        &mut self,
        lhs_expr: &HirExpr,
        assign_op: &str,
        rhs_expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        let rhs = self.emit_expr(rhs_expr, builder, frame)?;

        let to_store = if assign_op == "=" {
            rhs
        } else {
            let lhs_current = self.emit_expr(lhs_expr, builder, frame)?;
            self.emit_binary_op(builder, &assign_op_to_binary(assign_op), &lhs_current, &rhs)?
        };

        self.store_assignable(lhs_expr, &to_store, builder, frame)
    }

    /// Store into a pointer or lane target. Lane targets read-modify-write
    /// the base integer and recurse on the base expression.
    fn store_assignable(
        &mut self,
        lhs_expr: &HirExpr,
        rhs: &TV,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        if lhs_expr.kind != HirExprKind::Lane {
            let lhs = self.emit_lvalue(lhs_expr, builder, frame)?;
            let casted = self
                .cast_if_needed(builder, rhs, &lhs.pointee)
                .ok_or_else(|| "irbuilder emit: assignment expression type mismatch".to_string())?;
            builder.store(lhs.pointee.clone(), casted.clone(), lhs.ptr);
            return Ok(TV::new(casted, lhs.pointee));
        }

        if lhs_expr.children.len() != 2 {
            return Err("irbuilder emit: invalid lane assignment target".to_string());
        }
        let Some(lane) = LaneInfo::parse(&lhs_expr.text) else {
            return Err(format!("irbuilder emit: unknown lane selector {}", lhs_expr.text));
        };

        let base_expr = &lhs_expr.children[0];
        let index_expr = &lhs_expr.children[1];

        let base_value = self.emit_expr(base_expr, builder, frame)?;
        let index_value = self.emit_expr(index_expr, builder, frame)?;

        let base_bits = integral_bit_width(&base_expr.ty).max(lane.bits);
        if base_bits > 64 {
            return Err("irbuilder emit: invalid lane base width".to_string());
        }
        let base_int_ty = Type::int_with_bits(base_bits);

        let base_int = self
            .cast_if_needed(builder, &base_value, &base_int_ty)
            .ok_or_else(|| "irbuilder emit: lane base is not integer-convertible".to_string())?;
        let index_i64 = self
            .coerce_i64(builder, &index_value)
            .ok_or_else(|| "irbuilder emit: lane index must be integer-convertible".to_string())?;
        let index_int = self
            .cast_int_with_signedness(builder, &TV::i64(index_i64), &base_int_ty, false)
            .ok_or_else(|| "irbuilder emit: lane index type conversion failed".to_string())?;

        let lane_int_ty = Type::int_with_bits(lane.bits);
        let rhs_lane = self
            .cast_int_with_signedness(builder, rhs, &lane_int_ty, lane.signed)
            .ok_or_else(|| {
                "irbuilder emit: lane assignment rhs is not integer-convertible".to_string()
            })?;

        let lane_bits_const = Value::ConstInt(base_int_ty.clone(), lane.bits as i64);
        let shift_amount =
            builder.bin(BinOp::Mul, base_int_ty.clone(), index_int, lane_bits_const);
        let raw_mask = lane_mask(lane.bits);
        let base_mask = Value::ConstInt(base_int_ty.clone(), raw_mask);
        let shifted_mask =
            builder.bin(BinOp::Shl, base_int_ty.clone(), base_mask, shift_amount.clone());
        let inverted = builder.bin(
            BinOp::Xor,
            base_int_ty.clone(),
            shifted_mask.clone(),
            Value::ConstInt(base_int_ty.clone(), -1),
        );
        let cleared_base = builder.bin(BinOp::And, base_int_ty.clone(), base_int, inverted);

        let rhs_base = self
            .cast_int_with_signedness(builder, &TV::new(rhs_lane.clone(), lane_int_ty.clone()), &base_int_ty, false)
            .ok_or_else(|| "irbuilder emit: lane assignment rhs type conversion failed".to_string())?;
        let shifted_rhs = builder.bin(BinOp::Shl, base_int_ty.clone(), rhs_base, shift_amount);
        let masked_rhs = builder.bin(BinOp::And, base_int_ty.clone(), shifted_rhs, shifted_mask);
        let updated_base = builder.bin(BinOp::Or, base_int_ty.clone(), cleared_base, masked_rhs);

        self.store_assignable(base_expr, &TV::new(updated_base, base_int_ty), builder, frame)?;

        let result_ty = self.to_ir_type(&lhs_expr.ty);
        if result_ty.is_integer() {
            let casted = self
                .cast_int_with_signedness(
                    builder,
                    &TV::new(rhs_lane, lane_int_ty),
                    &result_ty,
                    lane.signed,
                )
                .ok_or_else(|| "irbuilder emit: lane assignment result conversion failed".to_string())?;
            return Ok(TV::new(casted, result_ty));
        }
        let rhs_i64 = self
            .cast_int_with_signedness(builder, &TV::new(rhs_lane, lane_int_ty), &Type::I64, lane.signed)
            .ok_or_else(|| "irbuilder emit: lane assignment result conversion failed".to_string())?;
        let casted = self
            .cast_if_needed(builder, &TV::i64(rhs_i64), &result_ty)
            .ok_or_else(|| "irbuilder emit: lane assignment result conversion failed".to_string())?;
        Ok(TV::new(casted, result_ty))
    }

    fn emit_lane_load(
        &mut self,
        expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        if expr.children.len() != 2 {
            return Err("irbuilder emit: invalid lane expression".to_string());
        }
        let Some(lane) = LaneInfo::parse(&expr.text) else {
            return Err(format!("irbuilder emit: unknown lane selector {}", expr.text));
        };

        let base_expr = &expr.children[0];
        let index_expr = &expr.children[1];

        let base_value = self.emit_expr(base_expr, builder, frame)?;
        let index_value = self.emit_expr(index_expr, builder, frame)?;

        let base_bits = integral_bit_width(&base_expr.ty).max(lane.bits);
        if base_bits > 64 {
            return Err("irbuilder emit: invalid lane base width".to_string());
        }
        let base_int_ty = Type::int_with_bits(base_bits);

        let base_int = self
            .cast_if_needed(builder, &base_value, &base_int_ty)
            .ok_or_else(|| "irbuilder emit: lane base is not integer-convertible".to_string())?;
        let index_i64 = self
            .coerce_i64(builder, &index_value)
            .ok_or_else(|| "irbuilder emit: lane index must be integer-convertible".to_string())?;
        let index_int = self
            .cast_int_with_signedness(builder, &TV::i64(index_i64), &base_int_ty, false)
            .ok_or_else(|| "irbuilder emit: lane index type conversion failed".to_string())?;

        let lane_bits_const = Value::ConstInt(base_int_ty.clone(), lane.bits as i64);
        let shift_amount = builder.bin(BinOp::Mul, base_int_ty.clone(), index_int, lane_bits_const);
        let shifted = builder.bin(BinOp::LShr, base_int_ty.clone(), base_int, shift_amount);
        let mask = Value::ConstInt(base_int_ty.clone(), lane_mask(lane.bits));
        let mut lane_value = builder.bin(BinOp::And, base_int_ty.clone(), shifted, mask);

        let lane_int_ty = Type::int_with_bits(lane.bits);
        if lane.bits != base_bits {
            lane_value = builder.cast(CastOp::Trunc, base_int_ty, lane_int_ty.clone(), lane_value);
        }

        // Keep lane values widened to i64 so unsigned lanes keep
        // zero-extended semantics in later arithmetic and comparisons.
        let widened = self
            .cast_int_with_signedness(
                builder,
                &TV::new(lane_value, lane_int_ty),
                &Type::I64,
                lane.signed,
            )
            .ok_or_else(|| "irbuilder emit: lane result conversion failed".to_string())?;
        Ok(TV::i64(widened))
    }

    fn emit_call_expr(
        &mut self,
        expr: &HirExpr,
        builder: &mut FunctionBuilder,
        frame: &mut FunctionFrame,
    ) -> EmitResult<TV> {
        if !expr.text.is_empty() {
            let Some((ret, param_tys)) = self.signatures.get(&expr.text).cloned() else {
                return Err(format!("irbuilder emit: unknown function {}", expr.text));
            };
            if expr.children.len() != param_tys.len() {
                return Err(format!(
                    "irbuilder emit: argument count mismatch for function {}",
                    expr.text
                ));
            }

            let mut args = Vec::with_capacity(expr.children.len());
            for (child, param_ty) in expr.children.iter().zip(param_tys.iter()) {
                let tv = self.emit_expr(child, builder, frame)?;
                let casted = self.cast_if_needed(builder, &tv, param_ty).ok_or_else(|| {
                    format!("irbuilder emit: call argument type mismatch for function {}", expr.text)
                })?;
                args.push((param_ty.clone(), casted));
            }

            let call = builder.call(Callee::Direct(expr.text.clone()), ret.clone(), args);
            return Ok(match call {
                Some(value) => TV::new(value, ret),
                None => TV::i64(Value::i64_const(0)),
            });
        }

        if expr.children.is_empty() {
            return Err("irbuilder emit: invalid indirect call expression".to_string());
        }

        let callee_value = self.emit_expr(&expr.children[0], builder, frame)?;
        let mut args = Vec::with_capacity(expr.children.len().saturating_sub(1));
        for child in &expr.children[1..] {
            let param_ty = self.to_ir_type(&child.ty);
            let param_ty = if param_ty.is_void() { Type::I64 } else { param_ty };
            let tv = self.emit_expr(child, builder, frame)?;
            let casted = self
                .cast_if_needed(builder, &tv, &param_ty)
                .ok_or_else(|| "irbuilder emit: indirect call argument type mismatch".to_string())?;
            args.push((param_ty, casted));
        }

        let return_ty = self.to_ir_type(&expr.ty);
        let callee_ptr = self
            .cast_if_needed(builder, &callee_value, &Type::Ptr)
            .ok_or_else(|| "irbuilder emit: indirect call target is not callable".to_string())?;

        let call = builder.call(Callee::Indirect(callee_ptr), return_ty.clone(), args);
        Ok(match call {
            Some(value) => TV::new(value, return_ty),
            None => TV::i64(Value::i64_const(0)),
        })
    }

    fn emit_binary_op(
        &mut self,
        builder: &mut FunctionBuilder,
        op: &str,
        lhs: &TV,
        rhs: &TV,
    ) -> EmitResult<TV> {
        let lhs_i64 = self.coerce_i64(builder, lhs);
        let rhs_i64 = self.coerce_i64(builder, rhs);
        let (Some(lhs), Some(rhs)) = (lhs_i64, rhs_i64) else {
            return Err("irbuilder emit: binary op requires integer-convertible operands".to_string());
        };

        let simple = match op {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::SDiv),
            "%" => Some(BinOp::SRem),
            "&" => Some(BinOp::And),
            "|" => Some(BinOp::Or),
            "^" => Some(BinOp::Xor),
            "<<" => Some(BinOp::Shl),
            ">>" => Some(BinOp::AShr),
            _ => None,
        };
        if let Some(bin_op) = simple {
            let value = builder.bin(bin_op, Type::I64, lhs, rhs);
            return Ok(TV::i64(value));
        }

        let pred = match op {
            "==" => Some(ICmpPred::Eq),
            "!=" => Some(ICmpPred::Ne),
            "<" => Some(ICmpPred::Slt),
            ">" => Some(ICmpPred::Sgt),
            "<=" => Some(ICmpPred::Sle),
            ">=" => Some(ICmpPred::Sge),
            _ => None,
        };
        if let Some(pred) = pred {
            let bit = builder.icmp(pred, Type::I64, lhs, rhs);
            // Comparisons widen to i64 so the value behaves like the 0/1
            // numeric bool of the source language.
            let widened = builder.cast(CastOp::ZExt, Type::I1, Type::I64, bit);
            return Ok(TV::i64(widened));
        }

        if op == "&&" || op == "||" {
            let lhs_bool = self.to_bool(builder, &TV::i64(lhs));
            let rhs_bool = self.to_bool(builder, &TV::i64(rhs));
            let (Some(lhs_bool), Some(rhs_bool)) = (lhs_bool, rhs_bool) else {
                return Err(format!(
                    "irbuilder emit: logical {op} requires bool-convertible operands"
                ));
            };
            let combined = builder.bin(
                if op == "&&" { BinOp::And } else { BinOp::Or },
                Type::I1,
                lhs_bool,
                rhs_bool,
            );
            let widened = builder.cast(CastOp::ZExt, Type::I1, Type::I64, combined);
            return Ok(TV::i64(widened));
        }

        Err(format!("irbuilder emit: unsupported binary operator {op}"))
    }

    // -- constants -----------------------------------------------------------

    fn eval_const_int_expr(&self, expr: &HirExpr) -> EmitResult<i64> {
        match expr.kind {
            HirExprKind::IntLiteral => parse_int_base0(&expr.text)
                .ok_or_else(|| format!("invalid integer literal: {}", expr.text)),

            HirExprKind::Unary => {
                if expr.children.len() != 1 {
                    return Err("invalid unary expression".to_string());
                }
                let child = self.eval_const_int_expr(&expr.children[0])?;
                match expr.text.as_str() {
                    "+" => Ok(child),
                    "-" => Ok(child.wrapping_neg()),
                    "~" => Ok(!child),
                    "!" => Ok(i64::from(child == 0)),
                    other => Err(format!("unsupported unary operator: {other}")),
                }
            }

            HirExprKind::Binary => {
                if expr.children.len() != 2 {
                    return Err("invalid binary expression".to_string());
                }
                let lhs = self.eval_const_int_expr(&expr.children[0])?;
                // Short-circuit folding: the rhs of && / || is skipped when
                // the lhs already decides the result.
                match expr.text.as_str() {
                    "&&" if lhs == 0 => return Ok(0),
                    "||" if lhs != 0 => return Ok(1),
                    _ => {}
                }
                let rhs = self.eval_const_int_expr(&expr.children[1])?;
                match expr.text.as_str() {
                    "+" => Ok(lhs.wrapping_add(rhs)),
                    "-" => Ok(lhs.wrapping_sub(rhs)),
                    "*" => Ok(lhs.wrapping_mul(rhs)),
                    "/" => {
                        if rhs == 0 {
                            Err("division by zero".to_string())
                        } else {
                            Ok(lhs.wrapping_div(rhs))
                        }
                    }
                    "%" => {
                        if rhs == 0 {
                            Err("modulo by zero".to_string())
                        } else {
                            Ok(lhs.wrapping_rem(rhs))
                        }
                    }
                    "&" => Ok(lhs & rhs),
                    "|" => Ok(lhs | rhs),
                    "^" => Ok(lhs ^ rhs),
                    "<<" => Ok(lhs.wrapping_shl(rhs as u32)),
                    ">>" => Ok(lhs.wrapping_shr(rhs as u32)),
                    "==" => Ok(i64::from(lhs == rhs)),
                    "!=" => Ok(i64::from(lhs != rhs)),
                    "<" => Ok(i64::from(lhs < rhs)),
                    ">" => Ok(i64::from(lhs > rhs)),
                    "<=" => Ok(i64::from(lhs <= rhs)),
                    ">=" => Ok(i64::from(lhs >= rhs)),
                    "&&" => Ok(i64::from(lhs != 0 && rhs != 0)),
                    "||" => Ok(i64::from(lhs != 0 || rhs != 0)),
                    other => Err(format!("unsupported binary operator: {other}")),
                }
            }

            HirExprKind::Cast => {
                if expr.children.len() != 1 {
                    return Err("invalid cast expression".to_string());
                }
                self.eval_const_int_expr(&expr.children[0])
            }

            HirExprKind::Comma => {
                if expr.children.is_empty() {
                    return Err("invalid empty comma expression".to_string());
                }
                let mut value = 0;
                for child in &expr.children {
                    value = self.eval_const_int_expr(child)?;
                }
                Ok(value)
            }

            HirExprKind::Var => match self.global_constants.get(&expr.text) {
                Some(Const::Int(_, value)) => Ok(*value),
                Some(Const::Null) | Some(Const::Zero(_)) => Ok(0),
                Some(_) => Err(format!("constant variable is not integer-like: {}", expr.text)),
                None => Err(format!("unknown constant variable: {}", expr.text)),
            },

            _ => Err(format!("unsupported constant expression kind: {:?}", expr.kind)),
        }
    }

    fn eval_global_const_expr(&mut self, expr: &HirExpr, target_ty: &Type) -> EmitResult<Const> {
        if expr.kind == HirExprKind::Var {
            if let Some(constant) = self.global_constants.get(&expr.text) {
                if let Const::Int(ty, value) = constant {
                    if target_ty.is_integer() {
                        let _ = ty;
                        return Ok(Const::Int(target_ty.clone(), *value));
                    }
                }
            }
            if self.global_types.contains_key(&expr.text) {
                if target_ty.is_pointer() {
                    return Ok(Const::GlobalRef(expr.text.clone()));
                }
                if target_ty.is_integer() {
                    return Ok(Const::PtrToInt(
                        Box::new(Const::GlobalRef(expr.text.clone())),
                        target_ty.clone(),
                    ));
                }
            }
        }

        if expr.kind == HirExprKind::Unary
            && expr.text == "&"
            && expr.children.len() == 1
            && expr.children[0].kind == HirExprKind::Var
        {
            let base_name = &expr.children[0].text;
            if !self.global_types.contains_key(base_name) {
                return Err(format!(
                    "unknown global in address-of constant expression: {base_name}"
                ));
            }
            if target_ty.is_pointer() {
                return Ok(Const::GlobalRef(base_name.clone()));
            }
            if target_ty.is_integer() {
                return Ok(Const::PtrToInt(
                    Box::new(Const::GlobalRef(base_name.clone())),
                    target_ty.clone(),
                ));
            }
            return Err("address-of initializer requires pointer/integer target type".to_string());
        }

        if expr.kind == HirExprKind::StringLiteral {
            let name = self.intern_decoded_string(decode_quoted_string(&expr.text));
            if target_ty.is_pointer() {
                return Ok(Const::GlobalRef(name));
            }
            if target_ty.is_integer() {
                return Ok(Const::PtrToInt(Box::new(Const::GlobalRef(name)), target_ty.clone()));
            }
            return Err("string literal initializer requires pointer/integer target type".to_string());
        }

        let value = self.eval_const_int_expr(expr)?;
        if target_ty.is_integer() {
            return Ok(Const::Int(target_ty.clone(), value));
        }
        if target_ty.is_pointer() {
            if value == 0 {
                return Ok(Const::Null);
            }
            return Ok(Const::IntToPtr(Box::new(Const::Int(Type::I64, value))));
        }
        Err("unsupported constant target type".to_string())
    }

    // -- conversions ---------------------------------------------------------

    fn cast_if_needed(&mut self, builder: &mut FunctionBuilder, tv: &TV, to: &Type) -> Option<Value> {
        if tv.ty == *to {
            return Some(tv.v.clone());
        }

        if tv.ty.is_integer() && to.is_integer() {
            let from_bits = tv.ty.int_bits().expect("integer type");
            let to_bits = to.int_bits().expect("integer type");
            if from_bits == to_bits {
                return Some(tv.v.clone());
            }
            if from_bits < to_bits {
                return Some(builder.cast(CastOp::SExt, tv.ty.clone(), to.clone(), tv.v.clone()));
            }
            return Some(builder.cast(CastOp::Trunc, tv.ty.clone(), to.clone(), tv.v.clone()));
        }

        if tv.ty.is_pointer() && to.is_pointer() {
            return Some(tv.v.clone());
        }
        if tv.ty.is_pointer() && to.is_integer() {
            return Some(builder.cast(CastOp::PtrToInt, Type::Ptr, to.clone(), tv.v.clone()));
        }
        if tv.ty.is_integer() && to.is_pointer() {
            let widened = self.coerce_i64(builder, tv)?;
            return Some(builder.cast(CastOp::IntToPtr, Type::I64, Type::Ptr, widened));
        }
        None
    }

    fn cast_int_with_signedness(
        &mut self,
        builder: &mut FunctionBuilder,
        tv: &TV,
        to: &Type,
        signed_extend: bool,
    ) -> Option<Value> {
        if !to.is_integer() {
            return None;
        }
        if tv.ty == *to {
            return Some(tv.v.clone());
        }
        if tv.ty.is_pointer() {
            return Some(builder.cast(CastOp::PtrToInt, Type::Ptr, to.clone(), tv.v.clone()));
        }
        if !tv.ty.is_integer() {
            return None;
        }
        let from_bits = tv.ty.int_bits().expect("integer type");
        let to_bits = to.int_bits().expect("integer type");
        if from_bits == to_bits {
            return Some(tv.v.clone());
        }
        if from_bits < to_bits {
            let op = if signed_extend { CastOp::SExt } else { CastOp::ZExt };
            return Some(builder.cast(op, tv.ty.clone(), to.clone(), tv.v.clone()));
        }
        Some(builder.cast(CastOp::Trunc, tv.ty.clone(), to.clone(), tv.v.clone()))
    }

    fn coerce_i64(&mut self, builder: &mut FunctionBuilder, tv: &TV) -> Option<Value> {
        if tv.ty == Type::I64 {
            return Some(tv.v.clone());
        }
        if tv.ty.is_integer() {
            return self.cast_if_needed(builder, tv, &Type::I64);
        }
        if tv.ty.is_pointer() {
            return Some(builder.cast(CastOp::PtrToInt, Type::Ptr, Type::I64, tv.v.clone()));
        }
        None
    }

    fn to_bool(&mut self, builder: &mut FunctionBuilder, tv: &TV) -> Option<Value> {
        if tv.ty == Type::I1 {
            return Some(tv.v.clone());
        }
        if tv.ty.is_integer() {
            return Some(builder.icmp(
                ICmpPred::Ne,
                tv.ty.clone(),
                tv.v.clone(),
                Value::ConstInt(tv.ty.clone(), 0),
            ));
        }
        if tv.ty.is_pointer() {
            return Some(builder.icmp(ICmpPred::Ne, Type::Ptr, tv.v.clone(), Value::NullPtr));
        }
        None
    }

    fn pack_print_arg(
        &mut self,
        builder: &mut FunctionBuilder,
        tv: &TV,
        expect_float: bool,
    ) -> Option<Value> {
        if expect_float {
            let as_f64 = self.coerce_f64(builder, tv)?;
            return Some(builder.cast(CastOp::Bitcast, Type::F64, Type::I64, as_f64));
        }
        self.coerce_i64(builder, tv)
    }

    fn coerce_f64(&mut self, builder: &mut FunctionBuilder, tv: &TV) -> Option<Value> {
        if tv.ty.is_float() {
            return Some(tv.v.clone());
        }
        if tv.ty.is_integer() {
            let widened = self.coerce_i64(builder, tv)?;
            return Some(builder.cast(CastOp::SIToFP, Type::I64, Type::F64, widened));
        }
        if tv.ty.is_pointer() {
            let as_i64 = builder.cast(CastOp::PtrToInt, Type::Ptr, Type::I64, tv.v.clone());
            return Some(builder.cast(CastOp::SIToFP, Type::I64, Type::F64, as_i64));
        }
        None
    }

    // -- string literals -----------------------------------------------------

    /// Intern a quoted string literal, deduplicating by decoded text.
    fn get_or_create_string_literal(&mut self, quoted: &str) -> Value {
        let decoded = decode_quoted_string(quoted);
        let name = self.intern_decoded_string(decoded);
        Value::Global(name)
    }

    fn intern_decoded_string(&mut self, decoded: String) -> String {
        if let Some(existing) = self.string_literals.get(&decoded) {
            return existing.clone();
        }
        let name = format!(".str.{}", self.next_string_id);
        self.next_string_id += 1;

        let mut bytes = decoded.clone().into_bytes();
        bytes.push(0);
        self.module.globals.push(Global {
            name: name.clone(),
            ty: Type::Array(Box::new(Type::I8), bytes.len() as u64),
            linkage: IrLinkage::Private,
            is_const: true,
            unnamed_addr: true,
            init: Some(Const::Bytes(bytes)),
        });
        self.string_literals.insert(decoded, name.clone());
        name
    }
}

fn to_ir_linkage(linkage: Linkage) -> IrLinkage {
    match linkage {
        Linkage::External => IrLinkage::External,
        Linkage::Internal => IrLinkage::Internal,
    }
}

fn assign_op_to_binary(assign_op: &str) -> String {
    match assign_op {
        "<<=" => "<<".to_string(),
        ">>=" => ">>".to_string(),
        op if op.len() == 2 && op.ends_with('=') => op[..1].to_string(),
        op => op.to_string(),
    }
}

fn lane_mask(bits: u32) -> i64 {
    if bits >= 64 {
        -1
    } else {
        ((1u64 << bits) - 1) as i64
    }
}

fn integral_bit_width(ty: &Ty) -> u32 {
    match &ty.kind {
        TyKind::Bool | TyKind::BoolChained => 1,
        TyKind::I8 | TyKind::U8 => 8,
        TyKind::I16 | TyKind::U16 => 16,
        TyKind::I32 | TyKind::U32 => 32,
        _ => 64,
    }
}

fn build_print_float_mask(atoms: &[FormatAtom]) -> Vec<bool> {
    let mut mask = Vec::new();
    for atom in atoms {
        if atom.width_from_arg {
            mask.push(false);
        }
        if atom.precision_from_arg {
            mask.push(false);
        }
        if atom.conv == 'z' {
            mask.push(false);
            mask.push(false);
            continue;
        }
        mask.push(atom.is_float());
    }
    mask
}

fn stmt_kind_name(stmt: &HirStmt) -> &'static str {
    match stmt {
        HirStmt::VarDecl(_) => "VarDecl",
        HirStmt::Assign(_) => "Assign",
        HirStmt::Return(_) => "Return",
        HirStmt::Expr(_) => "Expr",
        HirStmt::NoParenCall { .. } => "NoParenCall",
        HirStmt::Print(_) => "Print",
        HirStmt::Lock(_) => "Lock",
        HirStmt::Throw { .. } => "Throw",
        HirStmt::TryCatch(_) => "TryCatch",
        HirStmt::Break => "Break",
        HirStmt::Switch(_) => "Switch",
        HirStmt::If(_) => "If",
        HirStmt::While(_) => "While",
        HirStmt::DoWhile(_) => "DoWhile",
        HirStmt::Label(_) => "Label",
        HirStmt::Goto(_) => "Goto",
        HirStmt::InlineAsm(_) => "InlineAsm",
        HirStmt::MetadataDecl(_) => "MetadataDecl",
        HirStmt::LinkageDecl(_) => "LinkageDecl",
    }
}
