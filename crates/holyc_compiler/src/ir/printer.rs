//! Deterministic LLVM-syntax rendering of an IR [`Module`].
//!
//! The output parses back through [`super::parser`] and is accepted by the
//! system toolchain for the AOT path, so only standard syntax is emitted.

use super::module::{Callee, Const, Function, Global, Inst, IrLinkage, Module, Op, Term, Value};
use std::fmt::Write as _;

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; ModuleID = '{}'", module.name);
    let _ = writeln!(out, "source_filename = \"{}\"", module.name);
    if !module.target_triple.is_empty() {
        let _ = writeln!(out, "target triple = \"{}\"", module.target_triple);
    }
    out.push('\n');

    for def in &module.structs {
        let fields: Vec<String> = def.fields.iter().map(|f| f.to_string()).collect();
        let _ = writeln!(out, "%{} = type <{{ {} }}>", def.name, fields.join(", "));
    }
    if !module.structs.is_empty() {
        out.push('\n');
    }

    for global in &module.globals {
        print_global(global, &mut out);
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    for func in &module.functions {
        if func.is_declaration() {
            print_declaration(func, &mut out);
        }
    }
    out.push('\n');

    for func in &module.functions {
        if !func.is_declaration() {
            print_definition(func, &mut out);
            out.push('\n');
        }
    }

    out
}

fn linkage_keyword(linkage: IrLinkage) -> &'static str {
    match linkage {
        IrLinkage::External => "",
        IrLinkage::Internal => "internal ",
        IrLinkage::Private => "private ",
    }
}

fn print_global(global: &Global, out: &mut String) {
    let keyword = if global.is_const { "constant" } else { "global" };
    match &global.init {
        None => {
            let _ = writeln!(out, "@{} = external global {}", global.name, global.ty);
        }
        Some(init) => {
            let unnamed = if global.unnamed_addr { "unnamed_addr " } else { "" };
            let _ = writeln!(
                out,
                "@{} = {}{}{} {} {}",
                global.name,
                linkage_keyword(global.linkage),
                unnamed,
                keyword,
                global.ty,
                print_const(init)
            );
        }
    }
}

/// Render a constant without its leading type (the type is printed by the
/// enclosing context).
fn print_const(value: &Const) -> String {
    match value {
        Const::Int(_, v) => v.to_string(),
        Const::Null => "null".to_string(),
        Const::GlobalRef(name) => format!("@{name}"),
        Const::PtrToInt(inner, to) => {
            format!("ptrtoint (ptr {} to {to})", print_const(inner))
        }
        Const::IntToPtr(inner) => {
            let Const::Int(ty, v) = inner.as_ref() else {
                return format!("inttoptr ({} to ptr)", print_const(inner));
            };
            format!("inttoptr ({ty} {v} to ptr)")
        }
        Const::Bytes(bytes) => {
            let mut text = String::from("c\"");
            for &b in bytes {
                if b == b'"' || b == b'\\' || !(0x20..0x7f).contains(&b) {
                    let _ = write!(text, "\\{b:02X}");
                } else {
                    text.push(b as char);
                }
            }
            text.push('"');
            text
        }
        Const::Struct(tys, fields) => {
            let rendered: Vec<String> = tys
                .iter()
                .zip(fields.iter())
                .map(|(ty, field)| format!("{ty} {}", print_const(field)))
                .collect();
            format!("{{ {} }}", rendered.join(", "))
        }
        Const::Array(elem_ty, items) => {
            let rendered: Vec<String> =
                items.iter().map(|item| format!("{elem_ty} {}", print_const(item))).collect();
            format!("[{}]", rendered.join(", "))
        }
        Const::Zero(_) => "zeroinitializer".to_string(),
    }
}

fn print_declaration(func: &Function, out: &mut String) {
    let params: Vec<String> = func.params.iter().map(|p| p.ty.to_string()).collect();
    let _ = writeln!(out, "declare {} @{}({})", func.ret, func.name, params.join(", "));
}

/// Parameter names pass through from source; avoid a clash with the `%t<N>`
/// instruction-result namespace.
fn param_print_name(name: &str) -> String {
    let collides = name.len() > 1
        && name.starts_with('t')
        && name[1..].bytes().all(|b| b.is_ascii_digit());
    if collides {
        format!("arg.{name}")
    } else {
        name.to_string()
    }
}

fn print_definition(func: &Function, out: &mut String) {
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} %{}", p.ty, param_print_name(&p.name)))
        .collect();
    let _ = writeln!(
        out,
        "define {}{} @{}({}) {{",
        linkage_keyword(func.linkage),
        func.ret,
        func.name,
        params.join(", ")
    );

    for (i, block) in func.blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}:", block.label);
        for inst in &block.insts {
            print_inst(func, inst, out);
        }
        match &block.term {
            Some(term) => print_term(func, term, out),
            None => {
                let _ = writeln!(out, "  unreachable");
            }
        }
    }
    let _ = writeln!(out, "}}");
}

fn value(func: &Function, v: &Value) -> String {
    match v {
        Value::Local(id) => format!("%t{id}"),
        Value::Arg(index) => {
            let name = func
                .params
                .get(*index as usize)
                .map(|p| param_print_name(&p.name))
                .unwrap_or_else(|| format!("arg{index}"));
            format!("%{name}")
        }
        Value::Global(name) => format!("@{name}"),
        Value::ConstInt(_, v) => v.to_string(),
        Value::NullPtr => "null".to_string(),
    }
}

fn escape_asm(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        if b == b'"' || b == b'\\' || !(0x20..0x7f).contains(&b) {
            let _ = write!(out, "\\{b:02X}");
        } else {
            out.push(b as char);
        }
    }
    out
}

fn print_inst(func: &Function, inst: &Inst, out: &mut String) {
    out.push_str("  ");
    if let Some(id) = inst.id {
        let _ = write!(out, "%t{id} = ");
    }
    match &inst.op {
        Op::Alloca { ty } => {
            let _ = writeln!(out, "alloca {ty}");
        }
        Op::Load { ty, ptr } => {
            let _ = writeln!(out, "load {ty}, ptr {}", value(func, ptr));
        }
        Op::Store { ty, val, ptr } => {
            let _ = writeln!(out, "store {ty} {}, ptr {}", value(func, val), value(func, ptr));
        }
        Op::Bin { op, ty, lhs, rhs } => {
            let _ = writeln!(
                out,
                "{} {ty} {}, {}",
                op.mnemonic(),
                value(func, lhs),
                value(func, rhs)
            );
        }
        Op::ICmp { pred, ty, lhs, rhs } => {
            let _ = writeln!(
                out,
                "icmp {} {ty} {}, {}",
                pred.mnemonic(),
                value(func, lhs),
                value(func, rhs)
            );
        }
        Op::Cast { op, from, to, val } => {
            let _ = writeln!(out, "{} {from} {} to {to}", op.mnemonic(), value(func, val));
        }
        Op::Gep { elem, base, indices, inbounds } => {
            let _ = write!(
                out,
                "getelementptr {}{elem}, ptr {}",
                if *inbounds { "inbounds " } else { "" },
                value(func, base)
            );
            for (idx_ty, idx) in indices {
                let _ = write!(out, ", {idx_ty} {}", value(func, idx));
            }
            out.push('\n');
        }
        Op::Call { callee, ret, args } => {
            let rendered_args: Vec<String> = args
                .iter()
                .map(|(ty, arg)| format!("{ty} {}", value(func, arg)))
                .collect();
            match callee {
                Callee::Direct(name) => {
                    let _ = writeln!(out, "call {ret} @{name}({})", rendered_args.join(", "));
                }
                Callee::Indirect(target) => {
                    let _ = writeln!(
                        out,
                        "call {ret} {}({})",
                        value(func, target),
                        rendered_args.join(", ")
                    );
                }
                Callee::Asm { template, constraints } => {
                    let _ = writeln!(
                        out,
                        "call {ret} asm sideeffect \"{}\", \"{}\"({})",
                        escape_asm(template),
                        escape_asm(constraints),
                        rendered_args.join(", ")
                    );
                }
            }
        }
        Op::AtomicRmw { op, ty, ptr, val } => {
            let _ = writeln!(
                out,
                "atomicrmw {} ptr {}, {ty} {} seq_cst",
                op.mnemonic(),
                value(func, ptr),
                value(func, val)
            );
        }
    }
}

fn print_term(func: &Function, term: &Term, out: &mut String) {
    out.push_str("  ");
    match term {
        Term::Ret(None) => {
            out.push_str("ret void\n");
        }
        Term::Ret(Some((ty, v))) => {
            let _ = writeln!(out, "ret {ty} {}", value(func, v));
        }
        Term::Br(label) => {
            let _ = writeln!(out, "br label %{label}");
        }
        Term::CondBr { cond, then_label, else_label } => {
            let _ = writeln!(
                out,
                "br i1 {}, label %{then_label}, label %{else_label}",
                value(func, cond)
            );
        }
        Term::Unreachable => {
            out.push_str("unreachable\n");
        }
    }
}
