//! Structural verification of an IR module.
//!
//! Runs after emission and after parsing text IR. Checks the invariants the
//! execution engine and the printer rely on: unique symbols and block
//! labels, terminated blocks, resolvable branch targets, defined value
//! references, and call-site agreement with declared signatures.

use super::module::{Callee, Function, Module, Op, Term, Value};
use std::collections::{HashMap, HashSet};

pub fn verify_module(module: &Module) -> Result<(), String> {
    let mut global_names = HashSet::new();
    for global in &module.globals {
        if !global_names.insert(global.name.as_str()) {
            return Err(format!("duplicate global symbol '@{}'", global.name));
        }
    }

    let mut signatures: HashMap<&str, &Function> = HashMap::new();
    let mut defined = HashSet::new();
    for func in &module.functions {
        if global_names.contains(func.name.as_str()) {
            return Err(format!("function '@{}' collides with a global", func.name));
        }
        if !func.is_declaration() && !defined.insert(func.name.as_str()) {
            return Err(format!("duplicate function definition '@{}'", func.name));
        }
        match signatures.get(func.name.as_str()) {
            Some(existing) => {
                if existing.ret != func.ret
                    || existing.params.len() != func.params.len()
                    || existing
                        .params
                        .iter()
                        .zip(func.params.iter())
                        .any(|(a, b)| a.ty != b.ty)
                {
                    return Err(format!("conflicting signatures for '@{}'", func.name));
                }
                if !func.is_declaration() {
                    signatures.insert(func.name.as_str(), func);
                }
            }
            None => {
                signatures.insert(func.name.as_str(), func);
            }
        }
    }

    for func in &module.functions {
        if !func.is_declaration() {
            verify_function(module, func, &signatures)?;
        }
    }
    Ok(())
}

fn verify_function(
    module: &Module,
    func: &Function,
    signatures: &HashMap<&str, &Function>,
) -> Result<(), String> {
    let context = |msg: String| format!("in function '@{}': {msg}", func.name);

    let mut labels = HashSet::new();
    for block in &func.blocks {
        if !labels.insert(block.label.as_str()) {
            return Err(context(format!("duplicate block label '{}'", block.label)));
        }
    }

    // Values: ids defined once, every use resolves.
    let mut defined_ids = HashSet::new();
    for block in &func.blocks {
        for inst in &block.insts {
            if let Some(id) = inst.id {
                if !defined_ids.insert(id) {
                    return Err(context(format!("value %t{id} defined twice")));
                }
            }
        }
    }

    let check_value = |v: &Value| -> Result<(), String> {
        match v {
            Value::Local(id) if !defined_ids.contains(id) => {
                Err(context(format!("use of undefined value %t{id}")))
            }
            Value::Arg(index) if *index as usize >= func.params.len() => {
                Err(context(format!("argument index {index} out of range")))
            }
            _ => Ok(()),
        }
    };
    let check_label = |label: &str| -> Result<(), String> {
        if labels.contains(label) {
            Ok(())
        } else {
            Err(context(format!("branch to unknown block '{label}'")))
        }
    };

    for block in &func.blocks {
        for inst in &block.insts {
            match &inst.op {
                Op::Alloca { ty } => {
                    if ty.is_void() {
                        return Err(context("alloca of void type".to_string()));
                    }
                    if let super::types::Type::Struct(name) = ty {
                        if module.struct_def(name).is_none() {
                            return Err(context(format!("alloca of unknown struct '%{name}'")));
                        }
                    }
                }
                Op::Load { ty, ptr } => {
                    if ty.is_void() {
                        return Err(context("load of void type".to_string()));
                    }
                    check_value(ptr)?;
                }
                Op::Store { val, ptr, .. } => {
                    check_value(val)?;
                    check_value(ptr)?;
                }
                Op::Bin { ty, lhs, rhs, .. } => {
                    if !ty.is_integer() {
                        return Err(context("binary op on non-integer type".to_string()));
                    }
                    check_value(lhs)?;
                    check_value(rhs)?;
                }
                Op::ICmp { lhs, rhs, .. } => {
                    check_value(lhs)?;
                    check_value(rhs)?;
                }
                Op::Cast { val, .. } => check_value(val)?,
                Op::Gep { base, indices, elem, .. } => {
                    if let super::types::Type::Struct(name) = elem {
                        if module.struct_def(name).is_none() {
                            return Err(context(format!("gep into unknown struct '%{name}'")));
                        }
                    }
                    check_value(base)?;
                    for (_, idx) in indices {
                        check_value(idx)?;
                    }
                }
                Op::Call { callee, args, ret } => {
                    for (_, arg) in args {
                        check_value(arg)?;
                    }
                    match callee {
                        Callee::Direct(name) => {
                            if let Some(sig) = signatures.get(name.as_str()) {
                                if sig.params.len() != args.len() {
                                    return Err(context(format!(
                                        "call to '@{name}' passes {} args, signature has {}",
                                        args.len(),
                                        sig.params.len()
                                    )));
                                }
                                if sig.ret != *ret {
                                    return Err(context(format!(
                                        "call to '@{name}' disagrees on return type"
                                    )));
                                }
                            }
                            // Unknown names resolve against the runtime shim
                            // table at execution time.
                        }
                        Callee::Indirect(target) => check_value(target)?,
                        Callee::Asm { .. } => {}
                    }
                }
                Op::AtomicRmw { ty, ptr, val, .. } => {
                    if !ty.is_integer() {
                        return Err(context("atomicrmw on non-integer type".to_string()));
                    }
                    check_value(ptr)?;
                    check_value(val)?;
                }
            }
        }

        match &block.term {
            None => {
                return Err(context(format!("block '{}' is not terminated", block.label)));
            }
            Some(Term::Ret(None)) => {
                if !func.ret.is_void() {
                    return Err(context("void return from non-void function".to_string()));
                }
            }
            Some(Term::Ret(Some((ty, value)))) => {
                if func.ret.is_void() {
                    return Err(context("value return from void function".to_string()));
                }
                if *ty != func.ret {
                    return Err(context("return type disagrees with signature".to_string()));
                }
                check_value(value)?;
            }
            Some(Term::Br(label)) => check_label(label)?,
            Some(Term::CondBr { cond, then_label, else_label }) => {
                check_value(cond)?;
                check_label(then_label)?;
                check_label(else_label)?;
            }
            Some(Term::Unreachable) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parser::parse_module;

    #[test]
    fn accepts_well_formed_module() {
        let text = concat!(
            "define i64 @f(i64 %x) {\n",
            "entry:\n",
            "  %t0 = add i64 %x, 1\n",
            "  ret i64 %t0\n",
            "}\n"
        );
        let module = parse_module(text).unwrap();
        verify_module(&module).unwrap();
    }

    #[test]
    fn rejects_unterminated_block() {
        let text = "define void @f() {\nentry:\n  %t0 = alloca i64\n}\n";
        let module = parse_module(text).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.contains("not terminated"));
    }

    #[test]
    fn rejects_branch_to_unknown_block() {
        let text = "define void @f() {\nentry:\n  br label %missing\n}\n";
        let module = parse_module(text).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.contains("unknown block"));
    }

    #[test]
    fn rejects_undefined_value_use() {
        let text = "define i64 @f() {\nentry:\n  ret i64 %t9\n}\n";
        let module = parse_module(text).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.contains("undefined value"));
    }

    #[test]
    fn rejects_call_arity_mismatch() {
        let text = concat!(
            "declare i64 @g(i64)\n",
            "define void @f() {\n",
            "entry:\n",
            "  %t0 = call i64 @g(i64 1, i64 2)\n",
            "  ret void\n",
            "}\n"
        );
        let module = parse_module(text).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.contains("passes 2 args"));
    }
}
