//! IR module structure: globals, functions, blocks, instructions.

use super::types::{BinOp, CastOp, ICmpPred, RmwOp, Type};
use std::collections::HashMap;

/// Symbol linkage in the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrLinkage {
    External,
    Internal,
    /// Module-private, used for string constants and the reflection table.
    Private,
}

/// A named (packed) struct layout.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Type>,
}

/// Constant initializers for globals.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(Type, i64),
    Null,
    /// Address of another global or function.
    GlobalRef(String),
    PtrToInt(Box<Const>, Type),
    IntToPtr(Box<Const>),
    /// NUL-terminated byte payload of an `[N x i8]` string constant.
    Bytes(Vec<u8>),
    Struct(Vec<Type>, Vec<Const>),
    Array(Type, Vec<Const>),
    Zero(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub linkage: IrLinkage,
    pub is_const: bool,
    pub unnamed_addr: bool,
    /// `None` marks an external declaration.
    pub init: Option<Const>,
}

/// An SSA value reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Instruction result `%t<N>`.
    Local(u32),
    /// Function argument by index.
    Arg(u32),
    /// Address of a global or function, `@name`.
    Global(String),
    ConstInt(Type, i64),
    NullPtr,
}

impl Value {
    pub fn i64_const(value: i64) -> Value {
        Value::ConstInt(Type::I64, value)
    }
    pub fn i32_const(value: i64) -> Value {
        Value::ConstInt(Type::I32, value)
    }
}

/// Call targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Direct(String),
    Indirect(Value),
    /// Inline assembly expression with its joined constraint string.
    Asm { template: String, constraints: String },
}

/// Non-terminator operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Alloca { ty: Type },
    Load { ty: Type, ptr: Value },
    Store { ty: Type, val: Value, ptr: Value },
    Bin { op: BinOp, ty: Type, lhs: Value, rhs: Value },
    ICmp { pred: ICmpPred, ty: Type, lhs: Value, rhs: Value },
    Cast { op: CastOp, from: Type, to: Type, val: Value },
    Gep { elem: Type, base: Value, indices: Vec<(Type, Value)>, inbounds: bool },
    Call { callee: Callee, ret: Type, args: Vec<(Type, Value)> },
    AtomicRmw { op: RmwOp, ty: Type, ptr: Value, val: Value },
}

/// One instruction; `id` is present when the operation produces a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub id: Option<u32>,
    pub op: Op,
}

impl Inst {
    /// Result type of a value-producing operation.
    pub fn result_type(&self) -> Option<Type> {
        self.id.as_ref()?;
        Some(match &self.op {
            Op::Alloca { .. } => Type::Ptr,
            Op::Load { ty, .. } => ty.clone(),
            Op::Store { .. } => return None,
            Op::Bin { ty, .. } => ty.clone(),
            Op::ICmp { .. } => Type::I1,
            Op::Cast { to, .. } => to.clone(),
            Op::Gep { .. } => Type::Ptr,
            Op::Call { ret, .. } => ret.clone(),
            Op::AtomicRmw { ty, .. } => ty.clone(),
        })
    }
}

/// Block terminators.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Ret(Option<(Type, Value)>),
    Br(String),
    CondBr { cond: Value, then_label: String, else_label: String },
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Option<Term>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Block {
        Block { label: label.into(), insts: Vec::new(), term: None }
    }

    pub fn is_terminated(&self) -> bool {
        self.term.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Type,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub linkage: IrLinkage,
    /// Empty for declarations.
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Map of instruction-result id to its type.
    pub fn value_types(&self) -> HashMap<u32, Type> {
        let mut out = HashMap::new();
        for block in &self.blocks {
            for inst in &block.insts {
                if let (Some(id), Some(ty)) = (inst.id, inst.result_type()) {
                    out.insert(id, ty);
                }
            }
        }
        out
    }

    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }
}

/// An IR module: struct layouts, globals, and functions in emission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub target_triple: String,
    pub structs: Vec<StructDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module { name: name.into(), ..Module::default() }
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Byte size of a type under the module's packed layout rules.
    pub fn size_of(&self, ty: &Type) -> usize {
        match ty {
            Type::Void => 0,
            Type::I1 | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
            Type::Struct(name) => match self.struct_def(name) {
                Some(def) => def.fields.iter().map(|f| self.size_of(f)).sum::<usize>().max(1),
                None => 8,
            },
            Type::Tuple(fields) => fields.iter().map(|f| self.size_of(f)).sum::<usize>().max(1),
            Type::Array(elem, len) => self.size_of(elem) * (*len as usize),
        }
    }

    /// Byte offset of field `index` in a struct type (packed layout).
    pub fn struct_field_offset(&self, fields: &[Type], index: usize) -> usize {
        fields[..index].iter().map(|f| self.size_of(f)).sum()
    }
}
