//! IR type and operator vocabulary.

use std::fmt;

/// First-class IR types. Aggregate layouts are packed; `size_of` needs the
/// module's struct table and therefore lives on `Module`.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    I1,
    I8,
    I16,
    I32,
    I64,
    F64,
    Ptr,
    /// A named struct, printed as `%<name>`.
    Struct(String),
    /// A literal (unnamed) tuple type, printed `{ a, b, … }`.
    Tuple(Vec<Type>),
    /// Fixed-length array.
    Array(Box<Type>, u64),
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I8 => Some(8),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            _ => None,
        }
    }

    pub fn int_with_bits(bits: u32) -> Type {
        match bits {
            1 => Type::I1,
            8 => Type::I8,
            16 => Type::I16,
            32 => Type::I32,
            _ => Type::I64,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F64)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_first_class(&self) -> bool {
        !matches!(self, Type::Void)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::I1 => f.write_str("i1"),
            Type::I8 => f.write_str("i8"),
            Type::I16 => f.write_str("i16"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::F64 => f.write_str("double"),
            Type::Ptr => f.write_str("ptr"),
            Type::Struct(name) => write!(f, "%{name}"),
            Type::Tuple(fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(" }")
            }
            Type::Array(elem, len) => write!(f, "[{len} x {elem}]"),
        }
    }
}

/// Integer binary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        }
    }
}

/// Integer comparison predicates. Only the signed orderings are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ICmpPred {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
}

impl ICmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ICmpPred::Eq => "eq",
            ICmpPred::Ne => "ne",
            ICmpPred::Slt => "slt",
            ICmpPred::Sgt => "sgt",
            ICmpPred::Sle => "sle",
            ICmpPred::Sge => "sge",
        }
    }
}

/// Conversion opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SExt,
    ZExt,
    Trunc,
    PtrToInt,
    IntToPtr,
    Bitcast,
    SIToFP,
    FPToSI,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
            CastOp::SIToFP => "sitofp",
            CastOp::FPToSI => "fptosi",
        }
    }
}

/// Atomic read-modify-write opcodes; all emitted with seq-cst ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmwOp {
    Xchg,
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl RmwOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            RmwOp::Xchg => "xchg",
            RmwOp::Add => "add",
            RmwOp::Sub => "sub",
            RmwOp::And => "and",
            RmwOp::Or => "or",
            RmwOp::Xor => "xor",
        }
    }
}
