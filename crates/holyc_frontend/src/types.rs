//! The HolyC type model.
//!
//! Types are a small closed enum plus a pointer depth, replacing the string
//! encodings of the historical implementation. [`Ty`] still renders in the
//! historic notation (`I64`, `U8*`, `fn I64`, `Bool(chained)`) so AST/HIR
//! dumps stay recognizable, but promotions and conversions are exhaustive
//! matches over [`ValueClass`].

use std::fmt;

/// Base kind of a type, before pointer indirection is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    U0,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
    Bool,
    /// A comparison whose left operand was itself a comparison. Recognized
    /// but treated as `Bool` semantically.
    BoolChained,
    /// A named aggregate (or any non-primitive type name).
    Named(String),
    /// A function value; the payload is the return type.
    Fn(Box<Ty>),
}

/// A type: base kind plus pointer depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ty {
    pub kind: TyKind,
    pub ptr: u32,
}

/// Classification used by promotion, conversion, and print-format rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Bool,
    Int,
    UInt,
    Float,
    Pointer,
    /// Aggregates, `U0`, and anything whose class is not statically known.
    Opaque,
}

impl Ty {
    pub fn new(kind: TyKind) -> Self {
        Ty { kind, ptr: 0 }
    }

    pub const I64: Ty = Ty { kind: TyKind::I64, ptr: 0 };
    pub const U0: Ty = Ty { kind: TyKind::U0, ptr: 0 };
    pub const BOOL: Ty = Ty { kind: TyKind::Bool, ptr: 0 };
    pub const F64: Ty = Ty { kind: TyKind::F64, ptr: 0 };

    /// `U8*`, the type of string literals.
    pub fn u8_ptr() -> Ty {
        Ty { kind: TyKind::U8, ptr: 1 }
    }

    /// Function-value type with the given return type.
    pub fn fn_value(ret: Ty) -> Ty {
        Ty { kind: TyKind::Fn(Box::new(ret)), ptr: 0 }
    }

    pub fn is_pointer(&self) -> bool {
        self.ptr > 0
    }

    /// Add one level of indirection.
    pub fn pointer_to(&self) -> Ty {
        Ty { kind: self.kind.clone(), ptr: self.ptr + 1 }
    }

    /// Remove one level of indirection. Dereferencing a non-pointer falls
    /// back to `I64`, matching the permissive historical behavior.
    pub fn deref(&self) -> Ty {
        if self.ptr > 0 {
            Ty { kind: self.kind.clone(), ptr: self.ptr - 1 }
        } else {
            Ty::I64
        }
    }

    pub fn class(&self) -> ValueClass {
        if self.ptr > 0 {
            return ValueClass::Pointer;
        }
        match &self.kind {
            TyKind::Bool | TyKind::BoolChained => ValueClass::Bool,
            TyKind::I8 | TyKind::I16 | TyKind::I32 | TyKind::I64 => ValueClass::Int,
            TyKind::U8 | TyKind::U16 | TyKind::U32 | TyKind::U64 => ValueClass::UInt,
            TyKind::F64 => ValueClass::Float,
            TyKind::U0 | TyKind::Named(_) | TyKind::Fn(_) => ValueClass::Opaque,
        }
    }

    /// Width in bits for scalar classification; pointers are 64.
    pub fn bits(&self) -> u32 {
        if self.ptr > 0 {
            return 64;
        }
        match &self.kind {
            TyKind::Bool | TyKind::BoolChained => 1,
            TyKind::I8 | TyKind::U8 => 8,
            TyKind::I16 | TyKind::U16 => 16,
            TyKind::I32 | TyKind::U32 => 32,
            TyKind::I64 | TyKind::U64 | TyKind::F64 => 64,
            TyKind::U0 | TyKind::Named(_) | TyKind::Fn(_) => 0,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.class(),
            ValueClass::Bool | ValueClass::Int | ValueClass::UInt | ValueClass::Float
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.class(), ValueClass::Bool | ValueClass::Int | ValueClass::UInt)
    }

    pub fn is_opaque(&self) -> bool {
        self.class() == ValueClass::Opaque
    }

    /// The base type name with pointer stars and `class`/`union` prefixes
    /// stripped; used by the `lastclass` default and reflection rows.
    pub fn base_name(&self) -> String {
        match &self.kind {
            TyKind::Named(name) => name.clone(),
            TyKind::Fn(_) => "I64".to_string(),
            other => Ty { kind: other.clone(), ptr: 0 }.to_string(),
        }
    }

    /// Storage size estimate in bytes, matching the layout rules shared by
    /// sema, the IR builder, and the runtime reflection cache.
    pub fn estimated_size(&self, aggregate_size: impl Fn(&str) -> Option<usize>) -> usize {
        if self.ptr > 0 {
            return 8;
        }
        match &self.kind {
            TyKind::Bool | TyKind::BoolChained | TyKind::I8 | TyKind::U8 => 1,
            TyKind::I16 | TyKind::U16 => 2,
            TyKind::I32 | TyKind::U32 => 4,
            TyKind::I64 | TyKind::U64 | TyKind::F64 | TyKind::U0 | TyKind::Fn(_) => 8,
            TyKind::Named(name) => aggregate_size(name).unwrap_or(8),
        }
    }

    /// Parse a declaration type text (modifiers already stripped) such as
    /// `U8 *`, `class Foo`, `CHashClass *`. Empty input yields `I64`.
    pub fn parse(text: &str) -> Ty {
        let mut trimmed = text.trim();
        let mut depth = 0u32;
        while let Some(stripped) = trimmed.strip_suffix('*') {
            depth += 1;
            trimmed = stripped.trim_end();
        }
        if let Some(rest) = trimmed.strip_prefix("class ") {
            return Ty { kind: TyKind::Named(rest.trim().to_string()), ptr: depth };
        }
        if let Some(rest) = trimmed.strip_prefix("union ") {
            return Ty { kind: TyKind::Named(rest.trim().to_string()), ptr: depth };
        }
        let kind = match trimmed {
            "" => TyKind::I64,
            "U0" => TyKind::U0,
            "I8" => TyKind::I8,
            "U8" => TyKind::U8,
            "I16" => TyKind::I16,
            "U16" => TyKind::U16,
            "I32" => TyKind::I32,
            "U32" => TyKind::U32,
            "I64" => TyKind::I64,
            "U64" => TyKind::U64,
            "F64" => TyKind::F64,
            "Bool" => TyKind::Bool,
            "class" | "union" => TyKind::I64,
            other => TyKind::Named(other.to_string()),
        };
        Ty { kind, ptr: depth }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TyKind::U0 => f.write_str("U0")?,
            TyKind::I8 => f.write_str("I8")?,
            TyKind::U8 => f.write_str("U8")?,
            TyKind::I16 => f.write_str("I16")?,
            TyKind::U16 => f.write_str("U16")?,
            TyKind::I32 => f.write_str("I32")?,
            TyKind::U32 => f.write_str("U32")?,
            TyKind::I64 => f.write_str("I64")?,
            TyKind::U64 => f.write_str("U64")?,
            TyKind::F64 => f.write_str("F64")?,
            TyKind::Bool => f.write_str("Bool")?,
            TyKind::BoolChained => f.write_str("Bool(chained)")?,
            TyKind::Named(name) => f.write_str(name)?,
            TyKind::Fn(ret) => write!(f, "fn {ret}")?,
        }
        for _ in 0..self.ptr {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// Integer promotion: HolyC execution is 64-bit centric, so integral math
/// normalizes to 64 bits, preserving unsigned intent when either side is
/// unsigned. Non-integral inputs fall back to `I64`.
pub fn promote_integer_result(lhs: &Ty, rhs: &Ty) -> Ty {
    if !lhs.is_integral() || !rhs.is_integral() {
        return Ty::I64;
    }
    if lhs.class() == ValueClass::UInt || rhs.class() == ValueClass::UInt {
        Ty::new(TyKind::U64)
    } else {
        Ty::I64
    }
}

/// Implicit convertibility: numerics interconvert freely, pointers and
/// integrals interconvert, and opaque types convert to anything.
pub fn can_implicit_convert(from: &Ty, to: &Ty) -> bool {
    let from_class = from.class();
    let to_class = to.class();
    if from_class == ValueClass::Opaque || to_class == ValueClass::Opaque {
        return true;
    }
    if from_class == to_class {
        return true;
    }
    if from.is_numeric() && to.is_numeric() {
        return true;
    }
    (from_class == ValueClass::Pointer && to.is_integral())
        || (to_class == ValueClass::Pointer && from.is_integral())
}

/// A lane selector such as `u8` in `v.u8[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneInfo {
    pub bits: u32,
    pub signed: bool,
}

impl LaneInfo {
    /// Parse a lane selector; both `i16` and `I16` spellings are accepted.
    pub fn parse(selector: &str) -> Option<LaneInfo> {
        let lowered = selector.trim().to_ascii_lowercase();
        let (signed, width) = match lowered.as_str() {
            "i8" => (true, 8),
            "u8" => (false, 8),
            "i16" => (true, 16),
            "u16" => (false, 16),
            "i32" => (true, 32),
            "u32" => (false, 32),
            "i64" => (true, 64),
            "u64" => (false, 64),
            _ => return None,
        };
        Some(LaneInfo { bits: width, signed })
    }

    /// The element type the selector projects out of its base.
    pub fn element_ty(&self) -> Ty {
        let kind = match (self.signed, self.bits) {
            (true, 8) => TyKind::I8,
            (false, 8) => TyKind::U8,
            (true, 16) => TyKind::I16,
            (false, 16) => TyKind::U16,
            (true, 32) => TyKind::I32,
            (false, 32) => TyKind::U32,
            (true, _) => TyKind::I64,
            (false, _) => TyKind::U64,
        };
        Ty::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pointer_depth() {
        let ty = Ty::parse("U8 **");
        assert_eq!(ty.kind, TyKind::U8);
        assert_eq!(ty.ptr, 2);
        assert_eq!(ty.to_string(), "U8**");
    }

    #[test]
    fn parses_class_prefix() {
        let ty = Ty::parse("class CTask *");
        assert_eq!(ty.kind, TyKind::Named("CTask".to_string()));
        assert_eq!(ty.ptr, 1);
        assert_eq!(ty.base_name(), "CTask");
    }

    #[test]
    fn empty_defaults_to_i64() {
        assert_eq!(Ty::parse(""), Ty::I64);
    }

    #[test]
    fn promotion_prefers_unsigned() {
        let u8_ty = Ty::new(TyKind::U8);
        let i64_ty = Ty::I64;
        assert_eq!(promote_integer_result(&u8_ty, &i64_ty), Ty::new(TyKind::U64));
        assert_eq!(promote_integer_result(&i64_ty, &i64_ty), Ty::I64);
    }

    #[test]
    fn pointer_integral_interconvert() {
        let ptr = Ty::u8_ptr();
        assert!(can_implicit_convert(&ptr, &Ty::I64));
        assert!(can_implicit_convert(&Ty::I64, &ptr));
        assert!(!can_implicit_convert(&ptr, &Ty::F64));
    }

    #[test]
    fn lane_selector_shapes() {
        let lane = LaneInfo::parse("U16").unwrap();
        assert_eq!(lane.bits, 16);
        assert!(!lane.signed);
        assert_eq!(lane.element_ty().to_string(), "U16");
        assert!(LaneInfo::parse("f64").is_none());
    }
}
