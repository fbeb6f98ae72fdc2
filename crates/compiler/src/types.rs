//! Type representation for Ember
//!
//! Types form a small directed acyclic graph: primitives at the leaves,
//! arrays/pointers/references wrapping an element type, and nominal struct
//! types resolved against the analyzer's registry. Structural equality is
//! the derived `PartialEq`; struct types compare by name.

use crate::token::TokenKind;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Char,
    /// String slice, lowered to `const char*`.
    Str,
    Void,
    /// Fixed-length array with the length known at parse time.
    Array(Box<Type>, usize),
    /// Raw pointer, for C interop.
    Pointer(Box<Type>),
    /// Reference with mutability; lowered to `const T*` / `T*`.
    Reference(Box<Type>, bool),
    /// Nominal struct type, resolved against the type registry by name.
    Struct(String),
    /// Placeholder before analysis has assigned a real type.
    Unknown,
}

impl Type {
    /// Map a primitive type keyword to its type.
    pub fn from_keyword(kind: TokenKind) -> Option<Type> {
        let ty = match kind {
            TokenKind::I8 => Type::I8,
            TokenKind::I16 => Type::I16,
            TokenKind::I32 => Type::I32,
            TokenKind::I64 => Type::I64,
            TokenKind::U8 => Type::U8,
            TokenKind::U16 => Type::U16,
            TokenKind::U32 => Type::U32,
            TokenKind::U64 => Type::U64,
            TokenKind::F32 => Type::F32,
            TokenKind::F64 => Type::F64,
            TokenKind::Bool => Type::Bool,
            TokenKind::Char => Type::Char,
            TokenKind::Str => Type::Str,
            TokenKind::Void => Type::Void,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_signed_integral(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_unsigned_integral(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U32 | Type::U64)
    }

    /// Integral types; `char` participates in integral arithmetic the way
    /// it does in C.
    pub fn is_integral(&self) -> bool {
        self.is_signed_integral() || self.is_unsigned_integral() || matches!(self, Type::Char)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// The compatibility relation used by every "compatible" rule in the
    /// analyzer: structural equality, or both integral, or both floating.
    /// No other widening is permitted.
    pub fn compatible_with(&self, other: &Type) -> bool {
        self == other
            || (self.is_integral() && other.is_integral())
            || (self.is_float() && other.is_float())
    }

    /// Strip one layer of reference or pointer, for field and method
    /// lookup on an object expression.
    pub fn auto_deref(&self) -> &Type {
        match self {
            Type::Reference(inner, _) | Type::Pointer(inner) => inner,
            other => other,
        }
    }

    /// The struct name behind this type, through at most one layer of
    /// reference or pointer.
    pub fn struct_name(&self) -> Option<&str> {
        match self.auto_deref() {
            Type::Struct(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Str => write!(f, "str"),
            Type::Void => write!(f, "void"),
            Type::Array(elem, size) => write!(f, "[{}; {}]", elem, size),
            Type::Pointer(pointee) => write!(f, "*{}", pointee),
            Type::Reference(referent, true) => write!(f, "&mut {}", referent),
            Type::Reference(referent, false) => write!(f, "&{}", referent),
            Type::Struct(name) => write!(f, "{}", name),
            Type::Unknown => write!(f, "<unknown>"),
        }
    }
}
