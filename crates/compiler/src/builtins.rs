//! Built-in callables
//!
//! Ember has no runtime library: the three built-ins compile to direct C
//! standard-library calls. The analyzer consults this table before normal
//! function lookup; codegen keys its `printf` format selection on the
//! same names.

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Variadic print with trailing newline -> `printf`.
    Println,
    /// Variadic print -> `printf`.
    Print,
    /// Single numeric argument -> C `sqrt`; result is `f32`.
    Sqrt,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "println" => Some(Builtin::Println),
            "print" => Some(Builtin::Print),
            "sqrt" => Some(Builtin::Sqrt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Println => "println",
            Builtin::Print => "print",
            Builtin::Sqrt => "sqrt",
        }
    }

    /// Result type of a call to this builtin.
    pub fn result_type(self) -> Type {
        match self {
            Builtin::Println | Builtin::Print => Type::Void,
            Builtin::Sqrt => Type::F32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(Builtin::lookup("println"), Some(Builtin::Println));
        assert_eq!(Builtin::lookup("sqrt"), Some(Builtin::Sqrt));
        assert_eq!(Builtin::lookup("printf"), None);
    }

    #[test]
    fn test_sqrt_narrows_to_f32() {
        // The result is f32 even for an f64 argument.
        assert_eq!(Builtin::Sqrt.result_type(), Type::F32);
    }
}
