//! Type lowering to C.

use crate::types::Type;

/// The C spelling of an Ember type in expression position (casts,
/// prototypes, return types). Array declarations go through
/// `c_declaration`, which places the brackets after the name.
pub fn c_type(ty: &Type) -> String {
    match ty {
        Type::I8 => "int8_t".to_string(),
        Type::I16 => "int16_t".to_string(),
        Type::I32 => "int32_t".to_string(),
        Type::I64 => "int64_t".to_string(),
        Type::U8 => "uint8_t".to_string(),
        Type::U16 => "uint16_t".to_string(),
        Type::U32 => "uint32_t".to_string(),
        Type::U64 => "uint64_t".to_string(),
        Type::F32 => "float".to_string(),
        Type::F64 => "double".to_string(),
        Type::Bool => "_Bool".to_string(),
        Type::Char => "char".to_string(),
        Type::Str => "const char*".to_string(),
        Type::Void => "void".to_string(),
        // Arrays decay to element pointers outside declaration sites.
        Type::Array(element, _) => format!("{}*", c_type(element)),
        Type::Pointer(pointee) => format!("{}*", c_type(pointee)),
        // A reference to an array lowers to an element pointer, matching
        // the decay applied where `&array` is taken.
        Type::Reference(referent, mutable) => {
            let pointee = match &**referent {
                Type::Array(element, _) => element,
                other => other,
            };
            if *mutable {
                format!("{}*", c_type(pointee))
            } else {
                format!("const {}*", c_type(pointee))
            }
        }
        Type::Struct(name) => name.clone(),
        Type::Unknown => "void /* unknown type */".to_string(),
    }
}

/// A C declarator for `name` of the given type: `int32_t x`,
/// `int32_t grid[3][2]`, `const P* p`.
pub fn c_declaration(ty: &Type, name: &str) -> String {
    if let Type::Array(_, _) = ty {
        let mut dims = String::new();
        let mut element = ty;
        while let Type::Array(inner, size) = element {
            dims.push_str(&format!("[{}]", size));
            element = inner;
        }
        format!("{} {}{}", c_type(element), name, dims)
    } else {
        format!("{} {}", c_type(ty), name)
    }
}

/// Rewrite a `::` path into a C identifier: `Vec2::new` -> `Vec2_new`.
pub fn mangle(name: &str) -> String {
    name.replace("::", "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_lowering() {
        assert_eq!(c_type(&Type::I8), "int8_t");
        assert_eq!(c_type(&Type::U64), "uint64_t");
        assert_eq!(c_type(&Type::F32), "float");
        assert_eq!(c_type(&Type::Bool), "_Bool");
        assert_eq!(c_type(&Type::Str), "const char*");
    }

    #[test]
    fn test_reference_lowering() {
        assert_eq!(
            c_type(&Type::Reference(Box::new(Type::I32), false)),
            "const int32_t*"
        );
        assert_eq!(
            c_type(&Type::Reference(Box::new(Type::I32), true)),
            "int32_t*"
        );
        assert_eq!(c_type(&Type::Pointer(Box::new(Type::Char))), "char*");
    }

    #[test]
    fn test_array_declaration() {
        assert_eq!(
            c_declaration(&Type::Array(Box::new(Type::I32), 4), "xs"),
            "int32_t xs[4]"
        );
        let nested = Type::Array(Box::new(Type::Array(Box::new(Type::U8), 2)), 3);
        assert_eq!(c_declaration(&nested, "grid"), "uint8_t grid[3][2]");
        assert_eq!(c_declaration(&Type::F64, "x"), "double x");
    }

    #[test]
    fn test_reference_to_array_lowers_to_element_pointer() {
        let arr = Type::Array(Box::new(Type::I32), 3);
        assert_eq!(
            c_type(&Type::Reference(Box::new(arr.clone()), false)),
            "const int32_t*"
        );
        assert_eq!(c_type(&Type::Reference(Box::new(arr), true)), "int32_t*");
    }

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("Vec2::new"), "Vec2_new");
        assert_eq!(mangle("plain"), "plain");
    }
}
