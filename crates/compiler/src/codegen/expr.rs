//! Expression emission
//!
//! Expressions are rendered into strings and composed by the caller;
//! statements write them into the output buffer. Every binary expression
//! is wrapped in parentheses so C precedence can never disagree with the
//! parsed tree.

use super::types::{c_type, mangle};
use super::{CodeGen, CodeGenError};
use crate::ast::{Expr, ExprKind, Literal, UnaryOp};
use crate::builtins::Builtin;
use crate::types::Type;

impl CodeGen {
    pub(super) fn gen_expr(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        if expr.ty.is_none() {
            // Only reachable through analyzer bugs; emit a placeholder
            // instead of aborting.
            return Ok("/* untyped expression */".to_string());
        }
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(gen_literal(literal)),
            ExprKind::Identifier(name) => Ok(mangle(name)),
            ExprKind::Assignment { target, op, value } => {
                let target = self.gen_expr(target)?;
                let value = self.gen_expr(value)?;
                Ok(format!("{} {} {}", target, op.symbol(), value))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;
                Ok(format!("({} {} {})", lhs, op.symbol(), rhs))
            }
            ExprKind::Unary { op, operand, .. } => self.gen_unary(*op, operand),
            ExprKind::Cast { expr, target } => {
                let inner = self.gen_expr(expr)?;
                Ok(format!("(({})({}))", c_type(target), inner))
            }
            ExprKind::Call { callee, args } => self.gen_call(callee, args),
            ExprKind::Field { object, field } => {
                let accessor = field_accessor(object);
                let object = self.gen_expr(object)?;
                Ok(format!("{}{}{}", object, accessor, field))
            }
            ExprKind::Index { array, index } => {
                // Arrays, pointers and references-to-arrays all index the
                // same way in C once references lower to element pointers.
                let index_code = self.gen_expr(index)?;
                let array_code = self.gen_expr(array)?;
                Ok(format!("{}[{}]", array_code, index_code))
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut parts = Vec::with_capacity(elements.len());
                for element in elements {
                    parts.push(self.gen_expr(element)?);
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            ExprKind::StructLiteral { name, fields } => {
                let header = if self.in_struct_init {
                    String::new()
                } else {
                    format!("({})", name)
                };
                let saved = std::mem::replace(&mut self.in_struct_init, true);
                let mut parts = Vec::with_capacity(fields.len());
                for (field, value) in fields {
                    parts.push(format!(".{} = {}", field, self.gen_expr(value)?));
                }
                self.in_struct_init = saved;
                if parts.is_empty() {
                    Ok(format!("{}{{0}}", header))
                } else {
                    Ok(format!("{}{{ {} }}", header, parts.join(", ")))
                }
            }
        }
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<String, CodeGenError> {
        match op {
            UnaryOp::Neg => Ok(format!("(-{})", self.gen_expr(operand)?)),
            UnaryOp::Not => Ok(format!("(!{})", self.gen_expr(operand)?)),
            UnaryOp::Deref => Ok(format!("(*{})", self.gen_expr(operand)?)),
            UnaryOp::Ref => {
                // Taking the address of an array uses the array name
                // directly: C's array-to-pointer decay.
                if matches!(operand.ty, Some(Type::Array(..))) {
                    self.gen_expr(operand)
                } else {
                    Ok(format!("(&{})", self.gen_expr(operand)?))
                }
            }
        }
    }

    fn gen_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<String, CodeGenError> {
        match &callee.kind {
            ExprKind::Identifier(name) => {
                match Builtin::lookup(name) {
                    Some(Builtin::Println) => return self.gen_print(args, true),
                    Some(Builtin::Print) => return self.gen_print(args, false),
                    Some(Builtin::Sqrt) => {
                        let arg = match args.first() {
                            Some(arg) => self.gen_expr(arg)?,
                            None => "0".to_string(),
                        };
                        return Ok(format!("sqrt({})", arg));
                    }
                    None => {}
                }
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.gen_expr(arg)?);
                }
                Ok(format!("{}({})", mangle(name), parts.join(", ")))
            }
            ExprKind::Field { object, field } => self.gen_method_call(object, field, args),
            // Not produced by the grammar; keep the output best-effort.
            _ => {
                let callee = self.gen_expr(callee)?;
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.gen_expr(arg)?);
                }
                Ok(format!("{}({})", callee, parts.join(", ")))
            }
        }
    }

    /// `obj.method(args...)` -> `Struct_method(obj, args...)`, with a `*`/`&`
    /// adjustment when the receiver parameter's shape differs from the
    /// object expression's.
    fn gen_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
    ) -> Result<String, CodeGenError> {
        let Some(struct_name) = object.ty.as_ref().and_then(|t| t.struct_name()) else {
            return Ok("/* untyped expression */".to_string());
        };
        let struct_name = struct_name.to_string();
        let receiver_is_ref = self
            .method_receivers
            .get(&format!("{}::{}", struct_name, method))
            .copied()
            .unwrap_or(false);
        let object_is_ref = matches!(
            object.ty.as_ref(),
            Some(Type::Reference(..)) | Some(Type::Pointer(..))
        );
        let object_code = self.gen_expr(object)?;
        let receiver = match (object_is_ref, receiver_is_ref) {
            (true, false) => format!("(*{})", object_code),
            (false, true) => format!("(&{})", object_code),
            _ => object_code,
        };

        let mut parts = vec![receiver];
        for arg in args {
            parts.push(self.gen_expr(arg)?);
        }
        Ok(format!("{}_{}({})", struct_name, method, parts.join(", ")))
    }

    /// `println`/`print` expand to one `printf` whose format string is
    /// chosen from each argument's resolved type.
    fn gen_print(&mut self, args: &[Expr], newline: bool) -> Result<String, CodeGenError> {
        let mut format_str = String::new();
        let mut call_args: Vec<String> = Vec::new();
        for arg in args {
            let Some(ty) = arg.ty.clone() else { continue };
            let code = self.gen_expr(arg)?;
            match ty {
                Type::Str => {
                    format_str.push_str("%s");
                    call_args.push(code);
                }
                Type::Bool => {
                    format_str.push_str("%s");
                    call_args.push(format!("(({}) ? \"true\" : \"false\")", code));
                }
                Type::Char => {
                    format_str.push_str("%c");
                    call_args.push(code);
                }
                Type::F32 | Type::F64 => {
                    format_str.push_str("%f");
                    call_args.push(code);
                }
                ty if ty.is_unsigned_integral() => {
                    format_str.push_str("%llu");
                    call_args.push(format!("(unsigned long long)({})", code));
                }
                ty if ty.is_integral() => {
                    format_str.push_str("%lld");
                    call_args.push(format!("(long long)({})", code));
                }
                // Unprintable types were rejected during analysis.
                _ => {}
            }
        }
        if newline {
            format_str.push_str("\\n");
        }
        let mut call = format!("printf(\"{}\"", format_str);
        for arg in call_args {
            call.push_str(", ");
            call.push_str(&arg);
        }
        call.push(')');
        Ok(call)
    }
}

/// `.` for struct values, `->` through one reference/pointer layer.
fn field_accessor(object: &Expr) -> &'static str {
    match object.ty.as_ref() {
        Some(Type::Reference(..)) | Some(Type::Pointer(..)) => "->",
        _ => ".",
    }
}

fn gen_literal(literal: &Literal) -> String {
    match literal {
        Literal::Int(value) => value.to_string(),
        Literal::Float(value) => format!("{:?}", value),
        Literal::Bool(true) => "true".to_string(),
        Literal::Bool(false) => "false".to_string(),
        Literal::Char(c) => c_char_literal(*c),
        // Raw lexeme text: escape sequences pass through to C unchanged.
        Literal::Str(text) => format!("\"{}\"", text),
    }
}

fn c_char_literal(c: char) -> String {
    match c {
        '\n' => "'\\n'".to_string(),
        '\t' => "'\\t'".to_string(),
        '\r' => "'\\r'".to_string(),
        '\\' => "'\\\\'".to_string(),
        '\'' => "'\\''".to_string(),
        '\0' => "'\\0'".to_string(),
        c if c.is_ascii() && !c.is_ascii_control() => format!("'{}'", c),
        c => format!("'\\x{:02x}'", c as u32),
    }
}
