//! Abstract syntax tree for Ember
//!
//! The parser owns the tree it builds; children are exclusively owned by
//! their parents, and all names and literal text are owned copies, so the
//! token vector can be dropped once parsing completes.
//!
//! Every expression node carries a source `Location` and a decoration slot
//! for its resolved type. The analyzer fills the slot; codegen reads it.

use crate::types::Type;
use std::fmt;

/// 1-based source position for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Include(IncludeDecl),
    ExternFunction(FunctionSig),
    Function(Function),
    Struct(StructDef),
    Impl(ImplBlock),
    /// Top-level statement (a `let` lowers to a C global).
    Statement(Stmt),
}

/// `include("stdio.h");` - forwarded to the C prologue.
#[derive(Debug, Clone)]
pub struct IncludeDecl {
    pub path: String,
    pub is_system: bool,
    pub location: Location,
}

/// Signature of an `extern fn`; the body lives in a user-included header.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Block,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub is_extern: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub location: Location,
}

/// `impl Name { fn ... }` - methods become free functions named
/// `Name::method` with the receiver as first parameter.
#[derive(Debug, Clone)]
pub struct ImplBlock {
    pub struct_name: String,
    pub functions: Vec<Function>,
    pub location: Location,
}

/// `{ statement* expr? }` - a trailing expression without `;` is the
/// block's value.
#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    If {
        cond: Expr,
        then_branch: Block,
        /// `else if ...` is represented as an else block holding one `If`.
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    /// `for i in a..b { ... }` - the upper bound is exclusive.
    For {
        var: String,
        var_type: Option<Type>,
        start: Expr,
        end: Expr,
        body: Block,
    },
    Loop {
        body: Block,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Let {
        name: String,
        ty: Option<Type>,
        init: Option<Expr>,
        mutable: bool,
    },
    Block(Block),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
    /// Resolved type, attached during semantic analysis.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Expr {
            kind,
            location,
            ty: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Assignment {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        /// True for `&mut`; meaningful only with `UnaryOp::Ref`.
        is_mut_ref: bool,
    },
    Cast {
        expr: Box<Expr>,
        target: Type,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: String,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Literal(Literal),
    /// Name reference; may contain a `::` path (`Vec2::new`).
    Identifier(String),
    ArrayLiteral(Vec<Expr>),
    StructLiteral {
        name: String,
        fields: Vec<(String, Expr)>,
    },
}

/// Decoded literal value. String text is kept raw (escapes preserved);
/// codegen writes it back out through C's own string syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-x`
    Neg,
    /// Logical not `!x`
    Not,
    /// Dereference `*x`
    Deref,
    /// Address-of `&x` / `&mut x`
    Ref,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Deref => "*",
            UnaryOp::Ref => "&",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_symbols() {
        assert_eq!(BinaryOp::Shl.symbol(), "<<");
        assert_eq!(AssignOp::Div.symbol(), "/=");
        assert_eq!(UnaryOp::Deref.symbol(), "*");
    }

    #[test]
    fn test_op_classification() {
        assert!(BinaryOp::Rem.is_arithmetic());
        assert!(BinaryOp::LtEq.is_comparison());
        assert!(BinaryOp::NotEq.is_equality());
        assert!(BinaryOp::And.is_logical());
        assert!(BinaryOp::Shr.is_bitwise());
        assert!(!BinaryOp::Add.is_bitwise());
    }

    #[test]
    fn test_expr_starts_undecorated() {
        let expr = Expr::new(
            ExprKind::Literal(Literal::Int(1)),
            Location::new(1, 1),
        );
        assert!(expr.ty.is_none());
    }
}
