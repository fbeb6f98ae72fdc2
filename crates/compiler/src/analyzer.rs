//! Semantic analysis for Ember
//!
//! Walks the AST in ordered passes over the top-level items:
//!
//! 1. Register every struct in the type registry (then validate field
//!    types, so structs can reference each other in any order).
//! 2. Register every impl method as a global function whose mangled name
//!    is `Struct::method`, with the receiver as first parameter.
//! 3. Register the signatures of remaining functions and externs, then
//!    analyze bodies and top-level statements in declaration order.
//!
//! The ordering gives forward references: a function may call functions
//! defined later in the file, and any struct may refer to any other
//! struct by name.
//!
//! Each checked expression caches its resolved type on its AST node;
//! already-decorated nodes short-circuit on revisit. Analysis continues
//! past errors and reports further independent ones.

use crate::ast::{
    AssignOp, Block, Expr, ExprKind, Function, FunctionSig, Item, Literal, Location, Param,
    Program, Stmt, StmtKind, UnaryOp,
};
use crate::builtins::Builtin;
use crate::diagnostics::Diagnostic;
use crate::symbols::{ParamInfo, ScopeKind, StructInfo, Symbol, SymbolTable};
use crate::types::Type;

/// Counters reported to the caller after a successful analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub functions_analyzed: usize,
    pub structs_analyzed: usize,
    pub variables_analyzed: usize,
}

pub struct Analyzer {
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    file: String,
    /// Tracks `break`/`continue` legality independent of scope kind, so
    /// nested non-loop scopes inside a loop stay legal.
    loop_depth: usize,
    stats: AnalysisStats,
}

impl Analyzer {
    pub fn new(file: impl Into<String>) -> Self {
        Analyzer {
            symbols: SymbolTable::new(),
            diagnostics: Vec::new(),
            file: file.into(),
            loop_depth: 0,
            stats: AnalysisStats::default(),
        }
    }

    /// Analyze and decorate the program. Returns the collected statistics
    /// and the ordered diagnostic list; an empty list means the tree is
    /// fully decorated and safe for codegen.
    pub fn analyze(mut self, program: &mut Program) -> (AnalysisStats, Vec<Diagnostic>) {
        self.register_structs(program);
        self.register_methods(program);
        self.register_signatures(program);
        self.analyze_bodies(program);
        debug_assert!(self.symbols.at_global_scope());
        (self.stats, self.diagnostics)
    }

    fn error(&mut self, message: String, location: Location) {
        self.diagnostics
            .push(Diagnostic::at(message, &self.file, location));
    }

    /// Check that every struct name mentioned in a type exists.
    fn validate_type(&mut self, ty: &Type, location: Location) {
        match ty {
            Type::Array(element, _) => self.validate_type(element, location),
            Type::Pointer(inner) | Type::Reference(inner, _) => {
                self.validate_type(inner, location)
            }
            Type::Struct(name) => {
                if self.symbols.struct_info(name).is_none() {
                    let name = name.clone();
                    self.error(format!("unknown type '{}'", name), location);
                }
            }
            _ => {}
        }
    }

    // ---- pass 1: struct registry ---------------------------------------

    fn register_structs(&mut self, program: &Program) {
        for item in &program.items {
            let Item::Struct(def) = item else { continue };
            self.stats.structs_analyzed += 1;

            let mut seen: Vec<&str> = Vec::new();
            for field in &def.fields {
                if seen.contains(&field.name.as_str()) {
                    self.error(
                        format!(
                            "duplicate field '{}' in struct '{}'",
                            field.name, def.name
                        ),
                        field.location,
                    );
                } else {
                    seen.push(&field.name);
                }
            }

            let info = StructInfo {
                name: def.name.clone(),
                fields: def
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), f.ty.clone()))
                    .collect(),
            };
            if self.symbols.define_struct(info).is_err() {
                self.error(
                    format!("duplicate definition of struct '{}'", def.name),
                    def.location,
                );
            }
        }

        // Field types can only be validated once every struct is known.
        for item in &program.items {
            let Item::Struct(def) = item else { continue };
            for field in &def.fields {
                let ty = field.ty.clone();
                self.validate_type(&ty, field.location);
            }
        }
    }

    // ---- pass 2: impl methods ------------------------------------------

    fn register_methods(&mut self, program: &Program) {
        for item in &program.items {
            let Item::Impl(imp) = item else { continue };
            if self.symbols.struct_info(&imp.struct_name).is_none() {
                self.error(
                    format!("impl target '{}' is not a known struct", imp.struct_name),
                    imp.location,
                );
            }
            for method in &imp.functions {
                if let Some(first) = method.params.first() {
                    if first.name == "self"
                        && first.ty.struct_name() != Some(imp.struct_name.as_str())
                    {
                        self.error(
                            format!(
                                "the 'self' parameter of '{}::{}' must have type '{}'",
                                imp.struct_name, method.name, imp.struct_name
                            ),
                            first.location,
                        );
                    }
                }
                let mangled = format!("{}::{}", imp.struct_name, method.name);
                let symbol = function_symbol(&method.params, &method.return_type);
                if self.symbols.define(mangled.clone(), symbol).is_err() {
                    self.error(
                        format!("duplicate definition of method '{}'", mangled),
                        method.location,
                    );
                }
            }
        }
    }

    // ---- pass 3a: remaining signatures ---------------------------------

    fn register_signatures(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Function(function) => {
                    let symbol = function_symbol(&function.params, &function.return_type);
                    if self.symbols.define(function.name.clone(), symbol).is_err() {
                        self.error(
                            format!("duplicate definition of function '{}'", function.name),
                            function.location,
                        );
                    }
                }
                Item::ExternFunction(sig) => {
                    self.register_extern(sig);
                }
                _ => {}
            }
        }
    }

    fn register_extern(&mut self, sig: &FunctionSig) {
        for param in &sig.params {
            let ty = param.ty.clone();
            self.validate_type(&ty, param.location);
        }
        let return_type = sig.return_type.clone();
        self.validate_type(&return_type, sig.location);
        let symbol = function_symbol(&sig.params, &sig.return_type);
        if self.symbols.define(sig.name.clone(), symbol).is_err() {
            self.error(
                format!("duplicate definition of function '{}'", sig.name),
                sig.location,
            );
        }
    }

    // ---- pass 3b: bodies ------------------------------------------------

    fn analyze_bodies(&mut self, program: &mut Program) {
        for item in &mut program.items {
            match item {
                Item::Function(function) => self.analyze_function(function, None),
                Item::Impl(imp) => {
                    let target = imp.struct_name.clone();
                    for method in &mut imp.functions {
                        self.analyze_function(method, Some(&target));
                    }
                }
                Item::Statement(stmt) => self.analyze_stmt(stmt),
                _ => {}
            }
        }
    }

    fn analyze_function(&mut self, function: &mut Function, impl_target: Option<&str>) {
        self.stats.functions_analyzed += 1;

        if let Some(target) = impl_target {
            self.symbols.push_struct_scope(target);
        }
        let return_type = function.return_type.clone();
        self.validate_type(&return_type, function.location);
        self.symbols.push_function_scope(return_type);

        for (index, param) in function.params.iter().enumerate() {
            let ty = param.ty.clone();
            self.validate_type(&ty, param.location);
            let symbol = Symbol::Parameter {
                ty,
                index,
                mutable: param.mutable,
            };
            if self.symbols.define(param.name.clone(), symbol).is_err() {
                self.error(
                    format!("duplicate parameter '{}'", param.name),
                    param.location,
                );
            }
        }

        // A loop outside the function cannot be broken from inside it.
        let saved_depth = std::mem::take(&mut self.loop_depth);
        self.analyze_block_statements(&mut function.body);
        self.loop_depth = saved_depth;

        self.symbols.pop_scope();
        if impl_target.is_some() {
            self.symbols.pop_scope();
        }
    }

    /// Analyze a block's statements and tail in the current scope.
    fn analyze_block_statements(&mut self, block: &mut Block) {
        for stmt in &mut block.statements {
            self.analyze_stmt(stmt);
        }
        if let Some(tail) = &mut block.tail {
            self.analyze_expr(tail);
        }
    }

    /// Analyze a block inside a fresh scope of the given kind.
    fn analyze_block_scoped(&mut self, block: &mut Block, kind: ScopeKind) {
        self.symbols.push_scope(kind);
        self.analyze_block_statements(block);
        self.symbols.pop_scope();
    }

    fn analyze_stmt(&mut self, stmt: &mut Stmt) {
        let location = stmt.location;
        match &mut stmt.kind {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.analyze_expr(cond);
                if cond_ty != Type::Unknown && cond_ty != Type::Bool {
                    self.error(
                        format!("if condition must be bool, found '{}'", cond_ty),
                        cond.location,
                    );
                }
                self.analyze_block_scoped(then_branch, ScopeKind::Block);
                if let Some(else_branch) = else_branch {
                    self.analyze_block_scoped(else_branch, ScopeKind::Block);
                }
            }
            StmtKind::While { cond, body } => {
                let cond_ty = self.analyze_expr(cond);
                if cond_ty != Type::Unknown && cond_ty != Type::Bool {
                    self.error(
                        format!("while condition must be bool, found '{}'", cond_ty),
                        cond.location,
                    );
                }
                self.loop_depth += 1;
                self.analyze_block_scoped(body, ScopeKind::Loop);
                self.loop_depth -= 1;
            }
            StmtKind::For {
                var,
                var_type,
                start,
                end,
                body,
            } => {
                let start_ty = self.analyze_expr(start);
                if start_ty != Type::Unknown && !start_ty.is_integral() {
                    self.error(
                        format!("for-range start must be integral, found '{}'", start_ty),
                        start.location,
                    );
                }
                let end_ty = self.analyze_expr(end);
                if end_ty != Type::Unknown && !end_ty.is_integral() {
                    self.error(
                        format!("for-range end must be integral, found '{}'", end_ty),
                        end.location,
                    );
                }
                let iter_ty = match var_type {
                    Some(ty) => {
                        if !ty.is_integral() {
                            self.error(
                                format!("for-loop variable must be integral, found '{}'", ty),
                                location,
                            );
                        }
                        ty.clone()
                    }
                    None => Type::I32,
                };

                self.symbols.push_scope(ScopeKind::Loop);
                let iterator = Symbol::Variable {
                    ty: iter_ty,
                    mutable: false,
                    initialized: true,
                };
                if self.symbols.define(var.clone(), iterator).is_err() {
                    self.error(format!("duplicate definition of '{}'", var), location);
                }
                self.loop_depth += 1;
                self.analyze_block_statements(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            StmtKind::Loop { body } => {
                self.loop_depth += 1;
                self.analyze_block_scoped(body, ScopeKind::Loop);
                self.loop_depth -= 1;
            }
            StmtKind::Return(value) => {
                let expected = self.symbols.enclosing_return_type().cloned();
                match expected {
                    None => {
                        self.error("'return' outside of a function".to_string(), location);
                        if let Some(value) = value {
                            self.analyze_expr(value);
                        }
                    }
                    Some(expected) => match value {
                        Some(value) => {
                            let value_ty = self.analyze_expr(value);
                            if value_ty != Type::Unknown
                                && !value_ty.compatible_with(&expected)
                            {
                                self.error(
                                    format!(
                                        "return type mismatch: expected '{}', found '{}'",
                                        expected, value_ty
                                    ),
                                    value.location,
                                );
                            }
                        }
                        None => {
                            if expected != Type::Void {
                                self.error(
                                    format!(
                                        "missing return value: function returns '{}'",
                                        expected
                                    ),
                                    location,
                                );
                            }
                        }
                    },
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error("'break' outside of a loop".to_string(), location);
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error("'continue' outside of a loop".to_string(), location);
                }
            }
            StmtKind::Let {
                name,
                ty,
                init,
                mutable,
            } => {
                self.stats.variables_analyzed += 1;
                let annotated = match ty {
                    Some(ty) => {
                        let ty = ty.clone();
                        self.validate_type(&ty, location);
                        ty
                    }
                    None => {
                        self.error(
                            format!("let binding '{}' requires a type annotation", name),
                            location,
                        );
                        Type::Unknown
                    }
                };
                let initialized = init.is_some();
                if let Some(init) = init {
                    let init_ty = self.analyze_expr(init);
                    if annotated != Type::Unknown
                        && init_ty != Type::Unknown
                        && !init_ty.compatible_with(&annotated)
                    {
                        self.error(
                            format!(
                                "type mismatch: cannot initialize '{}: {}' with '{}'",
                                name, annotated, init_ty
                            ),
                            init.location,
                        );
                    }
                }
                let symbol = Symbol::Variable {
                    ty: annotated,
                    mutable: *mutable,
                    initialized,
                };
                if self.symbols.define(name.clone(), symbol).is_err() {
                    self.error(
                        format!("duplicate definition of '{}' in this scope", name),
                        location,
                    );
                }
            }
            StmtKind::Block(block) => self.analyze_block_scoped(block, ScopeKind::Block),
            StmtKind::Expr(expr) => {
                self.analyze_expr(expr);
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    fn analyze_expr(&mut self, expr: &mut Expr) -> Type {
        if let Some(ty) = &expr.ty {
            return ty.clone();
        }
        let location = expr.location;
        let ty = match &mut expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Int(_) => Type::I32,
                Literal::Float(_) => Type::F64,
                Literal::Bool(_) => Type::Bool,
                Literal::Char(_) => Type::Char,
                Literal::Str(_) => Type::Str,
            },
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.resolve_identifier(&name, location, true)
            }
            ExprKind::Assignment { target, op, value } => {
                let op = *op;
                let value_ty = self.analyze_expr(value);
                let target_ty = if op == AssignOp::Assign {
                    // The first assignment to an uninitialized binding is
                    // not a read; resolve the type without the
                    // initialization check.
                    if let ExprKind::Identifier(name) = &target.kind {
                        let name = name.clone();
                        let resolved = self.resolve_identifier(&name, target.location, false);
                        target.ty = Some(resolved.clone());
                        resolved
                    } else {
                        self.analyze_expr(target)
                    }
                } else {
                    self.analyze_expr(target)
                };
                self.check_assignable(target);
                if op != AssignOp::Assign
                    && target_ty != Type::Unknown
                    && !target_ty.is_numeric()
                {
                    self.error(
                        format!(
                            "operator '{}' requires a numeric target, found '{}'",
                            op.symbol(),
                            target_ty
                        ),
                        location,
                    );
                }
                if target_ty != Type::Unknown
                    && value_ty != Type::Unknown
                    && !value_ty.compatible_with(&target_ty)
                {
                    self.error(
                        format!(
                            "type mismatch: cannot assign '{}' to '{}'",
                            value_ty, target_ty
                        ),
                        location,
                    );
                }
                target_ty
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lhs_ty = self.analyze_expr(lhs);
                let rhs_ty = self.analyze_expr(rhs);
                self.binary_result(op, lhs_ty, rhs_ty, location)
            }
            ExprKind::Unary {
                op,
                operand,
                is_mut_ref,
            } => {
                let op = *op;
                let is_mut_ref = *is_mut_ref;
                let operand_ty = self.analyze_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if operand_ty == Type::Unknown {
                            Type::Unknown
                        } else if operand_ty.is_numeric() {
                            operand_ty
                        } else {
                            self.error(
                                format!("cannot negate value of type '{}'", operand_ty),
                                location,
                            );
                            Type::Unknown
                        }
                    }
                    UnaryOp::Not => {
                        if operand_ty != Type::Unknown && operand_ty != Type::Bool {
                            self.error(
                                format!("operator '!' requires bool, found '{}'", operand_ty),
                                location,
                            );
                        }
                        Type::Bool
                    }
                    UnaryOp::Deref => match operand_ty {
                        Type::Pointer(pointee) => *pointee,
                        Type::Reference(referent, _) => *referent,
                        Type::Unknown => Type::Unknown,
                        other => {
                            self.error(
                                format!("cannot dereference value of type '{}'", other),
                                location,
                            );
                            Type::Unknown
                        }
                    },
                    UnaryOp::Ref => {
                        if operand_ty == Type::Unknown {
                            Type::Unknown
                        } else {
                            Type::Reference(Box::new(operand_ty), is_mut_ref)
                        }
                    }
                }
            }
            ExprKind::Cast { expr: inner, target } => {
                // Casts are always permitted once the operand has a type;
                // no narrowing check.
                let target = target.clone();
                let source_ty = self.analyze_expr(inner);
                self.validate_type(&target, location);
                if source_ty == Type::Unknown {
                    Type::Unknown
                } else {
                    target
                }
            }
            ExprKind::Index { array, index } => {
                let array_ty = self.analyze_expr(array);
                let index_ty = self.analyze_expr(index);
                if index_ty != Type::Unknown && !index_ty.is_integral() {
                    self.error(
                        format!("array index must be integral, found '{}'", index_ty),
                        index.location,
                    );
                }
                match array_ty {
                    Type::Array(element, _) => *element,
                    Type::Pointer(pointee) => *pointee,
                    Type::Reference(referent, _) => match *referent {
                        // Reference-to-array is auto-dereferenced.
                        Type::Array(element, _) => *element,
                        other => {
                            self.error(
                                format!("cannot index value of type '&{}'", other),
                                location,
                            );
                            Type::Unknown
                        }
                    },
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(
                            format!("cannot index value of type '{}'", other),
                            location,
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::Field { object, field } => {
                let field = field.clone();
                let object_ty = self.analyze_expr(object);
                self.field_type(&object_ty, &field, location)
            }
            ExprKind::Call { callee, args } => {
                let result = self.analyze_call(callee, args, location);
                // The callee itself is an expression node; decorate it
                // with the call's result so the tree is fully typed.
                callee.ty = Some(result.clone());
                result
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut element_ty = Type::Unknown;
                let count = elements.len();
                for (i, element) in elements.iter_mut().enumerate() {
                    let ty = self.analyze_expr(element);
                    if i == 0 {
                        element_ty = ty;
                    } else if element_ty != Type::Unknown
                        && ty != Type::Unknown
                        && !ty.compatible_with(&element_ty)
                    {
                        self.error(
                            format!(
                                "array elements must share one type: found '{}' and '{}'",
                                element_ty, ty
                            ),
                            element.location,
                        );
                    }
                }
                if element_ty == Type::Unknown {
                    Type::Unknown
                } else {
                    Type::Array(Box::new(element_ty), count)
                }
            }
            ExprKind::StructLiteral { name, fields } => {
                let name = name.clone();
                let info = self.symbols.struct_info(&name).cloned();
                match info {
                    None => {
                        self.error(format!("unknown struct '{}'", name), location);
                        for (_, value) in fields.iter_mut() {
                            self.analyze_expr(value);
                        }
                        Type::Unknown
                    }
                    Some(info) => {
                        let mut seen: Vec<String> = Vec::new();
                        for (field_name, value) in fields.iter_mut() {
                            let value_ty = self.analyze_expr(value);
                            if seen.contains(field_name) {
                                self.error(
                                    format!(
                                        "duplicate field '{}' in struct literal",
                                        field_name
                                    ),
                                    value.location,
                                );
                            } else {
                                seen.push(field_name.clone());
                            }
                            match info.field_type(field_name) {
                                None => {
                                    self.error(
                                        format!(
                                            "no field '{}' on struct '{}'",
                                            field_name, name
                                        ),
                                        value.location,
                                    );
                                }
                                Some(expected) => {
                                    if value_ty != Type::Unknown
                                        && !value_ty.compatible_with(expected)
                                    {
                                        self.error(
                                            format!(
                                                "type mismatch in field '{}': expected '{}', found '{}'",
                                                field_name, expected, value_ty
                                            ),
                                            value.location,
                                        );
                                    }
                                }
                            }
                        }
                        Type::Struct(name)
                    }
                }
            }
        };
        expr.ty = Some(ty.clone());
        ty
    }

    /// Resolve a name to its value type. `check_init` reports reads of
    /// uninitialized bindings; assignment targets pass false.
    fn resolve_identifier(&mut self, name: &str, location: Location, check_init: bool) -> Type {
        match self.symbols.lookup(name).cloned() {
            Some(Symbol::Variable {
                ty, initialized, ..
            }) => {
                if check_init && !initialized {
                    self.error(
                        format!("use of uninitialized variable '{}'", name),
                        location,
                    );
                }
                ty
            }
            Some(Symbol::Parameter { ty, .. }) => ty,
            Some(Symbol::Function { .. }) => {
                self.error(
                    format!("'{}' is a function and cannot be used as a value", name),
                    location,
                );
                Type::Unknown
            }
            Some(_) => {
                self.error(format!("'{}' is not a value", name), location);
                Type::Unknown
            }
            None => {
                if name == "self" {
                    // Synthetic receiver inside an impl method.
                    if let Some(target) = self.symbols.enclosing_struct_name() {
                        return Type::Struct(target.to_string());
                    }
                }
                self.error(format!("undefined variable '{}'", name), location);
                Type::Unknown
            }
        }
    }

    fn binary_result(
        &mut self,
        op: crate::ast::BinaryOp,
        lhs_ty: Type,
        rhs_ty: Type,
        location: Location,
    ) -> Type {
        if lhs_ty == Type::Unknown || rhs_ty == Type::Unknown {
            return Type::Unknown;
        }
        if op.is_arithmetic() {
            if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
                self.error(
                    format!(
                        "operator '{}' requires numeric operands, found '{}' and '{}'",
                        op, lhs_ty, rhs_ty
                    ),
                    location,
                );
                return Type::Unknown;
            }
            // Promotion: f64 beats f32 beats everything integral.
            if lhs_ty == Type::F64 || rhs_ty == Type::F64 {
                Type::F64
            } else if lhs_ty == Type::F32 || rhs_ty == Type::F32 {
                Type::F32
            } else {
                Type::I32
            }
        } else if op.is_comparison() {
            if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
                self.error(
                    format!(
                        "operator '{}' requires numeric operands, found '{}' and '{}'",
                        op, lhs_ty, rhs_ty
                    ),
                    location,
                );
            }
            Type::Bool
        } else if op.is_equality() {
            if lhs_ty != rhs_ty {
                self.error(
                    format!("cannot compare '{}' with '{}'", lhs_ty, rhs_ty),
                    location,
                );
            }
            Type::Bool
        } else if op.is_logical() {
            if lhs_ty != Type::Bool || rhs_ty != Type::Bool {
                self.error(
                    format!(
                        "operator '{}' requires bool operands, found '{}' and '{}'",
                        op, lhs_ty, rhs_ty
                    ),
                    location,
                );
            }
            Type::Bool
        } else {
            // Bitwise and shifts: integral operands, result is the left
            // operand's type.
            if !lhs_ty.is_integral() || !rhs_ty.is_integral() {
                self.error(
                    format!(
                        "operator '{}' requires integral operands, found '{}' and '{}'",
                        op, lhs_ty, rhs_ty
                    ),
                    location,
                );
                return Type::Unknown;
            }
            lhs_ty
        }
    }

    fn field_type(&mut self, object_ty: &Type, field: &str, location: Location) -> Type {
        if *object_ty == Type::Unknown {
            return Type::Unknown;
        }
        let Some(struct_name) = object_ty.struct_name().map(str::to_string) else {
            self.error(
                format!(
                    "cannot access field '{}' on value of type '{}'",
                    field, object_ty
                ),
                location,
            );
            return Type::Unknown;
        };
        let field_ty = self
            .symbols
            .struct_info(&struct_name)
            .map(|info| info.field_type(field).cloned());
        match field_ty {
            None => {
                self.error(format!("unknown struct '{}'", struct_name), location);
                Type::Unknown
            }
            Some(None) => {
                self.error(
                    format!("no field '{}' on struct '{}'", field, struct_name),
                    location,
                );
                Type::Unknown
            }
            Some(Some(ty)) => ty,
        }
    }

    fn analyze_call(
        &mut self,
        callee: &mut Expr,
        args: &mut [Expr],
        location: Location,
    ) -> Type {
        match &mut callee.kind {
            ExprKind::Identifier(name) => {
                let name = name.clone();
                if let Some(builtin) = Builtin::lookup(&name) {
                    return self.analyze_builtin_call(builtin, args, location);
                }
                let symbol = self.symbols.lookup(&name).cloned();
                match symbol {
                    Some(Symbol::Function {
                        return_type,
                        params,
                    }) => {
                        self.check_arguments(&name, &params, args, location);
                        return_type
                    }
                    Some(_) => {
                        self.error(format!("'{}' is not a function", name), location);
                        for arg in args.iter_mut() {
                            self.analyze_expr(arg);
                        }
                        Type::Unknown
                    }
                    None => {
                        self.error(format!("undefined function '{}'", name), location);
                        for arg in args.iter_mut() {
                            self.analyze_expr(arg);
                        }
                        Type::Unknown
                    }
                }
            }
            ExprKind::Field { object, field } => {
                // Method call: the receiver becomes the first argument of
                // the mangled free function.
                let field = field.clone();
                let object_ty = self.analyze_expr(object);
                if object_ty == Type::Unknown {
                    for arg in args.iter_mut() {
                        self.analyze_expr(arg);
                    }
                    return Type::Unknown;
                }
                let Some(struct_name) = object_ty.struct_name().map(str::to_string) else {
                    self.error(
                        format!(
                            "cannot call method '{}' on value of type '{}'",
                            field, object_ty
                        ),
                        location,
                    );
                    for arg in args.iter_mut() {
                        self.analyze_expr(arg);
                    }
                    return Type::Unknown;
                };
                let mangled = format!("{}::{}", struct_name, field);
                let symbol = self.symbols.lookup(&mangled).cloned();
                let Some(Symbol::Function {
                    return_type,
                    params,
                }) = symbol
                else {
                    self.error(
                        format!("no method '{}' on struct '{}'", field, struct_name),
                        location,
                    );
                    for arg in args.iter_mut() {
                        self.analyze_expr(arg);
                    }
                    return Type::Unknown;
                };
                if params.is_empty() {
                    self.error(
                        format!("method '{}' takes no receiver", mangled),
                        location,
                    );
                    return return_type;
                }
                // Receiver compatibility, through one auto-deref layer on
                // either side.
                let receiver = &params[0];
                if !object_ty
                    .auto_deref()
                    .compatible_with(receiver.ty.auto_deref())
                {
                    self.error(
                        format!(
                            "method '{}' expects receiver '{}', found '{}'",
                            mangled, receiver.ty, object_ty
                        ),
                        location,
                    );
                }
                // The declared argument count excludes the receiver.
                let expected = params.len() - 1;
                if args.len() != expected {
                    self.error(
                        format!(
                            "method '{}' expects {} argument{}, got {}",
                            mangled,
                            expected,
                            if expected == 1 { "" } else { "s" },
                            args.len()
                        ),
                        location,
                    );
                }
                for (arg, param) in args.iter_mut().zip(params.iter().skip(1)) {
                    let arg_ty = self.analyze_expr(arg);
                    if arg_ty != Type::Unknown && !arg_ty.compatible_with(&param.ty) {
                        self.error(
                            format!(
                                "argument '{}' of '{}' expects '{}', found '{}'",
                                param.name, mangled, param.ty, arg_ty
                            ),
                            arg.location,
                        );
                    }
                }
                // Decorate any arguments beyond the declared count.
                for arg in args.iter_mut().skip(expected) {
                    self.analyze_expr(arg);
                }
                return_type
            }
            _ => {
                self.error("expression is not callable".to_string(), location);
                self.analyze_expr(callee);
                for arg in args.iter_mut() {
                    self.analyze_expr(arg);
                }
                Type::Unknown
            }
        }
    }

    fn analyze_builtin_call(
        &mut self,
        builtin: Builtin,
        args: &mut [Expr],
        location: Location,
    ) -> Type {
        match builtin {
            Builtin::Println | Builtin::Print => {
                // Variadic sink; every argument must have a printable
                // type so codegen can pick a format specifier.
                for arg in args.iter_mut() {
                    let ty = self.analyze_expr(arg);
                    let printable = matches!(
                        ty,
                        Type::Str | Type::Bool | Type::Char | Type::Unknown
                    ) || ty.is_numeric();
                    if !printable {
                        self.error(
                            format!("cannot print value of type '{}'", ty),
                            arg.location,
                        );
                    }
                }
                Type::Void
            }
            Builtin::Sqrt => {
                if args.len() != 1 {
                    self.error(
                        format!("'sqrt' expects 1 argument, got {}", args.len()),
                        location,
                    );
                }
                for arg in args.iter_mut() {
                    let ty = self.analyze_expr(arg);
                    if ty != Type::Unknown && !ty.is_numeric() {
                        self.error(
                            format!("'sqrt' expects a numeric argument, found '{}'", ty),
                            arg.location,
                        );
                    }
                }
                builtin.result_type()
            }
        }
    }

    fn check_arguments(
        &mut self,
        name: &str,
        params: &[ParamInfo],
        args: &mut [Expr],
        location: Location,
    ) {
        if args.len() != params.len() {
            self.error(
                format!(
                    "function '{}' expects {} argument{}, got {}",
                    name,
                    params.len(),
                    if params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
                location,
            );
        }
        for (arg, param) in args.iter_mut().zip(params.iter()) {
            let arg_ty = self.analyze_expr(arg);
            if arg_ty != Type::Unknown && !arg_ty.compatible_with(&param.ty) {
                self.error(
                    format!(
                        "argument '{}' of '{}' expects '{}', found '{}'",
                        param.name, name, param.ty, arg_ty
                    ),
                    arg.location,
                );
            }
        }
        // Extra arguments still get analyzed for decoration.
        for arg in args.iter_mut().skip(params.len()) {
            self.analyze_expr(arg);
        }
    }

    // ---- assignment targets ---------------------------------------------

    /// Enforce invariant: assignment targets are identifiers of mutable
    /// bindings, index expressions on mutable storage, dereferences of
    /// mutable references or raw pointers, or field accesses through
    /// mutable paths.
    fn check_assignable(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Identifier(name) => self.check_mutable_binding(name, target.location),
            ExprKind::Index { array, .. } => self.check_mutable_path(array),
            ExprKind::Field { object, .. } => self.check_mutable_path(object),
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
                ..
            } => self.check_deref_mutability(operand),
            _ => {
                self.error("invalid assignment target".to_string(), target.location);
            }
        }
    }

    fn check_mutable_binding(&mut self, name: &str, location: Location) {
        match self.symbols.lookup(name).cloned() {
            Some(Symbol::Variable { mutable, .. }) => {
                if !mutable {
                    self.error(
                        format!("cannot assign to immutable variable '{}'", name),
                        location,
                    );
                } else if let Some(Symbol::Variable { initialized, .. }) =
                    self.symbols.lookup_mut(name)
                {
                    *initialized = true;
                }
            }
            Some(Symbol::Parameter { mutable, .. }) => {
                if !mutable {
                    self.error(
                        format!("cannot assign to immutable parameter '{}'", name),
                        location,
                    );
                }
            }
            Some(_) => {
                self.error(format!("cannot assign to '{}'", name), location);
            }
            // Undefined names were already reported during resolution.
            None => {}
        }
    }

    /// Mutability of the storage a field/index path runs through. A
    /// reference or pointer layer carries its own mutability; otherwise
    /// the path bottoms out at a binding.
    fn check_mutable_path(&mut self, expr: &Expr) {
        if let Some(ty) = &expr.ty {
            match ty {
                Type::Pointer(_) | Type::Reference(_, true) => return,
                Type::Reference(_, false) => {
                    self.error(
                        "cannot assign through immutable reference".to_string(),
                        expr.location,
                    );
                    return;
                }
                _ => {}
            }
        }
        match &expr.kind {
            ExprKind::Identifier(name) => self.check_mutable_binding(name, expr.location),
            ExprKind::Index { array, .. } => self.check_mutable_path(array),
            ExprKind::Field { object, .. } => self.check_mutable_path(object),
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
                ..
            } => self.check_deref_mutability(operand),
            _ => {
                self.error(
                    "cannot assign into a temporary value".to_string(),
                    expr.location,
                );
            }
        }
    }

    fn check_deref_mutability(&mut self, operand: &Expr) {
        match operand.ty.as_ref() {
            // Raw pointers are writable C-interop storage.
            Some(Type::Pointer(_)) | Some(Type::Reference(_, true)) | None => {}
            Some(Type::Reference(_, false)) => {
                self.error(
                    "cannot assign through immutable reference".to_string(),
                    operand.location,
                );
            }
            Some(Type::Unknown) => {}
            Some(_) => {
                // Non-pointer deref already produced a diagnostic during
                // expression analysis.
            }
        }
    }
}

/// Build a function symbol from a parameter list and return type.
fn function_symbol(params: &[Param], return_type: &Type) -> Symbol {
    Symbol::Function {
        return_type: return_type.clone(),
        params: params
            .iter()
            .map(|p| ParamInfo {
                name: p.name.clone(),
                ty: p.ty.clone(),
                mutable: p.mutable,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn analyze_source(source: &str) -> (Program, AnalysisStats, Vec<Diagnostic>) {
        let (mut program, parse_diags) = Parser::new(tokenize(source), "test.em").parse();
        assert!(parse_diags.is_empty(), "parse errors: {parse_diags:?}");
        let (stats, diagnostics) = Analyzer::new("test.em").analyze(&mut program);
        (program, stats, diagnostics)
    }

    fn analyze_clean(source: &str) -> (Program, AnalysisStats) {
        let (program, stats, diagnostics) = analyze_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        (program, stats)
    }

    fn first_error(source: &str) -> String {
        let (_, _, diagnostics) = analyze_source(source);
        assert!(!diagnostics.is_empty(), "expected a diagnostic");
        diagnostics[0].message.clone()
    }

    #[test]
    fn test_hello_world_is_clean() {
        analyze_clean(r#"fn main() -> i32 { println("Hello, World!"); return 0; }"#);
    }

    #[test]
    fn test_recursion_and_forward_reference() {
        // fib calls itself; main calls fib defined after it in the file.
        analyze_clean(
            "fn main() -> i32 { println(fib(10)); return 0; }\n\
             fn fib(n: i32) -> i32 { if (n <= 1) { return n; } return fib(n-1) + fib(n-2); }",
        );
    }

    #[test]
    fn test_struct_impl_method() {
        let (_, stats) = analyze_clean(
            "struct P { x: i32, y: i32 }\n\
             impl P { fn sum(self: P) -> i32 { return self.x + self.y; } }\n\
             fn main() -> i32 { let p: P = P { x: 3, y: 4 }; println(p.sum()); return 0; }",
        );
        assert_eq!(stats.structs_analyzed, 1);
        assert_eq!(stats.functions_analyzed, 2);
        assert_eq!(stats.variables_analyzed, 1);
    }

    #[test]
    fn test_decoration_is_total() {
        let (program, _) = analyze_clean(
            "fn main() -> i32 { let mut s: i32 = 0; for i in 0..3 { s = s + i; } return s; }",
        );
        // Spot-check decoration on the loop body's assignment.
        let Item::Function(f) = &program.items[0] else { panic!() };
        let StmtKind::For { start, end, body, .. } = &f.body.statements[1].kind else {
            panic!("expected for");
        };
        assert_eq!(start.ty, Some(Type::I32));
        assert_eq!(end.ty, Some(Type::I32));
        let StmtKind::Expr(assign) = &body.statements[0].kind else { panic!() };
        assert_eq!(assign.ty, Some(Type::I32));
    }

    #[test]
    fn test_let_type_mismatch() {
        let message = first_error("fn main() -> i32 { let x: i32 = \"hi\"; return 0; }");
        assert!(message.contains("type mismatch"), "{message}");
    }

    #[test]
    fn test_undefined_variable_assignment() {
        let message = first_error("fn main() -> i32 { x = 1; return 0; }");
        assert!(message.contains("undefined variable 'x'"), "{message}");
    }

    #[test]
    fn test_immutable_assignment() {
        let message = first_error("fn main() -> i32 { let x: i32 = 1; x = 2; return 0; }");
        assert!(message.contains("immutable variable 'x'"), "{message}");
    }

    #[test]
    fn test_break_outside_loop() {
        let message = first_error("fn main() -> i32 { break; }");
        assert!(message.contains("'break' outside of a loop"), "{message}");
    }

    #[test]
    fn test_continue_inside_nested_block_in_loop_is_legal() {
        analyze_clean(
            "fn f() { loop { if (true) { continue; } break; } }",
        );
    }

    #[test]
    fn test_integer_literal_widens_to_annotation() {
        // i64 annotation accepts an i32-typed literal: both integral.
        analyze_clean("fn f() { let big: i64 = 1; let small: u8 = 2; }");
    }

    #[test]
    fn test_float_int_do_not_mix() {
        let message = first_error("fn f() { let x: f64 = 1; }");
        assert!(message.contains("type mismatch"), "{message}");
    }

    #[test]
    fn test_cast_is_always_permitted() {
        analyze_clean("fn f() { let d: f64 = 3.9; let i: i32 = d as i32; }");
    }

    #[test]
    fn test_arithmetic_promotion() {
        let (program, _) = analyze_clean("fn f(a: i32, b: f64) { let c: f64 = a + b; }");
        let Item::Function(f) = &program.items[0] else { panic!() };
        let StmtKind::Let { init: Some(init), .. } = &f.body.statements[0].kind else {
            panic!()
        };
        assert_eq!(init.ty, Some(Type::F64));
    }

    #[test]
    fn test_bitwise_result_is_left_type() {
        let (program, _) = analyze_clean("fn f(a: u8, b: i32) { let c: u8 = a << b; }");
        let Item::Function(f) = &program.items[0] else { panic!() };
        let StmtKind::Let { init: Some(init), .. } = &f.body.statements[0].kind else {
            panic!()
        };
        assert_eq!(init.ty, Some(Type::U8));
    }

    #[test]
    fn test_sqrt_returns_f32() {
        analyze_clean("fn f() { let r: f32 = sqrt(2.0); }");
        let message = first_error("fn f() { let r: i32 = sqrt(2.0); }");
        assert!(message.contains("type mismatch"), "{message}");
    }

    #[test]
    fn test_condition_must_be_bool() {
        let message = first_error("fn f() { if (1) { } }");
        assert!(message.contains("must be bool"), "{message}");
        let message = first_error("fn f() { while (1) { } }");
        assert!(message.contains("must be bool"), "{message}");
    }

    #[test]
    fn test_duplicate_struct() {
        let message = first_error("struct S { a: i32 } struct S { b: i32 }");
        assert!(message.contains("duplicate definition of struct 'S'"), "{message}");
    }

    #[test]
    fn test_duplicate_function() {
        let message = first_error("fn f() { } fn f() { }");
        assert!(message.contains("duplicate definition of function 'f'"), "{message}");
    }

    #[test]
    fn test_duplicate_struct_field() {
        let message = first_error("struct S { a: i32, a: i32 }");
        assert!(message.contains("duplicate field 'a'"), "{message}");
    }

    #[test]
    fn test_unknown_field() {
        let message = first_error(
            "struct P { x: i32 } fn f() { let p: P = P { x: 1 }; let y: i32 = p.z; }",
        );
        assert!(message.contains("no field 'z'"), "{message}");
    }

    #[test]
    fn test_argument_count_mismatch() {
        let message = first_error("fn g(a: i32) { } fn f() { g(1, 2); }");
        assert!(message.contains("expects 1 argument, got 2"), "{message}");
    }

    #[test]
    fn test_argument_type_mismatch() {
        let message = first_error("fn g(a: bool) { } fn f() { g(1); }");
        assert!(message.contains("expects 'bool'"), "{message}");
    }

    #[test]
    fn test_use_before_initialization() {
        let message = first_error("fn f() { let x: i32; let y: i32 = x; }");
        assert!(message.contains("uninitialized variable 'x'"), "{message}");
    }

    #[test]
    fn test_first_assignment_initializes_mutable() {
        analyze_clean("fn f() { let mut x: i32; x = 1; let y: i32 = x; }");
    }

    #[test]
    fn test_return_type_checking() {
        let message = first_error("fn f() -> i32 { return true; }");
        assert!(message.contains("return type mismatch"), "{message}");
        let message = first_error("fn f() -> i32 { return; }");
        assert!(message.contains("missing return value"), "{message}");
        // void functions may return bare
        analyze_clean("fn f() { return; }");
    }

    #[test]
    fn test_equality_requires_equal_types() {
        let message = first_error("fn f() { let b: bool = 1 == 1.0; }");
        assert!(message.contains("cannot compare"), "{message}");
    }

    #[test]
    fn test_logical_requires_bool() {
        let message = first_error("fn f() { let b: bool = 1 && true; }");
        assert!(message.contains("requires bool operands"), "{message}");
    }

    #[test]
    fn test_reference_field_auto_deref() {
        analyze_clean(
            "struct P { x: i32 }\n\
             fn get(p: &P) -> i32 { return p.x; }",
        );
    }

    #[test]
    fn test_assign_through_reference_mutability() {
        analyze_clean(
            "struct P { x: i32 }\n\
             fn set(p: &mut P) { p.x = 1; }",
        );
        let message = first_error(
            "struct P { x: i32 }\n\
             fn set(p: &P) { p.x = 1; }",
        );
        assert!(message.contains("immutable reference"), "{message}");
    }

    #[test]
    fn test_deref_assignment() {
        analyze_clean("fn f(p: &mut i32) { *p = 3; }");
        let message = first_error("fn f(p: &i32) { *p = 3; }");
        assert!(message.contains("immutable reference"), "{message}");
    }

    #[test]
    fn test_index_rules() {
        analyze_clean(
            "fn f() { let mut a: [i32; 3] = [1, 2, 3]; a[0] = 5; let x: i32 = a[1]; }",
        );
        let message = first_error("fn f(a: [i32; 3]) { let x: i32 = a[1.5]; }");
        assert!(message.contains("index must be integral"), "{message}");
        let message = first_error("fn f() { let a: [i32; 3] = [1, 2, 3]; a[0] = 5; }");
        assert!(message.contains("immutable"), "{message}");
    }

    #[test]
    fn test_self_requires_matching_type() {
        let message = first_error(
            "struct P { x: i32 } struct Q { y: i32 }\n\
             impl P { fn get(self: Q) -> i32 { return 0; } }",
        );
        assert!(message.contains("'self' parameter"), "{message}");
    }

    #[test]
    fn test_method_argument_count_excludes_receiver() {
        let message = first_error(
            "struct P { x: i32 }\n\
             impl P { fn add(self: P, d: i32) -> i32 { return self.x + d; } }\n\
             fn f(p: P) { p.add(); }",
        );
        assert!(message.contains("expects 1 argument, got 0"), "{message}");
    }

    #[test]
    fn test_method_on_reference_receiver() {
        analyze_clean(
            "struct P { x: i32 }\n\
             impl P { fn get(self: P) -> i32 { return self.x; } }\n\
             fn f(p: &P) -> i32 { return p.get(); }",
        );
    }

    #[test]
    fn test_unannotated_let_is_error() {
        let message = first_error("fn f() { let x = 1; }");
        assert!(message.contains("requires a type annotation"), "{message}");
    }

    #[test]
    fn test_analysis_continues_past_errors() {
        let (_, _, diagnostics) = analyze_source(
            "fn f() { let a: i32 = true; let b: bool = 1; }",
        );
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_stats_counters() {
        let (_, stats) = analyze_clean(
            "struct A { x: i32 }\n\
             struct B { y: i32 }\n\
             impl A { fn get(self: A) -> i32 { return self.x; } }\n\
             fn main() -> i32 { let a: i32 = 1; let b: i32 = 2; return a + b; }",
        );
        assert_eq!(stats.structs_analyzed, 2);
        assert_eq!(stats.functions_analyzed, 2);
        assert_eq!(stats.variables_analyzed, 2);
    }

    #[test]
    fn test_unknown_type_annotation() {
        let message = first_error("fn f() { let x: Missing = 1; }");
        assert!(message.contains("unknown type 'Missing'"), "{message}");
    }

    #[test]
    fn test_top_level_let_and_use() {
        analyze_clean(
            "let limit: i32 = 10;\n\
             fn f() -> i32 { return limit; }",
        );
    }

    #[test]
    fn test_extern_function_callable() {
        analyze_clean(
            "extern fn c_random() -> i32;\n\
             fn f() -> i32 { return c_random(); }",
        );
    }
}
