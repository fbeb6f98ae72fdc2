//! Program-level emission: prologue, structs, prototypes, functions.

use super::types::{c_declaration, c_type};
use super::{CodeGen, CodeGenError};
use crate::ast::{Function, Item, Program, StmtKind, StructDef};
use crate::types::Type;

/// The fixed prologue; everything the generated code calls into lives in
/// these five headers.
const STANDARD_INCLUDES: [&str; 5] = ["stdio.h", "stdlib.h", "stdint.h", "stdbool.h", "math.h"];

impl CodeGen {
    /// Lower the whole decorated program to C text.
    pub fn codegen_program(&mut self, program: &Program) -> Result<String, CodeGenError> {
        self.collect_method_receivers(program);
        self.emit_prologue(program)?;
        self.emit_structs(program)?;
        self.emit_globals(program)?;
        self.emit_prototypes(program)?;
        self.emit_methods(program)?;
        self.emit_functions(program)?;
        Ok(std::mem::take(&mut self.out))
    }

    /// Record each method's receiver shape so call sites can insert the
    /// `&`/`*` adjustment without a symbol table.
    fn collect_method_receivers(&mut self, program: &Program) {
        for item in &program.items {
            let Item::Impl(imp) = item else { continue };
            for method in &imp.functions {
                let is_ref = matches!(
                    method.params.first().map(|p| &p.ty),
                    Some(Type::Reference(..)) | Some(Type::Pointer(..))
                );
                self.method_receivers
                    .insert(format!("{}::{}", imp.struct_name, method.name), is_ref);
            }
        }
    }

    fn emit_prologue(&mut self, program: &Program) -> Result<(), CodeGenError> {
        for header in STANDARD_INCLUDES {
            self.line(&format!("#include <{}>", header))?;
        }
        for item in &program.items {
            let Item::Include(include) = item else { continue };
            if include.is_system {
                self.line(&format!("#include <{}>", include.path))?;
            } else {
                self.line(&format!("#include \"{}\"", include.path))?;
            }
        }
        self.blank_line();
        Ok(())
    }

    fn emit_structs(&mut self, program: &Program) -> Result<(), CodeGenError> {
        for item in &program.items {
            let Item::Struct(def) = item else { continue };
            // Extern structs are declared by the user's own headers.
            if def.is_extern {
                continue;
            }
            self.emit_struct(def)?;
        }
        Ok(())
    }

    fn emit_struct(&mut self, def: &StructDef) -> Result<(), CodeGenError> {
        self.line(&format!("typedef struct {} {{", def.name))?;
        self.indent += 1;
        for field in &def.fields {
            let decl = c_declaration(&field.ty, &field.name);
            self.line(&format!("{};", decl))?;
        }
        self.indent -= 1;
        self.line(&format!("}} {};", def.name))?;
        self.blank_line();
        Ok(())
    }

    /// Top-level `let` bindings become C globals. Other top-level
    /// statements have nothing to execute them in C and are dropped.
    fn emit_globals(&mut self, program: &Program) -> Result<(), CodeGenError> {
        let mut emitted = false;
        for item in &program.items {
            let Item::Statement(stmt) = item else { continue };
            if matches!(stmt.kind, StmtKind::Let { .. }) {
                self.gen_stmt(stmt)?;
                emitted = true;
            }
        }
        if emitted {
            self.blank_line();
        }
        Ok(())
    }

    /// Prototypes for every function so that declaration order in the
    /// source never matters to the C compiler.
    fn emit_prototypes(&mut self, program: &Program) -> Result<(), CodeGenError> {
        let mut emitted = false;
        for item in &program.items {
            match item {
                Item::Impl(imp) => {
                    for method in &imp.functions {
                        let name = format!("{}_{}", imp.struct_name, method.name);
                        self.line(&format!("{};", signature(method, &name)))?;
                        emitted = true;
                    }
                }
                Item::Function(function) if function.name != "main" => {
                    self.line(&format!("{};", signature(function, &function.name)))?;
                    emitted = true;
                }
                _ => {}
            }
        }
        if emitted {
            self.blank_line();
        }
        Ok(())
    }

    /// Impl methods come out as free functions, before ordinary functions.
    fn emit_methods(&mut self, program: &Program) -> Result<(), CodeGenError> {
        for item in &program.items {
            let Item::Impl(imp) = item else { continue };
            for method in &imp.functions {
                let name = format!("{}_{}", imp.struct_name, method.name);
                self.gen_function(method, &name)?;
            }
        }
        Ok(())
    }

    fn emit_functions(&mut self, program: &Program) -> Result<(), CodeGenError> {
        for item in &program.items {
            let Item::Function(function) = item else { continue };
            self.gen_function(function, &function.name)?;
        }
        Ok(())
    }

    fn gen_function(&mut self, function: &Function, name: &str) -> Result<(), CodeGenError> {
        self.line(&format!("{} {{", signature(function, name)))?;
        self.indent += 1;
        for stmt in &function.body.statements {
            self.gen_stmt(stmt)?;
        }
        // A trailing block expression is the function's value.
        if let Some(tail) = &function.body.tail {
            let tail = self.gen_expr(tail)?;
            if function.return_type == Type::Void {
                self.line(&format!("{};", tail))?;
            } else {
                self.line(&format!("return {};", tail))?;
            }
        }
        self.indent -= 1;
        self.line("}")?;
        self.blank_line();
        Ok(())
    }
}

/// `int32_t name(param, ...)` - parameter-level mutability is discarded;
/// reference mutability already lives in the lowered pointer type.
fn signature(function: &Function, name: &str) -> String {
    let params = if function.params.is_empty() {
        "void".to_string()
    } else {
        function
            .params
            .iter()
            .map(|p| c_declaration(&p.ty, &p.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{} {}({})", c_type(&function.return_type), name, params)
}
