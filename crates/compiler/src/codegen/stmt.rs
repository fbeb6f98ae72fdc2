//! Statement and block emission.

use super::types::{c_declaration, c_type};
use super::{CodeGen, CodeGenError};
use crate::ast::{Block, Stmt, StmtKind};
use crate::types::Type;

impl CodeGen {
    pub(super) fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match &stmt.kind {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.gen_expr(cond)?;
                self.line(&format!("if ({}) {{", cond))?;
                self.gen_block_body(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.line("} else {")?;
                    self.gen_block_body(else_branch)?;
                }
                self.line("}")?;
            }
            StmtKind::While { cond, body } => {
                let cond = self.gen_expr(cond)?;
                self.line(&format!("while ({}) {{", cond))?;
                self.gen_block_body(body)?;
                self.line("}")?;
            }
            StmtKind::For {
                var,
                var_type,
                start,
                end,
                body,
            } => {
                let ty = match var_type {
                    None | Some(Type::I32) => "int".to_string(),
                    Some(other) => c_type(other),
                };
                let start = self.gen_expr(start)?;
                let end = self.gen_expr(end)?;
                // The upper bound is exclusive.
                self.line(&format!(
                    "for ({} {} = {}; {} < {}; {}++) {{",
                    ty, var, start, var, end, var
                ))?;
                self.gen_block_body(body)?;
                self.line("}")?;
            }
            StmtKind::Loop { body } => {
                self.line("while (1) {")?;
                self.gen_block_body(body)?;
                self.line("}")?;
            }
            StmtKind::Return(value) => match value {
                Some(value) => {
                    let value = self.gen_expr(value)?;
                    self.line(&format!("return {};", value))?;
                }
                None => self.line("return;")?,
            },
            StmtKind::Break => self.line("break;")?,
            StmtKind::Continue => self.line("continue;")?,
            StmtKind::Let {
                name,
                ty,
                init,
                mutable,
            } => {
                // The annotation is mandatory at the language level; an
                // absent one only reaches codegen through analyzer bugs.
                let ty = ty
                    .clone()
                    .or_else(|| init.as_ref().and_then(|e| e.ty.clone()))
                    .unwrap_or(Type::Unknown);
                let mut text = String::new();
                if !mutable {
                    text.push_str("const ");
                }
                text.push_str(&c_declaration(&ty, name));
                if let Some(init) = init {
                    text.push_str(" = ");
                    text.push_str(&self.gen_expr(init)?);
                }
                text.push(';');
                self.line(&text)?;
            }
            StmtKind::Block(block) => {
                self.line("{")?;
                self.gen_block_body(block)?;
                self.line("}")?;
            }
            StmtKind::Expr(expr) => {
                let expr = self.gen_expr(expr)?;
                self.line(&format!("{};", expr))?;
            }
        }
        Ok(())
    }

    /// Emit a block's statements (and tail expression, as an expression
    /// statement) one indent level deeper.
    pub(super) fn gen_block_body(&mut self, block: &Block) -> Result<(), CodeGenError> {
        self.indent += 1;
        for stmt in &block.statements {
            self.gen_stmt(stmt)?;
        }
        if let Some(tail) = &block.tail {
            let tail = self.gen_expr(tail)?;
            self.line(&format!("{};", tail))?;
        }
        self.indent -= 1;
        Ok(())
    }
}
