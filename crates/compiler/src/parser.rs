//! Parser for Ember
//!
//! Top-down recursive descent with a conventional precedence climb for
//! expressions. The parser always returns a tree: on a parse error it
//! records one diagnostic, enters panic mode (suppressing further
//! diagnostics), and synchronizes - discarding tokens until it is past a
//! `;` or looking at a token that plausibly begins a fresh declaration.
//!
//! Every unbounded loop carries two guards: a hard iteration cap to catch
//! grammar bugs and a no-progress check that forces the cursor forward if
//! an iteration failed to consume a token. Malformed input therefore
//! always terminates.

use crate::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprKind, FieldDef, Function, FunctionSig, ImplBlock,
    IncludeDecl, Item, Literal, Location, Param, Program, Stmt, StmtKind, StructDef, UnaryOp,
};
use crate::diagnostics::Diagnostic;
use crate::token::{LiteralValue, Token, TokenKind};
use crate::types::Type;

/// Errors are recorded in the parser's diagnostic list; the `Err` side
/// only signals "abort this construct and synchronize".
type ParseResult<T> = Result<T, ()>;

struct LoopGuard {
    iterations: usize,
    last_pos: usize,
}

impl LoopGuard {
    fn new() -> Self {
        LoopGuard {
            iterations: 0,
            last_pos: usize::MAX,
        }
    }
}

pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    file: String,
    diagnostics: Vec<Diagnostic>,
    panic_mode: bool,
}

impl<'src> Parser<'src> {
    /// Hard cap on iterations of any single parsing loop. Real programs
    /// stay far below this; hitting it means a grammar bug.
    const LOOP_LIMIT: usize = 1_000_000;

    pub fn new(tokens: Vec<Token<'src>>, file: impl Into<String>) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.into(),
            diagnostics: Vec::new(),
            panic_mode: false,
        }
    }

    /// Parse the whole token stream into a `Program`. Always returns a
    /// tree; the diagnostic list says whether it is trustworthy.
    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        // A lexical error truncated the stream; report it and stop.
        if let Some(error) = self.tokens.iter().find(|t| t.kind == TokenKind::Error) {
            self.diagnostics.push(Diagnostic::new(
                error.lexeme,
                &self.file,
                error.line,
                error.column,
            ));
            return (Program::default(), self.diagnostics);
        }

        let mut items = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.is_at_end() {
            if !self.check_progress(&mut guard, "top-level declarations") {
                break;
            }
            match self.parse_declaration() {
                Ok(item) => items.push(item),
                Err(()) => self.synchronize(),
            }
        }
        (Program { items }, self.diagnostics)
    }

    // ---- cursor helpers -------------------------------------------------

    fn current(&self) -> &Token<'src> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn current_lexeme(&self) -> &'src str {
        self.current().lexeme
    }

    fn current_location(&self) -> Location {
        let t = self.current();
        Location::new(t.line, t.column)
    }

    fn previous(&self) -> &Token<'src> {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    /// Kind of the token `offset` places ahead of the cursor (0 = current).
    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> ParseResult<()> {
        if self.match_kind(kind) {
            Ok(())
        } else {
            self.error_at_current(message);
            Err(())
        }
    }

    fn expect_identifier(&mut self, message: &str) -> ParseResult<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current_lexeme().to_string();
            self.advance();
            Ok(name)
        } else {
            self.error_at_current(message);
            Err(())
        }
    }

    // ---- error handling -------------------------------------------------

    /// Record a diagnostic at the current token unless the parser is
    /// already panicking.
    fn error_at_current(&mut self, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let (line, column) = (self.current().line, self.current().column);
        self.diagnostics
            .push(Diagnostic::new(message, &self.file, line, column));
    }

    /// Discard tokens until past a `;` or at a declaration starter.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if self.current_kind().starts_declaration() {
                return;
            }
            self.advance();
        }
    }

    /// Statement-level synchronization inside a block: additionally stops
    /// before the closing `}` so the block parse can finish.
    fn synchronize_in_block(&mut self) {
        self.panic_mode = false;
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            let kind = self.current_kind();
            if kind.starts_declaration() || kind == TokenKind::RightBrace {
                return;
            }
            self.advance();
        }
    }

    /// Loop guard: enforce the iteration cap and force the cursor forward
    /// when an iteration consumed nothing. Returns false when the
    /// enclosing loop must abort.
    fn check_progress(&mut self, guard: &mut LoopGuard, context: &str) -> bool {
        guard.iterations += 1;
        if guard.iterations > Self::LOOP_LIMIT {
            self.error_at_current(&format!("too many iterations while parsing {}", context));
            return false;
        }
        if self.pos == guard.last_pos {
            self.error_at_current(&format!("no parse progress in {}", context));
            self.advance();
            if self.is_at_end() {
                return false;
            }
        }
        guard.last_pos = self.pos;
        true
    }

    // ---- declarations ---------------------------------------------------

    fn parse_declaration(&mut self) -> ParseResult<Item> {
        match self.current_kind() {
            TokenKind::Include => self.parse_include().map(Item::Include),
            TokenKind::Extern => self.parse_extern(),
            TokenKind::Fn => self.parse_function().map(Item::Function),
            TokenKind::Struct => self.parse_struct(false).map(Item::Struct),
            TokenKind::Impl => self.parse_impl().map(Item::Impl),
            _ => self.parse_statement().map(Item::Statement),
        }
    }

    /// `include "(" STRING ")" ";"`
    fn parse_include(&mut self) -> ParseResult<IncludeDecl> {
        let location = self.current_location();
        self.expect(TokenKind::Include, "expected 'include'")?;
        self.expect(TokenKind::LeftParen, "expected '(' after 'include'")?;
        if !self.check(TokenKind::StringLiteral) {
            self.error_at_current("expected header path string in include");
            return Err(());
        }
        let lexeme = self.current_lexeme();
        let path = lexeme[1..lexeme.len() - 1].to_string();
        self.advance();
        self.expect(TokenKind::RightParen, "expected ')' after include path")?;
        self.expect(TokenKind::Semicolon, "expected ';' after include")?;
        let is_system = !(path.starts_with('.') || path.starts_with('/'));
        Ok(IncludeDecl {
            path,
            is_system,
            location,
        })
    }

    /// `extern ( struct_decl | fn_sig ";" )`
    fn parse_extern(&mut self) -> ParseResult<Item> {
        self.expect(TokenKind::Extern, "expected 'extern'")?;
        match self.current_kind() {
            TokenKind::Struct => self.parse_struct(true).map(Item::Struct),
            TokenKind::Fn => {
                let sig = self.parse_fn_signature()?;
                self.expect(TokenKind::Semicolon, "expected ';' after extern function")?;
                Ok(Item::ExternFunction(sig))
            }
            _ => {
                self.error_at_current("expected 'struct' or 'fn' after 'extern'");
                Err(())
            }
        }
    }

    /// `fn IDENT "(" params? ")" ( "->" type )?` - shared by function
    /// definitions and extern declarations.
    fn parse_fn_signature(&mut self) -> ParseResult<FunctionSig> {
        let location = self.current_location();
        self.expect(TokenKind::Fn, "expected 'fn'")?;
        let name = self.expect_identifier("expected function name after 'fn'")?;
        self.expect(TokenKind::LeftParen, "expected '(' after function name")?;
        let params = self.parse_params()?;
        let return_type = if self.match_kind(TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::Void
        };
        Ok(FunctionSig {
            name,
            params,
            return_type,
            location,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "parameter list") {
                break;
            }
            let location = self.current_location();
            let mutable = self.match_kind(TokenKind::Mut);
            let name = self.expect_identifier("expected parameter name")?;
            self.expect(TokenKind::Colon, "expected ':' after parameter name")?;
            let ty = self.parse_type()?;
            params.push(Param {
                name,
                ty,
                mutable,
                location,
            });
            if !self.check(TokenKind::RightParen) {
                self.expect(TokenKind::Comma, "expected ',' between parameters")?;
            }
        }
        self.expect(TokenKind::RightParen, "expected ')' after parameters")?;
        Ok(params)
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        let sig = self.parse_fn_signature()?;
        let body = self.parse_block()?;
        Ok(Function {
            name: sig.name,
            params: sig.params,
            return_type: sig.return_type,
            body,
            location: sig.location,
        })
    }

    /// `struct IDENT "{" ( IDENT ":" type ),* "}"`
    fn parse_struct(&mut self, is_extern: bool) -> ParseResult<StructDef> {
        let location = self.current_location();
        self.expect(TokenKind::Struct, "expected 'struct'")?;
        let name = self.expect_identifier("expected struct name after 'struct'")?;
        self.expect(TokenKind::LeftBrace, "expected '{' after struct name")?;

        let mut fields = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "struct fields") {
                break;
            }
            let field_location = self.current_location();
            let field_name = self.expect_identifier("expected field name")?;
            self.expect(TokenKind::Colon, "expected ':' after field name")?;
            let ty = self.parse_type()?;
            fields.push(FieldDef {
                name: field_name,
                ty,
                location: field_location,
            });
            if !self.check(TokenKind::RightBrace) {
                self.expect(TokenKind::Comma, "expected ',' between struct fields")?;
            }
        }
        self.expect(TokenKind::RightBrace, "expected '}' after struct fields")?;
        Ok(StructDef {
            name,
            fields,
            is_extern,
            location,
        })
    }

    /// `impl IDENT "{" fn* "}"`
    fn parse_impl(&mut self) -> ParseResult<ImplBlock> {
        let location = self.current_location();
        self.expect(TokenKind::Impl, "expected 'impl'")?;
        let struct_name = self.expect_identifier("expected struct name after 'impl'")?;
        self.expect(TokenKind::LeftBrace, "expected '{' after impl target")?;

        let mut functions = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "impl block") {
                break;
            }
            if self.check(TokenKind::Fn) {
                match self.parse_function() {
                    Ok(function) => functions.push(function),
                    Err(()) => self.synchronize_in_block(),
                }
            } else {
                self.error_at_current("expected 'fn' inside impl block");
                self.synchronize_in_block();
            }
        }
        self.expect(TokenKind::RightBrace, "expected '}' after impl block")?;
        Ok(ImplBlock {
            struct_name,
            functions,
            location,
        })
    }

    // ---- statements -----------------------------------------------------

    fn starts_statement(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Loop
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Let
                | TokenKind::LeftBrace
        )
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.current_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let location = self.current_location();
                self.advance();
                self.expect(TokenKind::Semicolon, "expected ';' after 'break'")?;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    location,
                })
            }
            TokenKind::Continue => {
                let location = self.current_location();
                self.advance();
                self.expect(TokenKind::Semicolon, "expected ';' after 'continue'")?;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    location,
                })
            }
            TokenKind::Let => self.parse_let(),
            TokenKind::LeftBrace => {
                let location = self.current_location();
                let block = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(block),
                    location,
                })
            }
            _ => {
                let location = self.current_location();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "expected ';' after expression")?;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    location,
                })
            }
        }
    }

    /// `if "(" expr ")" block ( else ( if ... | block ) )?`
    ///
    /// The parentheses are required by the grammar.
    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::If, "expected 'if'")?;
        self.expect(TokenKind::LeftParen, "expected '(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "expected ')' after if condition")?;
        let then_branch = self.parse_block()?;

        let else_branch = if self.match_kind(TokenKind::Else) {
            if self.check(TokenKind::If) {
                // `else if` desugars to an else block holding the nested if.
                let else_location = self.current_location();
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![nested],
                    tail: None,
                    location: else_location,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            location,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::While, "expected 'while'")?;
        self.expect(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "expected ')' after while condition")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::While { cond, body },
            location,
        })
    }

    /// `for IDENT ( ":" type )? in expr ".." expr block` - exclusive
    /// upper bound.
    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::For, "expected 'for'")?;
        let var = self.expect_identifier("expected loop variable after 'for'")?;
        let var_type = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::In, "expected 'in' after loop variable")?;
        let start = self.parse_expression()?;
        self.expect(TokenKind::DotDot, "expected '..' in for range")?;
        let end = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::For {
                var,
                var_type,
                start,
                end,
                body,
            },
            location,
        })
    }

    fn parse_loop(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::Loop, "expected 'loop'")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::Loop { body },
            location,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::Return, "expected 'return'")?;
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "expected ';' after return")?;
        Ok(Stmt {
            kind: StmtKind::Return(value),
            location,
        })
    }

    /// `let mut? IDENT ( ":" type )? ( "=" expr )? ";"`
    fn parse_let(&mut self) -> ParseResult<Stmt> {
        let location = self.current_location();
        self.expect(TokenKind::Let, "expected 'let'")?;
        let mutable = self.match_kind(TokenKind::Mut);
        let name = self.expect_identifier("expected binding name after 'let'")?;
        let ty = if self.match_kind(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.match_kind(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after let binding")?;
        Ok(Stmt {
            kind: StmtKind::Let {
                name,
                ty,
                init,
                mutable,
            },
            location,
        })
    }

    /// `"{" statement* expr? "}"` - a trailing expression without `;` is
    /// the block's value.
    fn parse_block(&mut self) -> ParseResult<Block> {
        let location = self.current_location();
        self.expect(TokenKind::LeftBrace, "expected '{'")?;

        let mut statements = Vec::new();
        let mut tail = None;
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "block") {
                break;
            }
            if self.starts_statement() {
                match self.parse_statement() {
                    Ok(stmt) => statements.push(stmt),
                    Err(()) => self.synchronize_in_block(),
                }
                continue;
            }
            let stmt_location = self.current_location();
            match self.parse_expression() {
                Ok(expr) => {
                    if self.match_kind(TokenKind::Semicolon) {
                        statements.push(Stmt {
                            kind: StmtKind::Expr(expr),
                            location: stmt_location,
                        });
                    } else if self.check(TokenKind::RightBrace) {
                        tail = Some(Box::new(expr));
                    } else {
                        self.error_at_current("expected ';' after expression");
                        self.synchronize_in_block();
                    }
                }
                Err(()) => self.synchronize_in_block(),
            }
        }
        self.expect(TokenKind::RightBrace, "expected '}' to close block")?;
        Ok(Block {
            statements,
            tail,
            location,
        })
    }

    // ---- types ----------------------------------------------------------

    /// `& mut? T | * T | "[" T ";" INT "]" | primitive | IDENT`
    fn parse_type(&mut self) -> ParseResult<Type> {
        match self.current_kind() {
            TokenKind::Amp => {
                self.advance();
                let mutable = self.match_kind(TokenKind::Mut);
                let referent = self.parse_type()?;
                Ok(Type::Reference(Box::new(referent), mutable))
            }
            TokenKind::Star => {
                self.advance();
                let pointee = self.parse_type()?;
                Ok(Type::Pointer(Box::new(pointee)))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let element = self.parse_type()?;
                self.expect(TokenKind::Semicolon, "expected ';' in array type")?;
                if !self.check(TokenKind::IntLiteral) {
                    self.error_at_current("expected array length");
                    return Err(());
                }
                let size = match self.current().value {
                    Some(LiteralValue::Int(n)) if n >= 0 => n as usize,
                    _ => {
                        self.error_at_current("array length must be a non-negative integer");
                        return Err(());
                    }
                };
                self.advance();
                self.expect(TokenKind::RightBracket, "expected ']' after array length")?;
                Ok(Type::Array(Box::new(element), size))
            }
            TokenKind::Identifier => {
                let name = self.current_lexeme().to_string();
                self.advance();
                Ok(Type::Struct(name))
            }
            kind if kind.is_type_keyword() => {
                self.advance();
                Ok(Type::from_keyword(kind).expect("type keyword"))
            }
            _ => {
                self.error_at_current("expected type");
                Err(())
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and binds loosest.
    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_logical_or()?;
        let op = match self.current_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            _ => return Ok(expr),
        };
        self.advance();
        let location = expr.location;
        let value = self.parse_assignment()?;
        Ok(Expr::new(
            ExprKind::Assignment {
                target: Box::new(expr),
                op,
                value: Box::new(value),
            },
            location,
        ))
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_logical_and()?;
        while self.match_kind(TokenKind::OrOr) {
            let rhs = self.parse_logical_and()?;
            expr = binary(BinaryOp::Or, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_bit_or()?;
        while self.match_kind(TokenKind::AndAnd) {
            let rhs = self.parse_bit_or()?;
            expr = binary(BinaryOp::And, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_bit_xor()?;
        while self.match_kind(TokenKind::Pipe) {
            let rhs = self.parse_bit_xor()?;
            expr = binary(BinaryOp::BitOr, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_bit_and()?;
        while self.match_kind(TokenKind::Caret) {
            let rhs = self.parse_bit_and()?;
            expr = binary(BinaryOp::BitXor, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.match_kind(TokenKind::Amp) {
            let rhs = self.parse_equality()?;
            expr = binary(BinaryOp::BitAnd, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_cast()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_cast()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    /// `expr as T` - binds tighter than comparison, looser than shift.
    fn parse_cast(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_shift()?;
        while self.match_kind(TokenKind::As) {
            let target = self.parse_type()?;
            let location = expr.location;
            expr = Expr::new(
                ExprKind::Cast {
                    expr: Box::new(expr),
                    target,
                },
                location,
            );
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let location = self.current_location();
        let (op, is_mut_ref) = match self.current_kind() {
            TokenKind::Minus => (UnaryOp::Neg, false),
            TokenKind::Bang => (UnaryOp::Not, false),
            TokenKind::Star => (UnaryOp::Deref, false),
            TokenKind::Amp => {
                self.advance();
                let is_mut = self.match_kind(TokenKind::Mut);
                let operand = self.parse_unary()?;
                return Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Ref,
                        operand: Box::new(operand),
                        is_mut_ref: is_mut,
                    },
                    location,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
                is_mut_ref,
            },
            location,
        ))
    }

    /// Postfix chain: calls, indexing, field access, `::` paths.
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        let mut guard = LoopGuard::new();
        loop {
            if !self.check_progress(&mut guard, "postfix chain") {
                return Err(());
            }
            match self.current_kind() {
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        location,
                    );
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RightBracket, "expected ']' after index")?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Index {
                            array: Box::new(expr),
                            index: Box::new(index),
                        },
                        location,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_identifier("expected field name after '.'")?;
                    let location = expr.location;
                    expr = Expr::new(
                        ExprKind::Field {
                            object: Box::new(expr),
                            field,
                        },
                        location,
                    );
                }
                TokenKind::PathSep => {
                    self.advance();
                    let segment = self.expect_identifier("expected name after '::'")?;
                    // `A::b` is rewritten into a single identifier; the
                    // analyzer and codegen both key on the joined name.
                    match expr.kind {
                        ExprKind::Identifier(ref name) => {
                            let joined = format!("{}::{}", name, segment);
                            expr = Expr::new(ExprKind::Identifier(joined), expr.location);
                        }
                        _ => {
                            self.error_at_current("'::' may only follow a name");
                            return Err(());
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "argument list") {
                break;
            }
            args.push(self.parse_expression()?);
            if !self.check(TokenKind::RightParen) {
                self.expect(TokenKind::Comma, "expected ',' between arguments")?;
            }
        }
        self.expect(TokenKind::RightParen, "expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let location = self.current_location();
        match self.current_kind() {
            TokenKind::IntLiteral => {
                let value = match self.current().value {
                    Some(LiteralValue::Int(n)) => n,
                    _ => 0,
                };
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Int(value)), location))
            }
            TokenKind::FloatLiteral => {
                let value = match self.current().value {
                    Some(LiteralValue::Float(f)) => f,
                    _ => 0.0,
                };
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Float(value)), location))
            }
            TokenKind::True | TokenKind::False => {
                let value = self.current_kind() == TokenKind::True;
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(value)), location))
            }
            TokenKind::CharLiteral => {
                let value = match self.current().value {
                    Some(LiteralValue::Char(c)) => c,
                    _ => '\0',
                };
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Char(value)), location))
            }
            TokenKind::StringLiteral => {
                let lexeme = self.current_lexeme();
                let text = lexeme[1..lexeme.len() - 1].to_string();
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Str(text)), location))
            }
            TokenKind::Identifier => {
                let name = self.current_lexeme().to_string();
                self.advance();
                if self.check(TokenKind::LeftBrace) && self.looks_like_struct_literal() {
                    return self.parse_struct_literal(name, location);
                }
                Ok(Expr::new(ExprKind::Identifier(name), location))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.parse_array_literal(location),
            _ => {
                self.error_at_current("expected expression");
                Err(())
            }
        }
    }

    /// Bounded lookahead past an identifier's `{`: `}` or `IDENT :` means
    /// a struct literal; anything else leaves the brace for a block. No
    /// tokens are consumed on the non-literal path.
    fn looks_like_struct_literal(&self) -> bool {
        match self.peek_kind(1) {
            TokenKind::RightBrace => true,
            TokenKind::Identifier => self.peek_kind(2) == TokenKind::Colon,
            _ => false,
        }
    }

    fn parse_struct_literal(&mut self, name: String, location: Location) -> ParseResult<Expr> {
        self.expect(TokenKind::LeftBrace, "expected '{' in struct literal")?;
        let mut fields = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "struct literal") {
                break;
            }
            let field = self.expect_identifier("expected field name in struct literal")?;
            self.expect(TokenKind::Colon, "expected ':' after field name")?;
            let value = self.parse_expression()?;
            fields.push((field, value));
            if !self.check(TokenKind::RightBrace) {
                self.expect(TokenKind::Comma, "expected ',' between struct literal fields")?;
            }
        }
        self.expect(TokenKind::RightBrace, "expected '}' after struct literal")?;
        Ok(Expr::new(
            ExprKind::StructLiteral { name, fields },
            location,
        ))
    }

    fn parse_array_literal(&mut self, location: Location) -> ParseResult<Expr> {
        self.expect(TokenKind::LeftBracket, "expected '['")?;
        let mut elements = Vec::new();
        let mut guard = LoopGuard::new();
        while !self.check(TokenKind::RightBracket) && !self.is_at_end() {
            if !self.check_progress(&mut guard, "array literal") {
                break;
            }
            elements.push(self.parse_expression()?);
            if !self.check(TokenKind::RightBracket) {
                self.expect(TokenKind::Comma, "expected ',' between array elements")?;
            }
        }
        self.expect(TokenKind::RightBracket, "expected ']' after array literal")?;
        Ok(Expr::new(ExprKind::ArrayLiteral(elements), location))
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let location = lhs.location;
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> (Program, Vec<Diagnostic>) {
        Parser::new(tokenize(source), "test.em").parse()
    }

    fn parse_clean(source: &str) -> Program {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        program
    }

    #[test]
    fn test_parse_hello_world() {
        let program = parse_clean(r#"fn main() -> i32 { println("hi"); return 0; }"#);
        assert_eq!(program.items.len(), 1);
        let Item::Function(f) = &program.items[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name, "main");
        assert_eq!(f.return_type, Type::I32);
        assert_eq!(f.body.statements.len(), 2);
    }

    #[test]
    fn test_parse_struct_and_impl() {
        let program = parse_clean(
            "struct P { x: i32, y: i32 }\n\
             impl P { fn sum(self: P) -> i32 { return self.x + self.y; } }",
        );
        let Item::Struct(s) = &program.items[0] else {
            panic!("expected struct");
        };
        assert_eq!(s.name, "P");
        assert_eq!(s.fields.len(), 2);
        assert!(!s.is_extern);

        let Item::Impl(i) = &program.items[1] else {
            panic!("expected impl");
        };
        assert_eq!(i.struct_name, "P");
        assert_eq!(i.functions.len(), 1);
        assert_eq!(i.functions[0].params[0].name, "self");
    }

    #[test]
    fn test_precedence_mul_binds_tighter_than_add() {
        let program = parse_clean("fn f() -> i32 { return 1 + 2 * 3; }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        let StmtKind::Return(Some(expr)) = &f.body.statements[0].kind else {
            panic!("expected return");
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_cast_binds_between_comparison_and_shift() {
        // `a < b as i64` must parse as `a < (b as i64)`
        let program = parse_clean("fn f(a: i32, b: i32) -> bool { return a < b as i64; }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        let StmtKind::Return(Some(expr)) = &f.body.statements[0].kind else {
            panic!();
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!();
        };
        assert_eq!(*op, BinaryOp::Lt);
        assert!(matches!(rhs.kind, ExprKind::Cast { .. }));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse_clean("fn f() { a = b = c; }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        let StmtKind::Expr(expr) = &f.body.statements[0].kind else {
            panic!();
        };
        let ExprKind::Assignment { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assignment { .. }));
    }

    #[test]
    fn test_path_rewrites_to_single_identifier() {
        let program = parse_clean("fn f() { Vec2::new(1, 2); }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        let StmtKind::Expr(expr) = &f.body.statements[0].kind else {
            panic!();
        };
        let ExprKind::Call { callee, args } = &expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(
            &callee.kind,
            ExprKind::Identifier(name) if name == "Vec2::new"
        ));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_struct_literal_vs_block() {
        // Struct literal: identifier { ident : ... }
        let program = parse_clean("fn f() -> P { return P { x: 1, y: 2 }; }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        let StmtKind::Return(Some(expr)) = &f.body.statements[0].kind else {
            panic!();
        };
        assert!(matches!(expr.kind, ExprKind::StructLiteral { .. }));

        // Not a struct literal: `while (c) { f(); }` - the lookahead must
        // leave the brace alone.
        parse_clean("fn g(c: bool) { while (c) { h(); } }");
    }

    #[test]
    fn test_for_range_is_exclusive_shape() {
        let program = parse_clean("fn f() { for i in 0..3 { println(i); } }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        assert!(matches!(f.body.statements[0].kind, StmtKind::For { .. }));
    }

    #[test]
    fn test_if_requires_parentheses() {
        let (_, diagnostics) = parse_source("fn f(c: bool) { if c { g(); } }");
        assert!(!diagnostics.is_empty());
        assert!(diagnostics[0].message.contains("expected '(' after 'if'"));
    }

    #[test]
    fn test_reference_types() {
        let program = parse_clean("fn f(a: &i32, b: &mut f64, c: *u8, d: [i32; 4]) { }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        assert_eq!(f.params[0].ty, Type::Reference(Box::new(Type::I32), false));
        assert_eq!(f.params[1].ty, Type::Reference(Box::new(Type::F64), true));
        assert_eq!(f.params[2].ty, Type::Pointer(Box::new(Type::U8)));
        assert_eq!(f.params[3].ty, Type::Array(Box::new(Type::I32), 4));
    }

    #[test]
    fn test_extern_declarations() {
        let program = parse_clean(
            "extern fn strlen(s: str) -> i64;\n\
             extern struct FILE { }",
        );
        assert!(matches!(program.items[0], Item::ExternFunction(_)));
        let Item::Struct(s) = &program.items[1] else {
            panic!();
        };
        assert!(s.is_extern);
    }

    #[test]
    fn test_include_system_and_local() {
        let program = parse_clean("include(\"math.h\");\ninclude(\"./util.h\");");
        let Item::Include(sys) = &program.items[0] else {
            panic!();
        };
        assert!(sys.is_system);
        assert_eq!(sys.path, "math.h");
        let Item::Include(local) = &program.items[1] else {
            panic!();
        };
        assert!(!local.is_system);
    }

    #[test]
    fn test_error_recovery_collects_multiple_errors() {
        let (program, diagnostics) = parse_source(
            "fn f() { let = 1; }\n\
             fn g() { return 0; }\n\
             fn h() { let : ; }",
        );
        assert!(diagnostics.len() >= 2);
        // g still parsed despite its neighbours
        assert!(program.items.iter().any(
            |item| matches!(item, Item::Function(f) if f.name == "g" && !f.body.statements.is_empty())
        ));
    }

    #[test]
    fn test_panic_mode_suppresses_cascades() {
        // A single malformed let should not produce one diagnostic per
        // following token.
        let (_, diagnostics) = parse_source("fn f() { let 1 2 3 4 5 6; }");
        assert!(diagnostics.len() <= 2, "got {diagnostics:?}");
    }

    #[test]
    fn test_malformed_input_terminates() {
        // Inputs that once looped forever in naive parsers.
        for source in ["{", "fn", "fn f(", "struct S {", "impl T {", "fn f() { (", "[1,"] {
            let (_, diagnostics) = parse_source(source);
            assert!(!diagnostics.is_empty(), "source {source:?} must error");
        }
    }

    #[test]
    fn test_block_tail_expression() {
        let program = parse_clean("fn f() -> i32 { let x: i32 = 1; x }");
        let Item::Function(f) = &program.items[0] else {
            panic!();
        };
        assert_eq!(f.body.statements.len(), 1);
        assert!(f.body.tail.is_some());
    }

    #[test]
    fn test_lexical_error_becomes_diagnostic() {
        let (program, diagnostics) = parse_source("fn f() { \"unterminated }");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unterminated string"));
        assert!(program.items.is_empty());
    }

    #[test]
    fn test_top_level_let() {
        let program = parse_clean("let limit: i32 = 10;");
        assert!(matches!(
            program.items[0],
            Item::Statement(Stmt {
                kind: StmtKind::Let { .. },
                ..
            })
        ));
    }
}
