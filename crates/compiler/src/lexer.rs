//! Lexer for Ember source text
//!
//! Single pass over the UTF-8 source buffer. Produces a token vector that
//! always ends with exactly one `Eof` token. On the first invalid input the
//! lexer emits one `Error` token (whose lexeme is a static message), stops
//! scanning, and terminates the stream.
//!
//! Position tracking: lines and columns are 1-based and count bytes.
//! Advancing over a newline increments the line and resets the column.

use crate::token::{LiteralValue, Token, TokenKind};

/// Scan a source buffer into a token vector terminated by `Eof`.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let kind = token.kind;
        tokens.push(token);
        match kind {
            TokenKind::Eof => break,
            TokenKind::Error => {
                // Stop scanning after the first lexical error but keep the
                // stream well-formed for the parser.
                tokens.push(Token::new(TokenKind::Eof, "", lexer.line, lexer.column));
                break;
            }
            _ => {}
        }
    }
    tokens
}

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    /// Byte offset of the next unconsumed byte.
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.bytes.get(self.pos + 1).copied().unwrap_or(0)
    }

    /// Consume one byte. Only call when the byte is known to be ASCII;
    /// multi-byte characters go through `advance_char`.
    fn advance(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        b
    }

    /// Consume one full UTF-8 character, keeping `pos` on a char boundary.
    /// Used inside string and character literals where arbitrary text is
    /// legal. The column advances by the character's byte length.
    fn advance_char(&mut self) -> char {
        let ch = self.source[self.pos..].chars().next().unwrap_or('\0');
        let len = ch.len_utf8();
        self.pos += len;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += len as u32;
        }
        ch
    }

    /// Consume one byte if it matches `expected`.
    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments. Line comments run to the newline;
    /// block comments do not nest and must be terminated.
    fn skip_trivia(&mut self) -> Result<(), Token<'src>> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.advance_char();
                    }
                }
                b'/' if self.peek_next() == b'*' => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            return Err(Token::error("unterminated block comment", line, column));
                        }
                        if self.peek() == b'*' && self.peek_next() == b'/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Token<'src> {
        if let Err(error) = self.skip_trivia() {
            return error;
        }

        let start = self.pos;
        let (line, column) = (self.line, self.column);

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, "", line, column);
        }

        let b = self.peek();
        if b.is_ascii_alphabetic() || b == b'_' {
            return self.identifier(start, line, column);
        }
        if b.is_ascii_digit() {
            return self.number(start, line, column);
        }
        if b == b'"' {
            return self.string(start, line, column);
        }
        if b == b'\'' {
            return self.character(start, line, column);
        }

        self.advance();
        let kind = match b {
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'.' => {
                if self.match_byte(b'.') {
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            b':' => {
                if self.match_byte(b':') {
                    TokenKind::PathSep
                } else {
                    TokenKind::Colon
                }
            }
            b'-' => {
                if self.match_byte(b'>') {
                    TokenKind::Arrow
                } else if self.match_byte(b'=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            b'+' => {
                if self.match_byte(b'=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            b'*' => {
                if self.match_byte(b'=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            b'/' => {
                if self.match_byte(b'=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    TokenKind::LtEq
                } else if self.match_byte(b'<') {
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    TokenKind::GtEq
                } else if self.match_byte(b'>') {
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            _ => return Token::error("unexpected character", line, column),
        };
        Token::new(kind, &self.source[start..self.pos], line, column)
    }

    fn identifier(&mut self, start: usize, line: u32, column: u32) -> Token<'src> {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let lexeme = &self.source[start..self.pos];
        match TokenKind::keyword(lexeme) {
            Some(TokenKind::True) => Token::with_value(
                TokenKind::True,
                lexeme,
                line,
                column,
                LiteralValue::Bool(true),
            ),
            Some(TokenKind::False) => Token::with_value(
                TokenKind::False,
                lexeme,
                line,
                column,
                LiteralValue::Bool(false),
            ),
            Some(kind) => Token::new(kind, lexeme, line, column),
            None => Token::new(TokenKind::Identifier, lexeme, line, column),
        }
    }

    fn number(&mut self, start: usize, line: u32, column: u32) -> Token<'src> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;

        // A '.' only belongs to the number when a digit follows; `0..3`
        // leaves the int literal intact for the range operator.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if self.peek() == b'e' || self.peek() == b'E' {
            let after_sign = if self.peek_next() == b'+' || self.peek_next() == b'-' {
                self.bytes.get(self.pos + 2).copied().unwrap_or(0)
            } else {
                self.peek_next()
            };
            if after_sign.is_ascii_digit() {
                is_float = true;
                self.advance();
                if self.peek() == b'+' || self.peek() == b'-' {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
        }

        let lexeme = &self.source[start..self.pos];
        if is_float {
            let value: f64 = lexeme.parse().unwrap_or(0.0);
            Token::with_value(
                TokenKind::FloatLiteral,
                lexeme,
                line,
                column,
                LiteralValue::Float(value),
            )
        } else {
            match lexeme.parse::<i64>() {
                Ok(value) => Token::with_value(
                    TokenKind::IntLiteral,
                    lexeme,
                    line,
                    column,
                    LiteralValue::Int(value),
                ),
                Err(_) => Token::error("integer literal out of range", line, column),
            }
        }
    }

    /// Scan a string literal. Escape sequences are preserved raw in the
    /// lexeme; a backslash unconditionally consumes the following
    /// character. Interpretation is deferred to codegen, which writes the
    /// text back out through C's own string syntax.
    fn string(&mut self, start: usize, line: u32, column: u32) -> Token<'src> {
        self.advance(); // opening quote
        loop {
            if self.is_at_end() {
                return Token::error("unterminated string literal", line, column);
            }
            match self.peek() {
                b'"' => {
                    self.advance();
                    break;
                }
                b'\\' => {
                    self.advance();
                    if self.is_at_end() {
                        return Token::error("unterminated string literal", line, column);
                    }
                    self.advance_char();
                }
                _ => {
                    self.advance_char();
                }
            }
        }
        Token::new(
            TokenKind::StringLiteral,
            &self.source[start..self.pos],
            line,
            column,
        )
    }

    fn character(&mut self, start: usize, line: u32, column: u32) -> Token<'src> {
        self.advance(); // opening quote
        if self.is_at_end() || self.peek() == b'\'' {
            return Token::error("empty character literal", line, column);
        }

        let value = if self.peek() == b'\\' {
            self.advance();
            if self.is_at_end() {
                return Token::error("unterminated character literal", line, column);
            }
            match self.advance_char() {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                '0' => '\0',
                other => other,
            }
        } else {
            self.advance_char()
        };

        if self.peek() != b'\'' {
            return Token::error("unterminated character literal", line, column);
        }
        self.advance(); // closing quote

        Token::with_value(
            TokenKind::CharLiteral,
            &self.source[start..self.pos],
            line,
            column,
            LiteralValue::Char(value),
        )
    }
}
