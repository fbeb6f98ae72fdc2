//! Compiler diagnostics
//!
//! Each pipeline stage accumulates an ordered list of `Diagnostic` records.
//! The core only produces messages and 1-based positions; rendering (the
//! offending source line, caret underline, colour) belongs to the caller.
//! `render` is the reference renderer used by the CLI; it emits no ANSI
//! escapes unless asked to.

use crate::ast::Location;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub file: String,
    /// 1-based line of the token at fault.
    pub line: u32,
    /// 1-based column of the token at fault.
    pub column: u32,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Diagnostic {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    pub fn at(message: impl Into<String>, file: impl Into<String>, location: Location) -> Self {
        Diagnostic::new(message, file, location.line, location.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: error: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

fn paint(text: &str, code: &str, colour: bool) -> String {
    if colour {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Render one diagnostic against its source buffer: the header line, the
/// offending source line, and a caret under the reported column.
pub fn render(diagnostic: &Diagnostic, source: &str, colour: bool) -> String {
    let header = format!(
        "{}: {}",
        paint("error", "1;31", colour),
        diagnostic.message
    );
    let pointer = format!(
        " --> {}:{}:{}",
        diagnostic.file, diagnostic.line, diagnostic.column
    );

    let mut out = format!("{}\n{}", header, pointer);

    if let Some(line_text) = source.lines().nth(diagnostic.line as usize - 1) {
        let line_no = format!("{:4}", diagnostic.line);
        let pad = " ".repeat(diagnostic.column.saturating_sub(1) as usize);
        let caret = paint("^", "1;31", colour);
        out.push_str(&format!(
            "\n{} {} {}\n     {} {}{}",
            paint(&line_no, "1;34", colour),
            paint("|", "1;34", colour),
            line_text,
            paint("|", "1;34", colour),
            pad,
            caret
        ));
    }
    out
}

/// Render a full diagnostic list followed by the terminating summary line.
pub fn render_all(diagnostics: &[Diagnostic], source: &str, colour: bool) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&render(diagnostic, source, colour));
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "{}: aborting due to {} previous error{}",
        paint("error", "1;31", colour),
        diagnostics.len(),
        if diagnostics.len() == 1 { "" } else { "s" }
    ));
    out
}
