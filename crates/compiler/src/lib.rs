//! Ember Compiler Library
//!
//! Compiles Ember source (`.em`) to portable C11 text and, through an
//! external `cc`-style toolchain, to native executables.
//!
//! The pipeline is four linear stages, each halting the run on error:
//! lexing ([`lexer`]), recursive-descent parsing ([`parser`]), semantic
//! analysis ([`analyzer`]) and C emission ([`codegen`]). Diagnostics
//! accumulate per stage in insertion order with 1-based source positions;
//! rendering is up to the caller ([`diagnostics::render_all`]).
//!
//! ```rust,ignore
//! use emberc::compile_to_c;
//!
//! let source = r#"fn main() -> i32 { println("hi"); return 0; }"#;
//! let (c_text, stats) = compile_to_c(source, "hello.em")?;
//! ```

pub mod analyzer;
pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod token;
pub mod types;

pub use analyzer::{AnalysisStats, Analyzer};
pub use codegen::{CodeGen, CodeGenError};
pub use config::{CompilerConfig, ProjectConfig};
pub use diagnostics::Diagnostic;
pub use lexer::tokenize;
pub use parser::Parser;
pub use types::Type;

use std::fs;
use std::path::Path;
use std::process::Command;

/// Failure modes of the file-level entry points. Source diagnostics and
/// toolchain failures are kept apart so the CLI can exit with distinct
/// codes.
#[derive(Debug)]
pub enum BuildError {
    /// The pipeline produced diagnostics; no output was written.
    Compile(Vec<Diagnostic>),
    /// Reading the source or writing an artifact failed.
    Io(String),
    /// The external C compiler could not be run or reported failure.
    Toolchain(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Compile(diagnostics) => {
                write!(f, "{} compile error(s)", diagnostics.len())
            }
            BuildError::Io(message) => write!(f, "{}", message),
            BuildError::Toolchain(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for BuildError {}

/// Run the pipeline on a source buffer and return the generated C text
/// with the analysis statistics. The filename only labels diagnostics.
pub fn compile_to_c(source: &str, filename: &str) -> Result<(String, AnalysisStats), Vec<Diagnostic>> {
    let tokens = lexer::tokenize(source);
    let (mut program, diagnostics) = Parser::new(tokens, filename).parse();
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    let (stats, diagnostics) = Analyzer::new(filename).analyze(&mut program);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    let c_text = CodeGen::generate(&program).map_err(|e| {
        vec![Diagnostic::new(
            format!("internal error: {}", e),
            filename,
            1,
            1,
        )]
    })?;
    Ok((c_text, stats))
}

/// Parse and analyze only; returns the statistics on success.
pub fn check_source(source: &str, filename: &str) -> Result<AnalysisStats, Vec<Diagnostic>> {
    let tokens = lexer::tokenize(source);
    let (mut program, diagnostics) = Parser::new(tokens, filename).parse();
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    let (stats, diagnostics) = Analyzer::new(filename).analyze(&mut program);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }
    Ok(stats)
}

/// Compile a source file to C text on disk.
pub fn emit_c_file(input: &Path, c_path: &Path) -> Result<AnalysisStats, BuildError> {
    let source = fs::read_to_string(input)
        .map_err(|e| BuildError::Io(format!("failed to read {}: {}", input.display(), e)))?;
    let (c_text, stats) =
        compile_to_c(&source, &input.display().to_string()).map_err(BuildError::Compile)?;
    fs::write(c_path, c_text)
        .map_err(|e| BuildError::Io(format!("failed to write {}: {}", c_path.display(), e)))?;
    Ok(stats)
}

/// Compile a source file to a native executable: generate `<output>.c`,
/// then run `cc -o <output> <output>.c -lm <user flags>`. The
/// intermediate C file is removed on success unless `keep_c` is set; on
/// toolchain failure it is left behind for inspection.
pub fn compile_file(input: &Path, output: &Path, config: &CompilerConfig) -> Result<(), BuildError> {
    let c_path = output.with_extension("c");
    emit_c_file(input, &c_path)?;

    let mut cc = Command::new(&config.cc);
    cc.arg("-o").arg(output).arg(&c_path).arg("-lm");
    for flag in &config.cflags {
        cc.arg(flag);
    }
    for lib in &config.libraries {
        cc.arg(format!("-l{}", lib));
    }

    let result = cc
        .output()
        .map_err(|e| BuildError::Toolchain(format!("failed to run {}: {}", config.cc, e)))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(BuildError::Toolchain(format!(
            "C compilation failed:\n{}",
            stderr
        )));
    }

    if !config.keep_c {
        fs::remove_file(&c_path).ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The end-to-end accept scenarios: each must produce C with no
    // diagnostics and the expected shape.

    #[test]
    fn test_scenario_hello() {
        let (c, _) =
            compile_to_c(r#"fn main() -> i32 { println("Hello, World!"); return 0; }"#, "t.em")
                .unwrap();
        assert!(c.contains("printf(\"%s\\n\", \"Hello, World!\");"));
    }

    #[test]
    fn test_scenario_recursion() {
        let source = "fn fib(n: i32) -> i32 { if (n <= 1) { return n; } return fib(n-1)+fib(n-2); }\n\
                      fn main() -> i32 { println(fib(10)); return 0; }";
        let (c, stats) = compile_to_c(source, "t.em").unwrap();
        assert!(c.contains("int32_t fib(int32_t n)"));
        assert!(c.contains("fib((n - 1))"));
        assert_eq!(stats.functions_analyzed, 2);
    }

    #[test]
    fn test_scenario_mutation_loop() {
        let source = "fn main() -> i32 { let mut i: i32 = 0; let mut s: i32 = 0; \
                      while (i < 5) { s = s + i; i = i + 1; } println(s); return 0; }";
        let (c, _) = compile_to_c(source, "t.em").unwrap();
        assert!(c.contains("int32_t i = 0;"));
        assert!(c.contains("while ((i < 5))"));
    }

    #[test]
    fn test_scenario_struct_method() {
        let source = "struct P { x: i32, y: i32 } \
                      impl P { fn sum(self: P) -> i32 { return self.x + self.y; } } \
                      fn main() -> i32 { let p: P = P { x: 3, y: 4 }; println(p.sum()); return 0; }";
        let (c, stats) = compile_to_c(source, "t.em").unwrap();
        assert!(c.contains("P_sum(p)"));
        assert_eq!(stats.structs_analyzed, 1);
    }

    #[test]
    fn test_scenario_for_range() {
        let (c, _) = compile_to_c(
            "fn main() -> i32 { for i in 0..3 { println(i); } return 0; }",
            "t.em",
        )
        .unwrap();
        assert!(c.contains("for (int i = 0; i < 3; i++)"));
    }

    #[test]
    fn test_scenario_cast() {
        let (c, _) = compile_to_c(
            "fn main() -> i32 { let f: f64 = 3.9; let i: i32 = f as i32; println(i); return 0; }",
            "t.em",
        )
        .unwrap();
        assert!(c.contains("((int32_t)(f))"));
    }

    // The error scenarios: at least one diagnostic, no C output.

    #[test]
    fn test_error_type_mismatch() {
        let err = compile_to_c(
            "fn main() -> i32 { let x: i32 = \"hi\"; return 0; }",
            "t.em",
        )
        .unwrap_err();
        assert!(!err.is_empty());
        assert!(err[0].message.contains("type mismatch"));
    }

    #[test]
    fn test_error_undefined_variable() {
        let err = compile_to_c("fn main() -> i32 { x = 1; return 0; }", "t.em").unwrap_err();
        assert!(err[0].message.contains("undefined variable"));
    }

    #[test]
    fn test_error_immutable_assignment() {
        let err = compile_to_c(
            "fn main() -> i32 { let x: i32 = 1; x = 2; return 0; }",
            "t.em",
        )
        .unwrap_err();
        assert!(err[0].message.contains("immutable"));
    }

    #[test]
    fn test_error_break_outside_loop() {
        let err = compile_to_c("fn main() -> i32 { break; }", "t.em").unwrap_err();
        assert!(err[0].message.contains("'break' outside of a loop"));
    }

    #[test]
    fn test_parse_errors_stop_before_analysis() {
        let err = compile_to_c("fn main( { }", "t.em").unwrap_err();
        assert!(!err.is_empty());
        // Positions are 1-based and point into the file.
        assert!(err[0].line >= 1 && err[0].column >= 1);
    }

    #[test]
    fn test_idempotent_output() {
        let source = "fn main() -> i32 { for i in 0..3 { println(i); } return 0; }";
        let (first, _) = compile_to_c(source, "t.em").unwrap();
        let (second, _) = compile_to_c(source, "t.em").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_diagnostics_preserve_order() {
        let err = compile_to_c(
            "fn f() { let a: i32 = true; let b: bool = 1; }",
            "t.em",
        )
        .unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err[0].line <= err[1].line);
    }

    #[test]
    fn test_emit_c_file_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hello.em");
        let c_path = dir.path().join("hello.c");
        fs::write(&input, "fn main() -> i32 { return 0; }").unwrap();

        let stats = emit_c_file(&input, &c_path).unwrap();
        assert_eq!(stats.functions_analyzed, 1);
        let c = fs::read_to_string(&c_path).unwrap();
        assert!(c.contains("int32_t main(void)"));
    }

    #[test]
    fn test_emit_c_file_reports_compile_errors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.em");
        fs::write(&input, "fn main() -> i32 { break; }").unwrap();

        let err = emit_c_file(&input, &dir.path().join("bad.c")).unwrap_err();
        match err {
            BuildError::Compile(diagnostics) => {
                assert!(diagnostics[0].message.contains("break"));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
        assert!(!dir.path().join("bad.c").exists());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let err = emit_c_file(Path::new("/no/such/file.em"), Path::new("/tmp/x.c")).unwrap_err();
        assert!(matches!(err, BuildError::Io(_)));
    }
}
