//! Ember Compiler CLI
//!
//! Command-line interface for compiling .em programs to C or native
//! executables, and for dumping intermediate pipeline artifacts.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use emberc::config::{CompilerConfig, ProjectConfig};
use emberc::{BuildError, diagnostics};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

/// Exit code for a failed external C compiler invocation, distinct from
/// ordinary pipeline failures.
const TOOLCHAIN_EXIT: i32 = 2;

#[derive(ClapParser)]
#[command(name = "emberc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ember compiler - transpile .em programs to C and native executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .em file to a native executable via the C toolchain
    Build {
        /// Input .em source file
        input: PathBuf,

        /// Output executable path (defaults to input filename without .em)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the intermediate C file
        #[arg(long)]
        keep_c: bool,

        /// C compiler to invoke
        #[arg(long)]
        cc: Option<String>,

        /// Extra flag for the C compiler (repeatable)
        #[arg(long = "cflag", value_name = "FLAG")]
        cflags: Vec<String>,

        /// Project configuration file (defaults to ./ember.toml if present)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Generate C source without invoking the C toolchain
    Emit {
        /// Input .em source file
        input: PathBuf,

        /// Output C file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse and analyze without generating code
    Check {
        /// Input .em source file
        input: PathBuf,

        /// Print analysis statistics
        #[arg(long)]
        stats: bool,
    },

    /// Dump the token stream
    Tokens {
        /// Input .em source file
        input: PathBuf,
    },

    /// Dump the abstract syntax tree
    Ast {
        /// Input .em source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            keep_c,
            cc,
            cflags,
            config,
        } => {
            let output = output.unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                PathBuf::from(stem)
            });
            run_build(&input, &output, keep_c, cc, cflags, config.as_deref());
        }
        Commands::Emit { input, output } => run_emit(&input, output.as_deref()),
        Commands::Check { input, stats } => run_check(&input, stats),
        Commands::Tokens { input } => run_tokens(&input),
        Commands::Ast { input } => run_ast(&input),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "emberc", &mut io::stdout());
}

fn colour_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Render diagnostics against the source and exit with failure.
fn report_and_exit(diags: &[emberc::Diagnostic], source: &str) -> ! {
    eprintln!("{}", diagnostics::render_all(diags, source, colour_enabled()));
    process::exit(1);
}

/// Layer the effective toolchain configuration: defaults, project file,
/// CLI flags.
fn load_config(
    explicit: Option<&Path>,
    cc: Option<String>,
    cflags: Vec<String>,
    keep_c: bool,
) -> CompilerConfig {
    let mut config = CompilerConfig::default();

    let project = match explicit {
        Some(path) => match ProjectConfig::load(path) {
            Ok(project) => Some(project),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => {
            let default_path = Path::new("ember.toml");
            if default_path.exists() {
                match ProjectConfig::load(default_path) {
                    Ok(project) => Some(project),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                None
            }
        }
    };
    if let Some(project) = project {
        config.merge_project(project);
    }

    if let Some(cc) = cc {
        config.cc = cc;
    }
    config.cflags.extend(cflags);
    if keep_c {
        config.keep_c = true;
    }
    config
}

fn run_build(
    input: &Path,
    output: &Path,
    keep_c: bool,
    cc: Option<String>,
    cflags: Vec<String>,
    config_path: Option<&Path>,
) {
    let config = load_config(config_path, cc, cflags, keep_c);

    match emberc::compile_file(input, output, &config) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output.display());
            if config.keep_c {
                println!("C source saved to {}", output.with_extension("c").display());
            }
        }
        Err(BuildError::Compile(diags)) => {
            let source = read_source(input);
            report_and_exit(&diags, &source);
        }
        Err(BuildError::Io(message)) => {
            eprintln!("Error: {}", message);
            process::exit(1);
        }
        Err(BuildError::Toolchain(message)) => {
            eprintln!("Error: {}", message);
            process::exit(TOOLCHAIN_EXIT);
        }
    }
}

fn run_emit(input: &Path, output: Option<&Path>) {
    let source = read_source(input);
    let filename = input.display().to_string();
    match emberc::compile_to_c(&source, &filename) {
        Ok((c_text, _)) => match output {
            Some(path) => {
                if let Err(e) = std::fs::write(path, c_text) {
                    eprintln!("Error writing {}: {}", path.display(), e);
                    process::exit(1);
                }
                println!("Wrote {}", path.display());
            }
            None => print!("{}", c_text),
        },
        Err(diags) => report_and_exit(&diags, &source),
    }
}

fn run_check(input: &Path, stats: bool) {
    let source = read_source(input);
    let filename = input.display().to_string();
    match emberc::check_source(&source, &filename) {
        Ok(analysis) => {
            println!("{}: ok", input.display());
            if stats {
                println!("  functions analyzed: {}", analysis.functions_analyzed);
                println!("  structs analyzed:   {}", analysis.structs_analyzed);
                println!("  variables analyzed: {}", analysis.variables_analyzed);
            }
        }
        Err(diags) => report_and_exit(&diags, &source),
    }
}

fn run_tokens(input: &Path) {
    let source = read_source(input);
    for token in emberc::tokenize(&source) {
        println!("{}", token);
    }
}

fn run_ast(input: &Path) {
    let source = read_source(input);
    let filename = input.display().to_string();
    let (program, diags) = emberc::Parser::new(emberc::tokenize(&source), filename).parse();
    if !diags.is_empty() {
        report_and_exit(&diags, &source);
    }
    println!("{:#?}", program);
}
