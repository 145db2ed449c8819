//! Compiler command-line driver.
//!
//! Exit codes: 0 on success, 1 on usage errors, 2 on compile failure.
//! Code generation planning runs only when no error-severity diagnostic
//! was produced; warnings never block it. Under `--strict` the pipeline
//! stops at the first error-severity diagnostic.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use crate::models::diagnostics::{Diagnostic, Severity};
use crate::models::source::FileId;
use crate::services::codegen;
use crate::services::pipeline::{self, CheckedUnit, PipelineOptions};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_COMPILE_FAILURE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArch {
    #[value(name = "x86_64")]
    X86_64,
    #[value(name = "arm64")]
    Arm64,
    #[value(name = "wasm32")]
    Wasm32,
    #[value(name = "native")]
    Native,
}

#[derive(Parser, Debug)]
#[command(name = "vesperc", version, about = "Vesper compiler")]
pub struct Cli {
    /// Source files to compile.
    pub inputs: Vec<PathBuf>,

    /// Output file.
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Optimization level.
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub opt_level: u8,

    /// Emit debug info.
    #[arg(short = 'g')]
    pub debug_info: bool,

    /// Verbose output.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Target architecture.
    #[arg(short = 't', value_enum, default_value = "native")]
    pub target: TargetArch,

    /// Code generation backend.
    #[arg(short = 'b', value_name = "BACKEND", default_value = "llvm")]
    pub backend: String,

    /// Include search path (repeatable).
    #[arg(short = 'I', value_name = "PATH")]
    pub include_paths: Vec<PathBuf>,

    /// Library search path (repeatable).
    #[arg(short = 'L', value_name = "PATH")]
    pub library_paths: Vec<PathBuf>,

    /// Library to link (repeatable).
    #[arg(short = 'l', value_name = "NAME")]
    pub libraries: Vec<String>,

    /// Do not seed the runtime prelude.
    #[arg(long)]
    pub no_stdlib: bool,

    /// Compile for the test harness.
    #[arg(long)]
    pub test_mode: bool,

    /// Abort on the first error-severity diagnostic.
    #[arg(long)]
    pub strict: bool,
}

/// Backend names that still parse but are no longer preferred.
const LEGACY_BACKENDS: &[&str] = &["llvm-legacy", "llvm-ir"];

/// Entry point for `main`; returns the process exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are successful exits.
            if err.use_stderr() {
                eprintln!("{err}");
                return EXIT_USAGE;
            }
            print!("{err}");
            return EXIT_SUCCESS;
        }
    };

    init_tracing(cli.verbose);
    execute(&cli)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    // A second init in the same process (tests) is fine to ignore.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the front-end pipeline over the inputs.
pub fn execute(cli: &Cli) -> i32 {
    match validate_backend(&cli.backend) {
        Ok(()) => {}
        Err(message) => {
            eprintln!("error: {message}");
            return EXIT_USAGE;
        }
    }

    if cli.inputs.is_empty() {
        eprintln!("error: no input files");
        return EXIT_USAGE;
    }

    let options = PipelineOptions {
        strict: cli.strict,
        no_stdlib: cli.no_stdlib,
    };

    let mut any_errors = false;
    for (index, input) in cli.inputs.iter().enumerate() {
        let unit = match compile_file(input, FileId(index as u32), &options) {
            Ok(unit) => unit,
            Err(err) => {
                eprintln!("error: {err:#}");
                return EXIT_COMPILE_FAILURE;
            }
        };
        if cli.test_mode {
            emit_json_diagnostics(input, &unit.diagnostics);
        } else {
            render_diagnostics(input, &unit.diagnostics);
        }

        if unit.has_errors() {
            any_errors = true;
            if cli.strict {
                debug!("strict mode: stopping at first failing file");
                return EXIT_COMPILE_FAILURE;
            }
            continue;
        }

        // Warnings never block code generation.
        let (module, plan_diags) = codegen::lower_program(&unit.program, &unit.const_values);
        if cli.test_mode {
            emit_json_diagnostics(input, &plan_diags);
        } else {
            render_diagnostics(input, &plan_diags);
        }
        if plan_diags.iter().any(Diagnostic::is_error) {
            any_errors = true;
            continue;
        }
        debug!(
            functions = module.functions.len(),
            consts = module.consts.len(),
            "IR plan ready for the external backend"
        );
    }

    if any_errors {
        EXIT_COMPILE_FAILURE
    } else {
        if let Some(output) = &cli.output {
            // Object emission is the external backend's job; the plan
            // stops at the IR boundary.
            info!(output = %output.display(), "emission delegated to the external backend");
        }
        EXIT_SUCCESS
    }
}

fn compile_file(
    input: &Path,
    file_id: FileId,
    options: &PipelineOptions,
) -> anyhow::Result<CheckedUnit> {
    let source = pipeline::read_source(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    info!(file = %input.display(), "compiling");
    Ok(pipeline::check_source(&source, file_id, options))
}

/// Machine-readable diagnostics for the external test harness, one JSON
/// object per line.
fn emit_json_diagnostics(input: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let mut record = serde_json::json!({
            "file": input.display().to_string(),
            "severity": diagnostic.severity,
            "code": diagnostic.code.as_str(),
            "message": diagnostic.message,
            "line": diagnostic.span.start.line,
            "column": diagnostic.span.start.column,
        });
        if let Some(suggestion) = &diagnostic.suggestion {
            record["suggestion"] = serde_json::Value::String(suggestion.clone());
        }
        println!("{record}");
    }
}

fn validate_backend(backend: &str) -> Result<(), String> {
    if backend == "llvm" {
        return Ok(());
    }
    if LEGACY_BACKENDS.contains(&backend) {
        warn!(backend, "deprecated backend name; use `llvm`");
        eprintln!("warning: backend name `{backend}` is deprecated; use `llvm`");
        return Ok(());
    }
    Err(format!(
        "unknown backend `{backend}` (supported: llvm)"
    ))
}

fn render_diagnostics(input: &std::path::Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let location = format!(
            "{}:{}:{}",
            input.display(),
            diagnostic.span.start.line,
            diagnostic.span.start.column
        );
        match diagnostic.severity {
            Severity::Error => eprintln!(
                "{location}: error[{}]: {}",
                diagnostic.code.as_str(),
                diagnostic.message
            ),
            Severity::Warning => eprintln!(
                "{location}: warning[{}]: {}",
                diagnostic.code.as_str(),
                diagnostic.message
            ),
            Severity::Info => eprintln!("{location}: note: {}", diagnostic.message),
        }
        if let Some(suggestion) = &diagnostic.suggestion {
            eprintln!("{location}: help: did you mean `{suggestion}`?");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cli_for(inputs: Vec<PathBuf>) -> Cli {
        Cli {
            inputs,
            output: None,
            opt_level: 0,
            debug_info: false,
            verbose: false,
            target: TargetArch::Native,
            backend: "llvm".to_string(),
            include_paths: Vec::new(),
            library_paths: Vec::new(),
            libraries: Vec::new(),
            no_stdlib: false,
            test_mode: false,
            strict: false,
        }
    }

    #[test]
    fn missing_inputs_is_a_usage_error() {
        assert_eq!(execute(&cli_for(Vec::new())), EXIT_USAGE);
    }

    #[test]
    fn unknown_backend_is_a_usage_error() {
        let mut cli = cli_for(vec![PathBuf::from("x.vsp")]);
        cli.backend = "gcc".to_string();
        assert_eq!(execute(&cli), EXIT_USAGE);
    }

    #[test]
    fn legacy_backend_is_accepted_with_deprecation() {
        assert!(validate_backend("llvm-legacy").is_ok());
        assert!(validate_backend("llvm").is_ok());
        assert!(validate_backend("msvc").is_err());
    }

    #[test]
    fn clean_file_compiles_successfully() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ok.vsp");
        fs::write(&path, "fn main() { log(\"hello\"); }").unwrap();
        assert_eq!(execute(&cli_for(vec![path])), EXIT_SUCCESS);
    }

    #[test]
    fn compile_error_yields_failure_exit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.vsp");
        fs::write(&path, "let x: i8 = 128;").unwrap();
        assert_eq!(execute(&cli_for(vec![path])), EXIT_COMPILE_FAILURE);
    }

    #[test]
    fn cli_parses_the_documented_flags() {
        let cli = Cli::try_parse_from([
            "vesperc", "-o", "out.o", "-O", "2", "-g", "-v", "-t", "x86_64", "-b", "llvm", "-I",
            "inc", "-L", "libdir", "-l", "m", "--no-stdlib", "--test-mode", "--strict",
            "main.vsp",
        ])
        .unwrap();

        assert_eq!(cli.opt_level, 2);
        assert!(cli.debug_info);
        assert_eq!(cli.target, TargetArch::X86_64);
        assert_eq!(cli.libraries, vec!["m".to_string()]);
        assert!(cli.strict);
        assert_eq!(cli.inputs, vec![PathBuf::from("main.vsp")]);
    }
}
