use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod resolver;

use resolver::FsResolver;

#[derive(Parser)]
#[command(name = "ard")]
#[command(version)]
#[command(about = "The Ard language toolchain", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, check, and interpret a source file
    Run {
        /// Input .ard file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Parse and check without running
    Check {
        /// Input .ard file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Emit diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile to bytecode
    Emit {
        /// Input .ard file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to FILE with an .ardb extension)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Load, verify, and run a bytecode file
    Exec {
        /// Input .ardb file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

// Exit codes: 0 success, 1 runtime error or panic, 2 parse/type
// diagnostics, 3 internal invariant violation.
const EXIT_DIAGNOSTICS: u8 = 2;
const EXIT_INTERNAL: u8 = 3;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run { input } => run(&input),
        Commands::Check { input, json } => check_only(&input, json),
        Commands::Emit { input, output } => emit(&input, output),
        Commands::Exec { input } => exec(&input),
    }
}

/// Front half shared by every source-consuming command: parse and
/// check, printing diagnostics. `None` means diagnostics blocked
/// further stages.
fn load_module(input: &Path) -> Result<Option<std::rc::Rc<ard_checker::ir::Module>>> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let file_name = input.display().to_string();

    let parsed = ard_parser::parse(&source);
    if !parsed.errors.is_empty() {
        for error in &parsed.errors {
            eprintln!("{}", error.to_diagnostic(&file_name).render(&source));
        }
        return Ok(None);
    }
    debug!("parsed {}: {} statements", file_name, parsed.program.statements.len());

    let resolver = FsResolver::new(input.parent().unwrap_or(Path::new(".")));
    let result = ard_checker::check(&parsed.program, &resolver, &file_name);
    let mut engine = ard_diagnostics::DiagnosticEngine::new();
    engine.extend(result.diagnostics);
    engine.print_all(&source);
    engine.print_summary();
    if engine.has_errors() {
        return Ok(None);
    }
    Ok(result.module)
}

fn run(input: &Path) -> Result<ExitCode> {
    let Some(module) = load_module(input)? else {
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    };
    match ard_interp::interpret(&module) {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(error) => {
            eprintln!("{}", error);
            Ok(ExitCode::from(error.exit_code() as u8))
        }
    }
}

fn check_only(input: &Path, json: bool) -> Result<ExitCode> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let file_name = input.display().to_string();

    let parsed = ard_parser::parse(&source);
    let mut engine = ard_diagnostics::DiagnosticEngine::new();
    for error in &parsed.errors {
        engine.emit(error.to_diagnostic(&file_name));
    }
    if parsed.errors.is_empty() {
        let resolver = FsResolver::new(input.parent().unwrap_or(Path::new(".")));
        let result = ard_checker::check(&parsed.program, &resolver, &file_name);
        engine.extend(result.diagnostics);
    }

    if json {
        println!("{}", engine.to_json());
    } else {
        engine.print_all(&source);
        engine.print_summary();
    }
    if engine.has_errors() {
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    }
    Ok(ExitCode::SUCCESS)
}

fn emit(input: &Path, output: Option<PathBuf>) -> Result<ExitCode> {
    let Some(module) = load_module(input)? else {
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    };
    let program = ard_bytecode::emit(&module)?;
    ard_bytecode::verify(&program)
        .map_err(|e| anyhow::anyhow!("emitted program failed verification: {}", e))?;
    let bytes = ard_bytecode::serialize(&program);
    let output = output.unwrap_or_else(|| input.with_extension("ardb"));
    std::fs::write(&output, &bytes)
        .with_context(|| format!("cannot write {}", output.display()))?;
    debug!("wrote {} bytes to {}", bytes.len(), output.display());
    Ok(ExitCode::SUCCESS)
}

fn exec(input: &Path) -> Result<ExitCode> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let program = match ard_bytecode::deserialize(&bytes) {
        Ok(program) => program,
        Err(error) => {
            eprintln!("{}: {}", input.display(), error);
            return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
        }
    };
    if let Err(error) = ard_bytecode::verify(&program) {
        eprintln!("{}: {}", input.display(), error);
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    }
    match ard_bytecode::run(&program, "main") {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(error) => {
            eprintln!("{}", error);
            Ok(ExitCode::from(error.exit_code() as u8))
        }
    }
}
