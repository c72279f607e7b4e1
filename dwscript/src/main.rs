//! DWScript evaluator CLI
//!
//! Runs programs handed over as JSON-serialized syntax trees.

use clap::{Parser, Subcommand};
use dwscript::{Error, EvalConfig, Interpreter, Program};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dwscript", version, about = "DWScript tree-walking evaluator")]
struct Cli {
    /// Configuration file (TOML, `[eval]` table)
    #[arg(long, global = true, default_value = "dwscript.toml")]
    config: PathBuf,

    /// Override the maximum call depth
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Log evaluator activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program
    Run {
        /// Program file (JSON syntax tree)
        file: PathBuf,
    },
    /// Load a program without running it
    Check {
        /// Program file (JSON syntax tree)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Command::Run { file } => run_file(&cli, file),
        Command::Check { file } => check_file(file),
    };

    if let Err(e) = result {
        eprintln!("{}", report(&e));
        std::process::exit(1);
    }
}

/// Uncaught script exceptions print as `Exception <Class>: <message>`,
/// everything else as `Error: <message>`
fn report(e: &Error) -> String {
    match e {
        Error::Uncaught { .. } => e.to_string(),
        Error::Runtime(err) => match err.position {
            Some(pos) => format!("Error: {} [{pos}]", err.message),
            None => format!("Error: {}", err.message),
        },
        other => format!("Error: {other}"),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dwscript=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_program(path: &Path) -> dwscript::Result<Program> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn run_file(cli: &Cli, path: &Path) -> dwscript::Result<()> {
    let mut config = EvalConfig::load(&cli.config)?.with_source_file(path.display().to_string());
    if let Some(depth) = cli.max_depth {
        config = config.with_max_recursion_depth(depth);
    }
    let program = load_program(path)?;
    tracing::debug!(file = %path.display(), statements = program.statements.len(), "loaded program");

    let mut interp = Interpreter::with_config(config);
    interp.run(&program)?;
    Ok(())
}

fn check_file(path: &Path) -> dwscript::Result<()> {
    let program = load_program(path)?;
    println!(
        "{}: {} top-level statements",
        path.display(),
        program.statements.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwscript::Position;
    use dwscript::interp::RuntimeError;

    #[test]
    fn test_report_runtime_error_without_prefix() {
        let err = Error::Runtime(RuntimeError::division_by_zero());
        assert_eq!(report(&err), "Error: division by zero");
        let err = Error::Runtime(RuntimeError::stack_overflow().at(Position::new(4, 2)));
        assert_eq!(report(&err), "Error: maximum recursion depth exceeded [line: 4, column: 2]");
    }

    #[test]
    fn test_report_uncaught_exception() {
        let err = Error::Uncaught {
            class: "EConvertError".to_string(),
            message: "'x' is not a valid integer value".to_string(),
            position: None,
        };
        assert_eq!(report(&err), "Exception EConvertError: 'x' is not a valid integer value");
    }
}
