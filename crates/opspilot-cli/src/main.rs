// crates/opspilot-cli/src/main.rs
// ============================================================================
// Module: OpsPilot CLI Entry Point
// Description: Command dispatcher for booting the runtime and validating
// configuration offline.
// Purpose: The operator-facing binary wrapping opspilot-runtime's
// composition root.
// Dependencies: clap, opspilot-core, opspilot-runtime, thiserror, tokio.
// ============================================================================

//! ## Overview
//! A `clap`-derived [`Cli`]/[`Commands`] tree, a plain [`CliError`]
//! wrapper, and an entry point that never panics on a user error — every
//! failure path returns [`ExitCode::FAILURE`] after writing a message to
//! stderr (exit code 0 on clean shutdown, 1 on startup failure).

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use opspilot_runtime::bootstrap;
use opspilot_runtime::RuntimeConfig;
use thiserror::Error;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "opspilot", disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the runtime from a config file and serve until a shutdown signal
    /// arrives.
    Serve(ServeArgs),
    /// Configuration inspection utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: PathBuf,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Parse and validate a configuration file without booting the runtime.
    Validate(ConfigValidateArgs),
}

/// Arguments for `config validate`.
#[derive(clap::Args, Debug)]
struct ConfigValidateArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: PathBuf,
}

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from `message`.
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(&args).await,
        Commands::Config { command } => command_config(&command).await,
    }
}

/// Executes the `serve` command: boots the runtime and blocks until an
/// operator-initiated shutdown.
async fn command_serve(args: &ServeArgs) -> CliResult<ExitCode> {
    let config = load_config(&args.config).await?;
    let system = bootstrap(&config).await.map_err(|err| CliError::new(format!("startup failed: {err}")))?;
    system.logger.log(opspilot_core::LogLevel::Info, "opspilot-cli", "runtime started, awaiting shutdown signal", &[]);
    system.run().await;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `config validate` command.
async fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => {
            load_config(&args.config).await?;
            write_stdout_line(&format!("{} is valid", args.config.display())).map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads and parses the config file at `path`.
async fn load_config(path: &Path) -> CliResult<RuntimeConfig> {
    RuntimeConfig::load(path).await.map_err(|err| CliError::new(format!("failed to load {}: {err}", path.display())))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    writeln!(std::io::stdout(), "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    writeln!(std::io::stderr(), "{message}")
}

/// Formats an I/O failure encountered while writing CLI output.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
