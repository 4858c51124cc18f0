mod cmd;
mod output;
mod reporter;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipewright_lib::pipeline::PipeKind;

use cmd::{cmd_capsules, cmd_plan, cmd_run};
use output::print_error;

/// pipewright - run build pipelines over isolated component capsules
#[derive(Parser)]
#[command(name = "pw")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Print machine-readable JSON
  #[arg(long, global = true)]
  json: bool,

  /// Path to the workspace config (default: nearest pipewright.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the build pipe for every environment
  Build {
    /// Recreate capsules even if they already exist
    #[arg(long)]
    no_reuse: bool,
  },

  /// Run the deploy pipe for every environment
  Deploy {
    /// Recreate capsules even if they already exist
    #[arg(long)]
    no_reuse: bool,
  },

  /// Show the ordered tasks each environment would run
  Plan {
    /// Pipe to plan: build or deploy
    #[arg(long, default_value = "build", value_parser = parse_pipe)]
    pipe: PipeKind,
  },

  /// List materialized capsules
  Capsules,
}

fn parse_pipe(value: &str) -> Result<PipeKind, String> {
  value.parse::<PipeKind>().map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
  let default = if verbose {
    "pipewright_lib=debug,pipewright_cli=debug"
  } else {
    "warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<bool> {
  let config = cli.config.as_deref();
  match cli.command {
    Commands::Build { no_reuse } => cmd_run(config, PipeKind::Build, no_reuse, cli.verbose, cli.json),
    Commands::Deploy { no_reuse } => cmd_run(config, PipeKind::Deploy, no_reuse, cli.verbose, cli.json),
    Commands::Plan { pipe } => cmd_plan(config, pipe, cli.json),
    Commands::Capsules => cmd_capsules(config, cli.json).map(|_| true),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
