//! Local repository manager
//!
//! Main entry point for the local-repo-manager CLI application.

use std::process::ExitCode;

use console::style;
use tracing_subscriber::EnvFilter;

use local_repo_manager::cli::{self, Cli, Commands};
use local_repo_manager::error::{Failure, Result};

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up logging
    setup_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.report() {
                Failure::Expected(message) => {
                    eprintln!("{} {}", style("Error:").red().bold(), message);
                }
                Failure::Unexpected(diagnostics) => {
                    eprintln!("{} {}", style("Unexpected error:").red().bold(), diagnostics);
                }
            }
            ExitCode::FAILURE
        }
    }
}

/// Set up logging based on CLI arguments
fn setup_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Main application logic
fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_path();

    match &cli.command {
        Commands::ScheduleUpdate(args) => cli::execute_schedule_update(config, args),
        Commands::RunBuild(args) => cli::execute_run_build(config, args),
        Commands::Config(args) => cli::execute_config(config, args),
        Commands::List(args) => cli::execute_list(config, args),
        Commands::ListExisting(args) => cli::execute_list_existing(config, args),
    }
}
