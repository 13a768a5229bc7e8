//! Command-line interface for local-repo-manager

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// Local repository manager - keep self-built Arch packages up to date
///
/// Builds outdated packages in a throwaway systemd-nspawn container and
/// publishes them to a local pacman repository.
#[derive(Parser, Debug)]
#[command(name = "local-repo-manager")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "LOCAL_REPO_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build outdated packages in a container and add them to the repository
    #[command(alias = "update")]
    ScheduleUpdate(ScheduleUpdateArgs),

    /// Build packages into a destination directory (run inside the container)
    #[command(alias = "build")]
    RunBuild(RunBuildArgs),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// List packages handled by the manager
    List(ListArgs),

    /// List packages present in the local repository
    ListExisting(ListArgs),
}

/// Arguments for the schedule-update command
#[derive(Parser, Debug)]
pub struct ScheduleUpdateArgs {
    /// Write build output to the terminal instead of a log file
    #[arg(long)]
    pub no_log: bool,

    /// Keep building remaining packages after one fails
    #[arg(long)]
    pub keep_going: bool,
}

/// Arguments for the run-build command
#[derive(Parser, Debug)]
pub struct RunBuildArgs {
    /// Directory receiving the built packages
    #[arg(long, required = true)]
    pub pkgdest: PathBuf,

    /// Keep building remaining packages after one fails
    #[arg(long)]
    pub keep_going: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print only this key (e.g. paths.log_dir)
    pub key: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = InfoFormat::Pretty)]
    pub format: InfoFormat,
}

/// Arguments for the listing commands
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = InfoFormat::Pretty)]
    pub format: InfoFormat,
}

/// Info output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InfoFormat {
    /// Human-readable pretty output
    Pretty,
    /// JSON output
    Json,
    /// TOML output
    Toml,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
