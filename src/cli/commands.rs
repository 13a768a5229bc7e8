//! Command execution handlers

use std::path::Path;

use console::style;
use serde::Serialize;

use crate::build::{
    discover_packages, prepare_container, record_failed_packages, BuildPipeline, BuildSettings,
    BuildUser, FailurePolicy, HostExecutor, SUDOERS_PATH,
};
use crate::config::{absolute, Config};
use crate::error::{RepoManagerError, Result};
use crate::models::{version::default_comparator, Package};
use crate::orchestrator::{Orchestrator, UpdateOutcome};
use crate::repository::{RepoAdd, RepositoryReader};
use crate::sandbox::{create_sandbox, LogSink};

use super::{ConfigArgs, InfoFormat, ListArgs, RunBuildArgs, ScheduleUpdateArgs};

/// Load the configuration for a command running on the host
///
/// The container only sees the root mount, so everything it needs
/// has to live there.
fn load_host_config(config_path: &Path) -> Result<Config> {
    let config = Config::load(config_path)?;
    config.validate_root_mount(&std::env::current_exe()?)?;
    Ok(config)
}

/// Execute the schedule-update command
pub fn execute_schedule_update(config_path: &Path, args: &ScheduleUpdateArgs) -> Result<()> {
    let config = load_host_config(config_path)?;

    let mut sink = if args.no_log {
        LogSink::Terminal
    } else {
        config.validate_log_dir()?;
        LogSink::open_file(&config.paths.log_dir)?
    };

    let sandbox = create_sandbox(&config);
    let index = RepoAdd::new(&config.tools.repo_add);
    let orchestrator = Orchestrator::new(
        &config,
        absolute(config_path)?,
        std::env::current_exe()?,
        sandbox.as_ref(),
        &index,
    )
    .keep_going(args.keep_going || config.build.keep_going);

    if let UpdateOutcome::Published(packages) = orchestrator.schedule_update(&mut sink)? {
        tracing::debug!("Published {:?}", packages);
    }
    Ok(())
}

/// Execute the run-build command
pub fn execute_run_build(config_path: &Path, args: &RunBuildArgs) -> Result<()> {
    let config = Config::load(config_path)?;

    let user = BuildUser::from_uid(config.build.user_uid)?;
    let host = HostExecutor::new(user, &config.tools.sudo);
    prepare_container(&config.sandbox, &host, Path::new(SUDOERS_PATH))?;

    println!("Retrieving package info from local repository...");
    let vercmp = default_comparator(&config.tools.vercmp);
    let repo = RepositoryReader::new(&config.paths.repository_file, vercmp.as_ref()).read()?;

    // Packages without a known upstream are reported by `list` but never built
    let packages: Vec<Package> = discover_packages(&config.paths.packages_dir)?
        .into_iter()
        .filter(Package::has_source)
        .collect();

    println!("Will build following packages:");
    for package in &packages {
        println!("* {}", package.name);
    }

    let settings = BuildSettings::from_config(&config, &args.pkgdest)?;
    let pipeline = BuildPipeline::new(&host, &repo, vercmp.as_ref(), settings);
    let policy = FailurePolicy::from(args.keep_going || config.build.keep_going);
    let summary = pipeline.build_all(&packages, policy)?;

    println!(
        "\n{} built, {} up to date",
        style(summary.built.len()).green().bold(),
        summary.skipped.len()
    );
    if !summary.failed.is_empty() {
        println!(
            "{} {}",
            style("Failed to build:").red().bold(),
            summary.failed.join(", ")
        );
        record_failed_packages(&args.pkgdest, &summary.failed)?;
    }

    Ok(())
}

/// Execute the config command
pub fn execute_config(config_path: &Path, args: &ConfigArgs) -> Result<()> {
    let config = load_host_config(config_path)?;

    if let Some(key) = &args.key {
        let value = config.get(key).ok_or_else(|| {
            RepoManagerError::config(format!("Unknown configuration key '{}'", key))
        })?;
        println!("{}", value);
        return Ok(());
    }

    match args.format {
        InfoFormat::Pretty => {
            let entries = config.entries();
            let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0) + 4;
            println!("Repository manager configuration:\n");
            for (key, value) in entries {
                println!("{:<width$} {}", format!("  {}:", key), value, width = width);
            }
            println!();
        }
        InfoFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        InfoFormat::Toml => println!("{}", to_toml(&config)?),
    }

    Ok(())
}

/// Execute the list command
pub fn execute_list(config_path: &Path, args: &ListArgs) -> Result<()> {
    #[derive(Serialize)]
    struct Listing<'a> {
        packages: &'a [Package],
    }

    let config = load_host_config(config_path)?;
    let packages = discover_packages(&config.paths.packages_dir)?;

    match args.format {
        InfoFormat::Pretty => {
            if packages.is_empty() {
                println!("No packages currently handled by the manager");
                return Ok(());
            }

            let width = packages.iter().map(|p| p.name.len()).max().unwrap_or(0) + 4;
            println!("Following packages are handled by the manager:\n");
            for package in &packages {
                let label = format!("  {}:", package.name);
                match &package.source {
                    Some(source) => println!("{:<width$} {}", label, source, width = width),
                    None => println!(
                        "{:<width$} {}",
                        label,
                        style("[NO REPOSITORY IDENTIFIED]").yellow(),
                        width = width
                    ),
                }
            }
            println!();
        }
        InfoFormat::Json => println!("{}", serde_json::to_string_pretty(&packages)?),
        InfoFormat::Toml => println!(
            "{}",
            to_toml(&Listing {
                packages: &packages
            })?
        ),
    }

    Ok(())
}

/// Execute the list-existing command
pub fn execute_list_existing(config_path: &Path, args: &ListArgs) -> Result<()> {
    let config = load_host_config(config_path)?;
    let vercmp = default_comparator(&config.tools.vercmp);
    let repo = RepositoryReader::new(&config.paths.repository_file, vercmp.as_ref()).read()?;

    match args.format {
        InfoFormat::Pretty => {
            if repo.is_empty() {
                println!("No packages in the local repository");
                return Ok(());
            }

            let width = repo.iter().map(|(name, _)| name.len()).max().unwrap_or(0) + 4;
            println!("Following packages are in local repository:\n");
            for (name, versions) in repo.iter() {
                let newest = versions.first().map(String::as_str).unwrap_or("");
                println!(
                    "{:<width$} {}",
                    format!("  {}:", name),
                    style(newest).cyan(),
                    width = width
                );
            }
            println!();
        }
        InfoFormat::Json => println!("{}", serde_json::to_string_pretty(&repo)?),
        InfoFormat::Toml => println!("{}", to_toml(&repo)?),
    }

    Ok(())
}

fn to_toml<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    toml::to_string_pretty(value).map_err(|e| RepoManagerError::Other(e.to_string()))
}
