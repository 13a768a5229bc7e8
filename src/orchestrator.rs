//! Host-side update: build in a throwaway container, then publish
//!
//! The manager re-invokes itself inside the sandbox with `run-build`. The
//! two sides only share the exchange directory the inner run writes its
//! packages to.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::{collect_artifacts, read_failed_packages};
use crate::config::Config;
use crate::error::{RepoManagerError, Result};
use crate::repository::RepositoryIndex;
use crate::sandbox::{with_scoped, LogSink, Sandbox, ScopedTempDirectory};

/// What an update run left in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No package had a newer version
    NothingNew,
    /// Packages copied into the repository directory and indexed
    Published(Vec<PathBuf>),
}

/// Drives a complete `schedule-update` run
pub struct Orchestrator<'a> {
    config: &'a Config,
    config_path: PathBuf,
    executable: PathBuf,
    sandbox: &'a dyn Sandbox,
    index: &'a dyn RepositoryIndex,
    keep_going: bool,
    exchange_base: Option<PathBuf>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator that re-runs `executable` with `config_path` in the sandbox
    pub fn new(
        config: &'a Config,
        config_path: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        sandbox: &'a dyn Sandbox,
        index: &'a dyn RepositoryIndex,
    ) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            executable: executable.into(),
            sandbox,
            index,
            keep_going: config.build.keep_going,
            exchange_base: None,
        }
    }

    /// Continue past failing packages and publish what did build
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Create the exchange directory under `base` instead of the system temp dir
    pub fn exchange_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.exchange_base = Some(base.into());
        self
    }

    /// Command run inside the sandbox
    pub fn inner_command(&self, pkgdest: &Path) -> Vec<OsString> {
        let mut command: Vec<OsString> = vec![
            self.executable.clone().into(),
            "--config".into(),
            self.config_path.clone().into(),
            "run-build".into(),
            "--pkgdest".into(),
            pkgdest.into(),
        ];
        if self.keep_going {
            command.push("--keep-going".into());
        }
        command
    }

    /// Build every outdated package and fold the results into the repository
    ///
    /// Sandbox failures are written to `sink` in full and reported as a
    /// single [`RepoManagerError::BuildFailed`]; nothing is published then.
    pub fn schedule_update(&self, sink: &mut LogSink) -> Result<UpdateOutcome> {
        println!("Setting up container to build new packages in...");

        let pkgdest = match &self.exchange_base {
            Some(base) => ScopedTempDirectory::new_in(base)?,
            None => ScopedTempDirectory::new()?,
        };
        with_scoped(pkgdest, |pkgdest| self.run_in(pkgdest, sink))
    }

    fn run_in(&self, pkgdest: &Path, sink: &mut LogSink) -> Result<UpdateOutcome> {
        println!("(build process will be logged to {})\n", sink.describe());

        let command = self.inner_command(pkgdest);
        if let Err(e) = self.sandbox.run(&command, &[pkgdest], sink) {
            if let Err(log_err) = sink.record_failure(&e) {
                tracing::error!("Could not write failure to {}: {}", sink.describe(), log_err);
            }
            return Err(RepoManagerError::BuildFailed {
                log: sink.describe(),
            });
        }

        println!("\nBuild complete, temporary container terminated");

        // Skipping everything is a normal outcome when nothing changed upstream
        let failed = read_failed_packages(pkgdest)?;
        let artifacts = collect_artifacts(pkgdest, self.config.build.artifact_format)?;
        let published = if artifacts.is_empty() {
            println!("No new packages have been built");
            Vec::new()
        } else {
            self.publish(&artifacts)?
        };

        if !failed.is_empty() {
            return Err(RepoManagerError::PartialBuild {
                packages: failed.join(", "),
                log: sink.describe(),
            });
        }

        if published.is_empty() {
            Ok(UpdateOutcome::NothingNew)
        } else {
            Ok(UpdateOutcome::Published(published))
        }
    }

    fn publish(&self, artifacts: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let paths = &self.config.paths;

        println!("Copying artifacts to local repository directory...");
        let mut copied = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let name = artifact.file_name().ok_or_else(|| {
                RepoManagerError::Other(format!("Artifact {} has no file name", artifact.display()))
            })?;
            let target = paths.repository_dir.join(name);
            fs::copy(artifact, &target)?;
            copied.push(target);
        }

        println!("Adding artifacts to local repository...\n");
        self.index.add(&paths.repository_file, &copied)?;

        println!("\nNew packages added to the repository");
        println!("Run pacman -Syyu to install them");
        Ok(copied)
    }
}
