//! Systemd-nspawn sandbox implementation

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::scoped::{with_scoped, ScopedTempDirectory};
use super::{LogSink, Sandbox};
use crate::config::absolute;
use crate::error::{RepoManagerError, Result};

/// Sandbox using systemd-nspawn over a volatile overlay of the host root
pub struct NspawnSandbox {
    program: PathBuf,
    extra_params: Vec<String>,
}

impl NspawnSandbox {
    /// Create a new nspawn sandbox
    ///
    /// `extra_params` is split on spaces and passed to nspawn verbatim.
    pub fn new(program: impl Into<PathBuf>, extra_params: &str) -> Self {
        Self {
            program: program.into(),
            extra_params: extra_params.split_whitespace().map(String::from).collect(),
        }
    }

    /// Check if systemd-nspawn is available
    fn check_availability(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|_| {
                RepoManagerError::setup(format!("{} not found", self.program.display()))
            })?;

        if !status.success() {
            return Err(RepoManagerError::setup(format!(
                "{} --version failed",
                self.program.display()
            )));
        }
        Ok(())
    }

    /// Arguments for running `command` with `root` as the container base
    pub fn arguments(
        &self,
        root: &Path,
        command: &[OsString],
        exchange_dirs: &[&Path],
    ) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec![
            "--quiet".into(),
            format!("--directory={}", root.display()).into(),
            "--volatile=overlay".into(),
            // Run as PID 2 (init is PID 1)
            "--as-pid2".into(),
        ];

        for dir in exchange_dirs {
            let mut bind = OsString::from("--bind=");
            bind.push(absolute(dir)?);
            args.push(bind);
        }

        args.extend(self.extra_params.iter().map(OsString::from));
        args.extend(command.iter().cloned());
        Ok(args)
    }
}

impl Sandbox for NspawnSandbox {
    fn run(&self, command: &[OsString], exchange_dirs: &[&Path], sink: &LogSink) -> Result<()> {
        self.check_availability()?;

        for dir in exchange_dirs {
            if !dir.is_dir() {
                return Err(RepoManagerError::setup(format!(
                    "Exchange directory {} does not exist",
                    dir.display()
                )));
            }
        }

        let root = ScopedTempDirectory::bind("/")?;

        with_scoped(root, |root| {
            let args = self.arguments(root, command, exchange_dirs)?;
            let (stdout, stderr) = sink.stdio()?;

            tracing::debug!("Running {} {:?}", self.program.display(), args);
            let status = Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .status()?;

            if !status.success() {
                return Err(RepoManagerError::execution(
                    format!("{} ... {}", self.program.display(), display_command(command)),
                    status,
                ));
            }
            Ok(())
        })
    }
}

fn display_command(command: &[OsString]) -> String {
    command
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
