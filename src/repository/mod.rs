//! Local package repository: reading its database and adding packages to it

pub mod database;

pub use database::{RepositoryReader, RepositoryRecord};

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{RepoManagerError, Result};

/// Folds built packages into a repository database
pub trait RepositoryIndex {
    /// Register the given package files in the database, creating it if absent
    fn add(&self, database: &Path, packages: &[PathBuf]) -> Result<()>;
}

/// `repo-add` from pacman-contrib
#[derive(Debug, Clone)]
pub struct RepoAdd {
    program: PathBuf,
}

impl RepoAdd {
    /// Create an indexer backed by the given `repo-add` binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RepositoryIndex for RepoAdd {
    fn add(&self, database: &Path, packages: &[PathBuf]) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--new").arg(database).args(packages);

        tracing::debug!("Running {:?}", cmd);
        let status = cmd.status()?;

        if !status.success() {
            return Err(RepoManagerError::execution(
                format!("{} --new {}", self.program.display(), database.display()),
                status,
            ));
        }
        Ok(())
    }
}
