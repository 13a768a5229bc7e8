//! Temporary directories with guaranteed cleanup
//!
//! A [`ScopedTempDirectory`] optionally has another directory bind-mounted
//! onto it. Release unmounts first and only then removes the directory, so
//! recursive removal never descends into the mounted source.

use std::fs;
use std::path::{Path, PathBuf};

use nix::mount::{mount, umount2, MntFlags, MsFlags};

use crate::error::{RepoManagerError, Result};

const PREFIX: &str = "local-repo-";

/// A temporary directory, optionally bind-mounted from a source path
#[derive(Debug)]
pub struct ScopedTempDirectory {
    path: PathBuf,
    mounted: bool,
    released: bool,
}

impl ScopedTempDirectory {
    /// Create an empty temporary directory
    pub fn new() -> Result<Self> {
        Self::new_in(std::env::temp_dir())
    }

    /// Create an empty temporary directory under `base`
    pub fn new_in(base: impl AsRef<Path>) -> Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(base)?
            .keep();

        Ok(Self {
            path,
            mounted: false,
            released: false,
        })
    }

    /// Create a temporary directory with `source` bind-mounted onto it
    pub fn bind(source: impl AsRef<Path>) -> Result<Self> {
        Self::bind_in(std::env::temp_dir(), source)
    }

    /// Create a temporary directory under `base` with `source` bind-mounted onto it
    pub fn bind_in(base: impl AsRef<Path>, source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        if !source.is_dir() {
            return Err(RepoManagerError::setup(format!(
                "{} is not a valid bind mount source",
                source.display()
            )));
        }

        let mut dir = Self::new_in(base)?;

        mount(
            Some(source),
            dir.path.as_path(),
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|errno| RepoManagerError::Mount {
            operation: "bind mounting onto",
            path: dir.path.clone(),
            errno,
        })?;

        tracing::debug!("Bind mounted {} on {}", source.display(), dir.path.display());
        dir.mounted = true;
        Ok(dir)
    }

    /// Location of the directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a bind mount is currently held
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Unmount (if mounted) and remove the directory, reporting failures
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if self.mounted {
            if let Err(errno) = umount2(self.path.as_path(), MntFlags::empty()) {
                // Never recurse into a directory that may still expose the source
                let _ = fs::remove_dir(&self.path);
                return Err(RepoManagerError::Mount {
                    operation: "unmounting",
                    path: self.path.clone(),
                    errno,
                });
            }
            self.mounted = false;
        }

        fs::remove_dir_all(&self.path)?;
        Ok(())
    }
}

impl Drop for ScopedTempDirectory {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::error!("Failed to clean up {}: {}", self.path.display(), e);
        }
    }
}

/// Run `f` with the directory, then release it whatever the outcome
///
/// An error from `f` takes precedence; a release failure after it is logged.
pub fn with_scoped<T, F>(dir: ScopedTempDirectory, f: F) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    let result = f(dir.path());
    let released = dir.release();

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            tracing::error!("Cleanup after failure also failed: {}", cleanup);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn is_empty(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_release_removes_directory() {
        let base = TempDir::new().unwrap();
        let dir = ScopedTempDirectory::new_in(base.path()).unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join("artifact.tar.xz"), b"data").unwrap();

        assert!(path.is_dir());
        dir.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let base = TempDir::new().unwrap();
        let path = {
            let dir = ScopedTempDirectory::new_in(base.path()).unwrap();
            fs::create_dir(dir.path().join("nested")).unwrap();
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(is_empty(base.path()));
    }

    #[test]
    fn test_cleanup_after_failure_in_scope() {
        let base = TempDir::new().unwrap();
        let dir = ScopedTempDirectory::new_in(base.path()).unwrap();

        let result: Result<()> = with_scoped(dir, |path| {
            fs::write(path.join("partial"), b"half written")?;
            Err(RepoManagerError::Other("injected failure".into()))
        });

        assert!(matches!(result, Err(RepoManagerError::Other(_))));
        assert!(is_empty(base.path()));
    }

    #[test]
    fn test_cleanup_after_success_in_scope() {
        let base = TempDir::new().unwrap();
        let dir = ScopedTempDirectory::new_in(base.path()).unwrap();
        let value = with_scoped(dir, |path| Ok(path.exists())).unwrap();
        assert!(value);
        assert!(is_empty(base.path()));
    }

    #[test]
    fn test_cleanup_after_panic_in_scope() {
        let base = TempDir::new().unwrap();
        let base_path = base.path().to_path_buf();

        let outcome = std::panic::catch_unwind(move || {
            let dir = ScopedTempDirectory::new_in(&base_path).unwrap();
            let _ = dir.path();
            panic!("boom");
        });

        assert!(outcome.is_err());
        assert!(is_empty(base.path()));
    }

    #[test]
    fn test_bind_rejects_missing_source() {
        let base = TempDir::new().unwrap();
        let err = ScopedTempDirectory::bind_in(base.path(), base.path().join("missing")).unwrap_err();
        assert!(matches!(err, RepoManagerError::SandboxSetup(_)));
        assert!(is_empty(base.path()));
    }

    #[test]
    fn test_bind_rejects_file_source() {
        let base = TempDir::new().unwrap();
        let file = base.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();
        let err = ScopedTempDirectory::bind_in(base.path(), &file).unwrap_err();
        assert!(matches!(err, RepoManagerError::SandboxSetup(_)));
    }

    #[test]
    fn test_bind_leaves_nothing_behind() {
        let base = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let source = scratch.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("marker"), b"visible").unwrap();

        // Without CAP_SYS_ADMIN the mount fails; either way nothing may leak
        match ScopedTempDirectory::bind_in(base.path(), &source) {
            Ok(dir) => {
                assert!(dir.is_mounted());
                assert!(dir.path().join("marker").is_file());
                dir.release().unwrap();
                assert!(source.join("marker").is_file());
            }
            Err(e) => assert!(matches!(e, RepoManagerError::Mount { .. })),
        }
        assert!(is_empty(base.path()));
    }
}
