//! Running build steps as root or as the unprivileged build user

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::unistd::{chown, Gid, Uid, User};

use crate::error::{RepoManagerError, Result};

/// Identity a step runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAs {
    /// The unprivileged build user (makepkg refuses to run as root)
    BuildUser,
    /// The current, privileged user
    Root,
}

/// A single external command of the build pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments after the program
    pub args: Vec<OsString>,
    /// Working directory
    pub cwd: PathBuf,
    /// Variables added to the inherited environment
    pub env: Vec<(String, OsString)>,
    /// Identity to run under
    pub run_as: RunAs,
}

impl Step {
    /// Create a step run by the build user in `cwd`
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            run_as: RunAs::BuildUser,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set extra environment variables on top of the inherited ones
    pub fn envs(mut self, env: &[(String, OsString)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    /// Run with the current privileges instead of as the build user
    pub fn as_root(mut self) -> Self {
        self.run_as = RunAs::Root;
        self
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Capability to run build steps on the (sandboxed) host
pub trait BuildHost {
    /// Hand ownership of `dir` to the build user
    fn claim(&self, dir: &Path) -> Result<()>;

    /// Run a step, streaming its output
    fn run(&self, step: &Step) -> Result<()>;

    /// Run a step and return what it printed on stdout
    fn capture(&self, step: &Step) -> Result<String>;
}

/// The unprivileged account builds run under
#[derive(Debug, Clone)]
pub struct BuildUser {
    /// Login name passed to sudo
    pub name: String,
    /// Owner for claimed directories
    pub uid: Uid,
    /// Primary group for claimed directories
    pub gid: Gid,
}

impl BuildUser {
    /// Look up the account with the given UID
    pub fn from_uid(uid: u32) -> Result<Self> {
        let user = User::from_uid(Uid::from_raw(uid))
            .map_err(|e| RepoManagerError::config(format!("Could not look up UID {}: {}", uid, e)))?
            .ok_or_else(|| {
                RepoManagerError::config(format!("No user with UID {} exists for building", uid))
            })?;

        Ok(Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
        })
    }
}

/// Runs steps through sudo, dropping to the build user where required
pub struct HostExecutor {
    user: BuildUser,
    sudo: PathBuf,
}

impl HostExecutor {
    /// Create an executor for the given build user
    pub fn new(user: BuildUser, sudo: impl Into<PathBuf>) -> Self {
        Self {
            user,
            sudo: sudo.into(),
        }
    }

    fn command(&self, step: &Step) -> Command {
        let mut cmd = match step.run_as {
            RunAs::BuildUser => {
                // -E keeps prepare_dir/PKGDEST visible to the build user
                let mut cmd = Command::new(&self.sudo);
                cmd.arg("-E").arg("-u").arg(&self.user.name).arg(&step.program);
                cmd
            }
            RunAs::Root => Command::new(&step.program),
        };

        cmd.args(&step.args).current_dir(&step.cwd).stdin(Stdio::null());
        for (key, value) in &step.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl BuildHost for HostExecutor {
    fn claim(&self, dir: &Path) -> Result<()> {
        chown(dir, Some(self.user.uid), Some(self.user.gid)).map_err(|errno| {
            RepoManagerError::setup(format!(
                "Could not hand {} over to {}: {}",
                dir.display(),
                self.user.name,
                errno
            ))
        })
    }

    fn run(&self, step: &Step) -> Result<()> {
        tracing::debug!("Running {}", step);
        let status = self.command(step).status()?;

        if !status.success() {
            return Err(RepoManagerError::execution(step.to_string(), status));
        }
        Ok(())
    }

    fn capture(&self, step: &Step) -> Result<String> {
        tracing::debug!("Capturing {}", step);
        let output = self.command(step).stderr(Stdio::inherit()).output()?;

        if !output.status.success() {
            return Err(RepoManagerError::execution(step.to_string(), output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = Step::new("/usr/bin/makepkg", "/tmp/build")
            .arg("--printsrcinfo")
            .envs(&[("PKGDEST".to_string(), OsString::from("/tmp/out"))]);
        assert_eq!(step.run_as, RunAs::BuildUser);
        assert_eq!(step.to_string(), "/usr/bin/makepkg --printsrcinfo");
        assert_eq!(step.env.len(), 1);

        let step = Step::new("/usr/bin/pacman", "/tmp/out")
            .args(["--needed", "--noconfirm", "-U"])
            .as_root();
        assert_eq!(step.run_as, RunAs::Root);
        assert_eq!(step.args.len(), 3);
    }

    #[test]
    fn test_root_user_lookup() {
        let root = BuildUser::from_uid(0).unwrap();
        assert_eq!(root.name, "root");
        assert!(root.uid.is_root());
    }

    #[test]
    fn test_root_steps_run_directly() {
        let executor = HostExecutor::new(BuildUser::from_uid(0).unwrap(), "/usr/bin/sudo");
        let cwd = std::env::temp_dir();

        let step = Step::new("/bin/sh", &cwd)
            .args(["-c", "echo $MARKER"])
            .envs(&[("MARKER".to_string(), OsString::from("visible"))])
            .as_root();
        let out = executor.capture(&step).unwrap();
        assert_eq!(out.trim(), "visible");

        let err = executor
            .run(&Step::new("/bin/sh", &cwd).args(["-c", "exit 3"]).as_root())
            .unwrap_err();
        assert!(matches!(err, RepoManagerError::SandboxExecution { .. }));
    }
}
