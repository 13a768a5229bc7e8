//! Error types for local-repo-manager

use std::error::Error as _;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for local-repo-manager operations
#[derive(Error, Debug)]
pub enum RepoManagerError {
    /// Filesystem or process spawning failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal failure
    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A required path or option is missing, unreadable or of the wrong type
    #[error("{0}")]
    Configuration(String),

    /// Scoped directory could not be prepared
    #[error("Sandbox setup failed: {0}")]
    SandboxSetup(String),

    /// `mount(2)` or `umount2(2)` reported a failure
    #[error("Error {operation} {path}: {errno}")]
    Mount {
        /// What was attempted, e.g. "unmounting"
        operation: &'static str,
        /// Directory the call targeted
        path: PathBuf,
        /// OS error code
        errno: nix::errno::Errno,
    },

    /// External process exited unsuccessfully
    #[error("Command `{command}` failed with {status}")]
    SandboxExecution {
        /// Command line that failed
        command: String,
        /// Exit status as reported by the OS
        status: String,
    },

    /// Repository entry or build metadata lacks the expected fields
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// Sandboxed build run failed; details went to the build log
    #[error("Build process has failed due to unexpected errors\nCheck the build log ({log}) to investigate the cause of the issue")]
    BuildFailed {
        /// Build log file name, or "terminal"
        log: String,
    },

    /// Keep-going run finished but some packages did not build
    #[error("Packages failed to build: {packages}\nCheck the build log ({log}) to investigate the cause of the issue")]
    PartialBuild {
        /// Comma separated names of failed packages
        packages: String,
        /// Build log file name, or "terminal"
        log: String,
    },

    /// JSON output failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything without a dedicated variant
    #[error("{0}")]
    Other(String),
}

/// Result type alias for local-repo-manager operations
pub type Result<T> = std::result::Result<T, RepoManagerError>;

/// How an error should be shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Known failure mode, shown as a single terse message
    Expected(String),
    /// Anything else, shown with the full cause chain
    Unexpected(String),
}

impl RepoManagerError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new sandbox setup error
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::SandboxSetup(msg.into())
    }

    /// Create a new malformed metadata error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMetadata(msg.into())
    }

    /// Create an execution error from a finished process
    pub fn execution(command: impl Into<String>, status: std::process::ExitStatus) -> Self {
        Self::SandboxExecution {
            command: command.into(),
            status: status.to_string(),
        }
    }

    /// Whether this is one of the anticipated failure kinds
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::SandboxSetup(_)
                | Self::Mount { .. }
                | Self::SandboxExecution { .. }
                | Self::MalformedMetadata(_)
                | Self::BuildFailed { .. }
                | Self::PartialBuild { .. }
        )
    }

    /// Classify the error for display at the outermost boundary
    pub fn report(&self) -> Failure {
        if self.is_expected() {
            return Failure::Expected(self.to_string());
        }

        let mut diagnostics = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            diagnostics.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        diagnostics.push_str(&format!("\n\n{:?}", self));
        Failure::Unexpected(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_errors_are_terse() {
        let err = RepoManagerError::config("Packages directory at /nope could not be accessed");
        assert_eq!(
            err.report(),
            Failure::Expected("Packages directory at /nope could not be accessed".into())
        );
    }

    #[test]
    fn test_build_failure_points_at_log() {
        let err = RepoManagerError::BuildFailed {
            log: "build-2024-01-01T00-00-00.log".into(),
        };
        match err.report() {
            Failure::Expected(msg) => {
                assert!(msg.starts_with("Build process has failed"));
                assert!(msg.contains("build-2024-01-01T00-00-00.log"));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_errors_carry_diagnostics() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = RepoManagerError::from(io);
        match err.report() {
            Failure::Unexpected(diag) => {
                assert!(diag.contains("denied"));
                assert!(diag.contains("Io("));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
