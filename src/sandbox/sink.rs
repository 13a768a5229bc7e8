//! Destination for the combined output of sandboxed runs

use std::fs::File;
use std::io::Write;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Local;

use crate::error::Result;

/// Where build output is written
#[derive(Debug)]
pub enum LogSink {
    /// Inherit the manager's own stdout
    Terminal,
    /// Timestamped log file
    File {
        /// Open log file
        file: File,
        /// Location of the log file
        path: PathBuf,
    },
}

impl LogSink {
    /// Open a fresh `build-<timestamp>.log` in `log_dir`
    pub fn open_file(log_dir: &Path) -> Result<Self> {
        let now = Local::now();
        let path = log_dir.join(format!("build-{}.log", now.format("%Y-%m-%dT%H-%M-%S")));

        let mut file = File::create(&path)?;
        writeln!(
            file,
            "BUILD LOG FOR {}\n================================\n",
            now.format("%d %B %Y at %H:%M")
        )?;
        file.flush()?;

        Ok(Self::File { file, path })
    }

    /// Human-readable name of the destination
    pub fn describe(&self) -> String {
        match self {
            Self::Terminal => "terminal".to_string(),
            Self::File { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// Stdout/stderr handles that both feed this sink
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        match self {
            Self::Terminal => {
                let stderr = std::io::stdout().as_fd().try_clone_to_owned()?;
                Ok((Stdio::inherit(), Stdio::from(stderr)))
            }
            Self::File { file, .. } => Ok((
                Stdio::from(file.try_clone()?),
                Stdio::from(file.try_clone()?),
            )),
        }
    }

    /// Append a failure report
    pub fn record_failure(&mut self, error: &dyn std::error::Error) -> Result<()> {
        let mut report = format!("\nERROR: {}\n", error);
        let mut source = error.source();
        while let Some(cause) = source {
            report.push_str(&format!("  caused by: {}\n", cause));
            source = cause.source();
        }
        report.push_str(&format!("{:?}\n", error));

        match self {
            Self::Terminal => {
                let mut stdout = std::io::stdout();
                stdout.write_all(report.as_bytes())?;
                stdout.flush()?;
            }
            Self::File { file, .. } => {
                file.write_all(report.as_bytes())?;
                file.flush()?;
            }
        }
        Ok(())
    }
}
