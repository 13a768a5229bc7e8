//! Sandbox environment for package building

mod nspawn;
pub mod scoped;
mod sink;

pub use nspawn::NspawnSandbox;
pub use scoped::{with_scoped, ScopedTempDirectory};
pub use sink::LogSink;

use std::ffi::OsString;
use std::path::Path;

use crate::config::Config;
use crate::error::Result;

/// Trait for sandbox implementations
pub trait Sandbox {
    /// Run `command` inside a fresh sandbox and wait for it to exit
    ///
    /// Each exchange directory is visible read-write at the same absolute
    /// path inside and outside. Combined stdout/stderr goes to `sink`.
    fn run(&self, command: &[OsString], exchange_dirs: &[&Path], sink: &LogSink) -> Result<()>;
}

/// Create the sandbox described by the configuration
pub fn create_sandbox(config: &Config) -> Box<dyn Sandbox> {
    // For now, we only support systemd-nspawn
    Box::new(NspawnSandbox::new(
        &config.tools.systemd_nspawn,
        &config.sandbox.extra_params,
    ))
}
