//! Local repository manager
//!
//! Keeps a local pacman repository of self-built packages up to date.
//! Each package lives in its own directory with a `prepare.sh` script that
//! fetches sources and lays out a PKGBUILD. An update run:
//!
//! - starts a throwaway systemd-nspawn container over a volatile overlay
//!   of the host root
//! - inside it, prepares every package, compares its declared version with
//!   the repository database and builds only what is newer
//! - copies the resulting archives into the repository and runs `repo-add`
//!
//! # Quick Start
//!
//! ```bash
//! # Show the packages the manager knows about
//! local-repo-manager list
//!
//! # Build anything outdated and publish it
//! local-repo-manager schedule-update
//!
//! # Show what the repository currently holds
//! local-repo-manager list-existing
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod sandbox;

// Re-export commonly used types
pub use error::{Failure, RepoManagerError, Result};
pub use models::{Package, SourceInfo, VersionCompare};
pub use orchestrator::{Orchestrator, UpdateOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
