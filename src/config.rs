//! Configuration management for local-repo-manager

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use serde::{Deserialize, Serialize};

use crate::error::{RepoManagerError, Result};
use crate::models::ArtifactFormat;

/// Location used when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/local-repo-manager.toml";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem locations
    pub paths: PathsConfig,

    /// Container settings
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// External executables
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory with one subdirectory per managed package
    pub packages_dir: PathBuf,
    /// Repository database archive
    pub repository_file: PathBuf,
    /// Directory the built packages are published to
    pub repository_dir: PathBuf,
    /// Directory receiving build logs
    pub log_dir: PathBuf,
}

/// Container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Extra systemd-nspawn flags, space separated
    pub extra_params: String,
    /// Command bringing up networking inside the container (empty to skip)
    pub network_command: Vec<String>,
    /// Let every user run sudo without a password inside the container
    pub passwordless_sudo: bool,
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// UID of the unprivileged user running makepkg
    pub user_uid: u32,
    /// Archive format makepkg is configured to produce
    pub artifact_format: ArtifactFormat,
    /// Continue with remaining packages after a failure
    pub keep_going: bool,
    /// Flags passed to makepkg when building
    pub makepkg_flags: Vec<String>,
}

/// External executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Container launcher
    pub systemd_nspawn: PathBuf,
    /// Package builder
    pub makepkg: PathBuf,
    /// Package manager used inside the container
    pub pacman: PathBuf,
    /// Repository database updater
    pub repo_add: PathBuf,
    /// Used to drop to the build user
    pub sudo: PathBuf,
    /// Shell running preparation scripts
    pub bash: PathBuf,
    /// Version comparison tool (built-in comparison if missing)
    pub vercmp: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            extra_params: String::new(),
            network_command: vec!["/usr/bin/dhclient".to_string(), "host0".to_string()],
            passwordless_sudo: true,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            user_uid: 1000,
            artifact_format: ArtifactFormat::default(),
            keep_going: false,
            makepkg_flags: vec!["-sc".to_string(), "--noconfirm".to_string()],
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            systemd_nspawn: PathBuf::from("/usr/bin/systemd-nspawn"),
            makepkg: PathBuf::from("/usr/bin/makepkg"),
            pacman: PathBuf::from("/usr/bin/pacman"),
            repo_add: PathBuf::from("/usr/bin/repo-add"),
            sudo: PathBuf::from("/usr/bin/sudo"),
            bash: PathBuf::from("/bin/bash"),
            vercmp: PathBuf::from("/usr/bin/vercmp"),
        }
    }
}

impl Config {
    /// Load configuration from file and validate its paths
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() || access(path, AccessFlags::R_OK).is_err() {
            return Err(RepoManagerError::config(format!(
                "Configuration file at {} could not be read",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content).map_err(|e| {
            RepoManagerError::config(format!(
                "Configuration file at {} is invalid: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without touching the filesystem
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check every configured path has the right type and permissions
    pub fn validate(&self) -> Result<()> {
        let paths = &self.paths;

        let dir = paths.repository_dir.as_path();
        if !dir.is_dir() || access(dir, AccessFlags::W_OK | AccessFlags::X_OK).is_err() {
            return Err(RepoManagerError::config(format!(
                "Repository directory at {} could not be accessed",
                dir.display()
            )));
        }

        // The database may not exist yet, but if it does it must be usable
        let file = paths.repository_file.as_path();
        if file.is_dir() {
            return Err(RepoManagerError::config(format!(
                "Repository file at {} is a directory",
                file.display()
            )));
        } else if file.is_file() && access(file, AccessFlags::R_OK | AccessFlags::W_OK).is_err() {
            return Err(RepoManagerError::config(format!(
                "Repository file at {} could not be read and written to",
                file.display()
            )));
        }

        let dir = paths.packages_dir.as_path();
        if !dir.is_dir() || access(dir, AccessFlags::R_OK | AccessFlags::X_OK).is_err() {
            return Err(RepoManagerError::config(format!(
                "Packages directory at {} could not be accessed",
                dir.display()
            )));
        }

        Ok(())
    }

    /// Check the log directory can receive build logs
    pub fn validate_log_dir(&self) -> Result<()> {
        let dir = self.paths.log_dir.as_path();
        if !dir.is_dir() || access(dir, AccessFlags::W_OK | AccessFlags::X_OK).is_err() {
            return Err(RepoManagerError::config(format!(
                "Log directory at {} could not be written to",
                dir.display()
            )));
        }
        Ok(())
    }

    /// Check everything the container needs is visible through the root overlay
    ///
    /// The volatile overlay only covers the root mount, so anything on
    /// another partition would be missing inside the container.
    pub fn validate_root_mount(&self, executable: &Path) -> Result<()> {
        if !on_root_mount(executable) {
            return Err(RepoManagerError::config(
                "Manager executable needs to be on the root partition",
            ));
        }
        if !on_root_mount(&self.paths.packages_dir) {
            return Err(RepoManagerError::config(
                "Packages directory needs to be on the root partition",
            ));
        }
        if !on_root_mount(&self.paths.repository_file) {
            return Err(RepoManagerError::config(
                "Repository file needs to be on the root partition",
            ));
        }
        Ok(())
    }

    /// Flattened `key = value` view for display
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Option<String> {
        let path = |p: &PathBuf| Some(p.display().to_string());
        match key {
            "paths.packages_dir" => path(&self.paths.packages_dir),
            "paths.repository_file" => path(&self.paths.repository_file),
            "paths.repository_dir" => path(&self.paths.repository_dir),
            "paths.log_dir" => path(&self.paths.log_dir),

            "sandbox.extra_params" => Some(self.sandbox.extra_params.clone()),
            "sandbox.network_command" => Some(self.sandbox.network_command.join(" ")),
            "sandbox.passwordless_sudo" => Some(self.sandbox.passwordless_sudo.to_string()),

            "build.user_uid" => Some(self.build.user_uid.to_string()),
            "build.artifact_format" => Some(self.build.artifact_format.suffix().to_string()),
            "build.keep_going" => Some(self.build.keep_going.to_string()),
            "build.makepkg_flags" => Some(self.build.makepkg_flags.join(" ")),

            "tools.systemd_nspawn" => path(&self.tools.systemd_nspawn),
            "tools.makepkg" => path(&self.tools.makepkg),
            "tools.pacman" => path(&self.tools.pacman),
            "tools.repo_add" => path(&self.tools.repo_add),
            "tools.sudo" => path(&self.tools.sudo),
            "tools.bash" => path(&self.tools.bash),
            "tools.vercmp" => path(&self.tools.vercmp),

            _ => None,
        }
    }
}

const KEYS: &[&str] = &[
    "paths.packages_dir",
    "paths.repository_file",
    "paths.repository_dir",
    "paths.log_dir",
    "sandbox.extra_params",
    "sandbox.network_command",
    "sandbox.passwordless_sudo",
    "build.user_uid",
    "build.artifact_format",
    "build.keep_going",
    "build.makepkg_flags",
    "tools.systemd_nspawn",
    "tools.makepkg",
    "tools.pacman",
    "tools.repo_add",
    "tools.sudo",
    "tools.bash",
    "tools.vercmp",
];

/// Make `path` absolute against the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Whether `path` lives on the same filesystem as `/`
///
/// Paths that do not exist yet are judged by their nearest existing ancestor.
pub fn on_root_mount(path: &Path) -> bool {
    let root_dev = match fs::metadata("/") {
        Ok(meta) => meta.dev(),
        Err(_) => return false,
    };

    match absolute(path) {
        Ok(path) => path
            .ancestors()
            .find_map(|p| fs::metadata(p).ok())
            .map_or(false, |meta| meta.dev() == root_dev),
        Err(_) => false,
    }
}
