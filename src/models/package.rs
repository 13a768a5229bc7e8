//! Package representation

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RepoManagerError, Result};

/// A package directory handled by the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Directory name, unique within the packages directory
    pub name: String,
    /// Absolute path of the package directory
    pub dir: PathBuf,
    /// Upstream repository checked out by the preparation script
    pub source: Option<String>,
}

impl Package {
    /// Create a package descriptor
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, source: Option<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            source,
        }
    }

    /// Path of the preparation script
    pub fn prepare_script(&self) -> PathBuf {
        self.dir.join(PREPARE_SCRIPT)
    }

    /// Whether an upstream source was identified
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

/// Name of the per-package preparation script
pub const PREPARE_SCRIPT: &str = "prepare.sh";

/// Versions declared by a package's build description
///
/// A single PKGBUILD may produce several packages; they all share the
/// version assembled from `epoch`, `pkgver` and `pkgrel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Produced package names, in declaration order
    pub names: Vec<String>,
    /// Full `[epoch:]pkgver[-pkgrel]` version
    pub version: String,
}

impl SourceInfo {
    /// Parse the output of `makepkg --printsrcinfo`
    pub fn parse(srcinfo: &str) -> Result<Self> {
        lazy_static::lazy_static! {
            static ref SRCINFO_RE: Regex = Regex::new(
                r"^\s*(epoch|pkgver|pkgrel|pkgname) = (.+)$"
            ).unwrap();
        }

        let mut names = Vec::new();
        let mut fields: BTreeMap<&str, String> = BTreeMap::new();

        for line in srcinfo.lines() {
            if let Some(caps) = SRCINFO_RE.captures(line) {
                let key = caps.get(1).map_or("", |m| m.as_str());
                let value = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
                if key == "pkgname" {
                    names.push(value);
                } else {
                    fields.insert(key, value);
                }
            }
        }

        let pkgver = fields
            .get("pkgver")
            .ok_or_else(|| RepoManagerError::malformed("build metadata declares no pkgver"))?;
        if names.is_empty() {
            return Err(RepoManagerError::malformed(
                "build metadata declares no pkgname",
            ));
        }

        let version = assemble_version(
            fields.get("epoch").map(String::as_str),
            pkgver,
            fields.get("pkgrel").map(String::as_str),
        );

        Ok(Self { names, version })
    }

    /// Pairs of produced package name and its version
    pub fn versions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(move |name| (name.as_str(), self.version.as_str()))
    }
}

/// Build `[epoch:]pkgver[-pkgrel]`
pub fn assemble_version(epoch: Option<&str>, pkgver: &str, pkgrel: Option<&str>) -> String {
    let mut version = pkgver.to_string();
    if let Some(rel) = pkgrel {
        version = format!("{}-{}", version, rel);
    }
    if let Some(epoch) = epoch {
        version = format!("{}:{}", epoch, version);
    }
    version
}

/// Archive format of the packages produced by makepkg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    /// .tar.xz
    #[default]
    TarXz,
    /// .tar.zst
    TarZst,
    /// .tar.gz
    TarGz,
}

impl ArtifactFormat {
    /// Filename suffix identifying an artifact
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::TarXz => ".tar.xz",
            Self::TarZst => ".tar.zst",
            Self::TarGz => ".tar.gz",
        }
    }

    /// Whether the file name carries this format's suffix
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.ends_with(self.suffix()))
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
