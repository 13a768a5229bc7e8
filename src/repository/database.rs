//! Reader for pacman repository databases
//!
//! A repository database is a (usually compressed) tar archive with one
//! directory per package revision, each holding a `desc` file:
//!
//! ```text
//! %NAME%
//! foo
//!
//! %VERSION%
//! 1.2-1
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Serialize;
use tar::Archive;
use xz2::read::XzDecoder;

use crate::error::{RepoManagerError, Result};
use crate::models::VersionCompare;

const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];

/// Package versions currently published in the repository
///
/// Names iterate in ascending order; each version list is newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepositoryRecord {
    packages: BTreeMap<String, Vec<String>>,
}

impl RepositoryRecord {
    /// Newest published version of a package
    pub fn newest(&self, name: &str) -> Option<&str> {
        self.packages
            .get(name)
            .and_then(|versions| versions.first())
            .map(String::as_str)
    }

    /// All published versions of a package, newest first
    pub fn versions(&self, name: &str) -> Option<&[String]> {
        self.packages.get(name).map(Vec::as_slice)
    }

    /// Number of distinct packages
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the repository holds no packages
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate over packages and their versions
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.packages
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.as_slice()))
    }
}

impl From<BTreeMap<String, Vec<String>>> for RepositoryRecord {
    /// Wrap versions that are already ordered newest first
    fn from(packages: BTreeMap<String, Vec<String>>) -> Self {
        Self { packages }
    }
}

/// Compression detected from the archive's leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Xz,
    Gzip,
    Zstd,
    None,
}

impl Compression {
    fn detect(header: &[u8]) -> Self {
        if header.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if header.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if header.starts_with(ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Reads package/version pairs out of a repository database archive
pub struct RepositoryReader<'a> {
    path: PathBuf,
    vercmp: &'a dyn VersionCompare,
}

impl<'a> RepositoryReader<'a> {
    /// Create a reader for the given database file
    pub fn new(path: impl AsRef<Path>, vercmp: &'a dyn VersionCompare) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            vercmp,
        }
    }

    /// Read the database
    ///
    /// A missing or empty file is a valid, empty repository. Entries
    /// whose `desc` lacks a name or version are skipped with a warning.
    pub fn read(&self) -> Result<RepositoryRecord> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} does not exist yet", self.path.display());
                return Ok(RepositoryRecord::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let header = reader.fill_buf()?;
        if header.is_empty() {
            return Ok(RepositoryRecord::default());
        }

        let mut packages = match Compression::detect(header) {
            Compression::Xz => Self::collect(XzDecoder::new(reader))?,
            Compression::Gzip => Self::collect(GzDecoder::new(reader))?,
            Compression::Zstd => Self::collect(zstd::Decoder::with_buffer(reader)?)?,
            Compression::None => Self::collect(reader)?,
        };

        for versions in packages.values_mut() {
            self.vercmp.sort_newest_first(versions)?;
        }

        Ok(RepositoryRecord { packages })
    }

    /// Gather every `desc` entry of the archive
    fn collect<R: Read>(reader: R) -> Result<BTreeMap<String, Vec<String>>> {
        let mut archive = Archive::new(reader);
        let mut packages: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let entry_path = entry.path()?.into_owned();
            if entry_path.file_name().map_or(true, |name| name != "desc") {
                continue;
            }

            let mut content = String::new();
            entry.read_to_string(&mut content)?;

            match parse_desc(&content) {
                Ok((name, version)) => packages.entry(name).or_default().push(version),
                Err(e) => tracing::warn!("Skipping {}: {}", entry_path.display(), e),
            }
        }

        Ok(packages)
    }
}

/// Extract name and version from a `desc` file
pub fn parse_desc(content: &str) -> Result<(String, String)> {
    let mut name = None;
    let mut version = None;
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        match line.trim_end() {
            "%NAME%" => name = lines.next().map(|v| v.trim().to_string()),
            "%VERSION%" => version = lines.next().map(|v| v.trim().to_string()),
            _ => {}
        }
        if name.is_some() && version.is_some() {
            break;
        }
    }

    match (name, version) {
        (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
            Ok((name, version))
        }
        (Some(name), _) if !name.is_empty() => Err(RepoManagerError::malformed(format!(
            "desc entry for {} has no %VERSION% value",
            name
        ))),
        _ => Err(RepoManagerError::malformed("desc entry has no %NAME% value")),
    }
}
