//! Finding the packages handled by the manager

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::{Package, PREPARE_SCRIPT};

lazy_static::lazy_static! {
    static ref REPO_ADDRESS_RE: Regex = Regex::new(r"^(?:ssh|https?)://").unwrap();
}

/// Scan `packages_dir` for package directories, sorted by name
///
/// Each package gets the upstream repository its preparation script clones,
/// if one can be found.
pub fn discover_packages(packages_dir: &Path) -> Result<Vec<Package>> {
    let mut packages = Vec::new();

    for entry in WalkDir::new(packages_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            // The packages directory itself must be readable
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                let path = e.path().unwrap_or(packages_dir).display().to_string();
                tracing::warn!("Skipping {}: {}", path, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let source = find_source_repository(entry.path());
        if source.is_none() {
            tracing::debug!("No upstream repository identified for {}", name);
        }
        packages.push(Package::new(name, entry.path(), source));
    }

    Ok(packages)
}

/// Extract the repository cloned by a package's preparation script
///
/// A missing or unreadable script simply yields `None`. Lines are decoded
/// lossily so comments in other encodings do not hide the clone line.
pub fn find_source_repository(package_dir: &Path) -> Option<String> {
    let script = package_dir.join(PREPARE_SCRIPT);
    let file = match File::open(&script) {
        Ok(file) => file,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not read {}: {}", script.display(), e);
            }
            return None;
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return None,
            Ok(_) => {
                if let Some(url) = clone_url(&String::from_utf8_lossy(&buf)) {
                    return Some(url);
                }
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {}", script.display(), e);
                return None;
            }
        }
    }
}

/// First URL argument of a `git clone` line
fn clone_url(line: &str) -> Option<String> {
    let mut words = line.split_whitespace();
    if words.next()? != "git" || words.next()? != "clone" {
        return None;
    }
    words
        .find(|word| REPO_ADDRESS_RE.is_match(word))
        .map(String::from)
}
