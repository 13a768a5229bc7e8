//! Package version ordering
//!
//! Versions follow the pacman `[epoch:]pkgver[-pkgrel]` layout and are
//! ordered segment by segment, numeric runs numerically and alphabetic
//! runs lexically, the way `vercmp(8)` does it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{RepoManagerError, Result};

/// Total order over package version strings
pub trait VersionCompare {
    /// Three-way comparison of two version strings
    fn compare(&self, a: &str, b: &str) -> Result<Ordering>;

    /// Whether `version` is strictly newer than `reference`
    ///
    /// A missing reference means there is no prior version, so any
    /// version counts as newer.
    fn is_newer(&self, version: &str, reference: Option<&str>) -> Result<bool> {
        match reference {
            None => Ok(true),
            Some(reference) => Ok(self.compare(version, reference)? == Ordering::Greater),
        }
    }

    /// Sort versions newest first
    ///
    /// Stable insertion sort; the first failed comparison is returned and
    /// leaves the slice partially sorted.
    fn sort_newest_first(&self, versions: &mut [String]) -> Result<()> {
        for i in 1..versions.len() {
            let mut j = i;
            while j > 0 && self.compare(&versions[j], &versions[j - 1])? == Ordering::Greater {
                versions.swap(j, j - 1);
                j -= 1;
            }
        }
        Ok(())
    }
}

/// Delegates comparison to the system `vercmp` executable
#[derive(Debug, Clone)]
pub struct SystemVercmp {
    program: PathBuf,
}

impl SystemVercmp {
    /// Create a comparator backed by the given `vercmp` binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the backing executable
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl VersionCompare for SystemVercmp {
    fn compare(&self, a: &str, b: &str) -> Result<Ordering> {
        let output = Command::new(&self.program).arg(a).arg(b).output()?;
        if !output.status.success() {
            return Err(RepoManagerError::execution(
                format!("{} {} {}", self.program.display(), a, b),
                output.status,
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: i32 = stdout.trim().parse().map_err(|_| {
            RepoManagerError::malformed(format!(
                "vercmp printed '{}' when comparing {} and {}",
                stdout.trim(),
                a,
                b
            ))
        })?;
        Ok(value.cmp(&0))
    }
}

/// In-process implementation of the pacman version ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeVercmp;

impl VersionCompare for NativeVercmp {
    fn compare(&self, a: &str, b: &str) -> Result<Ordering> {
        Ok(compare_versions(a, b))
    }
}

/// Pick the system tool when installed, the native rule otherwise
pub fn default_comparator(vercmp: &Path) -> Box<dyn VersionCompare> {
    if vercmp.is_file() {
        Box::new(SystemVercmp::new(vercmp))
    } else {
        tracing::debug!(
            "{} not found, using built-in version ordering",
            vercmp.display()
        );
        Box::new(NativeVercmp)
    }
}

/// Split `[epoch:]pkgver[-pkgrel]` into its three fields
fn split_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let digits = evr.bytes().take_while(u8::is_ascii_digit).count();

    let (epoch, rest) = if evr[digits..].starts_with(':') {
        let epoch = &evr[..digits];
        (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
    } else {
        ("0", evr)
    };

    match rest.rfind('-') {
        Some(pos) => (epoch, &rest[..pos], Some(&rest[pos + 1..])),
        None => (epoch, rest, None),
    }
}

/// Compare two full version strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch_a, ver_a, rel_a) = split_evr(a);
    let (epoch_b, ver_b, rel_b) = split_evr(b);

    compare_segments(epoch_a, epoch_b)
        .then_with(|| compare_segments(ver_a, ver_b))
        .then_with(|| match (rel_a, rel_b) {
            (Some(x), Some(y)) => compare_segments(x, y),
            // pkgrel only breaks ties when both sides carry one
            _ => Ordering::Equal,
        })
}

/// Segment-wise comparison of a single version field
fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < one.len() && j < two.len() {
        let (sep_i, sep_j) = (i, j);
        while i < one.len() && !one[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() {
            j += 1;
        }
        if i == one.len() || j == two.len() {
            break;
        }

        // Differing separator runs settle it
        if i - sep_i != j - sep_j {
            return (i - sep_i).cmp(&(j - sep_j));
        }

        let numeric = one[i].is_ascii_digit();
        let class: fn(&u8) -> bool = if numeric {
            u8::is_ascii_digit
        } else {
            u8::is_ascii_alphabetic
        };

        let start_i = i;
        let start_j = j;
        while i < one.len() && class(&one[i]) {
            i += 1;
        }
        while j < two.len() && class(&two[j]) {
            j += 1;
        }

        let seg_one = &one[start_i..i];
        let seg_two = &two[start_j..j];

        // Numeric segments beat alphabetic ones
        if seg_two.is_empty() {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let ordering = if numeric {
            let seg_one = trim_leading_zeros(seg_one);
            let seg_two = trim_leading_zeros(seg_two);
            seg_one
                .len()
                .cmp(&seg_two.len())
                .then_with(|| seg_one.cmp(seg_two))
        } else {
            seg_one.cmp(seg_two)
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    let one_done = i >= one.len();
    let two_done = j >= two.len();
    if one_done && two_done {
        return Ordering::Equal;
    }

    // A trailing alphabetic part never beats an exhausted string
    if (one_done && !two[j].is_ascii_alphabetic()) || (!one_done && one[i].is_ascii_alphabetic()) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn trim_leading_zeros(segment: &[u8]) -> &[u8] {
    let zeros = segment.iter().take_while(|&&c| c == b'0').count();
    &segment[zeros..]
}
