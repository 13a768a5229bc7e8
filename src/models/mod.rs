//! Data models for packages and versions

mod package;
pub mod version;

pub use package::*;
pub use version::{NativeVercmp, SystemVercmp, VersionCompare};
