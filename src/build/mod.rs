//! Building packages inside the sandbox

pub mod artifacts;
pub mod discovery;
pub mod executor;
pub mod pipeline;

pub use artifacts::collect_artifacts;
pub use discovery::{discover_packages, find_source_repository};
pub use executor::{BuildHost, BuildUser, HostExecutor, RunAs, Step};
pub use pipeline::{
    prepare_container, read_failed_packages, record_failed_packages, BuildPipeline,
    BuildSettings, BuildSummary, FailurePolicy, Outcome, FAILED_ARTIFACTS_DIR, SUDOERS_PATH,
};
