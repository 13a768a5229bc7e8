//! Per-package build pipeline run inside the sandbox

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use console::style;

use super::artifacts::collect_artifacts;
use super::executor::{BuildHost, Step};
use crate::config::{absolute, Config, SandboxConfig};
use crate::error::Result;
use crate::models::{ArtifactFormat, Package, SourceInfo, VersionCompare};
use crate::repository::RepositoryRecord;
use crate::sandbox::{with_scoped, ScopedTempDirectory};

/// Variable pointing preparation scripts at their package directory
pub const PREPARE_DIR_ENV: &str = "prepare_dir";

/// Variable telling makepkg where to put finished packages
pub const PKGDEST_ENV: &str = "PKGDEST";

/// Marker listing packages that failed during a keep-going run
pub const FAILED_PACKAGES_FILE: &str = ".failed-packages";

/// Directory under the destination holding archives of failed packages
pub const FAILED_ARTIFACTS_DIR: &str = ".failed";

/// Default location of the sudoers file inside the container
pub const SUDOERS_PATH: &str = "/etc/sudoers";

/// Result of running the pipeline for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing newer than the repository's copy
    Skipped,
    /// Built and installed into the container
    Built {
        /// Produced package names
        names: Vec<String>,
        /// Their shared version
        version: String,
    },
}

/// What to do when a package fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run on the first failure
    FailFast,
    /// Log the failure and continue with the next package
    KeepGoing,
}

impl From<bool> for FailurePolicy {
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Self::KeepGoing
        } else {
            Self::FailFast
        }
    }
}

/// Package names grouped by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Built and installed into the container
    pub built: Vec<String>,
    /// Already up to date in the repository
    pub skipped: Vec<String>,
    /// Failed under [`FailurePolicy::KeepGoing`]
    pub failed: Vec<String>,
}

/// Tools and locations used by the pipeline
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Shell running preparation scripts
    pub bash: PathBuf,
    /// makepkg executable
    pub makepkg: PathBuf,
    /// pacman executable, used for local installs
    pub pacman: PathBuf,
    /// Flags for the actual build invocation
    pub makepkg_flags: Vec<String>,
    /// Suffix identifying finished packages
    pub artifact_format: ArtifactFormat,
    /// Directory receiving finished packages, shared by every package of the run
    pub destination: PathBuf,
    /// Where scratch build directories are created (system temp dir if unset)
    pub scratch_base: Option<PathBuf>,
}

impl BuildSettings {
    /// Take tools and build options from the configuration
    pub fn from_config(config: &Config, destination: &Path) -> Result<Self> {
        Ok(Self {
            bash: config.tools.bash.clone(),
            makepkg: config.tools.makepkg.clone(),
            pacman: config.tools.pacman.clone(),
            makepkg_flags: config.build.makepkg_flags.clone(),
            artifact_format: config.build.artifact_format,
            destination: absolute(destination)?,
            scratch_base: None,
        })
    }
}

/// Prepares, version-checks, builds and installs packages one by one
pub struct BuildPipeline<'a> {
    host: &'a dyn BuildHost,
    repo: &'a RepositoryRecord,
    vercmp: &'a dyn VersionCompare,
    settings: BuildSettings,
}

impl<'a> BuildPipeline<'a> {
    /// Create a pipeline comparing against `repo`
    pub fn new(
        host: &'a dyn BuildHost,
        repo: &'a RepositoryRecord,
        vercmp: &'a dyn VersionCompare,
        settings: BuildSettings,
    ) -> Self {
        Self {
            host,
            repo,
            vercmp,
            settings,
        }
    }

    /// Build every package in order according to `policy`
    pub fn build_all(&self, packages: &[Package], policy: FailurePolicy) -> Result<BuildSummary> {
        let mut summary = BuildSummary::default();

        for package in packages {
            println!(
                "\n{}\n===========================",
                style(format!("BUILD FOR {}", package.name)).bold()
            );

            match self.build(package) {
                Ok(Outcome::Built { .. }) => summary.built.push(package.name.clone()),
                Ok(Outcome::Skipped) => summary.skipped.push(package.name.clone()),
                Err(e) if policy == FailurePolicy::KeepGoing => {
                    tracing::error!("Build for {} failed: {}", package.name, e);
                    summary.failed.push(package.name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    /// Run the pipeline for a single package in a fresh scratch directory
    pub fn build(&self, package: &Package) -> Result<Outcome> {
        let scratch = match &self.settings.scratch_base {
            Some(base) => ScopedTempDirectory::new_in(base)?,
            None => ScopedTempDirectory::new()?,
        };
        with_scoped(scratch, |build_dir| self.build_in(package, build_dir))
    }

    fn build_in(&self, package: &Package, build_dir: &Path) -> Result<Outcome> {
        let settings = &self.settings;
        let env = self.environment(package)?;

        // makepkg refuses to run as root, so both directories go to the build user
        self.host.claim(&settings.destination)?;
        self.host.claim(build_dir)?;

        println!("Preparing the package for build...");
        self.host.run(
            &Step::new(&settings.bash, build_dir)
                .arg(package.prepare_script())
                .envs(&env),
        )?;

        println!("Checking package version (will not build if older or same as current)...");
        let srcinfo = self.host.capture(
            &Step::new(&settings.makepkg, build_dir)
                .arg("--printsrcinfo")
                .envs(&env),
        )?;
        let info = SourceInfo::parse(&srcinfo)?;

        if !self.needs_build(&info)? {
            println!(
                "None of the build artifacts are newer than contents of the local repository, skipping..."
            );
            return Ok(Outcome::Skipped);
        }

        // Archives of earlier packages in the same run are already installed
        let existing: HashSet<PathBuf> =
            collect_artifacts(&settings.destination, settings.artifact_format)?
                .into_iter()
                .collect();

        let result = self.build_and_install(build_dir, &env, &existing);
        if result.is_err() {
            self.set_aside(package, &existing);
        }
        result?;

        Ok(Outcome::Built {
            names: info.names,
            version: info.version,
        })
    }

    fn build_and_install(
        &self,
        build_dir: &Path,
        env: &[(String, OsString)],
        existing: &HashSet<PathBuf>,
    ) -> Result<()> {
        let settings = &self.settings;

        println!("Building the package...");
        self.host.run(
            &Step::new(&settings.makepkg, build_dir)
                .args(&settings.makepkg_flags)
                .envs(env),
        )?;

        // Later packages of the same run may need this one as a build dependency
        println!("Installing the new packages in the container...");
        let produced = self.produced_since(existing)?;
        self.host.run(
            &Step::new(&settings.pacman, &settings.destination)
                .args(["--needed", "--noconfirm", "-U"])
                .args(produced)
                .envs(env)
                .as_root(),
        )
    }

    /// Archives in the destination that were not there before
    fn produced_since(&self, existing: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
        let mut produced: Vec<PathBuf> =
            collect_artifacts(&self.settings.destination, self.settings.artifact_format)?
                .into_iter()
                .filter(|path| !existing.contains(path))
                .collect();
        produced.sort();
        Ok(produced)
    }

    /// Move a failed package's archives out of the destination
    ///
    /// They end up in `<destination>/.failed/<package>` so nothing
    /// publishes them.
    fn set_aside(&self, package: &Package, existing: &HashSet<PathBuf>) {
        let produced = match self.produced_since(existing) {
            Ok(produced) => produced,
            Err(e) => {
                tracing::warn!("Could not list archives left by {}: {}", package.name, e);
                return;
            }
        };
        if produced.is_empty() {
            return;
        }

        let target = self
            .settings
            .destination
            .join(FAILED_ARTIFACTS_DIR)
            .join(&package.name);
        if let Err(e) = fs::create_dir_all(&target) {
            tracing::warn!("Could not create {}: {}", target.display(), e);
            return;
        }
        for path in produced {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let moved = target.join(file_name);
            match fs::rename(&path, &moved) {
                Ok(()) => tracing::info!("Set aside {}", moved.display()),
                Err(e) => tracing::warn!("Could not move {}: {}", path.display(), e),
            }
        }
    }

    /// Whether any produced package is newer than the repository's copy
    fn needs_build(&self, info: &SourceInfo) -> Result<bool> {
        for (name, version) in info.versions() {
            let current = self.repo.newest(name);
            if self.vercmp.is_newer(version, current)? {
                tracing::debug!(
                    "{} {} is newer than {}",
                    name,
                    version,
                    current.unwrap_or("nothing")
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn environment(&self, package: &Package) -> Result<Vec<(String, OsString)>> {
        Ok(vec![
            (
                PREPARE_DIR_ENV.to_string(),
                absolute(&package.dir)?.into_os_string(),
            ),
            (
                PKGDEST_ENV.to_string(),
                self.settings.destination.clone().into_os_string(),
            ),
        ])
    }
}

/// Make the container ready for building
///
/// Optionally lets every user sudo without a password (for `makepkg -s`)
/// and brings up the container's network interface.
pub fn prepare_container(config: &SandboxConfig, host: &dyn BuildHost, sudoers: &Path) -> Result<()> {
    if config.passwordless_sudo {
        println!("Configuring sudo permissions...");
        fs::write(sudoers, "ALL ALL=(ALL) NOPASSWD: ALL\n")?;
    }

    if let Some((program, args)) = config.network_command.split_first() {
        println!("Configuring internal network connection...");
        host.run(&Step::new(program, "/").args(args).as_root())?;
    }

    Ok(())
}

/// Leave the names of failed packages next to the artifacts
pub fn record_failed_packages(destination: &Path, failed: &[String]) -> Result<()> {
    if failed.is_empty() {
        return Ok(());
    }
    let mut content = failed.join("\n");
    content.push('\n');
    fs::write(destination.join(FAILED_PACKAGES_FILE), content)?;
    Ok(())
}

/// Names recorded by [`record_failed_packages`], empty if none were
pub fn read_failed_packages(destination: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(destination.join(FAILED_PACKAGES_FILE)) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::executor::RunAs;
    use crate::config::ToolsConfig;
    use crate::error::RepoManagerError;
    use crate::models::NativeVercmp;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    /// Records steps instead of running them; makepkg "produces" archives
    #[derive(Default)]
    struct FakeHost {
        srcinfo: HashMap<String, String>,
        failing: Option<(String, &'static str)>,
        steps: RefCell<Vec<Step>>,
        claimed: RefCell<Vec<PathBuf>>,
    }

    impl FakeHost {
        fn with_srcinfo(mut self, package: &str, name: &str, version: &str) -> Self {
            let (pkgver, pkgrel) = version.split_once('-').unwrap();
            self.srcinfo.insert(
                package.to_string(),
                format!(
                    "pkgbase = {0}\n\tpkgver = {1}\n\tpkgrel = {2}\n\npkgname = {0}\n",
                    name, pkgver, pkgrel
                ),
            );
            self
        }

        fn failing_at(mut self, package: &str, program: &'static str) -> Self {
            self.failing = Some((package.to_string(), program));
            self
        }

        fn env<'s>(step: &'s Step, key: &str) -> Option<&'s OsString> {
            step.env.iter().find(|(k, _)| k == key).map(|(_, v)| v)
        }

        fn package_of(step: &Step) -> String {
            Self::env(step, PREPARE_DIR_ENV)
                .and_then(|dir| Path::new(dir).file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        }

        fn program_of(step: &Step) -> String {
            step.program
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        }

        fn check(&self, step: &Step) -> Result<()> {
            self.steps.borrow_mut().push(step.clone());
            if let Some((package, program)) = &self.failing {
                if *package == Self::package_of(step) && *program == Self::program_of(step) {
                    return Err(RepoManagerError::SandboxExecution {
                        command: step.to_string(),
                        status: "exit status: 1".to_string(),
                    });
                }
            }
            Ok(())
        }

        fn programs(&self) -> Vec<String> {
            self.steps.borrow().iter().map(Self::program_of).collect()
        }
    }

    impl BuildHost for FakeHost {
        fn claim(&self, dir: &Path) -> Result<()> {
            self.claimed.borrow_mut().push(dir.to_path_buf());
            Ok(())
        }

        fn run(&self, step: &Step) -> Result<()> {
            self.check(step)?;
            if Self::program_of(step) == "makepkg" {
                let package = Self::package_of(step);
                let info = SourceInfo::parse(&self.srcinfo[&package])?;
                let dest = PathBuf::from(Self::env(step, PKGDEST_ENV).unwrap());
                for name in &info.names {
                    fs::write(
                        dest.join(format!("{}-{}-x86_64.pkg.tar.xz", name, info.version)),
                        b"",
                    )?;
                }
            }
            Ok(())
        }

        fn capture(&self, step: &Step) -> Result<String> {
            self.check(step)?;
            Ok(self
                .srcinfo
                .get(&Self::package_of(step))
                .cloned()
                .unwrap_or_default())
        }
    }

    struct Fixture {
        packages: TempDir,
        destination: TempDir,
        scratch: TempDir,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let packages = TempDir::new().unwrap();
            for name in names {
                fs::create_dir(packages.path().join(name)).unwrap();
            }
            Self {
                packages,
                destination: TempDir::new().unwrap(),
                scratch: TempDir::new().unwrap(),
            }
        }

        fn package(&self, name: &str) -> Package {
            Package::new(
                name,
                self.packages.path().join(name),
                Some(format!("https://example.com/{}.git", name)),
            )
        }

        fn settings(&self) -> BuildSettings {
            let tools = ToolsConfig::default();
            BuildSettings {
                bash: tools.bash,
                makepkg: tools.makepkg,
                pacman: tools.pacman,
                makepkg_flags: vec!["-sc".to_string(), "--noconfirm".to_string()],
                artifact_format: ArtifactFormat::TarXz,
                destination: self.destination.path().to_path_buf(),
                scratch_base: Some(self.scratch.path().to_path_buf()),
            }
        }

        fn artifacts(&self) -> Vec<PathBuf> {
            let mut found =
                collect_artifacts(self.destination.path(), ArtifactFormat::TarXz).unwrap();
            found.sort();
            found
        }

        fn scratch_is_empty(&self) -> bool {
            fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    fn repo(entries: &[(&str, &str)]) -> RepositoryRecord {
        let mut packages = BTreeMap::new();
        for (name, version) in entries {
            packages.insert(name.to_string(), vec![version.to_string()]);
        }
        RepositoryRecord::from(packages)
    }

    #[test]
    fn test_newer_version_is_built_and_installed() {
        let fixture = Fixture::new(&["foo"]);
        let host = FakeHost::default().with_srcinfo("foo", "foo", "1.1-1");
        let repo = repo(&[("foo", "1.0-1")]);
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let outcome = pipeline.build(&fixture.package("foo")).unwrap();
        assert_eq!(
            outcome,
            Outcome::Built {
                names: vec!["foo".to_string()],
                version: "1.1-1".to_string()
            }
        );
        assert_eq!(host.programs(), vec!["bash", "makepkg", "makepkg", "pacman"]);

        let steps = host.steps.borrow();
        assert_eq!(steps[0].run_as, RunAs::BuildUser);
        assert_eq!(steps[0].args, vec![OsString::from(fixture.package("foo").prepare_script())]);
        assert_eq!(
            FakeHost::env(&steps[0], PREPARE_DIR_ENV),
            Some(&fixture.packages.path().join("foo").into_os_string())
        );
        assert_eq!(steps[1].args, vec![OsString::from("--printsrcinfo")]);
        assert_eq!(steps[2].args, vec![OsString::from("-sc"), OsString::from("--noconfirm")]);

        let install = &steps[3];
        assert_eq!(install.run_as, RunAs::Root);
        assert_eq!(install.cwd, fixture.destination.path());
        let artifact = fixture.destination.path().join("foo-1.1-1-x86_64.pkg.tar.xz");
        assert_eq!(install.args.last(), Some(&artifact.into_os_string()));

        let claimed = host.claimed.borrow();
        assert_eq!(claimed[0], fixture.destination.path());
        assert!(claimed[1].starts_with(fixture.scratch.path()));
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_same_version_stops_before_build() {
        let fixture = Fixture::new(&["foo"]);
        let host = FakeHost::default().with_srcinfo("foo", "foo", "1.0-1");
        let repo = repo(&[("foo", "1.0-1")]);
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let outcome = pipeline.build(&fixture.package("foo")).unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(host.programs(), vec!["bash", "makepkg"]);
        assert!(fixture.artifacts().is_empty());
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_older_version_is_skipped() {
        let fixture = Fixture::new(&["foo"]);
        let host = FakeHost::default().with_srcinfo("foo", "foo", "1.0-1");
        let repo = repo(&[("foo", "1.0-2")]);
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        assert_eq!(pipeline.build(&fixture.package("foo")).unwrap(), Outcome::Skipped);
    }

    #[test]
    fn test_empty_repository_always_builds() {
        let fixture = Fixture::new(&["foo"]);
        let host = FakeHost::default().with_srcinfo("foo", "foo", "0.1-1");
        let repo = RepositoryRecord::default();
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        assert!(matches!(
            pipeline.build(&fixture.package("foo")).unwrap(),
            Outcome::Built { .. }
        ));
        assert_eq!(fixture.artifacts().len(), 1);
    }

    #[test]
    fn test_malformed_metadata_aborts_before_build() {
        let fixture = Fixture::new(&["foo"]);
        let mut host = FakeHost::default();
        host.srcinfo
            .insert("foo".to_string(), "pkgbase = foo\n\tpkgrel = 1\n".to_string());
        let repo = RepositoryRecord::default();
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let err = pipeline.build(&fixture.package("foo")).unwrap_err();
        assert!(matches!(err, RepoManagerError::MalformedMetadata(_)));
        assert_eq!(host.programs(), vec!["bash", "makepkg"]);
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_failure_aborts_run_by_default() {
        let fixture = Fixture::new(&["a", "b"]);
        let host = FakeHost::default()
            .with_srcinfo("a", "a", "1.0-1")
            .with_srcinfo("b", "b", "1.0-1")
            .failing_at("a", "makepkg");
        let repo = RepositoryRecord::default();
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let packages = vec![fixture.package("a"), fixture.package("b")];
        let err = pipeline
            .build_all(&packages, FailurePolicy::FailFast)
            .unwrap_err();
        assert!(matches!(err, RepoManagerError::SandboxExecution { .. }));

        // Nothing of b ran
        assert!(host
            .steps
            .borrow()
            .iter()
            .all(|step| FakeHost::package_of(step) != "b"));
        assert!(fixture.artifacts().is_empty());
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_keep_going_continues_past_failure() {
        let fixture = Fixture::new(&["a", "b", "c"]);
        let host = FakeHost::default()
            .with_srcinfo("a", "a", "1.0-1")
            .with_srcinfo("b", "b", "1.0-1")
            .with_srcinfo("c", "c", "2.0-1")
            .failing_at("a", "bash");
        let repo = repo(&[("c", "2.0-1")]);
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let packages = vec![fixture.package("a"), fixture.package("b"), fixture.package("c")];
        let summary = pipeline
            .build_all(&packages, FailurePolicy::KeepGoing)
            .unwrap();
        assert_eq!(
            summary,
            BuildSummary {
                built: vec!["b".to_string()],
                skipped: vec!["c".to_string()],
                failed: vec!["a".to_string()],
            }
        );
        assert_eq!(
            fixture.artifacts(),
            vec![fixture.destination.path().join("b-1.0-1-x86_64.pkg.tar.xz")]
        );
    }

    #[test]
    fn test_failed_install_keeps_archives_out_of_the_run() {
        let fixture = Fixture::new(&["a", "b"]);
        let host = FakeHost::default()
            .with_srcinfo("a", "a", "1.0-1")
            .with_srcinfo("b", "b", "1.0-1")
            .failing_at("a", "pacman");
        let repo = RepositoryRecord::default();
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        let packages = vec![fixture.package("a"), fixture.package("b")];
        let summary = pipeline
            .build_all(&packages, FailurePolicy::KeepGoing)
            .unwrap();
        assert_eq!(summary.built, vec!["b"]);
        assert_eq!(summary.failed, vec!["a"]);

        let a_archive = fixture.destination.path().join("a-1.0-1-x86_64.pkg.tar.xz");
        let b_archive = fixture.destination.path().join("b-1.0-1-x86_64.pkg.tar.xz");

        // b's install step only sees b's archive
        let steps = host.steps.borrow();
        let b_install = steps
            .iter()
            .find(|step| {
                FakeHost::program_of(step) == "pacman" && FakeHost::package_of(step) == "b"
            })
            .unwrap();
        assert_eq!(b_install.args.last(), Some(&b_archive.clone().into_os_string()));
        assert!(!b_install.args.contains(&a_archive.into_os_string()));

        assert_eq!(fixture.artifacts(), vec![b_archive]);
        assert!(fixture
            .destination
            .path()
            .join(FAILED_ARTIFACTS_DIR)
            .join("a")
            .join("a-1.0-1-x86_64.pkg.tar.xz")
            .is_file());
    }

    #[test]
    fn test_install_only_passes_new_archives() {
        let fixture = Fixture::new(&["foo"]);
        let stale = fixture.destination.path().join("old-0.1-1-x86_64.pkg.tar.xz");
        fs::write(&stale, b"").unwrap();
        let host = FakeHost::default().with_srcinfo("foo", "foo", "1.0-1");
        let repo = RepositoryRecord::default();
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        pipeline.build(&fixture.package("foo")).unwrap();
        let steps = host.steps.borrow();
        let install = steps.last().unwrap();
        assert_eq!(
            install.args[3..].to_vec(),
            vec![fixture
                .destination
                .path()
                .join("foo-1.0-1-x86_64.pkg.tar.xz")
                .into_os_string()]
        );
        assert!(stale.is_file());
    }

    #[test]
    fn test_split_package_builds_when_any_part_is_newer() {
        let fixture = Fixture::new(&["mesa"]);
        let mut host = FakeHost::default();
        host.srcinfo.insert(
            "mesa".to_string(),
            "pkgbase = mesa\n\tpkgver = 23.1\n\tpkgrel = 1\n\npkgname = mesa\n\npkgname = lib32-mesa\n"
                .to_string(),
        );
        let repo = repo(&[("mesa", "23.1-1")]);
        let pipeline = BuildPipeline::new(&host, &repo, &NativeVercmp, fixture.settings());

        assert!(matches!(
            pipeline.build(&fixture.package("mesa")).unwrap(),
            Outcome::Built { .. }
        ));
        assert_eq!(fixture.artifacts().len(), 2);
    }

    #[test]
    fn test_prepare_container() {
        let dir = TempDir::new().unwrap();
        let sudoers = dir.path().join("sudoers");
        let host = FakeHost::default();

        prepare_container(&SandboxConfig::default(), &host, &sudoers).unwrap();
        assert_eq!(
            fs::read_to_string(&sudoers).unwrap(),
            "ALL ALL=(ALL) NOPASSWD: ALL\n"
        );
        let steps = host.steps.borrow();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].program, PathBuf::from("/usr/bin/dhclient"));
        assert_eq!(steps[0].args, vec![OsString::from("host0")]);
        assert_eq!(steps[0].run_as, RunAs::Root);
    }

    #[test]
    fn test_prepare_container_disabled() {
        let dir = TempDir::new().unwrap();
        let sudoers = dir.path().join("sudoers");
        let host = FakeHost::default();
        let config = SandboxConfig {
            extra_params: String::new(),
            network_command: Vec::new(),
            passwordless_sudo: false,
        };

        prepare_container(&config, &host, &sudoers).unwrap();
        assert!(!sudoers.exists());
        assert!(host.steps.borrow().is_empty());
    }

    #[test]
    fn test_failed_packages_marker() {
        let dir = TempDir::new().unwrap();
        assert!(read_failed_packages(dir.path()).unwrap().is_empty());

        record_failed_packages(dir.path(), &[]).unwrap();
        assert!(!dir.path().join(FAILED_PACKAGES_FILE).exists());

        record_failed_packages(dir.path(), &["a".to_string(), "c".to_string()]).unwrap();
        assert_eq!(read_failed_packages(dir.path()).unwrap(), vec!["a", "c"]);
        assert!(collect_artifacts(dir.path(), ArtifactFormat::TarXz)
            .unwrap()
            .is_empty());
    }
}
