//! Formula records.
//!
//! A [`Formula`] is a static declaration: version, where the source comes from
//! and how to verify it, what it needs, how to install it, and how to prove the
//! install works. Records are plain data. Behavior lives in the strategy each
//! record references ([`InstallPlan`]), so several versions of the same
//! toolkit share one implementation.
//!
//! Records serialize to JSON, which is how extra formulae are supplied at
//! runtime (see [`crate::catalog`]).

use crate::error::{FormulaError, Result};
use crate::platform::{Arch, HostConfig, Os};
use crate::strategy::InstallPlan;
use crate::verify::TestStep;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Download location pattern shared by every version of a toolkit family.
///
/// Templates understand `{version}`, `{companion}` and, in `url`, `{filename}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPattern {
    pub url: String,
    pub filenames: BTreeMap<Arch, String>,
}

impl ArtifactPattern {
    /// NVIDIA's local runfile installers.
    pub fn cuda_runfile() -> Self {
        let mut filenames = BTreeMap::new();
        filenames.insert(
            Arch::X86_64,
            "cuda_{version}_{companion}_linux.run".to_string(),
        );
        filenames.insert(
            Arch::Arm64,
            "cuda_{version}_{companion}_linux_sbsa.run".to_string(),
        );

        Self {
            url: "https://developer.download.nvidia.com/compute/cuda/{version}/local_installers/{filename}"
                .to_string(),
            filenames,
        }
    }
}

/// Version and per-architecture checksums of a vendor artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    pub version: String,
    /// Version of the companion component baked into artifact names (the driver)
    pub companion_version: String,
    pub checksums: BTreeMap<Arch, String>,
    pub artifact: ArtifactPattern,
}

impl VersionSpec {
    pub fn new(
        version: &str,
        companion_version: &str,
        x86_64_sha256: &str,
        arm64_sha256: &str,
        artifact: ArtifactPattern,
    ) -> Self {
        let mut checksums = BTreeMap::new();
        checksums.insert(Arch::X86_64, x86_64_sha256.to_string());
        checksums.insert(Arch::Arm64, arm64_sha256.to_string());

        Self {
            version: version.to_string(),
            companion_version: companion_version.to_string(),
            checksums,
            artifact,
        }
    }

    /// `13.1` for `13.1.0`
    pub fn major_minor(&self) -> Option<String> {
        major_minor(&self.version)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(FormulaError::config("version must not be empty"));
        }
        if self.checksums.is_empty() {
            return Err(FormulaError::config(format!(
                "version {} declares no checksums",
                self.version
            )));
        }

        let mut seen: BTreeMap<&str, Arch> = BTreeMap::new();
        for (arch, sha) in &self.checksums {
            if !is_sha256_hex(sha) {
                return Err(FormulaError::config(format!(
                    "checksum for {} is not a sha256 hex digest: {}",
                    arch, sha
                )));
            }
            if let Some(other) = seen.insert(sha.as_str(), *arch) {
                return Err(FormulaError::config(format!(
                    "{} and {} declare the same checksum {}",
                    other, arch, sha
                )));
            }
            if !self.artifact.filenames.contains_key(arch) {
                return Err(FormulaError::config(format!(
                    "checksum declared for {} but no artifact filename",
                    arch
                )));
            }
        }

        Ok(())
    }
}

pub fn major_minor(version: &str) -> Option<String> {
    let mut parts = version.split('.');
    let major = parts.next().filter(|s| !s.is_empty())?;
    let minor = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("{}.{}", major, minor))
}

pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Where the bits to install come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Source {
    /// Per-architecture vendor installer verified by checksum
    Runfile(VersionSpec),
    /// Git checkout, optionally pinned to a tag
    Git {
        url: String,
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        revision: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Build,
    Test,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Condition::is_always")]
    pub when: Condition,
}

impl Dependency {
    fn new(name: &str, kind: DependencyKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            when: Condition::Always,
        }
    }

    pub fn build(name: &str) -> Self {
        Self::new(name, DependencyKind::Build)
    }

    pub fn test(name: &str) -> Self {
        Self::new(name, DependencyKind::Test)
    }

    pub fn runtime(name: &str) -> Self {
        Self::new(name, DependencyKind::Runtime)
    }

    pub fn on_linux(mut self) -> Self {
        self.when = Condition::Linux;
        self
    }

    /// Executable to look for on `PATH` when no keg is installed (`gcc@14` -> `gcc-14`)
    pub fn executable_name(&self) -> String {
        match self.name.split_once('@') {
            Some((base, version)) => format!("{}-{}", base, version),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub name: String,
    pub because: String,
}

/// User-selectable build option such as `with-docs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaOption {
    pub name: String,
    pub description: String,
}

/// Options given on the command line, stored without the `with-` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    enabled: BTreeSet<String>,
}

impl BuildOptions {
    pub fn from_flags<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // without-* is the default state of every option
        let enabled = flags
            .into_iter()
            .filter_map(|flag| {
                let flag = flag.as_ref().trim_start_matches("--");
                if flag.starts_with("without-") {
                    return None;
                }
                Some(flag.strip_prefix("with-").unwrap_or(flag).to_string())
            })
            .collect();
        Self { enabled }
    }

    pub fn with(&self, option: &str) -> bool {
        self.enabled.contains(option)
    }

    pub fn without(&self, option: &str) -> bool {
        !self.with(option)
    }

    pub fn flags(&self) -> Vec<String> {
        self.enabled.iter().map(|o| format!("with-{}", o)).collect()
    }
}

/// Precompiled bottle table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottleSpec {
    pub root_url: String,
    #[serde(default)]
    pub rebuild: u32,
    /// Bottle tag (`x86_64_linux`) to sha256
    pub files: BTreeMap<String, String>,
}

impl BottleSpec {
    /// Checksum for a tag, ignoring all-zero placeholders left by unfinished bottle builds
    pub fn checksum_for(&self, tag: &str) -> Option<&str> {
        self.files
            .get(tag)
            .map(String::as_str)
            .filter(|sha| is_sha256_hex(sha) && !sha.bytes().all(|b| b == b'0'))
    }
}

/// When a conditional step applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    #[default]
    Always,
    Linux,
    Macos,
    /// Only inside the upstream project's CI
    Upstream,
}

impl Condition {
    pub fn holds(self, host: &HostConfig) -> bool {
        match self {
            Condition::Always => true,
            Condition::Linux => host.os == Os::Linux,
            Condition::Macos => host.os == Os::Macos,
            Condition::Upstream => host.upstream_ci,
        }
    }

    pub fn is_always(&self) -> bool {
        *self == Condition::Always
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default, skip_serializing_if = "Condition::is_always")]
    pub when: Condition,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Livecheck {
    /// Scrape a page; `{major_minor}` in the regex pins the release line
    PageRegex { url: String, regex: String },
    /// Latest GitHub release tag, first capture group is the version
    GithubLatest { repo: String, regex: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub run: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub desc: String,
    pub homepage: String,
    #[serde(default)]
    pub license: Option<String>,
    pub version: String,
    pub source: Source,
    #[serde(default)]
    pub requirements: Vec<Os>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub options: Vec<FormulaOption>,
    #[serde(default)]
    pub bottle: Option<BottleSpec>,
    /// Keg-only formulae are never linked into the prefix
    #[serde(default)]
    pub keg_only: bool,
    pub install: InstallPlan,
    #[serde(default)]
    pub tests: Vec<TestStep>,
    #[serde(default)]
    pub caveats: Option<String>,
    #[serde(default)]
    pub post_install: Vec<Note>,
    #[serde(default)]
    pub livecheck: Option<Livecheck>,
    #[serde(default)]
    pub service: Option<Service>,
}

impl Formula {
    pub fn version_spec(&self) -> Option<&VersionSpec> {
        match &self.source {
            Source::Runfile(spec) => Some(spec),
            Source::Git { .. } => None,
        }
    }

    pub fn dependencies_of(&self, kind: DependencyKind) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(move |d| d.kind == kind)
    }

    /// Dependencies of `kind` that apply on `host`.
    pub fn host_dependencies<'a>(
        &'a self,
        kind: DependencyKind,
        host: &'a HostConfig,
    ) -> impl Iterator<Item = &'a Dependency> {
        self.dependencies_of(kind).filter(move |d| d.when.holds(host))
    }

    /// Check the record is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(FormulaError::config(format!(
                "invalid formula name '{}'",
                self.name
            )));
        }
        if let Some(spec) = self.version_spec() {
            spec.validate()?;
            if spec.version != self.version {
                return Err(FormulaError::config(format!(
                    "{}: version {} does not match artifact version {}",
                    self.name, self.version, spec.version
                )));
            }
        }
        for option in &self.options {
            if !option.name.starts_with("with-") && !option.name.starts_with("without-") {
                return Err(FormulaError::config(format!(
                    "{}: option '{}' must start with with- or without-",
                    self.name, option.name
                )));
            }
        }
        Ok(())
    }

    /// Platform requirement check, before anything is fetched.
    pub fn check_requirements(&self, host: &HostConfig) -> Result<()> {
        if self.requirements.is_empty() || self.requirements.contains(&host.os) {
            return Ok(());
        }
        let wanted: Vec<String> = self.requirements.iter().map(|os| os.to_string()).collect();
        Err(FormulaError::config(format!(
            "{} requires {} (host is {})",
            self.name,
            wanted.join(" or "),
            host.os
        )))
    }

    /// Reject options the record does not declare.
    pub fn check_options(&self, options: &BuildOptions) -> Result<()> {
        for flag in options.flags() {
            let known = self.options.iter().any(|o| {
                o.name == flag || o.name.strip_prefix("without-") == flag.strip_prefix("with-")
            });
            if !known {
                return Err(FormulaError::config(format!(
                    "{} has no option --{}",
                    self.name, flag
                )));
            }
        }
        Ok(())
    }
}
