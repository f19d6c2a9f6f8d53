//! Installer - drives one formula from record to verified keg.
//!
//! Order matters: every check that can fail without touching the network
//! (requirements, options, conflicts, dependencies, architecture resolution)
//! runs first. The keg directory is only created after the artifact has been
//! verified, and it is discarded again if anything after that fails, so a
//! failed install never leaves a half-populated keg behind.
//!
//! ```no_run
//! use formulary::catalog::Catalog;
//! use formulary::config::Config;
//! use formulary::installer::{InstallRequest, Installer};
//!
//! #[tokio::main]
//! async fn main() -> formulary::Result<()> {
//!     let config = Config::from_env(None, None)?;
//!     let catalog = Catalog::load(&config)?;
//!     let installer = Installer::new(&config)?;
//!
//!     let outcome = installer
//!         .install(catalog.get("cuda@13.1")?, &InstallRequest::default())
//!         .await?;
//!     println!("Installed {} {}", outcome.name, outcome.version);
//!     Ok(())
//! }
//! ```

use crate::bottle::{self, BottleFile};
use crate::cellar;
use crate::config::Config;
use crate::download::{self, Download};
use crate::error::{FormulaError, Result};
use crate::formula::{BuildOptions, Dependency, DependencyKind, Formula, Source};
use crate::layout::InstallLayout;
use crate::process;
use crate::receipt::{InstallReceipt, ReceiptSource};
use crate::resolver::{self, Artifact};
use crate::strategy::{InstallContext, InstallReport};
use crate::symlink;
use crate::verify::{self, TestOutcome};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// How to install, as chosen on the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub options: BuildOptions,
    /// Use this local file instead of downloading (still verified)
    pub artifact: Option<PathBuf>,
    /// Ignore any bottle and build from source
    pub build_from_source: bool,
    /// Run the formula's test procedure after installing
    pub run_tests: bool,
    /// Replace an existing keg of the same version
    pub force: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub strategy: String,
    pub poured_from_bottle: bool,
    pub report: InstallReport,
    pub linked: Vec<PathBuf>,
    /// Post-install notes and caveats, expanded for this keg
    pub messages: Vec<String>,
    #[serde(skip)]
    pub tests: Option<TestOutcome>,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UninstallOutcome {
    pub name: String,
    pub version: String,
    pub unlinked: usize,
}

/// Where the keg contents come from.
enum Payload {
    Bottle { bottle: BottleFile, path: PathBuf },
    Artifact { artifact: Artifact, path: PathBuf },
    Checkout { url: String, tag: Option<String>, revision: Option<String> },
    Nothing,
}

pub struct Installer<'a> {
    config: &'a Config,
    client: reqwest::Client,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("formulary/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Bottle to pour on this host, unless a source build was requested.
    pub fn bottle_for(&self, formula: &Formula, request: &InstallRequest) -> Option<BottleFile> {
        if request.build_from_source || request.artifact.is_some() || !request.options.flags().is_empty() {
            return None;
        }
        bottle::select(formula, &self.config.host)
    }

    /// Every check that needs neither network nor a keg.
    pub fn preflight(&self, formula: &Formula, request: &InstallRequest, pouring: bool) -> Result<()> {
        let host = &self.config.host;
        formula.validate()?;
        formula.check_requirements(host)?;
        formula.check_options(&request.options)?;

        for conflict in &formula.conflicts {
            if cellar::is_installed(self.config, &conflict.name) {
                return Err(FormulaError::config(format!(
                    "{} conflicts with {}: {}",
                    formula.name, conflict.name, conflict.because
                )));
            }
        }

        if !pouring {
            self.require(formula, DependencyKind::Build)?;
            formula
                .install
                .strategy()
                .check(formula, self.config, &request.options)?;
        }
        if request.run_tests {
            self.require(formula, DependencyKind::Test)?;
        }
        for dep in formula.host_dependencies(DependencyKind::Runtime, host) {
            if !self.dependency_available(dep) {
                tracing::warn!("{} needs {} at runtime, which is not installed", formula.name, dep.name);
            }
        }

        if let Some(spec) = formula.version_spec() {
            resolver::resolve(host.arch, spec)?;
        }

        Ok(())
    }

    fn require(&self, formula: &Formula, kind: DependencyKind) -> Result<()> {
        let missing: Vec<&str> = formula
            .host_dependencies(kind, &self.config.host)
            .filter(|dep| !self.dependency_available(dep))
            .map(|dep| dep.name.as_str())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        let kind = match kind {
            DependencyKind::Build => "build",
            DependencyKind::Test => "test",
            DependencyKind::Runtime => "runtime",
        };
        Err(FormulaError::config(format!(
            "{} is missing {} dependencies: {}",
            formula.name,
            kind,
            missing.join(", ")
        )))
    }

    /// Installed as a keg, or an executable of the same name on `PATH`.
    pub fn dependency_available(&self, dep: &Dependency) -> bool {
        cellar::is_installed(self.config, &dep.name)
            || which::which(dep.executable_name()).is_ok()
            || which::which(&dep.name).is_ok()
    }

    /// Download (or reuse from cache) whatever `install` would need, verified.
    pub async fn fetch(&self, formula: &Formula, request: &InstallRequest) -> Result<PathBuf> {
        if let Some(bottle) = self.bottle_for(formula, request) {
            return self.fetch_bottle(&bottle, request.show_progress).await;
        }
        let spec = formula.version_spec().ok_or_else(|| {
            FormulaError::config(format!(
                "{} is built from a git checkout; there is nothing to fetch",
                formula.name
            ))
        })?;
        let artifact = resolver::resolve(self.config.host.arch, spec)?;
        self.fetch_artifact(formula, &artifact, request).await
    }

    async fn fetch_bottle(&self, bottle: &BottleFile, show_progress: bool) -> Result<PathBuf> {
        let download = Download {
            label: &bottle.filename,
            url: &bottle.url,
            filename: &bottle.filename,
            sha256: &bottle.sha256,
            bearer: Some(bottle::ANONYMOUS_REGISTRY_TOKEN),
        };
        download::fetch(&self.client, &self.config.cache_dir, &download, show_progress).await
    }

    async fn fetch_artifact(
        &self,
        formula: &Formula,
        artifact: &Artifact,
        request: &InstallRequest,
    ) -> Result<PathBuf> {
        match &request.artifact {
            Some(local) => {
                download::verify_file(local, &artifact.sha256).await?;
                tracing::info!("using local artifact {}", local.display());
                Ok(local.clone())
            }
            None => {
                let download = Download::artifact(&formula.name, artifact);
                download::fetch(&self.client, &self.config.cache_dir, &download, request.show_progress)
                    .await
            }
        }
    }

    pub async fn install(&self, formula: &Formula, request: &InstallRequest) -> Result<InstallOutcome> {
        let start = Instant::now();
        let bottle = self.bottle_for(formula, request);
        self.preflight(formula, request, bottle.is_some())?;

        let layout = InstallLayout::new(self.config, &formula.name, &formula.version);
        let replacing = layout.exists();
        if replacing && !request.force {
            return Err(FormulaError::config(format!(
                "{} {} is already installed at {} (use --force to reinstall)",
                formula.name,
                formula.version,
                layout.root.display()
            )));
        }

        let payload = match (bottle, &formula.source) {
            (Some(bottle), _) => {
                let path = self.fetch_bottle(&bottle, request.show_progress).await?;
                Payload::Bottle { bottle, path }
            }
            (None, Source::Runfile(spec)) => {
                let artifact = resolver::resolve(self.config.host.arch, spec)?;
                let path = self.fetch_artifact(formula, &artifact, request).await?;
                Payload::Artifact { artifact, path }
            }
            (None, Source::Git { url, tag, revision }) => {
                if formula.install.strategy().needs_checkout() {
                    Payload::Checkout {
                        url: url.clone(),
                        tag: tag.clone(),
                        revision: revision.clone(),
                    }
                } else {
                    Payload::Nothing
                }
            }
        };

        let work = tempfile::Builder::new()
            .prefix(&format!("formulary-{}-", formula.name))
            .tempdir()
            .context("Failed to create build directory")?;
        let (buildpath, source) = stage(formula, &payload, work.path())?;

        // The old keg stays until everything that can fail remotely has succeeded
        if replacing {
            tracing::info!("removing existing keg {}", layout.root.display());
            self.remove_keg(&layout)?;
        }

        let (layout, receipt) = self.populate(formula, request, &payload, &buildpath, source, layout)?;

        let tests = if request.run_tests {
            Some(verify::run_tests(formula, &layout, &self.config.host)?)
        } else {
            None
        };

        Ok(InstallOutcome {
            name: formula.name.clone(),
            version: formula.version.clone(),
            path: layout.root.clone(),
            strategy: receipt.strategy,
            poured_from_bottle: receipt.poured_from_bottle,
            report: receipt.report,
            linked: receipt.linked,
            messages: self.messages(formula, &layout),
            tests,
            time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Create and fill the keg, write its receipt and link it.
    ///
    /// On failure the keg that was actually created is removed, including a
    /// `version_N` keg poured from a bottle.
    fn populate(
        &self,
        formula: &Formula,
        request: &InstallRequest,
        payload: &Payload,
        buildpath: &Path,
        source: ReceiptSource,
        layout: InstallLayout,
    ) -> Result<(InstallLayout, InstallReceipt)> {
        let (layout, mut receipt) = match self.fill(formula, request, payload, buildpath, source, &layout) {
            Ok(filled) => filled,
            Err(e) => {
                self.discard_failed(formula, &layout);
                return Err(e);
            }
        };

        if let Err(e) = self.finish(formula, &layout, &mut receipt) {
            self.discard_failed(formula, &layout);
            return Err(e);
        }

        Ok((layout, receipt))
    }

    fn finish(&self, formula: &Formula, layout: &InstallLayout, receipt: &mut InstallReceipt) -> Result<()> {
        layout.link_opt()?;
        if !formula.keg_only {
            receipt.linked = symlink::link_keg(layout, &self.config.prefix)?;
        }
        receipt.write(&layout.root)?;
        Ok(())
    }

    fn fill(
        &self,
        formula: &Formula,
        request: &InstallRequest,
        payload: &Payload,
        buildpath: &Path,
        source: ReceiptSource,
        layout: &InstallLayout,
    ) -> Result<(InstallLayout, InstallReceipt)> {
        let arch = self.config.host.arch;
        let strategy = formula.install.strategy();

        if let Payload::Bottle { path, .. } = payload {
            let keg = bottle::extract_bottle(path, &self.config.cellar(), &formula.name, &formula.version)?;
            let layout = InstallLayout::at(keg, self.config.opt_dir(), &formula.name, &formula.version);
            let mut receipt = InstallReceipt::new(
                formula,
                arch,
                strategy.name(),
                source,
                &request.options,
                InstallReport::default(),
            );
            receipt.poured_from_bottle = true;
            return Ok((layout, receipt));
        }

        let artifact = match payload {
            Payload::Artifact { path, .. } => Some(path.as_path()),
            _ => None,
        };

        layout.create()?;
        let ctx = InstallContext {
            formula,
            layout,
            config: self.config,
            buildpath,
            artifact,
            options: &request.options,
        };
        tracing::info!("installing {} with {}", formula.name, strategy.name());
        let report = strategy.install(&ctx)?;

        let receipt = InstallReceipt::new(formula, arch, strategy.name(), source, &request.options, report);
        Ok((layout.clone(), receipt))
    }

    fn discard_failed(&self, formula: &Formula, layout: &InstallLayout) {
        tracing::warn!("install of {} failed, removing {}", formula.name, layout.root.display());
        if let Err(cleanup) = self.remove_keg(layout) {
            tracing::warn!("cleanup failed: {}", cleanup);
        }
    }

    /// Post-install notes that apply to this host, then caveats.
    pub fn messages(&self, formula: &Formula, layout: &InstallLayout) -> Vec<String> {
        let mut messages: Vec<String> = formula
            .post_install
            .iter()
            .filter(|note| note.when.holds(&self.config.host))
            .map(|note| layout.expand(&note.message))
            .collect();
        if let Some(caveats) = &formula.caveats {
            messages.push(layout.expand(caveats));
        }
        messages
    }

    /// Run the test procedure against the installed keg of `formula`'s version.
    pub fn test(&self, formula: &Formula) -> Result<TestOutcome> {
        let kegs = cellar::installed_versions(self.config, &formula.name)?;
        let keg = kegs
            .iter()
            .find(|k| k.version == formula.version)
            .or_else(|| kegs.first())
            .ok_or_else(|| FormulaError::NotFound(format!("{} is not installed", formula.name)))?;

        self.require(formula, DependencyKind::Test)?;
        let layout = InstallLayout::at(keg.path.clone(), self.config.opt_dir(), &keg.name, &keg.version);
        verify::run_tests(formula, &layout, &self.config.host)
    }

    /// Remove every installed version of `name`.
    pub fn uninstall(&self, name: &str) -> Result<Vec<UninstallOutcome>> {
        let kegs = cellar::installed_versions(self.config, name)?;
        if kegs.is_empty() {
            return Err(FormulaError::NotFound(format!("{} is not installed", name)));
        }

        kegs.into_iter()
            .map(|keg| {
                let layout = InstallLayout::at(keg.path.clone(), self.config.opt_dir(), &keg.name, &keg.version);
                let unlinked = self.remove_keg(&layout)?;
                Ok(UninstallOutcome {
                    name: keg.name,
                    version: keg.version,
                    unlinked,
                })
            })
            .collect()
    }

    fn remove_keg(&self, layout: &InstallLayout) -> Result<usize> {
        let unlinked = symlink::unlink_keg(layout, &self.config.prefix)?;
        layout.unlink_opt()?;
        layout.discard()?;
        Ok(unlinked.len())
    }
}

/// Build directory and receipt source for a payload, cloning a checkout if needed.
fn stage(formula: &Formula, payload: &Payload, work: &Path) -> Result<(PathBuf, ReceiptSource)> {
    Ok(match payload {
        Payload::Bottle { bottle, .. } => (
            work.to_path_buf(),
            ReceiptSource {
                url: Some(bottle.url.clone()),
                filename: Some(bottle.filename.clone()),
                sha256: Some(bottle.sha256.clone()),
                tag: Some(bottle.tag.clone()),
            },
        ),
        Payload::Artifact { artifact, .. } => (work.to_path_buf(), ReceiptSource::from_artifact(artifact)),
        Payload::Checkout { url, tag, revision } => {
            let checkout = work.join(&formula.name);
            clone_source(url, tag.as_deref(), revision.as_deref(), &checkout)?;
            let source = ReceiptSource {
                url: Some(url.clone()),
                tag: tag.clone(),
                ..Default::default()
            };
            (checkout, source)
        }
        Payload::Nothing => (work.to_path_buf(), ReceiptSource::default()),
    })
}

/// Shallow clone with submodules, checked against the pinned revision.
fn clone_source(url: &str, tag: Option<&str>, revision: Option<&str>, dest: &Path) -> Result<()> {
    let mut clone = Command::new("git");
    clone.args(["clone", "--depth", "1"]);
    if let Some(tag) = tag {
        clone.args(["--branch", tag]);
    }
    clone
        .args(["--recurse-submodules", "--shallow-submodules"])
        .arg(url)
        .arg(dest);
    process::run(&mut clone)?;

    if let Some(expected) = revision {
        let head = process::output(Command::new("git").arg("-C").arg(dest).args(["rev-parse", "HEAD"]))?;
        let head = head.trim();
        if head != expected {
            return Err(FormulaError::Integrity {
                artifact: format!("{}@{}", url, tag.unwrap_or("HEAD")),
                expected: expected.to_string(),
                actual: head.to_string(),
            });
        }
    }
    Ok(())
}
