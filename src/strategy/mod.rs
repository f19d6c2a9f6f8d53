//! Install strategies.
//!
//! A formula record names *what* to install; the strategy it references
//! decides *how*. Strategies are shared values, so every version of a toolkit
//! family points at the same implementation with its own parameters.
//!
//! - **runfile**: run a vendor's self-extracting installer silently into
//!   `libexec/`, then finish the keg with wrappers, a symlink tree, or nothing
//! - **script**: write a shell script from the record into `bin/`
//! - **cmake**: configure, build and install a CMake project from a checkout

pub mod cmake;
pub mod runfile;
pub mod script;

use crate::config::Config;
use crate::error::Result;
use crate::formula::{BuildOptions, Formula};
use crate::layout::InstallLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use cmake::CmakeInstall;
pub use runfile::{LayoutStyle, RunfileInstall};
pub use script::ScriptInstall;

/// Everything a strategy may touch during one install.
pub struct InstallContext<'a> {
    pub formula: &'a Formula,
    pub layout: &'a InstallLayout,
    pub config: &'a Config,
    /// Scratch directory; the source checkout for git formulae
    pub buildpath: &'a Path,
    /// Verified vendor artifact, for runfile formulae
    pub artifact: Option<&'a Path>,
    pub options: &'a BuildOptions,
}

/// What a strategy put into the keg, recorded in the install receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    #[serde(default)]
    pub wrappers: Vec<PathBuf>,
    #[serde(default)]
    pub links: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl InstallReport {
    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty() && self.links.is_empty() && self.files.is_empty()
    }
}

pub trait InstallStrategy {
    fn name(&self) -> &'static str;

    /// Whether `ctx.buildpath` must hold the formula's source checkout
    fn needs_checkout(&self) -> bool {
        false
    }

    /// Checks that need neither network nor a keg, run before anything is fetched.
    fn check(&self, _formula: &Formula, _config: &Config, _options: &BuildOptions) -> Result<()> {
        Ok(())
    }

    /// Populate `ctx.layout`. The caller created the keg root and discards it on error.
    fn install(&self, ctx: &InstallContext<'_>) -> Result<InstallReport>;
}

/// Serializable reference to a strategy and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InstallPlan {
    Runfile(RunfileInstall),
    Script(ScriptInstall),
    Cmake(CmakeInstall),
}

impl InstallPlan {
    pub fn strategy(&self) -> &dyn InstallStrategy {
        match self {
            InstallPlan::Runfile(s) => s,
            InstallPlan::Script(s) => s,
            InstallPlan::Cmake(s) => s,
        }
    }
}

/// Copy a file into `dir` keeping its name, mode 0755.
pub(crate) fn install_executable(source: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    use anyhow::Context;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let name = source
        .file_name()
        .with_context(|| format!("No file name in {}", source.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let target = dir.join(name);
    fs::copy(source, &target).with_context(|| {
        format!("Failed to install {} into {}", source.display(), dir.display())
    })?;
    fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
    Ok(target)
}
