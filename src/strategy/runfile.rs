//! Vendor runfile installs (the CUDA toolkit family).
//!
//! The vendor installer always lands in `libexec/`, never the keg root, so
//! co-installed versions cannot collide. What happens afterwards is a
//! per-record choice, because different releases of the same toolkit have
//! shipped with different keg shapes:
//!
//! - [`LayoutStyle::Wrappers`]: one environment-injecting stub per executable
//! - [`LayoutStyle::SymlinkTree`]: relative symlinks for `bin`, `lib64`,
//!   `include`, `nvvm` and `extras`
//! - [`LayoutStyle::Bare`]: leave the bundle as installed

use super::{InstallContext, InstallReport, InstallStrategy};
use crate::error::{FormulaError, Result};
use crate::layout::InstallLayout;
use crate::wrapper::{self, ToolkitEnv};
use crate::{process, symlink};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutStyle {
    Wrappers,
    SymlinkTree,
    Bare,
}

/// Directories mirrored into the keg root by the symlink-tree layout, when present
const AUXILIARY_DIRS: &[&str] = &["nvvm", "extras"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunfileInstall {
    pub layout: LayoutStyle,
    pub env: ToolkitEnv,
    /// Stage `*.so*` from `libexec/<prefix>*/` into `lib/`
    #[serde(default)]
    pub stage_libraries: Option<String>,
}

impl RunfileInstall {
    pub fn cuda(layout: LayoutStyle) -> Self {
        Self {
            layout,
            env: ToolkitEnv::cuda(),
            stage_libraries: match layout {
                LayoutStyle::Wrappers => Some("nsight-".to_string()),
                LayoutStyle::SymlinkTree | LayoutStyle::Bare => None,
            },
        }
    }

    /// Unattended installer invocation targeting `libexec/`.
    ///
    /// Wrapper and bare kegs also pin the installer's default root and scratch
    /// directory inside the build; the symlink-tree releases take the vendor
    /// defaults for both.
    pub fn installer_command(&self, installer: &Path, layout: &InstallLayout, tmpdir: &Path) -> Command {
        let pin_roots = self.layout != LayoutStyle::SymlinkTree;
        let mut cmd = Command::new("sh");
        cmd.arg(installer);
        if pin_roots {
            cmd.arg(format!("--defaultroot={}", layout.lib.display()));
        }
        cmd.arg("--no-drm").arg("--no-man-page").arg("--no-opengl-libs").arg("--silent");
        if pin_roots {
            cmd.arg(format!("--tmpdir={}", tmpdir.display()));
        }
        cmd.arg("--toolkit")
            .arg(format!("--toolkitpath={}", layout.libexec.display()));
        cmd
    }

    /// Post-installer keg finishing. Safe to run again on the same keg.
    pub fn finish_layout(&self, layout: &InstallLayout) -> Result<InstallReport> {
        let mut report = InstallReport::default();

        match self.layout {
            LayoutStyle::Wrappers => {
                report.wrappers = wrapper::generate_wrappers(&layout.libexec, &layout.bin, &self.env)?;
            }
            LayoutStyle::SymlinkTree => {
                report.links = self.symlink_tree(layout)?;
            }
            LayoutStyle::Bare => {}
        }

        if let Some(dir_prefix) = &self.stage_libraries {
            let staged = symlink::stage_shared_libraries(&layout.libexec, dir_prefix, &layout.lib)?;
            tracing::info!("staged {} shared libraries into {}", staged.len(), layout.lib.display());
            report.links.extend(staged);
        }

        Ok(report)
    }

    fn symlink_tree(&self, layout: &InstallLayout) -> Result<Vec<std::path::PathBuf>> {
        let home = &layout.libexec;
        let mut links = Vec::new();

        let executables = wrapper::discover_executables(&home.join("bin"))?;
        links.extend(symlink::install_symlinks(&executables, &layout.bin)?);

        let libraries = symlink::dir_entries(&home.join(&self.env.lib_subdir))?;
        links.extend(symlink::install_symlinks(&libraries, &layout.lib)?);

        let headers = symlink::dir_entries(&home.join("include"))?;
        links.extend(symlink::install_symlinks(&headers, &layout.include)?);

        for dir in AUXILIARY_DIRS {
            let entries = symlink::dir_entries(&home.join(dir))?;
            if !entries.is_empty() {
                links.extend(symlink::install_symlinks(&entries, &layout.root.join(dir))?);
            }
        }

        Ok(links)
    }
}

impl InstallStrategy for RunfileInstall {
    fn name(&self) -> &'static str {
        match self.layout {
            LayoutStyle::Wrappers => "runfile/wrappers",
            LayoutStyle::SymlinkTree => "runfile/symlink-tree",
            LayoutStyle::Bare => "runfile/bare",
        }
    }

    fn install(&self, ctx: &InstallContext<'_>) -> Result<InstallReport> {
        let installer = ctx.artifact.ok_or_else(|| {
            FormulaError::config(format!("{}: runfile install needs a verified artifact", ctx.formula.name))
        })?;

        let tmpdir = ctx.buildpath.join("tmp");
        fs::create_dir_all(&tmpdir)
            .with_context(|| format!("Failed to create {}", tmpdir.display()))?;
        fs::create_dir_all(&ctx.layout.lib)
            .with_context(|| format!("Failed to create {}", ctx.layout.lib.display()))?;

        tracing::info!("installing {} {} into {}", ctx.formula.name, ctx.formula.version, ctx.layout.libexec.display());
        process::run(
            self.installer_command(installer, ctx.layout, &tmpdir).current_dir(ctx.buildpath),
        )?;

        self.finish_layout(ctx.layout)
    }
}
