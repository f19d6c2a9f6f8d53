//! Formulae whose whole payload is a shell script declared in the record.

use super::{InstallContext, InstallReport, InstallStrategy, install_executable};
use crate::error::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInstall {
    pub file_name: String,
    pub contents: String,
}

impl InstallStrategy for ScriptInstall {
    fn name(&self) -> &'static str {
        "script"
    }

    fn install(&self, ctx: &InstallContext<'_>) -> Result<InstallReport> {
        let staged = ctx.buildpath.join(&self.file_name);
        fs::write(&staged, ctx.layout.expand(&self.contents))
            .with_context(|| format!("Failed to write {}", staged.display()))?;

        let installed = install_executable(&staged, &ctx.layout.bin)?;
        tracing::info!("buildpath: {}", ctx.buildpath.display());

        Ok(InstallReport {
            files: vec![installed],
            ..Default::default()
        })
    }
}
