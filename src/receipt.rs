//! Install receipts.
//!
//! Every keg gets an `INSTALL_RECEIPT.json` describing how it was produced:
//! which artifact (or bottle) it came from, which strategy populated it, and
//! the wrappers and links that strategy created. `list`, `uninstall` and
//! `test` read it back.
//!
//! ```text
//! <prefix>/Cellar/cuda@13.0/13.0.2/
//!   INSTALL_RECEIPT.json
//!   bin/
//!   libexec/
//! ```

use crate::formula::{BuildOptions, DependencyKind, Formula};
use crate::platform::Arch;
use crate::resolver::Artifact;
use crate::strategy::InstallReport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ReceiptSource {
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self {
            url: Some(artifact.url.clone()),
            filename: Some(artifact.filename.clone()),
            sha256: Some(artifact.sha256.clone()),
            tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub formulary_version: String,
    pub name: String,
    pub version: String,
    pub arch: Arch,
    pub strategy: String,
    #[serde(default)]
    pub poured_from_bottle: bool,
    #[serde(default)]
    pub source: ReceiptSource,
    #[serde(default)]
    pub used_options: Vec<String>,
    #[serde(default)]
    pub runtime_dependencies: Vec<String>,
    #[serde(default)]
    pub report: InstallReport,
    #[serde(default)]
    pub linked: Vec<PathBuf>,
    pub time: i64,
}

impl InstallReceipt {
    pub fn new(
        formula: &Formula,
        arch: Arch,
        strategy: &str,
        source: ReceiptSource,
        options: &BuildOptions,
        report: InstallReport,
    ) -> Self {
        Self {
            formulary_version: format!("formulary/{}", env!("CARGO_PKG_VERSION")),
            name: formula.name.clone(),
            version: formula.version.clone(),
            arch,
            strategy: strategy.to_string(),
            poured_from_bottle: false,
            source,
            used_options: options.flags(),
            runtime_dependencies: formula
                .dependencies_of(DependencyKind::Runtime)
                .map(|d| d.name.clone())
                .collect(),
            report,
            linked: vec![],
            time: chrono::Utc::now().timestamp(),
        }
    }

    /// Read an existing INSTALL_RECEIPT.json file
    pub fn read(keg: &Path) -> Result<Self> {
        let receipt_path = keg.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&receipt_path)
            .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse receipt: {}", receipt_path.display()))
    }

    /// Write receipt to INSTALL_RECEIPT.json
    pub fn write(&self, keg: &Path) -> Result<()> {
        let receipt_path = keg.join(RECEIPT_FILE);
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize install receipt")?;

        fs::write(&receipt_path, json)
            .with_context(|| format!("Failed to write receipt: {}", receipt_path.display()))?;

        Ok(())
    }

    pub fn installed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.time, 0)
    }
}
