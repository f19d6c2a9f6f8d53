//! Cellar queries - reading what is installed

use crate::config::Config;
use crate::layout::InstallLayout;
use crate::receipt::InstallReceipt;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// An installed keg in the Cellar
#[derive(Debug, Clone)]
pub struct InstalledKeg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub receipt: Option<InstallReceipt>,
}

impl InstalledKeg {
    fn from_path(name: String, version: String, path: PathBuf) -> Self {
        let receipt = InstallReceipt::read(&path).ok();
        Self {
            name,
            version,
            path,
            receipt,
        }
    }

    pub fn layout(&self, config: &Config) -> InstallLayout {
        InstallLayout::new(config, &self.name, &self.version)
    }

    pub fn linked(&self) -> bool {
        self.receipt.as_ref().is_some_and(|r| !r.linked.is_empty())
    }
}

fn visible_entries(dir: &std::path::Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Read all installed kegs from the Cellar
pub fn list_installed(config: &Config) -> Result<Vec<InstalledKeg>> {
    let cellar = config.cellar();
    if !cellar.exists() {
        return Ok(vec![]);
    }

    let mut kegs = Vec::new();
    for (name, formula_dir) in visible_entries(&cellar)? {
        for (version, path) in visible_entries(&formula_dir)? {
            kegs.push(InstalledKeg::from_path(name.clone(), version, path));
        }
    }

    Ok(kegs)
}

/// Installed versions of a formula, newest first
pub fn installed_versions(config: &Config, name: &str) -> Result<Vec<InstalledKeg>> {
    let formula_dir = config.cellar().join(name);
    if !formula_dir.exists() {
        return Ok(vec![]);
    }

    let mut kegs: Vec<InstalledKeg> = visible_entries(&formula_dir)?
        .into_iter()
        .map(|(version, path)| InstalledKeg::from_path(name.to_string(), version, path))
        .collect();

    kegs.sort_by(|a, b| compare_versions(&b.version, &a.version));
    Ok(kegs)
}

/// Any version of `name` present in the Cellar or linked under `opt/`
pub fn is_installed(config: &Config, name: &str) -> bool {
    if config.opt_prefix(name).exists() {
        return true;
    }
    installed_versions(config, name).is_ok_and(|kegs| !kegs.is_empty())
}

/// Compare two version strings numerically, part by part
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let a_parts: Vec<u32> = a.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();
    let b_parts: Vec<u32> = b.split('.').filter_map(|s| s.parse::<u32>().ok()).collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    // Fall back to lexicographic
    a.cmp(b)
}
