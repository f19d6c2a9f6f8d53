//! Bottle pouring: the precompiled shortcut around a source install.
//!
//! A record's bottle table maps platform tags to blob checksums on an OCI
//! registry. When the host's tag has a real (non-placeholder) checksum and the
//! user did not ask for a source build, the bottle is downloaded, verified and
//! unpacked straight into the Cellar:
//!
//! ```text
//! Input:  cuda@13.0--13.0.2.x86_64_linux.bottle.tar.gz
//!   cuda@13.0/13.0.2/bin/...
//! Extract to: <prefix>/Cellar/cuda@13.0/13.0.2/
//! ```

use crate::formula::Formula;
use crate::platform::HostConfig;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;

/// Anonymous pull token accepted by ghcr.io for public images
pub const ANONYMOUS_REGISTRY_TOKEN: &str = "QQ==";

/// A bottle selected for this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottleFile {
    pub tag: String,
    pub url: String,
    pub filename: String,
    pub sha256: String,
}

/// Registry image name: `cuda@13.0` is stored as `cuda/13.0`
pub fn image_name(formula: &str) -> String {
    formula.replace('@', "/").replace('+', "x")
}

/// The bottle to pour for this host, if any.
pub fn select(formula: &Formula, host: &HostConfig) -> Option<BottleFile> {
    let bottle = formula.bottle.as_ref()?;
    let tag = host.bottle_tag();
    let sha256 = bottle.checksum_for(&tag)?.to_string();

    let rebuild = if bottle.rebuild > 0 {
        format!(".{}", bottle.rebuild)
    } else {
        String::new()
    };

    Some(BottleFile {
        url: format!(
            "{}/{}/blobs/sha256:{}",
            bottle.root_url.trim_end_matches('/'),
            image_name(&formula.name),
            sha256
        ),
        filename: format!(
            "{}--{}.{}.bottle{}.tar.gz",
            formula.name, formula.version, tag, rebuild
        ),
        tag,
        sha256,
    })
}

/// Unpack a bottle into the Cellar and return the keg path.
pub fn extract_bottle(bottle_path: &Path, cellar: &Path, name: &str, version: &str) -> Result<PathBuf> {
    fs::create_dir_all(cellar)
        .with_context(|| format!("Failed to create Cellar directory: {}", cellar.display()))?;

    let file = fs::File::open(bottle_path)
        .with_context(|| format!("Failed to open bottle: {}", bottle_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    // Archive contains: {name}/{version}/* or {name}/{version}_N/*
    archive
        .unpack(cellar)
        .with_context(|| format!("Failed to extract bottle to: {}", cellar.display()))?;

    let formula_dir = cellar.join(name);
    if formula_dir.join(version).exists() {
        return Ok(formula_dir.join(version));
    }

    // Bottle revision suffix (version_N)
    let revision_prefix = format!("{}_", version);
    let with_revision = fs::read_dir(&formula_dir)
        .with_context(|| format!("Failed to read formula directory: {}", formula_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .find(|entry_name| {
            let entry_name = entry_name.to_string_lossy();
            entry_name
                .strip_prefix(&revision_prefix)
                .is_some_and(|rev| !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()))
        })
        .with_context(|| {
            format!(
                "Extraction failed: no directory found matching version {} in {}",
                version,
                formula_dir.display()
            )
        })?;

    Ok(formula_dir.join(with_revision))
}
