//! Architecture-to-artifact resolution.
//!
//! Given the host architecture and a [`VersionSpec`], pick the installer file
//! name, its download URL and the checksum it must match. Resolution is pure:
//! it never touches the network or the filesystem, so a bad architecture or an
//! incomplete record fails before anything is downloaded.

use crate::error::{FormulaError, Result};
use crate::formula::VersionSpec;
use crate::platform::Arch;
use serde::Serialize;

/// A concrete downloadable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub arch: Arch,
    pub filename: String,
    pub url: String,
    pub sha256: String,
}

/// Resolve the artifact for `arch`.
///
/// # Errors
///
/// [`FormulaError::Configuration`] when the record has no checksum or no file
/// name pattern for `arch`.
///
/// # Examples
///
/// ```
/// use formulary::catalog;
/// use formulary::platform::Arch;
/// use formulary::resolver::resolve;
///
/// let formula = catalog::builtin("cuda@13.0").unwrap();
/// let spec = formula.version_spec().unwrap();
/// let artifact = resolve(Arch::X86_64, spec).unwrap();
/// assert_eq!(artifact.filename, "cuda_13.0.2_580.95.05_linux.run");
/// ```
pub fn resolve(arch: Arch, spec: &VersionSpec) -> Result<Artifact> {
    let sha256 = spec.checksums.get(&arch).ok_or_else(|| {
        FormulaError::config(format!(
            "no checksum declared for {} in version {}",
            arch, spec.version
        ))
    })?;
    let pattern = spec.artifact.filenames.get(&arch).ok_or_else(|| {
        FormulaError::config(format!(
            "no artifact name declared for {} in version {}",
            arch, spec.version
        ))
    })?;

    let filename = fill(pattern, spec);
    let url = fill(&spec.artifact.url, spec).replace("{filename}", &filename);

    Ok(Artifact {
        arch,
        filename,
        url,
        sha256: sha256.clone(),
    })
}

/// Resolve from a textual architecture tag, as given on the command line.
pub fn resolve_tag(tag: &str, spec: &VersionSpec) -> Result<Artifact> {
    let arch: Arch = tag.parse()?;
    resolve(arch, spec)
}

/// Resolve every architecture the record declares.
pub fn resolve_all(spec: &VersionSpec) -> Result<Vec<Artifact>> {
    spec.checksums.keys().map(|arch| resolve(*arch, spec)).collect()
}

fn fill(template: &str, spec: &VersionSpec) -> String {
    template
        .replace("{version}", &spec.version)
        .replace("{companion}", &spec.companion_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ArtifactPattern;
    use std::collections::HashSet;

    fn spec_13_1_1() -> VersionSpec {
        VersionSpec::new(
            "13.1.1",
            "590.48.01",
            &"a".repeat(64),
            &"b".repeat(64),
            ArtifactPattern::cuda_runfile(),
        )
    }

    #[test]
    fn test_x86_64_runfile() {
        let artifact = resolve(Arch::X86_64, &spec_13_1_1()).unwrap();
        assert_eq!(artifact.filename, "cuda_13.1.1_590.48.01_linux.run");
        assert_eq!(
            artifact.url,
            "https://developer.download.nvidia.com/compute/cuda/13.1.1/local_installers/cuda_13.1.1_590.48.01_linux.run"
        );
        assert_eq!(artifact.sha256, "a".repeat(64));
    }

    #[test]
    fn test_arm64_uses_sbsa_runfile() {
        let artifact = resolve(Arch::Arm64, &spec_13_1_1()).unwrap();
        assert_eq!(artifact.filename, "cuda_13.1.1_590.48.01_linux_sbsa.run");
        assert_eq!(artifact.sha256, "b".repeat(64));
    }

    #[test]
    fn test_unknown_tag_fails_before_resolution() {
        let err = resolve_tag("ppc64le", &spec_13_1_1()).unwrap_err();
        assert!(matches!(err, FormulaError::Configuration(_)));
    }

    #[test]
    fn test_missing_checksum_is_configuration_error() {
        let mut spec = spec_13_1_1();
        spec.checksums.remove(&Arch::Arm64);
        let err = resolve(Arch::Arm64, &spec).unwrap_err();
        assert!(matches!(err, FormulaError::Configuration(_)));
    }

    #[test]
    fn test_all_artifacts_are_distinct() {
        let artifacts = resolve_all(&spec_13_1_1()).unwrap();
        assert_eq!(artifacts.len(), 2);
        let identities: HashSet<_> = artifacts
            .iter()
            .map(|a| (a.filename.clone(), a.sha256.clone()))
            .collect();
        assert_eq!(identities.len(), 2);
    }
}
