//! Runtime configuration, resolved once at startup.
//!
//! Environment variables are read here and nowhere else:
//!
//! | Variable                | Meaning                                      |
//! |-------------------------|----------------------------------------------|
//! | `FORMULARY_PREFIX`      | Install prefix (falls back to `HOMEBREW_PREFIX`) |
//! | `FORMULARY_CACHE`       | Download cache directory                     |
//! | `FORMULARY_ARCH`        | Architecture override (`x86_64`, `arm64`)     |
//! | `FORMULARY_FORMULA_DIR` | Directory of extra JSON formula records      |
//! | `GITHUB_REPOSITORY`     | Enables upstream-only build and test steps   |

use crate::error::Result;
use crate::platform::HostConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Repository whose CI gets the upstream-only steps (test suites, etc.)
pub const UPSTREAM_REPOSITORY: &str = "LizardByte/Sunshine";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub prefix: PathBuf,
    pub cache_dir: PathBuf,
    pub formula_dir: Option<PathBuf>,
    pub host: HostConfig,
}

impl Config {
    /// Build the configuration from the environment, with CLI overrides taking precedence.
    pub fn from_env(prefix: Option<PathBuf>, arch: Option<String>) -> Result<Self> {
        let prefix = prefix.unwrap_or_else(detect_prefix);
        let cache_dir = std::env::var_os("FORMULARY_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        let formula_dir = std::env::var_os("FORMULARY_FORMULA_DIR").map(PathBuf::from);

        let arch = arch.or_else(|| std::env::var("FORMULARY_ARCH").ok());
        let upstream_ci =
            std::env::var("GITHUB_REPOSITORY").is_ok_and(|repo| repo == UPSTREAM_REPOSITORY);
        let host = HostConfig::detect(arch.as_deref(), upstream_ci)?;

        tracing::debug!(
            "config: prefix={} arch={} upstream_ci={}",
            prefix.display(),
            host.arch,
            upstream_ci
        );

        Ok(Self {
            prefix,
            cache_dir,
            formula_dir,
            host,
        })
    }

    /// Configuration rooted entirely under `prefix`, used by tests.
    pub fn isolated(prefix: &Path, host: HostConfig) -> Self {
        Self {
            prefix: prefix.to_path_buf(),
            cache_dir: prefix.join("cache"),
            formula_dir: None,
            host,
        }
    }

    pub fn cellar(&self) -> PathBuf {
        self.prefix.join("Cellar")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.prefix.join("opt")
    }

    /// `<prefix>/opt/<name>`, the stable path of a formula's linked keg
    pub fn opt_prefix(&self, name: &str) -> PathBuf {
        self.opt_dir().join(name)
    }
}

/// Detect the install prefix on this system
pub fn detect_prefix() -> PathBuf {
    if let Ok(prefix) = std::env::var("FORMULARY_PREFIX") {
        return PathBuf::from(prefix);
    }
    if let Ok(prefix) = std::env::var("HOMEBREW_PREFIX") {
        return PathBuf::from(prefix);
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/home/linuxbrew/.linuxbrew")
    }
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(not(any(target_os = "linux", all(target_os = "macos", target_arch = "aarch64"))))]
    {
        PathBuf::from("/usr/local")
    }
}

fn default_cache_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cache/formulary/downloads")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Arch;

    #[test]
    fn test_isolated_paths() {
        let config = Config::isolated(Path::new("/tmp/fx"), HostConfig::linux(Arch::X86_64));
        assert_eq!(config.cellar(), PathBuf::from("/tmp/fx/Cellar"));
        assert_eq!(config.opt_prefix("cuda@13.1"), PathBuf::from("/tmp/fx/opt/cuda@13.1"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/fx/cache"));
    }

    #[test]
    fn test_detect_prefix_not_empty() {
        assert!(!detect_prefix().as_os_str().is_empty());
    }
}
