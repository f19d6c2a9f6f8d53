//! Host platform identification.
//!
//! Formula records select artifacts, bottles and install behavior by CPU
//! architecture and operating system. Detection happens exactly once, when
//! [`HostConfig`] is built at startup; everything downstream receives the
//! resolved values explicitly instead of inspecting the process environment.
//!
//! # Tags
//!
//! Architectures use Homebrew spelling: `arm64` rather than Rust's `aarch64`.
//! Bottle tags combine architecture and OS: `x86_64_linux`, `arm64_sequoia`.
//!
//! # Examples
//!
//! ```no_run
//! use formulary::platform::{Arch, HostConfig};
//!
//! fn main() -> formulary::error::Result<()> {
//!     let host = HostConfig::detect(None, false)?;
//!     println!("{} ({})", host.arch, host.bottle_tag());
//!
//!     let arm: Arch = "aarch64".parse()?;
//!     assert_eq!(arm, Arch::Arm64);
//!     Ok(())
//! }
//! ```

use crate::error::{FormulaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CPU architecture a formula can be resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Arm64];

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Architecture of the running binary.
    pub fn from_target() -> Result<Self> {
        std::env::consts::ARCH.parse()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "intel" => Ok(Arch::X86_64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(FormulaError::config(format!(
                "unsupported architecture '{}' (expected x86_64 or arm64)",
                other
            ))),
        }
    }
}

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
}

impl Os {
    pub fn current() -> Result<Self> {
        match std::env::consts::OS {
            "linux" => Ok(Os::Linux),
            "macos" => Ok(Os::Macos),
            other => Err(FormulaError::config(format!(
                "unsupported operating system '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => f.write_str("linux"),
            Os::Macos => f.write_str("macos"),
        }
    }
}

/// Everything about the host that formula logic is allowed to branch on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostConfig {
    pub arch: Arch,
    pub os: Os,
    /// macOS release codename used in bottle tags (`sequoia`), `None` on Linux
    pub macos_release: Option<String>,
    /// Running inside the upstream project's own CI
    pub upstream_ci: bool,
}

impl HostConfig {
    /// Detect the host once. `arch_override` replaces the compiled-in architecture.
    pub fn detect(arch_override: Option<&str>, upstream_ci: bool) -> Result<Self> {
        let arch = match arch_override {
            Some(tag) => tag.parse()?,
            None => Arch::from_target()?,
        };
        let os = Os::current()?;
        let macos_release = match os {
            Os::Macos => Some(macos_name(&macos_version()?).to_string()),
            Os::Linux => None,
        };

        Ok(Self {
            arch,
            os,
            macos_release,
            upstream_ci,
        })
    }

    /// Linux host with the given architecture, for tests and dry runs.
    pub fn linux(arch: Arch) -> Self {
        Self {
            arch,
            os: Os::Linux,
            macos_release: None,
            upstream_ci: false,
        }
    }

    /// Bottle tag for this host, e.g. `x86_64_linux` or `arm64_sonoma`.
    pub fn bottle_tag(&self) -> String {
        match (&self.os, &self.macos_release) {
            (Os::Macos, Some(release)) => format!("{}_{}", self.arch, release),
            _ => format!("{}_linux", self.arch),
        }
    }

    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }
}

#[cfg(target_os = "macos")]
fn macos_version() -> Result<String> {
    use anyhow::Context;
    use std::process::Command;

    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .context("Failed to run sw_vers")?;

    let version = String::from_utf8(output.stdout)
        .context("Invalid UTF-8 in sw_vers output")?
        .trim()
        .to_string();

    Ok(version)
}

#[cfg(not(target_os = "macos"))]
fn macos_version() -> Result<String> {
    Err(FormulaError::config("not running on macOS"))
}

fn macos_name(version: &str) -> &'static str {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    match major {
        26 | 16 => "tahoe",
        15 => "sequoia",
        14 => "sonoma",
        13 => "ventura",
        12 => "monterey",
        11 => "big_sur",
        _ => "sonoma",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("AMD64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert_eq!(" arm64 ".parse::<Arch>().unwrap(), Arch::Arm64);
    }

    #[test]
    fn test_unknown_arch_is_configuration_error() {
        let err = "riscv64".parse::<Arch>().unwrap_err();
        assert!(matches!(err, FormulaError::Configuration(_)));
        assert!(err.to_string().contains("riscv64"));
    }

    #[test]
    fn test_32bit_arm_is_rejected() {
        // std::env::consts::ARCH on 32-bit ARM hosts
        assert!(matches!(
            "arm".parse::<Arch>().unwrap_err(),
            FormulaError::Configuration(_)
        ));
        assert!("armv7".parse::<Arch>().is_err());
    }

    #[test]
    fn test_arch_serde_spelling() {
        assert_eq!(serde_json::to_string(&Arch::Arm64).unwrap(), "\"arm64\"");
        let arch: Arch = serde_json::from_str("\"x86_64\"").unwrap();
        assert_eq!(arch, Arch::X86_64);
    }

    #[test]
    fn test_linux_bottle_tag() {
        assert_eq!(HostConfig::linux(Arch::X86_64).bottle_tag(), "x86_64_linux");
        assert_eq!(HostConfig::linux(Arch::Arm64).bottle_tag(), "arm64_linux");
    }

    #[test]
    fn test_macos_bottle_tag() {
        let host = HostConfig {
            arch: Arch::Arm64,
            os: Os::Macos,
            macos_release: Some("sequoia".into()),
            upstream_ci: false,
        };
        assert_eq!(host.bottle_tag(), "arm64_sequoia");
    }

    #[test]
    fn test_macos_names() {
        assert_eq!(macos_name("15.1"), "sequoia");
        assert_eq!(macos_name("14.0"), "sonoma");
        assert_eq!(macos_name("26.0"), "tahoe");
        assert_eq!(macos_name("garbage"), "sonoma");
    }
}
