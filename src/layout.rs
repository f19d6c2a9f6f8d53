//! Keg layout for one installed formula version.
//!
//! ```text
//! <prefix>/Cellar/cuda@13.1/13.1.0/    root (keg)
//!   bin/                               wrappers or symlinks
//!   lib/                               staged shared libraries
//!   include/
//!   libexec/                           the vendor bundle itself
//!   INSTALL_RECEIPT.json
//! <prefix>/opt/cuda@13.1 -> ../Cellar/cuda@13.1/13.1.0
//! ```
//!
//! The installer owns the lifecycle: it creates the tree before running a
//! strategy and discards it if anything fails. Strategies only populate it.

use crate::config::Config;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    pub bin: PathBuf,
    pub lib: PathBuf,
    pub include: PathBuf,
    pub libexec: PathBuf,
    opt_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(config: &Config, name: &str, version: &str) -> Self {
        Self::at(config.cellar().join(name).join(version), config.opt_dir(), name, version)
    }

    pub fn at(root: PathBuf, opt_dir: PathBuf, name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            bin: root.join("bin"),
            lib: root.join("lib"),
            include: root.join("include"),
            libexec: root.join("libexec"),
            root,
            opt_dir,
        }
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Create the keg root. Subdirectories are created by whoever fills them.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create keg: {}", self.root.display()))
    }

    /// Remove the keg and, if it is now empty, the formula directory above it.
    pub fn discard(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove keg: {}", self.root.display()))?;
        }
        if let Some(parent) = self.root.parent()
            && fs::read_dir(parent).is_ok_and(|mut entries| entries.next().is_none())
        {
            fs::remove_dir(parent)?;
        }
        Ok(())
    }

    pub fn opt_prefix(&self) -> PathBuf {
        self.opt_dir.join(&self.name)
    }

    /// Point `<prefix>/opt/<name>` at this keg with a relative symlink.
    pub fn link_opt(&self) -> Result<PathBuf> {
        let link = self.opt_prefix();
        fs::create_dir_all(&self.opt_dir)
            .with_context(|| format!("Failed to create {}", self.opt_dir.display()))?;

        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)
                .with_context(|| format!("Failed to replace {}", link.display()))?;
        }

        let target = crate::symlink::relative_path(&self.opt_dir, &self.root);
        unix_fs::symlink(&target, &link).with_context(|| {
            format!(
                "Failed to create symlink: {} -> {}",
                link.display(),
                target.display()
            )
        })?;
        Ok(link)
    }

    /// Remove the opt link if it still points at this keg.
    pub fn unlink_opt(&self) -> Result<bool> {
        let link = self.opt_prefix();
        let Ok(target) = fs::read_link(&link) else {
            return Ok(false);
        };
        let resolved = crate::symlink::normalize_path(&self.opt_dir.join(target));
        if resolved == self.root {
            fs::remove_file(&link)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Expand `{placeholder}` tokens in record text.
    ///
    /// Known tokens: `name`, `version`, `prefix`, `bin`, `lib`, `include`,
    /// `libexec`, `opt_prefix`, `opt_bin`, `opt_lib`, `opt_libexec`, and
    /// `opt:<formula>` for another formula's opt prefix. Anything else,
    /// including `${CMAKE_VAR}` and C braces, is left untouched.
    pub fn expand(&self, template: &str) -> String {
        self.expand_with(template, &[])
    }

    /// Like [`expand`](Self::expand) with extra `(token, value)` pairs.
    pub fn expand_with(&self, template: &str, extra: &[(&str, &Path)]) -> String {
        static TOKEN: OnceLock<Regex> = OnceLock::new();
        let token = TOKEN.get_or_init(|| {
            Regex::new(r"\{([a-z_]+(?::[A-Za-z0-9@+._-]+)?)\}").expect("token pattern is valid")
        });

        token
            .replace_all(template, |caps: &Captures<'_>| {
                let key = &caps[1];
                if let Some((_, value)) = extra.iter().find(|(k, _)| *k == key) {
                    return value.display().to_string();
                }
                match self.lookup(key) {
                    Some(value) => value,
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let opt = self.opt_prefix();
        let path = match key {
            "name" => return Some(self.name.clone()),
            "version" => return Some(self.version.clone()),
            "prefix" => self.root.clone(),
            "bin" => self.bin.clone(),
            "lib" => self.lib.clone(),
            "include" => self.include.clone(),
            "libexec" => self.libexec.clone(),
            "opt_prefix" => opt,
            "opt_bin" => opt.join("bin"),
            "opt_lib" => opt.join("lib"),
            "opt_libexec" => opt.join("libexec"),
            other => self.opt_dir.join(other.strip_prefix("opt:")?),
        };
        Some(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(root: &Path) -> InstallLayout {
        InstallLayout::at(
            root.join("Cellar/cuda@13.1/13.1.0"),
            root.join("opt"),
            "cuda@13.1",
            "13.1.0",
        )
    }

    #[test]
    fn test_expand_known_tokens() {
        let layout = layout(Path::new("/p"));
        assert_eq!(
            layout.expand("export CUDA_HOME={opt_libexec}"),
            "export CUDA_HOME=/p/opt/cuda@13.1/libexec"
        );
        assert_eq!(layout.expand("{bin}/nvcc {version}"), "/p/Cellar/cuda@13.1/13.1.0/bin/nvcc 13.1.0");
        assert_eq!(layout.expand("-DOPENSSL_ROOT_DIR={opt:openssl@3}"), "-DOPENSSL_ROOT_DIR=/p/opt/openssl@3");
    }

    #[test]
    fn test_expand_leaves_foreign_braces() {
        let layout = layout(Path::new("/p"));
        let cmake = "message(STATUS \"${CMAKE_CUDA_COMPILER}\")";
        assert_eq!(layout.expand(cmake), cmake);
        let c = "int main() {\n  return 0;\n}";
        assert_eq!(layout.expand(c), c);
        assert_eq!(layout.expand("{unknown_token}"), "{unknown_token}");
    }

    #[test]
    fn test_expand_with_extra() {
        let layout = layout(Path::new("/p"));
        let out = layout.expand_with("{testpath}/test.cu", &[("testpath", Path::new("/t"))]);
        assert_eq!(out, "/t/test.cu");
    }

    #[test]
    fn test_opt_link_roundtrip() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        layout.create().unwrap();

        let link = layout.link_opt().unwrap();
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("../Cellar/cuda@13.1/13.1.0")
        );
        // Relinking replaces rather than failing
        layout.link_opt().unwrap();

        assert!(layout.unlink_opt().unwrap());
        assert!(link.symlink_metadata().is_err());
    }

    #[test]
    fn test_discard_removes_empty_formula_dir() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        layout.create().unwrap();
        fs::write(layout.root.join("file"), "x").unwrap();

        layout.discard().unwrap();
        assert!(!layout.root.exists());
        assert!(!temp.path().join("Cellar/cuda@13.1").exists());
    }
}
