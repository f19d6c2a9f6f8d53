//! Wrapper script generation for relocated vendor binaries.
//!
//! A vendor bundle installed under a version-qualified `libexec/` cannot rely
//! on paths baked in at link time. Each real executable gets a small bash stub
//! in the keg's `bin/` that injects the toolkit home and search paths, then
//! `exec`s the real binary so the argument vector and exit code pass through.
//!
//! ```text
//! #!/bin/bash
//! export CUDA_HOME="/p/Cellar/cuda@13.1/13.1.0/libexec"
//! export PATH="/p/Cellar/cuda@13.1/13.1.0/libexec/bin:$PATH"
//! export LD_LIBRARY_PATH="/p/Cellar/cuda@13.1/13.1.0/libexec/lib64:$LD_LIBRARY_PATH"
//! exec "/p/Cellar/cuda@13.1/13.1.0/libexec/bin/nvcc" "$@"
//! ```

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Environment a toolkit's binaries expect, as declared by the formula record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitEnv {
    /// Variable naming the toolkit root, e.g. `CUDA_HOME`
    pub home_var: String,
    /// Library directory below the toolkit root, e.g. `lib64`
    pub lib_subdir: String,
}

impl ToolkitEnv {
    pub fn cuda() -> Self {
        Self {
            home_var: "CUDA_HOME".to_string(),
            lib_subdir: "lib64".to_string(),
        }
    }
}

/// One generated stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperScript {
    pub name: String,
    pub target: PathBuf,
    pub home_var: String,
    pub home: PathBuf,
    pub lib_dir: PathBuf,
}

impl WrapperScript {
    pub fn new(target: &Path, home: &Path, env: &ToolkitEnv) -> Result<Self> {
        let name = target
            .file_name()
            .with_context(|| format!("No file name in {}", target.display()))?
            .to_string_lossy()
            .into_owned();

        Ok(Self {
            name,
            target: target.to_path_buf(),
            home_var: env.home_var.clone(),
            home: home.to_path_buf(),
            lib_dir: home.join(&env.lib_subdir),
        })
    }

    pub fn render(&self) -> String {
        let bin_dir = self.target.parent().unwrap_or(&self.home);
        format!(
            "#!/bin/bash\n\
             export {var}=\"{home}\"\n\
             export PATH=\"{bin}:$PATH\"\n\
             export LD_LIBRARY_PATH=\"{lib}:$LD_LIBRARY_PATH\"\n\
             exec \"{target}\" \"$@\"\n",
            var = self.home_var,
            home = self.home.display(),
            bin = bin_dir.display(),
            lib = self.lib_dir.display(),
            target = self.target.display(),
        )
    }

    /// Write into `bin_dir` with mode 0755, replacing any previous stub.
    pub fn write(&self, bin_dir: &Path) -> Result<PathBuf> {
        let path = bin_dir.join(&self.name);

        // A symlink left by another layout would redirect the write into libexec
        if path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(&path)?;
        }

        fs::write(&path, self.render())
            .with_context(|| format!("Failed to write wrapper: {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to chmod wrapper: {}", path.display()))?;
        Ok(path)
    }
}

/// Regular files in `dir` with any execute bit set, sorted by path.
///
/// Vendor `bin/` directories mix tools with profiles and config files
/// (`nvcc.profile`); those are skipped.
pub fn discover_executables(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut executables = Vec::new();

    for path in crate::symlink::dir_entries(dir)? {
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
            executables.push(path);
        }
    }

    Ok(executables)
}

/// Generate one wrapper per executable in `<home>/bin` into `bin_dir`.
pub fn generate_wrappers(home: &Path, bin_dir: &Path, env: &ToolkitEnv) -> Result<Vec<PathBuf>> {
    let executables = discover_executables(&home.join("bin"))?;
    fs::create_dir_all(bin_dir)
        .with_context(|| format!("Failed to create {}", bin_dir.display()))?;

    let wrappers = executables
        .iter()
        .map(|exe| WrapperScript::new(exe, home, env))
        .collect::<Result<Vec<_>>>()?;

    // Each wrapper is an independent file
    let mut written = wrappers
        .par_iter()
        .map(|wrapper| wrapper.write(bin_dir))
        .collect::<Result<Vec<_>>>()?;
    written.sort();

    tracing::info!("generated {} wrapper scripts in {}", written.len(), bin_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &str, mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_render() {
        let home = Path::new("/k/libexec");
        let wrapper = WrapperScript::new(&home.join("bin/nvcc"), home, &ToolkitEnv::cuda()).unwrap();
        let script = wrapper.render();

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("export CUDA_HOME=\"/k/libexec\"\n"));
        assert!(script.contains("export PATH=\"/k/libexec/bin:$PATH\"\n"));
        assert!(script.contains("export LD_LIBRARY_PATH=\"/k/libexec/lib64:$LD_LIBRARY_PATH\"\n"));
        assert!(script.ends_with("exec \"/k/libexec/bin/nvcc\" \"$@\"\n"));
    }

    #[test]
    fn test_discover_skips_non_executables() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        write_file(&bin.join("nvcc"), "#!/bin/sh\n", 0o755);
        write_file(&bin.join("ptxas"), "#!/bin/sh\n", 0o700);
        write_file(&bin.join("nvcc.profile"), "INCLUDES=", 0o644);
        fs::create_dir_all(bin.join("crt")).unwrap();

        let found = discover_executables(&bin).unwrap();
        assert_eq!(found, vec![bin.join("nvcc"), bin.join("ptxas")]);
    }

    #[test]
    fn test_discover_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(discover_executables(&temp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_generate_overwrites_previous_symlink() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("libexec");
        write_file(&home.join("bin/nvcc"), "#!/bin/sh\necho real\n", 0o755);
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        std::os::unix::fs::symlink("../libexec/bin/nvcc", bin.join("nvcc")).unwrap();

        generate_wrappers(&home, &bin, &ToolkitEnv::cuda()).unwrap();

        assert!(!bin.join("nvcc").symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_to_string(home.join("bin/nvcc")).unwrap(),
            "#!/bin/sh\necho real\n"
        );
    }
}
