// Test helpers for isolated testing
// Provides a throwaway prefix and fake vendor installers so nothing touches the system

#![allow(dead_code)]

use formulary::catalog::{self, CudaRelease};
use formulary::config::Config;
use formulary::formula::Formula;
use formulary::platform::{Arch, HostConfig};
use formulary::strategy::LayoutStyle;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated prefix, cleaned up when dropped
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_arch(Arch::X86_64)
    }

    pub fn with_arch(arch: Arch) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::isolated(temp_dir.path(), HostConfig::linux(arch));
        Self { temp_dir, config }
    }

    pub fn prefix(&self) -> &Path {
        &self.config.prefix
    }

    /// Scratch directory outside the prefix
    pub fn scratch(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join("scratch").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sha256_hex(path: &Path) -> String {
    format!("{:x}", Sha256::digest(fs::read(path).unwrap()))
}

const FAKE_RUNFILE: &str = r#"#!/bin/sh
# Stand-in for a vendor self-extracting installer
set -e
root=""
for arg in "$@"; do
  case "$arg" in
    --toolkitpath=*) root="${arg#--toolkitpath=}" ;;
    --silent|--toolkit|--no-drm|--no-man-page|--no-opengl-libs) ;;
    --defaultroot=*|--tmpdir=*) ;;
    *) echo "unexpected argument: $arg" >&2; exit 64 ;;
  esac
done
[ -n "$root" ] || exit 65

mkdir -p "$root/bin" "$root/lib64" "$root/include" "$root/nvvm/bin" "$root/nsight-systems-2025.1/host-linux-x64"

cat > "$root/bin/nvcc" <<'EOS'
#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "nvcc: NVIDIA (R) Cuda compiler driver"
  echo "Cuda compilation tools, release @MAJOR_MINOR@, V@VERSION@"
  echo "CUDA_HOME=$CUDA_HOME"
  exit 0
fi
exit 1
EOS
cat > "$root/bin/ptxas" <<'EOS'
#!/bin/sh
exit 0
EOS
chmod 755 "$root/bin/nvcc" "$root/bin/ptxas"
echo 'INCLUDES += -I$(TOP)/include' > "$root/bin/nvcc.profile"

echo "elf" > "$root/lib64/libcudart.so.13"
echo "/* cuda */" > "$root/include/cuda.h"
echo "elf" > "$root/nvvm/bin/cicc"
echo "elf" > "$root/nsight-systems-2025.1/host-linux-x64/libQt6Core.so.6"
"#;

/// Write a fake runfile that lays out a toolkit reporting `version`.
pub fn fake_runfile(dir: &Path, version: &str) -> PathBuf {
    let major_minor: Vec<&str> = version.split('.').take(2).collect();
    let path = dir.join(format!("cuda_{}_fake.run", version));
    fs::write(
        &path,
        FAKE_RUNFILE
            .replace("@VERSION@", version)
            .replace("@MAJOR_MINOR@", &major_minor.join(".")),
    )
    .unwrap();
    path
}

/// A runfile that fails the way a real installer does on a bad host.
pub fn failing_runfile(dir: &Path, code: i32) -> PathBuf {
    let path = dir.join("cuda_broken.run");
    fs::write(
        &path,
        format!("#!/bin/sh\necho 'driver mismatch' >&2\nexit {}\n", code),
    )
    .unwrap();
    path
}

/// Toolkit record whose x86_64 checksum matches `runfile`.
pub fn toolkit_formula(version: &str, driver: &str, runfile: &Path, layout: LayoutStyle) -> Formula {
    let x86_64_sha256 = sha256_hex(runfile);
    let mut formula = catalog::cuda(&CudaRelease {
        version,
        driver_version: driver,
        x86_64_sha256: &x86_64_sha256,
        arm64_sha256: &"b".repeat(64),
        layout,
        bottle_rebuild: 0,
        bottle_x86_64_linux: &"0".repeat(64),
    });
    // Nothing in the sandbox provides cmake
    formula.dependencies.clear();
    formula
}
