//! Formula catalog: built-in records plus JSON records from disk.
//!
//! The toolkit family shares everything except version, driver version,
//! checksums and bottle table; [`cuda`] builds a record from exactly those.
//!
//! # Examples
//!
//! ```
//! use formulary::catalog::Catalog;
//!
//! let catalog = Catalog::builtin();
//! let formula = catalog.get("cuda@13.1").unwrap();
//! assert_eq!(formula.version, "13.1.0");
//! assert!(catalog.get("cuda@13.2").is_err());
//! ```

use crate::config::Config;
use crate::error::{FormulaError, Result};
use crate::formula::{
    ArtifactPattern, BottleSpec, Condition, Conflict, Dependency, Formula, FormulaOption,
    Livecheck, Note, Service, Source, VersionSpec,
};
use crate::platform::Os;
use crate::strategy::cmake::{ConditionalArgs, ExtraInstall, GccToolchain, OptionToggle};
use crate::strategy::{CmakeInstall, InstallPlan, LayoutStyle, RunfileInstall, ScriptInstall};
use crate::verify::TestStep;
use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const BOTTLE_ROOT: &str = "https://ghcr.io/v2/lizardbyte/homebrew";
const PLACEHOLDER_SHA: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const CUDA_TEST_SOURCE: &str = r#"#include <stdio.h>

__global__ void hello() {
  printf("Hello from CUDA!\n");
}

int main() {
  printf("CUDA Toolkit Test\n");
  return 0;
}
"#;

const CUDA_TEST_CMAKELISTS: &str = r#"cmake_minimum_required(VERSION 3.18)
project(CUDATest LANGUAGES CXX CUDA)

message(STATUS "CUDA Toolkit Root: ${CMAKE_CUDA_TOOLKIT_INCLUDE_DIRECTORIES}")
message(STATUS "CUDA Compiler: ${CMAKE_CUDA_COMPILER}")

add_executable(cuda_test test.cu)
"#;

const CUDA_WRAPPER_CAVEATS: &str = r#"CUDA Toolkit {version} has been installed to:
  {opt_libexec}

Wrapper scripts for CUDA binaries are available at:
  {opt_bin}/nvcc

These wrappers automatically set CUDA_HOME for you.

For CMake projects:
  -DCMAKE_CUDA_COMPILER={opt_bin}/nvcc
  -DCMAKE_CUDA_TOOLKIT_ROOT_DIR={opt_libexec}

For shell/manual configuration:
  export CUDA_HOME={opt_libexec}
  export PATH={opt_bin}:$PATH
  export LD_LIBRARY_PATH={opt_libexec}/lib64:$LD_LIBRARY_PATH

This formula only installs the CUDA Toolkit (compiler and libraries).
You still need to install the NVIDIA driver separately for your system.

Note: Nsight tools (Nsight Systems, Nsight Compute) have their libraries
symlinked to {opt_lib}, but the tools use their bundled versions via RPATH.

Verify your installation with:
  nvcc --version
"#;

const CUDA_SYMLINK_CAVEATS: &str = r#"CUDA Toolkit {version} has been installed to:
  {libexec}

The nvcc compiler is available at:
  {bin}/nvcc

To use CUDA in your projects, you may need to set the following environment variables:
  export CUDA_HOME={libexec}
  export PATH={bin}:$PATH
  export LD_LIBRARY_PATH={lib}:$LD_LIBRARY_PATH

NOTE: CUDA_HOME points to libexec where nvcc.profile and other config files are located.

This formula only installs the CUDA Toolkit (compiler and libraries).
You still need to install the NVIDIA driver separately for your system.

Verify your installation with:
  nvcc --version
"#;

/// One CUDA toolkit release.
pub struct CudaRelease<'a> {
    pub version: &'a str,
    pub driver_version: &'a str,
    pub x86_64_sha256: &'a str,
    pub arm64_sha256: &'a str,
    pub layout: LayoutStyle,
    pub bottle_rebuild: u32,
    pub bottle_x86_64_linux: &'a str,
}

/// Build a toolkit record; the `@major.minor` suffix comes from the version.
pub fn cuda(release: &CudaRelease<'_>) -> Formula {
    let spec = VersionSpec::new(
        release.version,
        release.driver_version,
        release.x86_64_sha256,
        release.arm64_sha256,
        ArtifactPattern::cuda_runfile(),
    );
    let line = spec.major_minor().unwrap_or_else(|| release.version.to_string());

    let mut cmake_defines = vec!["-DCMAKE_CUDA_COMPILER={bin}/nvcc".to_string()];
    let caveats = match release.layout {
        LayoutStyle::SymlinkTree => {
            cmake_defines.push("-DCMAKE_CUDA_TOOLKIT_ROOT_DIR={libexec}".to_string());
            CUDA_SYMLINK_CAVEATS
        }
        LayoutStyle::Wrappers | LayoutStyle::Bare => CUDA_WRAPPER_CAVEATS,
    };

    Formula {
        name: format!("cuda@{}", line),
        desc: "NVIDIA CUDA Toolkit - GPU-accelerated library and nvcc compiler".to_string(),
        homepage: "https://developer.nvidia.com/cuda-toolkit".to_string(),
        license: None,
        version: release.version.to_string(),
        source: Source::Runfile(spec),
        requirements: vec![Os::Linux],
        dependencies: vec![Dependency::test("cmake")],
        conflicts: vec![],
        options: vec![],
        bottle: Some(BottleSpec {
            root_url: BOTTLE_ROOT.to_string(),
            rebuild: release.bottle_rebuild,
            files: BTreeMap::from([(
                "x86_64_linux".to_string(),
                release.bottle_x86_64_linux.to_string(),
            )]),
        }),
        // Wrapper kegs stay out of the prefix; only the symlink-tree release is linked
        keg_only: release.layout != LayoutStyle::SymlinkTree,
        install: InstallPlan::Runfile(RunfileInstall::cuda(release.layout)),
        tests: vec![
            TestStep::VersionOutput {
                program: "{bin}/nvcc".to_string(),
                args: vec!["--version".to_string()],
                expect: "{version}".to_string(),
                when: Condition::Always,
            },
            TestStep::Compile {
                compiler: "{bin}/nvcc".to_string(),
                source_name: "test.cu".to_string(),
                source: CUDA_TEST_SOURCE.to_string(),
                output: "test".to_string(),
                run_expect: Some("CUDA Toolkit Test".to_string()),
                when: Condition::Always,
            },
            TestStep::CmakeConfigure {
                lists: CUDA_TEST_CMAKELISTS.to_string(),
                defines: cmake_defines,
                when: Condition::Always,
            },
        ],
        caveats: Some(caveats.to_string()),
        post_install: vec![],
        livecheck: Some(Livecheck::PageRegex {
            url: "https://developer.nvidia.com/cuda-toolkit-archive".to_string(),
            regex: r#"(?i)href="/cuda-(?:downloads|[\d-]+-download-archive)">CUDA\s+Toolkit\s+v?({major_minor}\.[\d.]+)"#
                .to_string(),
        }),
        service: None,
    }
}

fn hello_world() -> Formula {
    let files = ["arm64_tahoe", "arm64_sequoia", "arm64_sonoma", "x86_64_linux"]
        .into_iter()
        .map(|tag| (tag.to_string(), PLACEHOLDER_SHA.to_string()))
        .collect();

    Formula {
        name: "hello-world".to_string(),
        desc: "Simple program that outputs 'Hello, World!'".to_string(),
        homepage: "https://app.lizardbyte.dev".to_string(),
        license: None,
        version: "0.0.1".to_string(),
        source: Source::Git {
            url: "https://github.com/LizardByte/actions.git".to_string(),
            tag: None,
            revision: None,
        },
        requirements: vec![],
        dependencies: vec![],
        conflicts: vec![],
        options: vec![],
        bottle: Some(BottleSpec {
            root_url: BOTTLE_ROOT.to_string(),
            rebuild: 1,
            files,
        }),
        keg_only: false,
        install: InstallPlan::Script(ScriptInstall {
            file_name: "hello-world".to_string(),
            contents: "#!/bin/sh\necho \"Hello, World!\"\n".to_string(),
        }),
        tests: vec![TestStep::Run {
            program: "{bin}/hello-world".to_string(),
            args: vec![],
            expect_file: None,
            when: Condition::Always,
        }],
        caveats: None,
        post_install: vec![],
        livecheck: None,
        service: None,
    }
}

const SUNSHINE_VERSION: &str = "2025.924.154138";
const SUNSHINE_COMMIT: &str = "86188d47a7463b0f73b35de18a628353adeaa20e";

const SUNSHINE_LINUX_LIBRARIES: &[&str] = &[
    "at-spi2-core",
    "avahi",
    "ayatana-ido",
    "cairo",
    "gdk-pixbuf",
    "glib",
    "gnu-which",
    "gtk+3",
    "harfbuzz",
    "libayatana-appindicator",
    "libayatana-indicator",
    "libcap",
    "libdbusmenu",
    "libdrm",
    "libice",
    "libnotify",
    "libsm",
    "libva",
    "libx11",
    "libxcb",
    "libxcursor",
    "libxext",
    "libxfixes",
    "libxi",
    "libxinerama",
    "libxrandr",
    "libxtst",
    "mesa",
    "numactl",
    "pango",
    "pulseaudio",
    "systemd",
    "wayland",
];

fn sunshine() -> Formula {
    let mut dependencies: Vec<Dependency> = ["cmake", "doxygen", "graphviz", "node", "pkgconf"]
        .into_iter()
        .map(Dependency::build)
        .collect();
    dependencies.extend(
        ["curl", "icu4c@78", "miniupnpc", "openssl@3", "opus"]
            .into_iter()
            .map(Dependency::runtime),
    );
    dependencies.push(Dependency::build("gcc@14").on_linux());
    dependencies.push(Dependency::test("gcc@14").on_linux());
    dependencies.extend(
        SUNSHINE_LINUX_LIBRARIES
            .iter()
            .map(|name| Dependency::runtime(name).on_linux()),
    );

    let args = [
        "-DBUILD_WERROR=ON",
        "-DCMAKE_CXX_STANDARD=23",
        "-DHOMEBREW_ALLOW_FETCHCONTENT=ON",
        "-DOPENSSL_ROOT_DIR={opt:openssl@3}",
        "-DSUNSHINE_ASSETS_DIR=sunshine/assets",
        "-DSUNSHINE_BUILD_HOMEBREW=ON",
        "-DSUNSHINE_PUBLISHER_NAME=LizardByte",
        "-DSUNSHINE_PUBLISHER_WEBSITE=https://app.lizardbyte.dev",
        "-DSUNSHINE_PUBLISHER_ISSUE_URL=https://app.lizardbyte.dev/support",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    Formula {
        name: "sunshine".to_string(),
        desc: "Self-hosted game stream host for Moonlight".to_string(),
        homepage: "https://app.lizardbyte.dev/Sunshine".to_string(),
        license: Some("GPL-3.0-only".to_string()),
        version: SUNSHINE_VERSION.to_string(),
        source: Source::Git {
            url: "https://github.com/LizardByte/Sunshine.git".to_string(),
            tag: Some(format!("v{}", SUNSHINE_VERSION)),
            revision: Some(SUNSHINE_COMMIT.to_string()),
        },
        requirements: vec![],
        dependencies,
        conflicts: vec![Conflict {
            name: "sunshine-beta".to_string(),
            because: "sunshine and sunshine-beta cannot be installed at the same time".to_string(),
        }],
        options: vec![
            FormulaOption {
                name: "with-docs".to_string(),
                description: "Enable docs".to_string(),
            },
            FormulaOption {
                name: "with-static-boost".to_string(),
                description: "Enable static link of Boost libraries".to_string(),
            },
            FormulaOption {
                name: "without-static-boost".to_string(),
                description: "Disable static link of Boost libraries".to_string(),
            },
        ],
        bottle: None,
        keg_only: false,
        install: InstallPlan::Cmake(CmakeInstall {
            env: BTreeMap::from([
                ("BRANCH".to_string(), String::new()),
                ("BUILD_VERSION".to_string(), "{version}".to_string()),
                ("COMMIT".to_string(), SUNSHINE_COMMIT.to_string()),
            ]),
            gcc: Some(GccToolchain {
                version: "14".to_string(),
                static_runtime: true,
            }),
            args,
            conditional_args: vec![
                ConditionalArgs {
                    when: Condition::Upstream,
                    args: vec!["-DBUILD_TESTS=ON".to_string()],
                    otherwise: vec!["-DBUILD_TESTS=OFF".to_string()],
                },
                ConditionalArgs {
                    when: Condition::Linux,
                    args: vec!["-DCUDA_FAIL_ON_MISSING=OFF".to_string()],
                    otherwise: vec![],
                },
            ],
            toggles: vec![
                OptionToggle {
                    option: "docs".to_string(),
                    on: vec!["-DBUILD_DOCS=ON".to_string()],
                    off: vec!["-DBUILD_DOCS=OFF".to_string()],
                    link_against: None,
                },
                OptionToggle {
                    option: "static-boost".to_string(),
                    on: vec!["-DBOOST_USE_STATIC=ON".to_string()],
                    off: vec!["-DBOOST_USE_STATIC=OFF".to_string()],
                    link_against: Some("icu4c@78".to_string()),
                },
            ],
            bin_installs: vec![
                ExtraInstall {
                    path: "build/tests/test_sunshine".to_string(),
                    when: Condition::Upstream,
                },
                ExtraInstall {
                    path: "src_assets/linux/misc/postinst".to_string(),
                    when: Condition::Linux,
                },
            ],
        }),
        tests: vec![
            TestStep::Run {
                program: "{bin}/sunshine".to_string(),
                args: vec!["--version".to_string()],
                expect_file: None,
                when: Condition::Always,
            },
            TestStep::Run {
                program: "{bin}/test_sunshine".to_string(),
                args: vec![
                    "--gtest_color=yes".to_string(),
                    "--gtest_output=xml:test_results.xml".to_string(),
                ],
                expect_file: Some("test_results.xml".to_string()),
                when: Condition::Upstream,
            },
        ],
        caveats: Some(
            "Thanks for installing Sunshine!\n\nTo get started, review the documentation at:\n  https://docs.lizardbyte.dev/projects/sunshine\n"
                .to_string(),
        ),
        post_install: vec![
            Note {
                when: Condition::Linux,
                message: "ATTENTION: To complete installation, you must run the following command:\n`sudo {bin}/postinst`"
                    .to_string(),
            },
            Note {
                when: Condition::Macos,
                message: "Sunshine can only access microphones on macOS due to system limitations.\nTo stream system audio use \"Soundflower\" or \"BlackHole\".\n\nGamepads are not currently supported on macOS."
                    .to_string(),
            },
        ],
        livecheck: Some(Livecheck::GithubLatest {
            repo: "LizardByte/Sunshine".to_string(),
            regex: r"^v?(\d+\.\d+\.\d+)$".to_string(),
        }),
        service: Some(Service {
            run: vec![
                "{opt_bin}/sunshine".to_string(),
                "~/.config/sunshine/sunshine.conf".to_string(),
            ],
        }),
    }
}

/// Every built-in record.
pub fn builtin_formulae() -> Vec<Formula> {
    vec![
        cuda(&CudaRelease {
            version: "12.9.1",
            driver_version: "575.57.08",
            x86_64_sha256: "0f6d806ddd87230d2adbe8a6006a9d20144fdbda9de2d6acc677daa5d036417a",
            arm64_sha256: "64f47ab791a76b6889702425e0755385f5fa216c5a9f061875c7deed5f08cdb6",
            layout: LayoutStyle::Wrappers,
            bottle_rebuild: 0,
            bottle_x86_64_linux: PLACEHOLDER_SHA,
        }),
        cuda(&CudaRelease {
            version: "13.0.2",
            driver_version: "580.95.05",
            x86_64_sha256: "81a5d0d0870ba2022efb0a531dcc60adbdc2bbff7b3ef19d6fd6d8105406c775",
            arm64_sha256: "93ab4c77ae2bc0f1f600ef48ccd3ff25a3203a6a6161a84511a33cbf5b5621fc",
            layout: LayoutStyle::Wrappers,
            bottle_rebuild: 0,
            bottle_x86_64_linux: "99bdba97c1abdd7f83a90c6f383766c6cd6e9ac22c5da12806164929c96669cf",
        }),
        cuda(&CudaRelease {
            version: "13.1.0",
            driver_version: "590.44.01",
            x86_64_sha256: "6b4fdf2694b3d7afbc526f26412b4cf4f050b202324455053307310f53b323a7",
            arm64_sha256: "06cda49a7031b1c99f784237be5c852619379cbba9555036045044b9ddc99240",
            layout: LayoutStyle::SymlinkTree,
            bottle_rebuild: 3,
            bottle_x86_64_linux: "dbc2fe792ce4a748642a2386176e2944975201fbbcaab487ff716281f8a74675",
        }),
        hello_world(),
        sunshine(),
    ]
}

/// A single built-in record by name.
pub fn builtin(name: &str) -> Option<Formula> {
    builtin_formulae().into_iter().find(|f| f.name == name)
}

/// Parse and validate one JSON record.
pub fn load_json(path: &Path) -> Result<Formula> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read formula: {}", path.display()))?;
    let formula: Formula = serde_json::from_str(&contents)?;
    formula.validate()?;
    Ok(formula)
}

/// Named set of validated formula records.
#[derive(Debug, Clone)]
pub struct Catalog {
    formulae: BTreeMap<String, Formula>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self::from_formulae(builtin_formulae())
    }

    pub fn from_formulae(formulae: Vec<Formula>) -> Self {
        Self {
            formulae: formulae.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    /// Built-ins, then `*.json` records from the configured directory (which win on name clashes).
    pub fn load(config: &Config) -> Result<Self> {
        let mut catalog = Self::builtin();
        let Some(dir) = &config.formula_dir else {
            return Ok(catalog);
        };

        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read formula directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let formula = load_json(&path).map_err(|e| {
                FormulaError::config(format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!("loaded {} from {}", formula.name, path.display());
            catalog.formulae.insert(formula.name.clone(), formula);
        }

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Result<&Formula> {
        self.formulae.get(name).ok_or_else(|| {
            let suggestions = self.suggest(name);
            if suggestions.is_empty() {
                FormulaError::NotFound(name.to_string())
            } else {
                FormulaError::NotFound(format!(
                    "{} (did you mean {}?)",
                    name,
                    suggestions.join(", ")
                ))
            }
        })
    }

    /// Closest record names, best first
    pub fn suggest(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(f64, &String)> = self
            .formulae
            .keys()
            .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
            .filter(|(score, _)| *score >= 0.85)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(3).map(|(_, n)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulae.values()
    }

    pub fn len(&self) -> usize {
        self.formulae.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulae.is_empty()
    }
}
