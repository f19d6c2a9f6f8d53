//! CMake project builds from a source checkout.
//!
//! Record-driven: the record supplies environment, CMake arguments,
//! option toggles and the extra files to put in `bin/`. On Linux the build can
//! be pinned to a versioned GCC formula and link its runtime statically so the
//! result does not depend on that compiler at runtime.

use super::{InstallContext, InstallReport, InstallStrategy, install_executable};
use crate::cellar;
use crate::config::Config;
use crate::error::{FormulaError, Result};
use crate::formula::{BuildOptions, Condition, Formula};
use crate::layout::InstallLayout;
use crate::process;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

const STATIC_RUNTIME_FLAGS: &str = "-static-libgcc -static-libstdc++";

/// Versioned GCC formula to compile with on Linux.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GccToolchain {
    pub version: String,
    /// Link libgcc and libstdc++ statically
    #[serde(default)]
    pub static_runtime: bool,
}

impl GccToolchain {
    pub fn formula_name(&self) -> String {
        format!("gcc@{}", self.version)
    }
}

/// Arguments switched by a `with-<option>` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionToggle {
    pub option: String,
    #[serde(default)]
    pub on: Vec<String>,
    #[serde(default)]
    pub off: Vec<String>,
    /// Installed formula whose headers and libraries the enabled build links against
    #[serde(default)]
    pub link_against: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalArgs {
    pub when: Condition,
    pub args: Vec<String>,
    #[serde(default)]
    pub otherwise: Vec<String>,
}

/// A build product copied into `bin/` after `make install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInstall {
    pub path: String,
    #[serde(default)]
    pub when: Condition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmakeInstall {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub gcc: Option<GccToolchain>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub conditional_args: Vec<ConditionalArgs>,
    #[serde(default)]
    pub toggles: Vec<OptionToggle>,
    #[serde(default)]
    pub bin_installs: Vec<ExtraInstall>,
}

/// Arguments every CMake formula gets, Homebrew style.
pub fn std_cmake_args(layout: &InstallLayout) -> Vec<String> {
    vec![
        format!("-DCMAKE_INSTALL_PREFIX={}", layout.root.display()),
        "-DCMAKE_INSTALL_LIBDIR=lib".to_string(),
        "-DCMAKE_BUILD_TYPE=Release".to_string(),
        "-DCMAKE_FIND_FRAMEWORK=LAST".to_string(),
        "-DCMAKE_VERBOSE_MAKEFILE=ON".to_string(),
        "-Wno-dev".to_string(),
        "-DBUILD_TESTING=OFF".to_string(),
    ]
}

fn append(env: &mut BTreeMap<String, String>, key: &str, value: &str) {
    env.entry(key.to_string())
        .and_modify(|existing| {
            existing.push(' ');
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

impl CmakeInstall {
    /// Build environment, with record values expanded.
    pub fn environment(&self, ctx: &InstallContext<'_>) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), ctx.layout.expand(v)))
            .collect();

        if let Some(gcc) = &self.gcc
            && ctx.config.host.is_linux()
        {
            let gcc_bin = ctx.config.opt_prefix(&gcc.formula_name()).join("bin");
            env.insert(
                "CC".to_string(),
                gcc_bin.join(format!("gcc-{}", gcc.version)).display().to_string(),
            );
            env.insert(
                "CXX".to_string(),
                gcc_bin.join(format!("g++-{}", gcc.version)).display().to_string(),
            );
            if gcc.static_runtime {
                append(&mut env, "LDFLAGS", STATIC_RUNTIME_FLAGS);
            }
        }

        for toggle in &self.toggles {
            let Some(dep) = &toggle.link_against else {
                continue;
            };
            if ctx.options.without(&toggle.option) {
                continue;
            }
            let opt = ctx.config.opt_prefix(dep);
            append(&mut env, "CXXFLAGS", &format!("-I{}", opt.join("include").display()));
            append(&mut env, "LDFLAGS", &format!("-L{}", opt.join("lib").display()));
            env.insert("LIBRARY_PATH".to_string(), opt.join("lib").display().to_string());
            tracing::info!("linking against {} at {}", dep, opt.join("lib").display());
        }

        env
    }

    /// Full configure argument list after `-S . -B build -G "Unix Makefiles"`.
    pub fn arguments(&self, ctx: &InstallContext<'_>) -> Vec<String> {
        let host = &ctx.config.host;
        let mut args = std_cmake_args(ctx.layout);
        args.extend(self.args.iter().map(|a| ctx.layout.expand(a)));

        for cond in &self.conditional_args {
            let chosen = if cond.when.holds(host) {
                &cond.args
            } else {
                &cond.otherwise
            };
            args.extend(chosen.iter().map(|a| ctx.layout.expand(a)));
        }

        for toggle in &self.toggles {
            let enabled = ctx.options.with(&toggle.option);
            tracing::info!(
                "{}: {}",
                toggle.option,
                if enabled { "enabled" } else { "disabled" }
            );
            let chosen = if enabled { &toggle.on } else { &toggle.off };
            args.extend(chosen.iter().map(|a| ctx.layout.expand(a)));
        }

        if self.gcc.as_ref().is_some_and(|g| g.static_runtime) && host.is_linux() {
            args.push(format!("-DCMAKE_EXE_LINKER_FLAGS={}", STATIC_RUNTIME_FLAGS));
            args.push(format!("-DCMAKE_SHARED_LINKER_FLAGS={}", STATIC_RUNTIME_FLAGS));
        }

        args
    }

    fn command(program: &str, dir: &Path, env: &BTreeMap<String, String>) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(dir).envs(env);
        cmd
    }
}

impl InstallStrategy for CmakeInstall {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn needs_checkout(&self) -> bool {
        true
    }

    /// Every enabled toggle's `link_against` formula must already be installed.
    fn check(&self, formula: &Formula, config: &Config, options: &BuildOptions) -> Result<()> {
        for toggle in &self.toggles {
            let Some(dep) = &toggle.link_against else {
                continue;
            };
            if options.with(&toggle.option) && !cellar::is_installed(config, dep) {
                return Err(FormulaError::config(format!(
                    "{dep} must be installed to build {} --with-{}; install {dep} or drop the option",
                    formula.name, toggle.option
                )));
            }
        }
        Ok(())
    }

    fn install(&self, ctx: &InstallContext<'_>) -> Result<InstallReport> {
        let env = self.environment(ctx);
        let args = self.arguments(ctx);
        let src = ctx.buildpath;

        process::run(
            Self::command("cmake", src, &env)
                .args(["-S", ".", "-B", "build", "-G", "Unix Makefiles"])
                .args(&args),
        )?;
        process::run(Self::command("make", src, &env).args(["-C", "build"]))?;
        process::run(Self::command("make", src, &env).args(["-C", "build", "install"]))?;

        let mut report = InstallReport::default();
        for extra in &self.bin_installs {
            if !extra.when.holds(&ctx.config.host) {
                continue;
            }
            report
                .files
                .push(install_executable(&src.join(&extra.path), &ctx.layout.bin)?);
        }

        Ok(report)
    }
}
