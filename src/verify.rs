//! Black-box test procedures.
//!
//! Each formula declares an ordered list of [`TestStep`]s that run against the
//! installed keg inside a fresh temporary directory (`{testpath}`). A failed
//! check is a hard [`FormulaError::Assertion`]; a failing tool is a
//! [`FormulaError::Subprocess`]. There is no warn-only mode.

use crate::error::{FormulaError, Result};
use crate::formula::{Condition, Formula};
use crate::layout::InstallLayout;
use crate::platform::HostConfig;
use crate::process;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TestStep {
    /// Output of `program args...` must contain `expect`
    VersionOutput {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        expect: String,
        #[serde(default)]
        when: Condition,
    },
    /// `compiler <source_name> -o <output>`, then optionally run the result
    Compile {
        compiler: String,
        source_name: String,
        source: String,
        output: String,
        #[serde(default)]
        run_expect: Option<String>,
        #[serde(default)]
        when: Condition,
    },
    /// Configure a throwaway CMake project; `build/CMakeCache.txt` must appear
    CmakeConfigure {
        lists: String,
        #[serde(default)]
        defines: Vec<String>,
        #[serde(default)]
        when: Condition,
    },
    /// Run a program; it must exit 0 and leave `expect_file` behind if given
    Run {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        expect_file: Option<String>,
        #[serde(default)]
        when: Condition,
    },
}

impl TestStep {
    pub fn when(&self) -> Condition {
        match self {
            TestStep::VersionOutput { when, .. }
            | TestStep::Compile { when, .. }
            | TestStep::CmakeConfigure { when, .. }
            | TestStep::Run { when, .. } => *when,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TestStep::VersionOutput { program, args, .. } | TestStep::Run { program, args, .. } => {
                let mut parts = vec![program.clone()];
                parts.extend(args.iter().cloned());
                parts.join(" ")
            }
            TestStep::Compile {
                compiler,
                source_name,
                output,
                ..
            } => format!("{} {} -o {}", compiler, source_name, output),
            TestStep::CmakeConfigure { .. } => "cmake configure".to_string(),
        }
    }
}

/// Which steps ran and which were skipped by their condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Run every applicable step of `formula` against `layout`.
pub fn run_tests(formula: &Formula, layout: &InstallLayout, host: &HostConfig) -> Result<TestOutcome> {
    let testpath = TempDir::new().context("Failed to create test directory")?;
    let mut outcome = TestOutcome::default();

    for step in &formula.tests {
        let label = layout.expand(&step.describe());
        if !step.when().holds(host) {
            tracing::info!("skipping test step: {}", label);
            outcome.skipped.push(label);
            continue;
        }
        tracing::info!("test step: {}", label);
        run_step(step, layout, testpath.path())?;
        outcome.passed.push(label);
    }

    tracing::info!("testpath: {}", testpath.path().display());
    Ok(outcome)
}

fn assert_exists(path: &Path, check: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(FormulaError::Assertion {
            check: check.to_string(),
            expected: format!("{} exists", path.display()),
            actual: "missing".to_string(),
        })
    }
}

fn assert_contains(output: &str, expected: &str, check: &str) -> Result<()> {
    if output.contains(expected) {
        Ok(())
    } else {
        Err(FormulaError::Assertion {
            check: check.to_string(),
            expected: format!("output containing {:?}", expected),
            actual: output.trim().to_string(),
        })
    }
}

/// Run one step with `testpath` as working directory.
pub fn run_step(step: &TestStep, layout: &InstallLayout, testpath: &Path) -> Result<()> {
    let expand = |s: &str| layout.expand_with(s, &[("testpath", testpath)]);
    let command = |program: &str, args: &[String]| {
        let mut cmd = Command::new(expand(program));
        cmd.args(args.iter().map(|a| expand(a))).current_dir(testpath);
        cmd
    };

    match step {
        TestStep::VersionOutput {
            program,
            args,
            expect,
            ..
        } => {
            let output = process::output(&mut command(program, args))?;
            assert_contains(&output, &expand(expect), &expand(&step.describe()))
        }
        TestStep::Compile {
            compiler,
            source_name,
            source,
            output,
            run_expect,
            ..
        } => {
            fs::write(testpath.join(source_name), source)
                .with_context(|| format!("Failed to write {}", source_name))?;
            process::run(&mut command(
                compiler,
                &[source_name.clone(), "-o".to_string(), output.clone()],
            ))?;

            let binary = testpath.join(output);
            assert_exists(&binary, &expand(&step.describe()))?;

            if let Some(expected) = run_expect {
                let out = process::output(Command::new(&binary).current_dir(testpath))?;
                assert_contains(&out, expected, &binary.display().to_string())?;
            }
            Ok(())
        }
        TestStep::CmakeConfigure { lists, defines, .. } => {
            fs::write(testpath.join("CMakeLists.txt"), lists)
                .context("Failed to write CMakeLists.txt")?;
            let build = testpath.join("build");
            let mut args = vec![
                "-S".to_string(),
                testpath.display().to_string(),
                "-B".to_string(),
                build.display().to_string(),
            ];
            args.extend(defines.iter().cloned());
            process::run(&mut command("cmake", &args))?;
            assert_exists(&build.join("CMakeCache.txt"), "cmake configure")
        }
        TestStep::Run {
            program,
            args,
            expect_file,
            ..
        } => {
            process::run(&mut command(program, args))?;
            match expect_file {
                Some(file) => assert_exists(&testpath.join(expand(file)), &expand(&step.describe())),
                None => Ok(()),
            }
        }
    }
}
