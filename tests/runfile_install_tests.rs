// End-to-end toolkit installs driven by a fake vendor runfile
// Run with: cargo test --test runfile_install_tests

mod test_helpers;

use formulary::error::FormulaError;
use formulary::installer::{InstallRequest, Installer};
use formulary::layout::InstallLayout;
use formulary::platform::{Arch, HostConfig};
use formulary::receipt::InstallReceipt;
use formulary::resolver;
use formulary::strategy::{InstallPlan, LayoutStyle};
use formulary::verify::{self, TestStep};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::process::Command;
use test_helpers::{TestEnvironment, failing_runfile, fake_runfile, toolkit_formula};

fn request_with(artifact: std::path::PathBuf) -> InstallRequest {
    InstallRequest {
        artifact: Some(artifact),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_x86_64_13_1_1_wrapper_reports_version() {
    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);

    let artifact = resolver::resolve(Arch::X86_64, formula.version_spec().unwrap()).unwrap();
    assert_eq!(artifact.filename, "cuda_13.1.1_590.48.01_linux.run");

    let installer = Installer::new(&env.config).unwrap();
    let outcome = installer.install(&formula, &request_with(runfile)).await.unwrap();

    let nvcc = outcome.path.join("bin/nvcc");
    let mode = fs::metadata(&nvcc).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let wrapper = fs::read_to_string(&nvcc).unwrap();
    assert!(wrapper.starts_with("#!/bin/bash"));
    assert!(wrapper.contains("export CUDA_HOME="));
    assert!(wrapper.contains("exec \""));

    let out = Command::new(&nvcc).arg("--version").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("13.1.1"), "unexpected output: {stdout}");
    assert!(stdout.contains(&format!("CUDA_HOME={}", outcome.path.join("libexec").display())));
}

#[tokio::test]
async fn test_one_wrapper_per_executable() {
    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.0.2");
    let formula = toolkit_formula("13.0.2", "580.95.05", &runfile, LayoutStyle::Wrappers);

    let installer = Installer::new(&env.config).unwrap();
    let outcome = installer.install(&formula, &request_with(runfile)).await.unwrap();

    let mut names: Vec<String> = fs::read_dir(outcome.path.join("bin"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["nvcc", "ptxas"]);
    assert_eq!(outcome.report.wrappers.len(), 2);

    // Nsight shared objects are staged into lib/
    assert!(outcome.path.join("lib/libQt6Core.so.6").symlink_metadata().is_ok());

    let receipt = InstallReceipt::read(&outcome.path).unwrap();
    assert_eq!(receipt.strategy, "runfile/wrappers");
    assert_eq!(receipt.arch, Arch::X86_64);
    assert!(!receipt.poured_from_bottle);
    assert_eq!(
        receipt.source.filename.as_deref(),
        Some("cuda_13.0.2_580.95.05_linux.run")
    );

    // Keg-only: reachable through opt/, nothing linked into the prefix
    assert!(env.config.opt_prefix("cuda@13.0").join("bin/nvcc").exists());
    assert!(!env.prefix().join("bin/nvcc").exists());
}

#[tokio::test]
async fn test_finishing_twice_is_idempotent() {
    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.0");
    let formula = toolkit_formula("13.1.0", "590.44.01", &runfile, LayoutStyle::SymlinkTree);

    let installer = Installer::new(&env.config).unwrap();
    let outcome = installer.install(&formula, &request_with(runfile)).await.unwrap();
    assert_eq!(
        fs::read_link(outcome.path.join("bin/nvcc")).unwrap(),
        std::path::PathBuf::from("../libexec/bin/nvcc")
    );
    assert!(outcome.path.join("nvvm/bin").symlink_metadata().is_ok());
    assert!(env.prefix().join("bin/nvcc").exists());

    let InstallPlan::Runfile(strategy) = &formula.install else {
        panic!("toolkit records use the runfile strategy");
    };
    let layout = InstallLayout::new(&env.config, &formula.name, &formula.version);
    let again = strategy.finish_layout(&layout).unwrap();
    assert_eq!(again, outcome.report);
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_no_keg() {
    let env = TestEnvironment::new();
    let dl = env.scratch("dl");
    let runfile = fake_runfile(&dl, "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);

    // Same name, different bytes
    fs::write(&runfile, "#!/bin/sh\necho tampered\n").unwrap();

    let installer = Installer::new(&env.config).unwrap();
    let err = installer.install(&formula, &request_with(runfile)).await.unwrap_err();
    assert!(matches!(err, FormulaError::Integrity { .. }), "got {err}");
    assert!(!env.config.cellar().join("cuda@13.1").exists());
    assert!(!env.config.opt_prefix("cuda@13.1").exists());
}

#[tokio::test]
async fn test_failing_installer_propagates_exit_code_and_cleans_up() {
    let env = TestEnvironment::new();
    let runfile = failing_runfile(&env.scratch("dl"), 3);
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);

    let installer = Installer::new(&env.config).unwrap();
    let err = installer.install(&formula, &request_with(runfile)).await.unwrap_err();
    match &err {
        FormulaError::Subprocess { command, code } => {
            assert!(command.starts_with("sh "));
            assert_eq!(*code, Some(3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 3);
    assert!(!env.config.cellar().join("cuda@13.1").exists());
}

#[test]
fn test_unknown_architecture_is_configuration_error() {
    let err = HostConfig::detect(Some("ppc64le"), false).unwrap_err();
    assert!(matches!(err, FormulaError::Configuration(_)));

    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);
    let err = resolver::resolve_tag("riscv64", formula.version_spec().unwrap()).unwrap_err();
    assert!(matches!(err, FormulaError::Configuration(_)));
}

#[tokio::test]
async fn test_arm64_without_local_artifact_checksum_fails() {
    // The arm64 checksum in the record does not match the x86_64 fake
    let env = TestEnvironment::with_arch(Arch::Arm64);
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);

    let artifact = resolver::resolve(Arch::Arm64, formula.version_spec().unwrap()).unwrap();
    assert_eq!(artifact.filename, "cuda_13.1.1_590.48.01_linux_sbsa.run");

    let installer = Installer::new(&env.config).unwrap();
    let err = installer.install(&formula, &request_with(runfile)).await.unwrap_err();
    assert!(matches!(err, FormulaError::Integrity { .. }));
}

#[tokio::test]
async fn test_version_step_against_installed_keg() {
    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);

    let installer = Installer::new(&env.config).unwrap();
    installer.install(&formula, &request_with(runfile)).await.unwrap();

    let layout = InstallLayout::new(&env.config, &formula.name, &formula.version);
    let version_step = formula
        .tests
        .iter()
        .find(|step| matches!(step, TestStep::VersionOutput { .. }))
        .unwrap();
    verify::run_step(version_step, &layout, &env.scratch("testpath")).unwrap();
}

#[tokio::test]
async fn test_reinstall_requires_force() {
    let env = TestEnvironment::new();
    let runfile = fake_runfile(&env.scratch("dl"), "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);
    let installer = Installer::new(&env.config).unwrap();

    installer.install(&formula, &request_with(runfile.clone())).await.unwrap();
    let err = installer
        .install(&formula, &request_with(runfile.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, FormulaError::Configuration(_)));

    let forced = InstallRequest {
        force: true,
        ..request_with(runfile)
    };
    let outcome = installer.install(&formula, &forced).await.unwrap();
    assert!(outcome.path.join("bin/nvcc").exists());
}

#[tokio::test]
async fn test_forced_reinstall_with_bad_artifact_keeps_keg() {
    let env = TestEnvironment::new();
    let dl = env.scratch("dl");
    let runfile = fake_runfile(&dl, "13.1.1");
    let formula = toolkit_formula("13.1.1", "590.48.01", &runfile, LayoutStyle::Wrappers);
    let installer = Installer::new(&env.config).unwrap();

    let outcome = installer.install(&formula, &request_with(runfile)).await.unwrap();

    let tampered = dl.join("cuda_tampered.run");
    fs::write(&tampered, "#!/bin/sh\necho tampered\n").unwrap();
    let forced = InstallRequest {
        force: true,
        ..request_with(tampered)
    };
    let err = installer.install(&formula, &forced).await.unwrap_err();
    assert!(matches!(err, FormulaError::Integrity { .. }), "got {err}");

    assert!(outcome.path.join("bin/nvcc").exists());
    assert!(InstallReceipt::read(&outcome.path).is_ok());
    assert!(env.config.opt_prefix("cuda@13.1").join("bin/nvcc").exists());
}
