// Source builds that must fail before anything is checked out
// Run with: cargo test --test source_install_tests

mod test_helpers;

use formulary::catalog;
use formulary::error::FormulaError;
use formulary::formula::{BuildOptions, Formula, Source};
use formulary::installer::{InstallRequest, Installer};
use std::fs;
use test_helpers::TestEnvironment;

/// Sunshine with nothing external required and a source that fails if touched.
fn offline_sunshine() -> Formula {
    let mut formula = catalog::builtin("sunshine").unwrap();
    formula.dependencies.clear();
    formula.conflicts.clear();
    formula.source = Source::Git {
        url: "/nonexistent/sunshine.git".to_string(),
        tag: None,
        revision: None,
    };
    formula
}

fn static_boost() -> InstallRequest {
    InstallRequest {
        options: BuildOptions::from_flags(["with-static-boost"]),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_static_boost_without_icu4c_fails_before_checkout() {
    let env = TestEnvironment::new();
    let formula = offline_sunshine();
    let installer = Installer::new(&env.config).unwrap();

    let err = installer.install(&formula, &static_boost()).await.unwrap_err();
    assert!(matches!(err, FormulaError::Configuration(_)), "got {err}");
    assert!(err.to_string().contains("icu4c@78"));
    assert!(!env.config.cellar().join("sunshine").exists());
}

#[test]
fn test_static_boost_preflight_passes_with_icu4c() {
    let env = TestEnvironment::new();
    let formula = offline_sunshine();
    let installer = Installer::new(&env.config).unwrap();

    assert!(installer.preflight(&formula, &static_boost(), false).is_err());
    fs::create_dir_all(env.config.cellar().join("icu4c@78/78.1")).unwrap();
    installer.preflight(&formula, &static_boost(), false).unwrap();

    // Without the option the companion is not needed at all
    fs::remove_dir_all(env.config.cellar().join("icu4c@78")).unwrap();
    installer
        .preflight(&formula, &InstallRequest::default(), false)
        .unwrap();
}
