use colored::Colorize;
use formulary::catalog::Catalog;
use formulary::colors;
use formulary::config::Config;
use formulary::error::{FormulaError, Result};
use formulary::formula::BuildOptions;
use formulary::installer::{InstallRequest, Installer};
use formulary::verify::TestOutcome;
use std::path::PathBuf;

/// Install flags as given on the command line.
pub struct InstallOptions {
    pub with: Vec<String>,
    pub artifact: Option<PathBuf>,
    pub build_from_source: bool,
    pub test: bool,
    pub force: bool,
}

fn show_progress() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

fn print_tests(outcome: &TestOutcome) {
    for step in &outcome.passed {
        colors::success(step);
    }
    for step in &outcome.skipped {
        println!("  {} {}", "-".dimmed(), format!("{} (skipped)", step).dimmed());
    }
}

pub async fn fetch(
    config: &Config,
    catalog: &Catalog,
    names: &[String],
    build_from_source: bool,
) -> Result<()> {
    let installer = Installer::new(config)?;
    let request = InstallRequest {
        build_from_source,
        show_progress: show_progress(),
        ..Default::default()
    };

    let mut failures = 0;
    for name in names {
        let result = match catalog.get(name) {
            Ok(formula) => installer.fetch(formula, &request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(path) => colors::success(&format!("{} {}", name.bold(), path.display())),
            Err(e) => {
                colors::failure(&format!("{}: {}", name, e));
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(FormulaError::Other(anyhow::anyhow!(
            "{} of {} fetches failed",
            failures,
            names.len()
        )));
    }
    Ok(())
}

pub async fn install(
    config: &Config,
    catalog: &Catalog,
    name: &str,
    options: InstallOptions,
) -> Result<()> {
    let formula = catalog.get(name)?;
    let installer = Installer::new(config)?;
    let request = InstallRequest {
        options: BuildOptions::from_flags(&options.with),
        artifact: options.artifact,
        build_from_source: options.build_from_source,
        run_tests: options.test,
        force: options.force,
        show_progress: show_progress(),
    };

    colors::heading(&format!("Installing {} {}", formula.name, formula.version));
    let outcome = installer.install(formula, &request).await?;

    let how = if outcome.poured_from_bottle {
        "poured from bottle".to_string()
    } else {
        outcome.strategy.clone()
    };
    colors::success(&format!(
        "{} {} ({}) in {:.1}s",
        outcome.name.bold(),
        outcome.path.display(),
        how,
        outcome.time_ms as f64 / 1000.0
    ));
    if !outcome.report.wrappers.is_empty() {
        println!("  {} wrapper scripts", outcome.report.wrappers.len());
    }
    if !outcome.linked.is_empty() {
        println!("  {} files linked into {}", outcome.linked.len(), config.prefix.display());
    }

    if !outcome.messages.is_empty() {
        colors::heading("Caveats");
        for message in &outcome.messages {
            println!("{}", message.trim_end());
        }
    }

    if let Some(tests) = &outcome.tests {
        colors::heading(&format!("Testing {}", outcome.name));
        print_tests(tests);
    }

    Ok(())
}

pub fn test(config: &Config, catalog: &Catalog, name: &str) -> Result<()> {
    let formula = catalog.get(name)?;
    let installer = Installer::new(config)?;

    colors::heading(&format!("Testing {}", formula.name));
    let outcome = installer.test(formula)?;
    print_tests(&outcome);
    Ok(())
}

pub fn uninstall(config: &Config, names: &[String]) -> Result<()> {
    let installer = Installer::new(config)?;

    for name in names {
        for removed in installer.uninstall(name)? {
            println!(
                "Uninstalling {} {}... ({} links removed)",
                removed.name.bold(),
                removed.version,
                removed.unlinked
            );
        }
    }
    Ok(())
}
