use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use formulary::catalog::Catalog;
use formulary::colors;
use formulary::config::Config;
use formulary::error::Result;
use formulary::formula::Formula;
use formulary::installer::Installer;
use formulary::livecheck::{self, LivecheckResult};

/// Generate shell completions
pub fn completions(shell: clap_complete::Shell) {
    let mut cmd = crate::Cli::command();
    generate(shell, &mut cmd, "formulary", &mut std::io::stdout());
}

pub async fn livecheck(
    config: &Config,
    catalog: &Catalog,
    names: &[String],
    json: bool,
) -> Result<()> {
    let formulae: Vec<&Formula> = if names.is_empty() {
        catalog.iter().filter(|f| f.livecheck.is_some()).collect()
    } else {
        names
            .iter()
            .map(|n| catalog.get(n))
            .collect::<Result<_>>()?
    };

    let installer = Installer::new(config)?;
    let client = installer.client();
    let checks = formulae.iter().map(|f| livecheck::check(client, f));
    let results = futures::future::join_all(checks).await;

    let mut found: Vec<LivecheckResult> = Vec::new();
    for (formula, result) in formulae.iter().zip(results) {
        match result {
            Ok(r) => found.push(r),
            Err(e) => colors::warning(&format!("{}: {}", formula.name, e)),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    for r in &found {
        let latest = if r.is_outdated() {
            r.latest.green().bold().to_string()
        } else {
            r.latest.clone()
        };
        println!("{}: {} ==> {}", r.name.bold(), r.current, latest);
    }
    Ok(())
}
