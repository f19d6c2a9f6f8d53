use colored::Colorize;
use formulary::catalog::Catalog;
use formulary::cellar;
use formulary::config::Config;
use formulary::error::Result;

pub fn config(config: &Config, catalog: &Catalog) -> Result<()> {
    println!("{}", "==> System Configuration".bold().green());
    println!();

    println!("{}", "Paths:".bold());
    let formula_dir = config
        .formula_dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(built-in only)".to_string());
    for (label, value) in [
        ("Prefix", config.prefix.display().to_string()),
        ("Cellar", config.cellar().display().to_string()),
        ("Cache", config.cache_dir.display().to_string()),
        ("Formulae", formula_dir),
    ] {
        println!("  {}: {}", label.dimmed(), value.cyan());
    }
    println!();

    let kegs = cellar::list_installed(config)?;
    println!("{}", "Statistics:".bold());
    println!(
        "  {}: {}",
        "Known formulae".dimmed(),
        catalog.len().to_string().cyan()
    );
    println!(
        "  {}: {}",
        "Installed kegs".dimmed(),
        kegs.len().to_string().cyan()
    );
    println!();

    println!("{}", "System:".bold());
    println!(
        "  {}: {}",
        "Version".dimmed(),
        env!("CARGO_PKG_VERSION").cyan()
    );
    println!(
        "  {}: {}",
        "Architecture".dimmed(),
        config.host.arch.to_string().cyan()
    );
    println!("  {}: {}", "OS".dimmed(), config.host.os.to_string().cyan());
    println!(
        "  {}: {}",
        "Bottle tag".dimmed(),
        config.host.bottle_tag().cyan()
    );
    if config.host.upstream_ci {
        println!("  {}: {}", "Upstream CI".dimmed(), "yes".cyan());
    }

    Ok(())
}
