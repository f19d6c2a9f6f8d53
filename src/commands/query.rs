use colored::Colorize;
use formulary::catalog::Catalog;
use formulary::cellar;
use formulary::config::Config;
use formulary::error::Result;
use formulary::formula::{DependencyKind, Formula, Source};
use formulary::layout::InstallLayout;
use formulary::resolver::{self, Artifact};

fn dependency_line(formula: &Formula, config: &Config, kind: DependencyKind) -> Option<String> {
    let names: Vec<String> = formula
        .host_dependencies(kind, &config.host)
        .map(|dep| {
            if cellar::is_installed(config, &dep.name) {
                format!("{} {}", dep.name, "✓".green())
            } else {
                dep.name.clone()
            }
        })
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

pub fn info(config: &Config, catalog: &Catalog, name: &str, json: bool) -> Result<()> {
    let formula = catalog.get(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(formula)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("==> {}: stable {}", formula.name, formula.version)
            .bold()
            .green()
    );
    println!("{}", formula.desc);
    println!("{}: {}", "Homepage".bold(), formula.homepage);
    if let Some(license) = &formula.license {
        println!("{}: {}", "License".bold(), license);
    }
    if formula.keg_only {
        println!("{}: versioned formula", "Keg-only".bold().yellow());
    }

    match &formula.source {
        Source::Runfile(spec) => {
            println!(
                "{}: {} (driver {})",
                "Runfile".bold(),
                spec.version,
                spec.companion_version
            );
        }
        Source::Git { url, tag, .. } => {
            let tag = tag.as_deref().unwrap_or("HEAD");
            println!("{}: {} @ {}", "Source".bold(), url, tag);
        }
    }
    println!(
        "{}: {}",
        "Install".bold(),
        formula.install.strategy().name()
    );

    let installed = cellar::installed_versions(config, &formula.name)?;
    if installed.is_empty() {
        println!("{}: {}", "Installed".bold(), "no".dimmed());
    } else {
        println!("{}:", "Installed".bold());
        for keg in &installed {
            println!("  {} {}", keg.path.display(), keg.version.dimmed());
        }
    }

    for (label, kind) in [
        ("Build", DependencyKind::Build),
        ("Test", DependencyKind::Test),
        ("Required", DependencyKind::Runtime),
    ] {
        if let Some(line) = dependency_line(formula, config, kind) {
            println!("{}: {}", label.bold(), line);
        }
    }

    if !formula.options.is_empty() {
        println!("{}", "==> Options".bold());
        for option in &formula.options {
            println!("--{}", option.name);
            println!("\t{}", option.description.dimmed());
        }
    }

    if formula.caveats.is_some() {
        println!("{}", "==> Caveats".bold());
        println!("Run {} to see them.", format!("formulary caveats {}", formula.name).cyan());
    }

    Ok(())
}

fn print_artifact(artifact: &Artifact) {
    println!("{}", format!("==> {}", artifact.arch).bold().green());
    println!("{}: {}", "File".bold(), artifact.filename);
    println!("{}: {}", "URL".bold(), artifact.url);
    println!("{}: {}", "SHA256".bold(), artifact.sha256);
}

pub fn resolve(config: &Config, catalog: &Catalog, name: &str, all: bool) -> Result<()> {
    let formula = catalog.get(name)?;
    let spec = formula.version_spec().ok_or_else(|| {
        formulary::FormulaError::config(format!(
            "{} is built from a git checkout and has no per-architecture artifact",
            formula.name
        ))
    })?;

    if all {
        for artifact in resolver::resolve_all(spec)? {
            print_artifact(&artifact);
        }
    } else {
        print_artifact(&resolver::resolve(config.host.arch, spec)?);
    }
    Ok(())
}

pub fn caveats(config: &Config, catalog: &Catalog, name: &str) -> Result<()> {
    let formula = catalog.get(name)?;
    let layout = InstallLayout::new(config, &formula.name, &formula.version);

    let Some(caveats) = &formula.caveats else {
        println!("{} has no caveats.", formula.name);
        return Ok(());
    };

    println!("{}", format!("==> {}: Caveats", formula.name).bold());
    println!("{}", layout.expand(caveats).trim_end());
    Ok(())
}
