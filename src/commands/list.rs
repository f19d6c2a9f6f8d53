use colored::Colorize;
use formulary::cellar;
use formulary::config::Config;
use formulary::error::Result;
use std::collections::BTreeMap;

pub fn list(config: &Config, show_versions: bool, json: bool) -> Result<()> {
    let kegs = cellar::list_installed(config)?;

    if json {
        #[derive(serde::Serialize)]
        struct KegInfo<'a> {
            name: &'a str,
            version: &'a str,
            path: String,
            strategy: Option<&'a str>,
            linked: bool,
        }

        let list: Vec<KegInfo<'_>> = kegs
            .iter()
            .map(|k| KegInfo {
                name: &k.name,
                version: &k.version,
                path: k.path.display().to_string(),
                strategy: k.receipt.as_ref().map(|r| r.strategy.as_str()),
                linked: k.linked(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if kegs.is_empty() {
        println!("No formulae installed");
        return Ok(());
    }

    // Group versions per formula
    let mut by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for keg in &kegs {
        by_name.entry(&keg.name).or_default().push(&keg.version);
    }

    for (name, versions) in by_name {
        if show_versions {
            println!("{} {}", name.bold(), versions.join(" ").dimmed());
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}
