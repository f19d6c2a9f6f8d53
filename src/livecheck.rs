//! Upstream version checks.
//!
//! Two strategies, chosen by the record:
//! - page regex: scrape a release index; `{major_minor}` in the pattern is
//!   replaced by the record's own release line so `cuda@13.0` never reports 13.1
//! - GitHub latest release: read `tag_name` and take the first capture group

use crate::cellar::compare_versions;
use crate::error::{FormulaError, Result};
use crate::formula::{Formula, Livecheck, major_minor};
use regex::Regex;
use serde::{Deserialize, Serialize};

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivecheckResult {
    pub name: String,
    pub current: String,
    pub latest: String,
}

impl LivecheckResult {
    pub fn is_outdated(&self) -> bool {
        compare_versions(&self.latest, &self.current).is_gt()
    }
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
}

/// Compile a record pattern, pinning `{major_minor}` to `version`'s line.
pub fn compile_pattern(pattern: &str, version: &str) -> Result<Regex> {
    let pattern = match major_minor(version) {
        Some(line) => pattern.replace("{major_minor}", &regex::escape(&line)),
        None => pattern.to_string(),
    };
    Regex::new(&pattern)
        .map_err(|e| FormulaError::config(format!("invalid livecheck regex: {}", e)))
}

/// Highest version captured anywhere in `body`.
pub fn latest_in(body: &str, regex: &Regex) -> Option<String> {
    regex
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .max_by(|a, b| compare_versions(a, b))
}

/// Query upstream for the newest version of `formula`.
pub async fn check(client: &reqwest::Client, formula: &Formula) -> Result<LivecheckResult> {
    let livecheck = formula.livecheck.as_ref().ok_or_else(|| {
        FormulaError::config(format!("{} declares no livecheck", formula.name))
    })?;

    let latest = match livecheck {
        Livecheck::PageRegex { url, regex } => {
            let regex = compile_pattern(regex, &formula.version)?;
            tracing::debug!("livecheck {}: GET {}", formula.name, url);
            let body = client.get(url).send().await?.error_for_status()?.text().await?;
            latest_in(&body, &regex)
        }
        Livecheck::GithubLatest { repo, regex } => {
            let regex = compile_pattern(regex, &formula.version)?;
            let url = format!("{}/repos/{}/releases/latest", GITHUB_API, repo);
            tracing::debug!("livecheck {}: GET {}", formula.name, url);
            let release: GithubRelease = client
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            latest_in(&release.tag_name, &regex)
        }
    };

    let latest = latest.ok_or_else(|| {
        FormulaError::NotFound(format!("no version matched for {}", formula.name))
    })?;

    Ok(LivecheckResult {
        name: formula.name.clone(),
        current: formula.version.clone(),
        latest,
    })
}
