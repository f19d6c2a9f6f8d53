// Unit tests for the formula catalog and record handling

#[cfg(test)]
mod catalog_tests {
    use formulary::catalog::{self, Catalog};
    use formulary::formula::{DependencyKind, Source};
    use formulary::platform::Arch;
    use formulary::resolver;
    use std::collections::HashSet;

    #[test]
    fn test_every_record_has_distinct_checksums() {
        let mut seen = HashSet::new();
        for formula in catalog::builtin_formulae() {
            let Some(spec) = formula.version_spec() else {
                continue;
            };
            for artifact in resolver::resolve_all(spec).unwrap() {
                assert!(
                    seen.insert(artifact.sha256.clone()),
                    "{} reuses checksum {}",
                    formula.name,
                    artifact.sha256
                );
            }
        }
        // Three toolkit versions, two architectures each
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_toolkit_urls() {
        let formula = catalog::builtin("cuda@12.9").unwrap();
        let spec = formula.version_spec().unwrap();

        let x86 = resolver::resolve(Arch::X86_64, spec).unwrap();
        assert_eq!(
            x86.url,
            "https://developer.download.nvidia.com/compute/cuda/12.9.1/local_installers/cuda_12.9.1_575.57.08_linux.run"
        );
        let arm = resolver::resolve(Arch::Arm64, spec).unwrap();
        assert_eq!(arm.filename, "cuda_12.9.1_575.57.08_linux_sbsa.run");
    }

    #[test]
    fn test_only_wrapper_toolkits_are_keg_only() {
        for name in ["cuda@12.9", "cuda@13.0"] {
            assert!(catalog::builtin(name).unwrap().keg_only, "{name}");
        }
        // The symlink-tree release links bin/nvcc into the prefix
        assert!(!catalog::builtin("cuda@13.1").unwrap().keg_only);
    }

    #[test]
    fn test_sunshine_record() {
        let formula = catalog::builtin("sunshine").unwrap();
        match &formula.source {
            Source::Git { tag, revision, .. } => {
                assert_eq!(tag.as_deref(), Some("v2025.924.154138"));
                assert_eq!(revision.as_deref().map(str::len), Some(40));
            }
            other => panic!("unexpected source: {other:?}"),
        }

        let build: Vec<&str> = formula
            .dependencies_of(DependencyKind::Build)
            .map(|d| d.name.as_str())
            .collect();
        assert!(build.contains(&"cmake"));
        assert!(build.contains(&"gcc@14"));
        assert!(formula.conflicts.iter().any(|c| c.name == "sunshine-beta"));
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get("hello-world").unwrap().version, "0.0.1");
        assert!(catalog.get("sunshin").unwrap_err().to_string().contains("sunshine"));
    }
}

#[cfg(test)]
mod host_dependency_tests {
    use formulary::catalog;
    use formulary::formula::DependencyKind;
    use formulary::platform::{Arch, HostConfig, Os};

    #[test]
    fn test_linux_only_dependencies() {
        let formula = catalog::builtin("sunshine").unwrap();
        let linux = HostConfig::linux(Arch::X86_64);
        let mut macos = linux.clone();
        macos.os = Os::Macos;
        macos.macos_release = Some("sequoia".into());

        let names = |host: &HostConfig| -> Vec<String> {
            formula
                .host_dependencies(DependencyKind::Runtime, host)
                .map(|d| d.name.clone())
                .collect()
        };
        assert!(names(&linux).contains(&"libdrm".to_string()));
        assert!(!names(&macos).contains(&"libdrm".to_string()));
        assert!(names(&macos).contains(&"openssl@3".to_string()));
        assert_eq!(macos.bottle_tag(), "x86_64_sequoia");
    }
}

#[cfg(test)]
mod record_json_tests {
    use formulary::catalog::{self, load_json};
    use formulary::error::FormulaError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_record_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sunshine.json");
        let formula = catalog::builtin("sunshine").unwrap();
        fs::write(&path, serde_json::to_string_pretty(&formula).unwrap()).unwrap();

        assert_eq!(load_json(&path).unwrap(), formula);
    }

    #[test]
    fn test_malformed_record_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, r#"{"name": "broken"}"#).unwrap();

        assert!(matches!(load_json(&path).unwrap_err(), FormulaError::Json(_)));
    }
}
