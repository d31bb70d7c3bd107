#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the Caro client.
//!
//! These tests parse Cargo.toml and verify that lints, features and demo
//! targets conform to project policy. If any test fails, the manifest has
//! drifted from the agreed-upon standards.
//!
//! All checks are synchronous filesystem reads.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads a file relative to the project root and returns its contents.
fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    })
}

fn manifest() -> toml::Table {
    toml::from_str(&read_project_file("Cargo.toml")).expect("Cargo.toml must parse")
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_free_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_free_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_denies_panic_prone_lints() {
        let manifest = manifest();
        let clippy = manifest["lints"]["clippy"]
            .as_table()
            .expect("Cargo.toml is missing a [lints.clippy] section");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] to keep \
                 library code panic-free."
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    #[test]
    fn default_features_enable_websocket_and_http() {
        let manifest = manifest();
        let default: Vec<&str> = manifest["features"]["default"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(default.contains(&"transport-websocket"));
        assert!(default.contains(&"snapshot-http"));
    }

    #[test]
    fn network_stacks_are_optional() {
        let manifest = manifest();
        let deps = manifest["dependencies"].as_table().unwrap();
        for name in ["tokio-tungstenite", "reqwest"] {
            let optional = deps[name]
                .get("optional")
                .and_then(toml::Value::as_bool)
                .unwrap_or(false);
            assert!(
                optional,
                "`{name}` must stay optional so the core builds without networking"
            );
        }
    }

    #[test]
    fn msrv_is_declared() {
        let manifest = manifest();
        let version = manifest["package"]["rust-version"]
            .as_str()
            .expect("Cargo.toml must declare a rust-version");
        assert!(version.split('.').count() >= 2, "unexpected rust-version {version}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: demo_targets
// ─────────────────────────────────────────────────────────────────────────────

mod demo_targets {
    use super::*;

    #[test]
    fn every_declared_demo_exists() {
        let manifest = manifest();
        let examples = manifest["example"].as_array().unwrap();
        assert!(!examples.is_empty());
        for example in examples {
            let path = example["path"].as_str().unwrap();
            assert!(
                project_root().join(path).is_file(),
                "demo target `{path}` declared in Cargo.toml does not exist"
            );
        }
    }

    #[test]
    fn networked_demo_requires_network_features() {
        let manifest = manifest();
        let online = manifest["example"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["name"].as_str() == Some("online_match"))
            .expect("online_match demo must be declared");
        let required: Vec<&str> = online["required-features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(required, ["transport-websocket", "snapshot-http"]);
    }
}
