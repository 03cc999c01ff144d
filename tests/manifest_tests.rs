#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the XL Spaceship client.
//!
//! These tests verify that Cargo.toml keeps the panic-free lint policy, the
//! feature layout and the MSRV the crate is documented against. If any test
//! fails, the manifest has drifted from the agreed-upon standards.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Parses Cargo.toml at the project root.
fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&contents).unwrap_or_else(|e| panic!("Cargo.toml is not valid TOML: {e}"))
}

const REQUIRED_DENY_LINTS: &[&str] = &[
    "unwrap_used",
    "expect_used",
    "panic",
    "todo",
    "unimplemented",
    "indexing_slicing",
];

#[test]
fn library_code_is_panic_free() {
    let manifest = manifest();
    let clippy = manifest["lints"]["clippy"]
        .as_table()
        .expect("Cargo.toml is missing a [lints.clippy] section");

    for lint in REQUIRED_DENY_LINTS {
        assert_eq!(
            clippy.get(*lint).and_then(|v| v.as_str()),
            Some("deny"),
            "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy]. \
             All panic-prone lints are denied in library code."
        );
    }
}

#[test]
fn http_transport_is_an_optional_default_feature() {
    let manifest = manifest();
    let features = manifest["features"].as_table().unwrap();

    let default: Vec<&str> = features["default"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(default, vec!["transport-http"]);

    let reqwest = &manifest["dependencies"]["reqwest"];
    assert_eq!(
        reqwest.get("optional").and_then(|v| v.as_bool()),
        Some(true),
        "reqwest must stay optional so custom transports do not pull in an HTTP stack"
    );
}

#[test]
fn rust_version_is_declared() {
    let manifest = manifest();
    let version = manifest["package"]["rust-version"]
        .as_str()
        .expect("Cargo.toml must declare a rust-version");
    let parts: Vec<u32> = version.split('.').map(|p| p.parse().unwrap()).collect();
    assert_eq!(parts.len(), 3, "rust-version must be a full version, got {version}");
    assert!(
        parts[0] == 1 && parts[1] >= 82,
        "rust-version {version} is older than the language features the crate uses"
    );
}

#[test]
fn demos_are_registered_as_examples() {
    let manifest = manifest();
    let examples = manifest["example"].as_array().unwrap();

    for example in examples {
        let path = example["path"].as_str().unwrap();
        assert!(
            path.starts_with("demos/"),
            "example {path} must live under demos/"
        );
        assert!(
            project_root().join(path).is_file(),
            "example path {path} does not exist"
        );
    }
}
