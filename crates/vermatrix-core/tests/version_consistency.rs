//! Every workspace crate takes its version from the workspace, and internal
//! path dependencies pin that same version.

use std::path::{Path, PathBuf};

const CRATES: [&str; 4] = [
    "crates/vermatrix-core",
    "crates/vermatrix-ci",
    "crates/vermatrix-cli",
    "crates/vermatrix-state",
];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    std::fs::read_to_string(path).unwrap().parse().unwrap()
}

fn workspace_version() -> String {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn all_crates_use_workspace_version() {
    for krate in CRATES {
        let doc = read_toml(&workspace_root().join(krate).join("Cargo.toml"));
        let inherits = doc["package"]["version"]
            .as_table()
            .and_then(|t| t.get("workspace"))
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{} should use version.workspace = true",
            krate
        );
    }
}

#[test]
fn workspace_members_match_crate_list() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let mut members: Vec<&str> = doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    members.sort_unstable();
    let mut expected = CRATES.to_vec();
    expected.sort_unstable();
    assert_eq!(members, expected);
}

#[test]
fn internal_dependencies_pin_workspace_version() {
    let ws_version = workspace_version();
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let deps = doc["workspace"]["dependencies"].as_table().unwrap();
    for (name, spec) in deps.iter().filter(|(n, _)| n.starts_with("vermatrix-")) {
        assert_eq!(
            spec.get("version").and_then(|v| v.as_str()),
            Some(ws_version.as_str()),
            "internal dependency {} must pin the workspace version",
            name
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    assert_eq!(workspace_version(), env!("CARGO_PKG_VERSION"));
    assert_eq!(vermatrix_core::VERSION, env!("CARGO_PKG_VERSION"));
}
