//! Generated files handed to the component and to CI.
//!
//! - `versions.json`: the component version plus its supported matrix, so
//!   the component can discover what it was verified against at runtime
//! - the CI matrix line appended to `$GITHUB_OUTPUT`

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::domain::catalog::{SupportedVersions, VersionCatalog};
use crate::matrix::CiMatrix;

pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionsManifest<'a> {
    pub version: &'a str,
    pub supported_versions: SupportedVersions<'a>,
}

impl<'a> VersionsManifest<'a> {
    pub fn new(version: &'a str, supported: &'a VersionCatalog) -> Self {
        Self {
            version,
            supported_versions: supported.supported_versions(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize versions manifest")
    }
}

/// Write `versions.json`, creating parent directories.
pub fn write_versions_manifest(path: &Path, manifest: &VersionsManifest<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let mut content = manifest.to_json_pretty()?;
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    info!(path = %path.display(), "versions manifest written");
    Ok(())
}

/// Where the CI matrix ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixSink {
    GithubOutput(std::path::PathBuf),
    Stdout(String),
}

/// Append `matrix=<json>` to `github_output` when given, else hand the JSON back.
pub fn export_ci_matrix(matrix: &CiMatrix, github_output: Option<&Path>) -> Result<MatrixSink> {
    let json = matrix.to_json().context("serialize CI matrix")?;
    match github_output {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open {:?}", path))?;
            writeln!(file, "matrix={}", json).with_context(|| format!("append to {:?}", path))?;
            Ok(MatrixSink::GithubOutput(path.to_path_buf()))
        }
        None => Ok(MatrixSink::Stdout(json)),
    }
}
