//! Orchestrator configuration.
//!
//! Loaded from a camelCase JSON file (default `vermatrix.json`), then
//! adjusted from the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `VERMATRIX_LATEST_KNOWN` | overrides `latestKnown` (required from one source or the other) |
//! | `VERMATRIX_MAX_PARALLEL` | overrides `maxParallel` |
//! | `CI` | one retry per task when `retries` is unset |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::catalog::DEFAULT_TESTED_MATRIX;
use crate::domain::error::{MatrixError, Result};
use crate::domain::toolchain::{default_requirements, ToolchainRequirement, ToolchainSelector};
use crate::domain::version::Version;
use crate::matrix::{TaskMatrixGenerator, DEFAULT_TASK_PREFIX};

pub const DEFAULT_CONFIG_FILE: &str = "vermatrix.json";
pub const LATEST_KNOWN_ENV: &str = "VERMATRIX_LATEST_KNOWN";
pub const MAX_PARALLEL_ENV: &str = "VERMATRIX_MAX_PARALLEL";

fn default_catalog() -> PathBuf {
    PathBuf::from("versions.json")
}

fn default_tested_matrix() -> String {
    DEFAULT_TESTED_MATRIX.to_string()
}

fn default_task_prefix() -> String {
    DEFAULT_TASK_PREFIX.to_string()
}

/// JDK installs handed to every task when the host sets them.
fn default_passthrough_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("java_zulu_path".to_string(), "ZULU_JDK".to_string()),
        ("java_zulu_alt_path".to_string(), "ZULU_ALT_JDK".to_string()),
    ])
}

fn default_max_parallel() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_local_repo() -> PathBuf {
    PathBuf::from("build/local-repo")
}

fn default_work_root() -> PathBuf {
    PathBuf::from("build/vermatrix")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    #[serde(default = "default_tested_matrix")]
    pub tested_matrix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_matrix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_known: Option<String>,
    #[serde(default = "default_task_prefix")]
    pub task_prefix: String,
    #[serde(default = "default_requirements")]
    pub toolchains: Vec<ToolchainRequirement>,
    /// Task environment key to host environment variable name.
    #[serde(default = "default_passthrough_env")]
    pub passthrough_env: BTreeMap<String, String>,
    /// Command run per task; `{version}`, `{task}`, `{toolchain}` are substituted.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Concurrent tasks allowed per toolchain id; unlisted toolchains are unbounded.
    #[serde(default)]
    pub toolchain_capacity: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_local_repo")]
    pub local_repo: PathBuf,
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            tested_matrix: default_tested_matrix(),
            supported_matrix: None,
            latest_known: None,
            task_prefix: default_task_prefix(),
            toolchains: default_requirements(),
            passthrough_env: default_passthrough_env(),
            command: Vec::new(),
            max_parallel: default_max_parallel(),
            toolchain_capacity: BTreeMap::new(),
            retries: None,
            timeout_secs: default_timeout_secs(),
            local_repo: default_local_repo(),
            work_root: default_work_root(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist.
    ///
    /// Relative paths inside the file resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let mut config = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for p in [&mut self.catalog, &mut self.local_repo, &mut self.work_root] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(MatrixError::Config("maxParallel must be at least 1".to_string()));
        }
        if let Some((id, _)) = self.toolchain_capacity.iter().find(|(_, c)| **c == 0) {
            return Err(MatrixError::Config(format!(
                "toolchainCapacity for {} must be at least 1",
                id
            )));
        }
        if self.toolchains.is_empty() {
            return Err(MatrixError::Config("no toolchain requirements".to_string()));
        }
        Ok(())
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(latest) = lookup(LATEST_KNOWN_ENV).filter(|v| !v.trim().is_empty()) {
            self.latest_known = Some(latest.trim().to_string());
        }
        if let Some(raw) = lookup(MAX_PARALLEL_ENV) {
            self.max_parallel = raw.trim().parse().map_err(|_| {
                MatrixError::Config(format!("{} is not a number: {}", MAX_PARALLEL_ENV, raw))
            })?;
        }
        if self.retries.is_none() && lookup("CI").is_some() {
            self.retries = Some(1);
        }
        self.validate()
    }

    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Newest published external version. Every run checks the catalog
    /// against it, so leaving it unset is a configuration error.
    pub fn latest_known_version(&self) -> Result<Version> {
        let raw = self
            .latest_known
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                MatrixError::Config(format!(
                    "latestKnown is not set (config file or {})",
                    LATEST_KNOWN_ENV
                ))
            })?;
        Version::parse(raw)
    }

    pub fn effective_retries(&self) -> u32 {
        self.retries.unwrap_or(0)
    }

    /// Resolve passthrough variables that are set on the host.
    pub fn external_paths<F>(&self, lookup: F) -> BTreeMap<String, PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.passthrough_env
            .iter()
            .filter_map(|(key, var)| {
                lookup(var)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.clone(), PathBuf::from(v)))
            })
            .collect()
    }

    pub fn generator<F>(&self, lookup: F) -> TaskMatrixGenerator
    where
        F: Fn(&str) -> Option<String>,
    {
        TaskMatrixGenerator::new(ToolchainSelector::new(self.toolchains.clone()))
            .with_prefix(self.task_prefix.clone())
            .with_external_paths(self.external_paths(lookup))
    }
}
