//! Verification task specifications and their outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::catalog::VersionEntry;
use super::digest::{compute_digest, hash_value};
use super::error::Result;
use super::toolchain::ToolchainRequirement;

/// One isolated verification run against one external version.
///
/// Built once at configuration time and never mutated afterwards. The name
/// is stable across runs, so executors may cache or re-run by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTaskSpec {
    pub name: String,
    pub version_entry: VersionEntry,
    pub toolchain: ToolchainRequirement,
    /// Optional external paths handed to the task, keyed by short name.
    #[serde(default)]
    pub extra_environment: BTreeMap<String, PathBuf>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    name: &'a str,
    version: &'a str,
    toolchain: &'a str,
    environment: &'a BTreeMap<String, PathBuf>,
}

impl VerificationTaskSpec {
    pub fn version(&self) -> &str {
        &self.version_entry.identifier
    }

    /// SHA-256 over name, version, toolchain and environment.
    pub fn fingerprint(&self) -> Result<String> {
        compute_digest(&FingerprintInput {
            name: &self.name,
            version: self.version(),
            toolchain: self.toolchain.toolchain_id.as_str(),
            environment: &self.extra_environment,
        })
    }

    /// Environment with values replaced by truncated hashes, for logs.
    pub fn redacted_environment(&self) -> BTreeMap<String, String> {
        self.extra_environment
            .iter()
            .map(|(k, v)| (k.clone(), hash_value(&v.to_string_lossy())))
            .collect()
    }
}

/// Terminal outcome of one task, after the task's own retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Pass,
    Fail { reason: String },
}

impl TaskOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        TaskOutcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, TaskOutcome::Pass)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Pass => write!(f, "pass"),
            TaskOutcome::Fail { reason } => write!(f, "fail: {}", reason),
        }
    }
}
