//! Toolchain selection by version threshold.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{MatrixError, Result};
use super::version::Version;

/// Identifier of a runtime or compiler variant, e.g. `jdk17`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolchainId(String);

impl ToolchainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolchainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Versions at or above `min_version_threshold` run on `toolchain_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainRequirement {
    #[serde(rename = "threshold")]
    pub min_version_threshold: Version,
    #[serde(rename = "toolchain")]
    pub toolchain_id: ToolchainId,
    /// Installation directory exposed to tasks, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
}

impl ToolchainRequirement {
    pub fn new(threshold: Version, toolchain: impl Into<String>) -> Self {
        Self {
            min_version_threshold: threshold,
            toolchain_id: ToolchainId::new(toolchain),
            home: None,
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }
}

/// The stock rule set: versions from 7.1.0 on need JDK 17, older ones JDK 11.
pub fn default_requirements() -> Vec<ToolchainRequirement> {
    vec![
        ToolchainRequirement::new(Version::from_segments(&[7, 1, 0]), "jdk17"),
        ToolchainRequirement::new(Version::zero(), "jdk11"),
    ]
}

/// Requirements held in descending threshold order.
#[derive(Debug, Clone, Default)]
pub struct ToolchainSelector {
    requirements: Vec<ToolchainRequirement>,
}

impl ToolchainSelector {
    pub fn new(mut requirements: Vec<ToolchainRequirement>) -> Self {
        requirements.sort_by(|a, b| b.min_version_threshold.cmp(&a.min_version_threshold));
        Self { requirements }
    }

    /// First requirement whose threshold is at or below `version`.
    pub fn select(&self, version: &Version) -> Result<&ToolchainRequirement> {
        self.requirements
            .iter()
            .find(|r| r.min_version_threshold <= *version)
            .ok_or_else(|| MatrixError::NoToolchainMatch {
                version: version.to_string(),
            })
    }

    /// True when a zero threshold makes selection total.
    pub fn has_catch_all(&self) -> bool {
        self.requirements
            .last()
            .is_some_and(|r| r.min_version_threshold == Version::zero())
    }

    pub fn requirements(&self) -> &[ToolchainRequirement] {
        &self.requirements
    }
}

/// Pure selection over an arbitrary requirement list.
pub fn select(version: &Version, requirements: &[ToolchainRequirement]) -> Result<ToolchainId> {
    ToolchainSelector::new(requirements.to_vec())
        .select(version)
        .map(|r| r.toolchain_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_threshold_boundary() {
        let reqs = default_requirements();
        assert_eq!(select(&v("7.0.4"), &reqs).unwrap().as_str(), "jdk11");
        assert_eq!(select(&v("7.1.0"), &reqs).unwrap().as_str(), "jdk17");
        assert_eq!(select(&v("10.0.0"), &reqs).unwrap().as_str(), "jdk17");
    }

    #[test]
    fn test_input_order_irrelevant() {
        let reqs = vec![
            ToolchainRequirement::new(Version::zero(), "jdk11"),
            ToolchainRequirement::new(v("8.0.0"), "jdk21"),
            ToolchainRequirement::new(v("7.1.0"), "jdk17"),
        ];
        let selector = ToolchainSelector::new(reqs);
        assert_eq!(selector.select(&v("8.1.4")).unwrap().toolchain_id.as_str(), "jdk21");
        assert_eq!(selector.select(&v("7.4.2")).unwrap().toolchain_id.as_str(), "jdk17");
        assert!(selector.has_catch_all());
    }

    #[test]
    fn test_no_match_without_catch_all() {
        let reqs = vec![ToolchainRequirement::new(v("7.1.0"), "jdk17")];
        let err = select(&v("4.2.0"), &reqs).unwrap_err();
        assert!(matches!(err, MatrixError::NoToolchainMatch { ref version } if version == "4.2.0"));
        assert!(!ToolchainSelector::new(reqs).has_catch_all());
    }

    #[test]
    fn test_prerelease_below_threshold() {
        let reqs = default_requirements();
        assert_eq!(select(&v("7.1.0-alpha01"), &reqs).unwrap().as_str(), "jdk11");
    }

    #[test]
    fn test_requirement_json_shape() {
        let req: ToolchainRequirement = serde_json::from_str(
            r#"{ "threshold": "7.1.0", "toolchain": "jdk17", "home": "/opt/jdk17" }"#,
        )
        .unwrap();
        assert_eq!(req.min_version_threshold, v("7.1.0"));
        assert_eq!(req.home.as_deref(), Some(std::path::Path::new("/opt/jdk17")));
    }
}
