//! Release descriptors, stages and per-stage results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ReleaseError, ReleaseResult};

/// Commit-ish a release tag points at unless told otherwise.
pub const DEFAULT_TARGET_COMMITISH: &str = "main";

/// Everything one release invocation needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub version: String,
    pub notes: String,
    pub tag_name: String,
    pub target_commitish: String,
    /// Set only through [`ReleaseDescriptor::with_overwrite`].
    overwrite_reason: Option<String>,
}

impl ReleaseDescriptor {
    pub fn new(
        version: impl Into<String>,
        notes: impl Into<String>,
        target_commitish: Option<&str>,
    ) -> ReleaseResult<Self> {
        let version = version.into().trim().to_string();
        if version.is_empty() {
            return Err(ReleaseError::InvalidDescriptor(
                "release version is empty".to_string(),
            ));
        }
        if version.chars().any(char::is_whitespace) {
            return Err(ReleaseError::InvalidDescriptor(format!(
                "release version '{}' contains whitespace",
                version
            )));
        }
        if version.contains(['/', '\\']) || version.contains("..") {
            return Err(ReleaseError::InvalidDescriptor(format!(
                "release version '{}' contains a path separator or '..'",
                version
            )));
        }
        let target = target_commitish
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TARGET_COMMITISH);

        Ok(Self {
            tag_name: format!("v{}", version),
            version,
            notes: notes.into().trim().to_string(),
            target_commitish: target.to_string(),
            overwrite_reason: None,
        })
    }

    /// Permit moving an existing tag and replacing an announcement.
    pub fn with_overwrite(mut self, reason: impl Into<String>) -> ReleaseResult<Self> {
        let reason = reason.into().trim().to_string();
        if reason.is_empty() {
            return Err(ReleaseError::OverwriteReasonRequired);
        }
        self.overwrite_reason = Some(reason);
        Ok(self)
    }

    pub fn overwrite_allowed(&self) -> bool {
        self.overwrite_reason.is_some()
    }

    pub fn overwrite_reason(&self) -> Option<&str> {
        self.overwrite_reason.as_deref()
    }
}

/// Release stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStage {
    Publish,
    Sign,
    Tag,
    Announce,
}

impl ReleaseStage {
    pub const ALL: [ReleaseStage; 4] = [
        ReleaseStage::Publish,
        ReleaseStage::Sign,
        ReleaseStage::Tag,
        ReleaseStage::Announce,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReleaseStage::Publish => "publish",
            ReleaseStage::Sign => "sign",
            ReleaseStage::Tag => "tag",
            ReleaseStage::Announce => "announce",
        }
    }

    /// Stages that must succeed before this one may start.
    pub fn predecessors(self) -> &'static [ReleaseStage] {
        match self {
            ReleaseStage::Publish => &[],
            ReleaseStage::Sign => &[ReleaseStage::Publish],
            ReleaseStage::Tag => &[ReleaseStage::Publish, ReleaseStage::Sign],
            ReleaseStage::Announce => &[ReleaseStage::Tag],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which operations the invoker asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedStages {
    /// Publish artifacts; sign when credentials happen to be present.
    PublishOnly,
    /// Publish, sign, tag and announce.
    TagAndAnnounce,
}

impl RequestedStages {
    pub fn includes(self, stage: ReleaseStage) -> bool {
        match self {
            RequestedStages::PublishOnly => {
                matches!(stage, ReleaseStage::Publish | ReleaseStage::Sign)
            }
            RequestedStages::TagAndAnnounce => true,
        }
    }

    /// Whether signing is mandatory for this request.
    pub fn requires_signature(self) -> bool {
        self.includes(ReleaseStage::Tag) || self.includes(ReleaseStage::Announce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Success,
    Failed,
    Skipped,
}

/// Outcome of one stage with an optional human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStageResult {
    pub stage: ReleaseStage,
    pub outcome: StageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl PipelineStageResult {
    pub fn success(stage: ReleaseStage) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Success,
            cause: None,
        }
    }

    pub fn failed(stage: ReleaseStage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Failed,
            cause: Some(cause.into()),
        }
    }

    pub fn skipped(stage: ReleaseStage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            cause: Some(cause.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Succeeded,
    Failed,
}

/// Terminal report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub tag_name: String,
    pub stages: Vec<PipelineStageResult>,
    pub status: ReleaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<PipelineStageResult>,
}

impl ReleaseReport {
    pub fn from_stages(tag_name: impl Into<String>, stages: Vec<PipelineStageResult>) -> Self {
        let first_failure = stages
            .iter()
            .find(|s| s.outcome == StageOutcome::Failed)
            .cloned();
        let status = if first_failure.is_some() {
            ReleaseStatus::Failed
        } else {
            ReleaseStatus::Succeeded
        };
        Self {
            tag_name: tag_name.into(),
            stages,
            status,
            first_failure,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ReleaseStatus::Succeeded
    }

    pub fn stage(&self, stage: ReleaseStage) -> Option<&PipelineStageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_derives_tag() {
        let d = ReleaseDescriptor::new(" 3.0.1\n", "notes", None).unwrap();
        assert_eq!(d.version, "3.0.1");
        assert_eq!(d.tag_name, "v3.0.1");
        assert_eq!(d.target_commitish, DEFAULT_TARGET_COMMITISH);
        assert!(!d.overwrite_allowed());
    }

    #[test]
    fn test_descriptor_rejects_empty_version() {
        assert!(matches!(
            ReleaseDescriptor::new("  ", "", None),
            Err(ReleaseError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_descriptor_rejects_path_like_version() {
        for bad in ["../x", "3.0/1", "3.0\\1", "3..0"] {
            assert!(
                matches!(
                    ReleaseDescriptor::new(bad, "", None),
                    Err(ReleaseError::InvalidDescriptor(_))
                ),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_overwrite_needs_reason() {
        let d = ReleaseDescriptor::new("3.0.1", "", Some("release/3.x")).unwrap();
        assert_eq!(d.target_commitish, "release/3.x");
        assert!(matches!(
            d.clone().with_overwrite(" "),
            Err(ReleaseError::OverwriteReasonRequired)
        ));
        let d = d.with_overwrite("hotfix for broken pom").unwrap();
        assert!(d.overwrite_allowed());
        assert_eq!(d.overwrite_reason(), Some("hotfix for broken pom"));
    }

    #[test]
    fn test_stage_predecessors_precede() {
        for stage in ReleaseStage::ALL {
            for pred in stage.predecessors() {
                assert!(pred < &stage);
            }
        }
        assert_eq!(ReleaseStage::from_name("tag"), Some(ReleaseStage::Tag));
    }

    #[test]
    fn test_requested_stages() {
        assert!(!RequestedStages::PublishOnly.includes(ReleaseStage::Tag));
        assert!(!RequestedStages::PublishOnly.requires_signature());
        assert!(RequestedStages::TagAndAnnounce.requires_signature());
    }

    #[test]
    fn test_report_first_failure() {
        let report = ReleaseReport::from_stages(
            "v1.0.0",
            vec![
                PipelineStageResult::success(ReleaseStage::Publish),
                PipelineStageResult::failed(ReleaseStage::Sign, "no key"),
                PipelineStageResult::skipped(ReleaseStage::Tag, "halted after sign failed"),
            ],
        );
        assert!(!report.succeeded());
        assert_eq!(report.first_failure.unwrap().stage, ReleaseStage::Sign);
    }
}
