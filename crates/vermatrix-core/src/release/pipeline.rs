//! The release pipeline: publish, sign, tag, announce.
//!
//! Stages run strictly one after another in the order derived from each
//! stage's declared predecessors. The first failure halts the pipeline and
//! later stages are reported as skipped. Nothing is rolled back and nothing
//! is retried; re-running is an operator decision.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;
use vermatrix_state::{
    Announcement, AnnouncementRecord, ArtifactStore, PublishedArtifact, ReleaseRegistry,
    StorageError, TagRecord, TagRequest, TagStore,
};

use crate::domain::error::{MatrixError, ReleaseError, ReleaseResult, Result};
use crate::domain::release::{
    PipelineStageResult, ReleaseDescriptor, ReleaseReport, ReleaseStage, RequestedStages,
    StageOutcome,
};
use crate::gate::GateResult;
use crate::graph::DependencyGraph;
use crate::metrics::METRICS;
use crate::obs;
use crate::release::signing::{CredentialProvider, Signer};

/// Derive an execution order from `(stage, predecessors)` declarations.
///
/// Fails with [`MatrixError::DependencyCycle`] when the declarations loop.
pub fn stage_order(declarations: &[(ReleaseStage, &[ReleaseStage])]) -> Result<Vec<ReleaseStage>> {
    let mut graph = DependencyGraph::new();
    for (stage, _) in declarations {
        graph.add_node(stage.name());
    }
    for (stage, predecessors) in declarations {
        for pred in predecessors.iter() {
            graph.add_dependency(pred.name(), stage.name())?;
        }
    }
    graph
        .topological_order()?
        .iter()
        .map(|name| {
            ReleaseStage::from_name(name).ok_or_else(|| MatrixError::UnknownNode {
                node: name.clone(),
            })
        })
        .collect()
}

fn declared_stages() -> Vec<(ReleaseStage, &'static [ReleaseStage])> {
    ReleaseStage::ALL
        .into_iter()
        .map(|s| (s, s.predecessors()))
        .collect()
}

/// External systems each stage talks to.
#[derive(Clone)]
pub struct ReleaseCollaborators {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub signer: Arc<dyn Signer>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub tags: Arc<dyn TagStore>,
    pub registry: Arc<dyn ReleaseRegistry>,
}

/// Result of the Sign stage when it did not fail.
#[derive(Debug, Clone)]
pub enum SignStep {
    Signed(Vec<PublishedArtifact>),
    Skipped(String),
}

pub struct ReleasePipeline {
    collaborators: ReleaseCollaborators,
    requested: RequestedStages,
    artifacts: Vec<PathBuf>,
    signature_dir: PathBuf,
    order: Vec<ReleaseStage>,
}

impl ReleasePipeline {
    /// Validates the stage graph up front; a cyclic declaration never runs.
    pub fn new(
        collaborators: ReleaseCollaborators,
        requested: RequestedStages,
        artifacts: Vec<PathBuf>,
        signature_dir: impl Into<PathBuf>,
    ) -> ReleaseResult<Self> {
        let order = stage_order(&declared_stages())?;
        Ok(Self {
            collaborators,
            requested,
            artifacts,
            signature_dir: signature_dir.into(),
            order,
        })
    }

    pub fn order(&self) -> &[ReleaseStage] {
        &self.order
    }

    pub fn requested(&self) -> RequestedStages {
        self.requested
    }

    /// Run every stage for `descriptor`, refusing outright unless `gate` passed.
    pub async fn run(
        &self,
        gate: &GateResult,
        descriptor: &ReleaseDescriptor,
    ) -> ReleaseResult<ReleaseReport> {
        if !gate.is_pass() {
            return Err(ReleaseError::GateFailed {
                failing: gate.failing_tasks(),
            });
        }

        let run_id = Uuid::new_v4().to_string();
        let _span = obs::RunSpan::enter("release", &run_id);
        info!(tag = %descriptor.tag_name, target = %descriptor.target_commitish, requested = ?self.requested, "release started");

        let mut results = Vec::with_capacity(self.order.len());
        let mut halted_by: Option<ReleaseStage> = None;

        for &stage in &self.order {
            let result = if let Some(failed) = halted_by {
                PipelineStageResult::skipped(stage, format!("halted after {} failed", failed))
            } else if !self.requested.includes(stage) {
                PipelineStageResult::skipped(stage, "not requested")
            } else {
                match self.run_stage(stage, descriptor).await {
                    Ok(None) => PipelineStageResult::success(stage),
                    Ok(Some(cause)) => PipelineStageResult::skipped(stage, cause),
                    Err(err) => {
                        halted_by = Some(stage);
                        PipelineStageResult::failed(stage, err.to_string())
                    }
                }
            };

            if result.outcome == StageOutcome::Success {
                METRICS.inc_stages_completed();
            }
            obs::emit_stage_finished(
                stage.name(),
                outcome_name(result.outcome),
                result.cause.as_deref(),
            );
            results.push(result);
        }

        let report = ReleaseReport::from_stages(descriptor.tag_name.clone(), results);
        obs::emit_release_finished(
            &report.tag_name,
            report.succeeded(),
            report.first_failure.as_ref().map(|f| f.stage.name()),
        );
        METRICS.flush();
        Ok(report)
    }

    /// `Ok(Some(cause))` marks the stage skipped.
    async fn run_stage(
        &self,
        stage: ReleaseStage,
        descriptor: &ReleaseDescriptor,
    ) -> ReleaseResult<Option<String>> {
        match stage {
            ReleaseStage::Publish => self.publish(descriptor).await.map(|_| None),
            ReleaseStage::Sign => match self.sign(descriptor).await? {
                SignStep::Signed(_) => Ok(None),
                SignStep::Skipped(cause) => Ok(Some(cause)),
            },
            ReleaseStage::Tag => self.tag(descriptor).await.map(|_| None),
            ReleaseStage::Announce => self.announce(descriptor).await.map(|_| None),
        }
    }

    /// Upload every artifact under the release version.
    pub async fn publish(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> ReleaseResult<Vec<PublishedArtifact>> {
        if self.artifacts.is_empty() {
            return Err(ReleaseError::InvalidDescriptor(
                "no artifacts configured for publishing".to_string(),
            ));
        }
        let mut published = Vec::with_capacity(self.artifacts.len());
        for path in &self.artifacts {
            let artifact = self
                .collaborators
                .artifacts
                .publish(&descriptor.version, path)
                .await?;
            info!(artifact = %artifact.name, digest = %artifact.digest.short(), "artifact published");
            published.push(artifact);
        }
        Ok(published)
    }

    /// Sign every artifact and publish the signatures next to them.
    ///
    /// Without credentials the stage is skipped, unless tagging was
    /// requested, in which case it fails.
    pub async fn sign(&self, descriptor: &ReleaseDescriptor) -> ReleaseResult<SignStep> {
        let Some(credentials) = self.collaborators.credentials.credentials() else {
            if self.requested.requires_signature() {
                return Err(ReleaseError::SigningCredentialsMissing {
                    required_by: ReleaseStage::Tag.name().to_string(),
                });
            }
            return Ok(SignStep::Skipped(
                "no signing credentials; no later stage requires a signature".to_string(),
            ));
        };

        let mut signatures = Vec::with_capacity(self.artifacts.len());
        for path in &self.artifacts {
            let signature = self
                .collaborators
                .signer
                .sign(path, &self.signature_dir, &credentials)
                .await?;
            let published = self
                .collaborators
                .artifacts
                .publish(&descriptor.version, &signature)
                .await?;
            signatures.push(published);
        }
        Ok(SignStep::Signed(signatures))
    }

    /// Point `descriptor.tag_name` at the target commit-ish.
    ///
    /// An existing tag is only moved when the descriptor carries an
    /// overwrite reason; the move is logged at `warn!`.
    pub async fn tag(&self, descriptor: &ReleaseDescriptor) -> ReleaseResult<TagRecord> {
        let request = TagRequest {
            name: descriptor.tag_name.clone(),
            commitish: descriptor.target_commitish.clone(),
            force: descriptor.overwrite_allowed(),
            reason: descriptor.overwrite_reason().map(str::to_string),
        };

        let record = self
            .collaborators
            .tags
            .create(request)
            .await
            .map_err(|e| match e {
                StorageError::TagExists { name, target } => {
                    ReleaseError::TagAlreadyExists { tag: name, target }
                }
                other => ReleaseError::Storage(other),
            })?;

        if record.forced {
            METRICS.inc_tags_forced();
            obs::emit_tag_overwritten(
                &record.name,
                record.previous_target.as_deref().unwrap_or(""),
                &record.target,
                record.reason.as_deref().unwrap_or(""),
            );
        } else if descriptor.overwrite_allowed() {
            warn!(tag = %record.name, "overwrite was allowed but the tag did not exist yet");
        }
        Ok(record)
    }

    /// Publish the release record. Never retried.
    pub async fn announce(
        &self,
        descriptor: &ReleaseDescriptor,
    ) -> ReleaseResult<AnnouncementRecord> {
        let announcement = Announcement {
            tag_name: descriptor.tag_name.clone(),
            version: descriptor.version.clone(),
            notes: descriptor.notes.clone(),
            target_commitish: descriptor.target_commitish.clone(),
        };
        self.collaborators
            .registry
            .announce(announcement, descriptor.overwrite_allowed())
            .await
            .map_err(|e| match e {
                StorageError::AnnouncementExists { tag } => {
                    ReleaseError::ReleaseAlreadyExists { tag }
                }
                other => ReleaseError::Storage(other),
            })
    }
}

fn outcome_name(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Success => "success",
        StageOutcome::Failed => "failed",
        StageOutcome::Skipped => "skipped",
    }
}
