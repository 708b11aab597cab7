//! vermatrix core library
//!
//! Expands a declared version catalog into one verification task per
//! external version, gates on the aggregate outcome, and drives the
//! publish, sign, tag and announce release stages.
//!
//! ```text
//! VersionCatalog -> ToolchainSelector -> TaskMatrixGenerator
//!     -> (N verification tasks) -> GateAggregator -> ReleasePipeline
//! ```

pub mod config;
pub mod domain;
pub mod gate;
pub mod git;
pub mod graph;
pub mod manifest;
pub mod matrix;
pub mod metrics;
pub mod obs;
pub mod release;
pub mod reporting;
pub mod telemetry;

pub use config::OrchestratorConfig;

pub use domain::{
    check_matrices_agree, default_requirements, CatalogDocument, CatalogValue, MatrixError,
    PipelineStageResult, ReleaseDescriptor, ReleaseError, ReleaseReport, ReleaseResult,
    ReleaseStage, ReleaseStatus, RequestedStages, Result, StageOutcome, TaskOutcome, ToolchainId,
    ToolchainRequirement, ToolchainSelector, VerificationTaskSpec, Version, VersionCatalog,
    VersionEntry, DEFAULT_TARGET_COMMITISH, DEFAULT_TESTED_MATRIX,
};

pub use gate::{GateAggregator, GateFailure, GateResult, GateStatus};
pub use git::SystemGitTagStore;
pub use graph::DependencyGraph;
pub use manifest::{export_ci_matrix, write_versions_manifest, MatrixSink, VersionsManifest};
pub use matrix::{
    normalize_version, task_name, CiMatrix, TaskMatrixGenerator, VerificationPlan, BASE_TASK,
    DEFAULT_TASK_PREFIX, GATE_NODE,
};
pub use release::{
    CredentialProvider, EnvCredentialProvider, GpgSigner, ReleaseCollaborators, ReleasePipeline,
    SignStep, Signer, SigningCredentials, StaticCredentialProvider,
};
pub use telemetry::init_tracing;

pub use vermatrix_state::{
    Announcement, AnnouncementRecord, ArtifactStore, JsonFileReleaseRegistry, LocalRepository,
    PublishedArtifact, ReleaseRegistry, StorageError, TagRecord, TagRequest, TagStore,
};

/// Crate version, embedded in reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
