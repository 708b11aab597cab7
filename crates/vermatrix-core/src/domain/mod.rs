//! Domain models for vermatrix.
//!
//! - `Version`: numeric, segment-wise comparable version identifiers
//! - `VersionCatalog`: the declared version matrix
//! - `ToolchainSelector`: threshold rules from version to toolchain
//! - `VerificationTaskSpec`: one generated verification run
//! - `ReleaseDescriptor`, `ReleaseStage`: release pipeline inputs and stages

pub mod catalog;
pub mod digest;
pub mod error;
pub mod release;
pub mod task;
pub mod toolchain;
pub mod version;

pub use catalog::{
    check_matrices_agree, CatalogDocument, CatalogValue, VersionCatalog, VersionEntry,
    DEFAULT_TESTED_MATRIX,
};
pub use error::{MatrixError, ReleaseError, ReleaseResult, Result};
pub use release::{
    PipelineStageResult, ReleaseDescriptor, ReleaseReport, ReleaseStage, ReleaseStatus,
    RequestedStages, StageOutcome, DEFAULT_TARGET_COMMITISH,
};
pub use task::{TaskOutcome, VerificationTaskSpec};
pub use toolchain::{default_requirements, ToolchainId, ToolchainRequirement, ToolchainSelector};
pub use version::Version;
