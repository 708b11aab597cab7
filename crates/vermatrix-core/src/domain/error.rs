//! Domain-level error taxonomy for vermatrix.
//!
//! Configuration errors ([`MatrixError`]) abort before any verification task
//! runs. Release errors ([`ReleaseError`]) halt the release pipeline at the
//! failing stage; nothing is retried automatically.

use vermatrix_state::StorageError;

/// Configuration-time errors: catalog, toolchain and graph construction.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error(
        "latest known version {latest} is not in matrix '{matrix}'; add it to the tested versions"
    )]
    UntestedLatestVersion { latest: String, matrix: String },

    #[error("no toolchain requirement matches version {version}")]
    NoToolchainMatch { version: String },

    #[error("invalid version identifier '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("matrices '{tested}' and '{supported}' diverge on latest known version {latest}")]
    DivergentMatrices {
        tested: String,
        supported: String,
        latest: String,
    },

    #[error("dependency cycle detected involving: {nodes:?}")]
    DependencyCycle { nodes: Vec<String> },

    #[error("node not found in graph: {node}")]
    UnknownNode { node: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration-time operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

/// Release-time errors. Each one is fatal to the remaining stages.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("verification gate failed; failing tasks: {failing:?}")]
    GateFailed { failing: Vec<String> },

    #[error("tag {tag} already exists at {target}; pass an overwrite reason to move it")]
    TagAlreadyExists { tag: String, target: String },

    #[error("release for tag {tag} was already announced")]
    ReleaseAlreadyExists { tag: String },

    #[error("signing credentials missing but required by stage {required_by}")]
    SigningCredentialsMissing { required_by: String },

    #[error("overwriting a release tag requires a non-empty reason")]
    OverwriteReasonRequired,

    #[error("invalid release descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("invalid stage order: {0}")]
    StageOrder(#[from] MatrixError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for release-time operations.
pub type ReleaseResult<T> = std::result::Result<T, ReleaseError>;
