//! Error types for vermatrix-state

use thiserror::Error;

/// Errors surfaced by release-stage collaborators.
#[derive(Error, Debug)]
pub enum StorageError {
    /// An artifact scheduled for publishing does not exist on disk
    #[error("artifact not found: {path}")]
    ArtifactNotFound { path: String },

    /// A tag already exists and the caller did not ask to move it
    #[error("tag already exists: {name} -> {target}")]
    TagExists { name: String, target: String },

    /// An announcement already exists for the tag and overwrite was not requested
    #[error("release already announced for tag: {tag}")]
    AnnouncementExists { tag: String },

    /// A version that cannot name a directory inside the repository
    #[error("invalid release version for storage: {version}")]
    InvalidVersion { version: String },

    /// Invalid content digest
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside an external backend (git, remote API, ...)
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_exists_displays_name_and_target() {
        let err = StorageError::TagExists {
            name: "v1.2.0".to_string(),
            target: "abc123".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("v1.2.0"));
        assert!(msg.contains("abc123"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(err.to_string().contains("denied"));
    }
}
