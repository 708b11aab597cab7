//! Collaborator trait definitions for the release stages
//!
//! These traits define the boundaries the release pipeline talks through:
//! - `ArtifactStore`: Artifact publishing (upload by version, overwrite semantics)
//! - `TagStore`: Immutable-by-policy named pointers to commits
//! - `ReleaseRegistry`: Release announcements keyed by tag name
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore: Artifact Publishing
// ---------------------------------------------------------------------------

/// An artifact that has been uploaded to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// File name of the artifact (e.g. `plugin-1.2.0.jar`)
    pub name: String,
    /// Release version the artifact was published under
    pub version: String,
    /// Store-specific location (path or URL)
    pub location: String,
    /// SHA-256 digest of the uploaded bytes
    pub digest: ContentDigest,
    /// When the upload completed
    pub published_at: DateTime<Utc>,
}

/// Artifact staging / publishing backend.
///
/// Guarantees:
/// - `publish` of the same file name under the same version overwrites the
///   previous upload (re-running a publish is idempotent).
/// - `list` returns artifacts for a version sorted by name.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `source` under `version`.
    async fn publish(&self, version: &str, source: &Path) -> StorageResult<PublishedArtifact>;

    /// List artifacts previously published under `version`.
    async fn list(&self, version: &str) -> StorageResult<Vec<PublishedArtifact>>;
}

// ---------------------------------------------------------------------------
// TagStore: Release Tags
// ---------------------------------------------------------------------------

/// Request to create (or force-move) a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequest {
    /// Tag name (e.g. `v1.2.0`)
    pub name: String,
    /// Commit-ish the tag should point at (branch name, sha, ...)
    pub commitish: String,
    /// Move the tag if it already exists
    pub force: bool,
    /// Operator-supplied justification, required by policy when `force` is set
    pub reason: Option<String>,
}

/// A tag as recorded by a [`TagStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Tag name
    pub name: String,
    /// Resolved commit SHA the tag points at
    pub target: String,
    /// Whether this record replaced an existing tag
    pub forced: bool,
    /// Commit the tag pointed at before a forced move
    pub previous_target: Option<String>,
    /// Justification recorded with a forced move
    pub reason: Option<String>,
    /// When the tag was written
    pub created_at: DateTime<Utc>,
}

/// Tag backend.
///
/// Semantics:
/// - `create` without `force` fails with `StorageError::TagExists` when the
///   name is already taken, leaving the existing tag untouched.
/// - `create` with `force` moves the tag and records the previous target.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Look up a tag by name.
    async fn get(&self, name: &str) -> StorageResult<Option<TagRecord>>;

    /// Create or force-move a tag.
    async fn create(&self, request: TagRequest) -> StorageResult<TagRecord>;
}

// ---------------------------------------------------------------------------
// ReleaseRegistry: Release Announcements
// ---------------------------------------------------------------------------

/// Release record published to a collaboration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Tag the release is attached to
    pub tag_name: String,
    /// Human-readable release name / version
    pub version: String,
    /// Release notes body
    pub notes: String,
    /// Commit-ish the release targets
    pub target_commitish: String,
}

/// A stored announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub announcement: Announcement,
    /// 1 for the first announcement of a tag, incremented on overwrite
    pub revision: u32,
    pub created_at: DateTime<Utc>,
}

/// Announcement registry.
///
/// Semantics:
/// - `announce` with `overwrite == false` fails with
///   `StorageError::AnnouncementExists` if the tag was already announced.
/// - `history` returns every revision for a tag, newest first (append-only).
#[async_trait]
pub trait ReleaseRegistry: Send + Sync {
    /// Publish an announcement.
    async fn announce(
        &self,
        announcement: Announcement,
        overwrite: bool,
    ) -> StorageResult<AnnouncementRecord>;

    /// Current announcement for a tag, if any.
    async fn find(&self, tag_name: &str) -> StorageResult<Option<AnnouncementRecord>>;

    /// All revisions for a tag (newest first).
    async fn history(&self, tag_name: &str) -> StorageResult<Vec<AnnouncementRecord>>;
}

/// File name component of `path`, used as the artifact name.
pub fn artifact_name(path: &Path) -> StorageResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::ArtifactNotFound {
            path: path.display().to_string(),
        })
}

/// Directory under a repository root holding one version's artifacts.
///
/// Versions that would resolve outside `root` are rejected.
pub fn version_dir(root: &Path, version: &str) -> StorageResult<PathBuf> {
    if version.is_empty()
        || version == "."
        || version.contains("..")
        || version.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidVersion {
            version: version.to_string(),
        });
    }
    Ok(root.join(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_dir_stays_under_root() {
        let root = Path::new("/repo");
        assert_eq!(version_dir(root, "3.0.1").unwrap(), root.join("3.0.1"));
        for bad in ["../x", "..", "3.0/1", "a\\b", "", "."] {
            assert!(
                matches!(version_dir(root, bad), Err(StorageError::InvalidVersion { .. })),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let d = ContentDigest::from_bytes(b"artifact");
        assert_eq!(d.as_str().len(), 64);
        assert_eq!(d.short().len(), 12);
        assert!(d.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_try_from_rejects_short_strings() {
        let err = ContentDigest::try_from("abc".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDigest { .. }));
    }

    #[test]
    fn artifact_name_uses_file_name() {
        let name = artifact_name(Path::new("build/libs/plugin-1.0.jar")).unwrap();
        assert_eq!(name, "plugin-1.0.jar");
    }
}
