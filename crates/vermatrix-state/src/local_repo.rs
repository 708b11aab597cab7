//! Filesystem artifact repository.
//!
//! Verification tasks resolve the component under test from this directory
//! instead of a public network, and the publish stage can target it
//! directly. Layout:
//!
//! ```text
//! <root>/<version>/<artifact>
//! <root>/<version>/<artifact>.sha256
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{
    artifact_name, version_dir, ArtifactStore, ContentDigest, PublishedArtifact, StorageResult,
};

const CHECKSUM_SUFFIX: &str = ".sha256";

/// Artifact store writing into a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalRepository {
    async fn publish(&self, version: &str, source: &Path) -> StorageResult<PublishedArtifact> {
        let name = artifact_name(source)?;
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|_| StorageError::ArtifactNotFound {
                path: source.display().to_string(),
            })?;
        let digest = ContentDigest::from_bytes(&bytes);

        let dir = version_dir(&self.root, version)?;
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&name);
        tokio::fs::write(&dest, &bytes).await?;
        tokio::fs::write(
            dir.join(format!("{}{}", name, CHECKSUM_SUFFIX)),
            digest.as_str(),
        )
        .await?;

        debug!(artifact = %name, version = %version, digest = %digest.short(), "artifact written to local repository");

        Ok(PublishedArtifact {
            name,
            version: version.to_string(),
            location: dest.display().to_string(),
            digest,
            published_at: Utc::now(),
        })
    }

    async fn list(&self, version: &str) -> StorageResult<Vec<PublishedArtifact>> {
        let dir = version_dir(&self.root, version)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut listed = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(CHECKSUM_SUFFIX) {
                continue;
            }
            let path = entry.path();
            let checksum = tokio::fs::read_to_string(dir.join(format!("{}{}", name, CHECKSUM_SUFFIX)))
                .await
                .map_err(|_| StorageError::Backend(format!("missing checksum for {}", name)))?;
            let digest = ContentDigest::try_from(checksum.trim().to_string())?;
            let modified: DateTime<Utc> = entry.metadata().await?.modified()?.into();
            listed.push(PublishedArtifact {
                name,
                version: version.to_string(),
                location: path.display().to_string(),
                digest,
                published_at: modified,
            });
        }
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}
