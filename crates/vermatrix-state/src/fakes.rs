//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryArtifactStore`, `MemoryTagStore`, and `MemoryReleaseRegistry`
//! that satisfy the trait contracts without touching the network or git.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory artifact store keyed by `(version, name)`.
///
/// Reads the source file so the recorded digest matches real content.
/// `failing` builds a store whose every publish returns a backend error.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, HashMap<String, PublishedArtifact>>>,
    fail_with: Option<String>,
    uploads: Mutex<u64>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Total number of successful uploads, including overwrites.
    pub fn upload_count(&self) -> u64 {
        *self.uploads.lock().unwrap()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn publish(&self, version: &str, source: &Path) -> StorageResult<PublishedArtifact> {
        if let Some(reason) = &self.fail_with {
            return Err(StorageError::Backend(reason.clone()));
        }
        let name = artifact_name(source)?;
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|_| StorageError::ArtifactNotFound {
                path: source.display().to_string(),
            })?;
        let published = PublishedArtifact {
            location: format!("memory://{}/{}", version, name),
            name: name.clone(),
            version: version.to_string(),
            digest: ContentDigest::from_bytes(&bytes),
            published_at: Utc::now(),
        };
        let mut artifacts = self.artifacts.lock().unwrap();
        artifacts
            .entry(version.to_string())
            .or_default()
            .insert(name, published.clone());
        *self.uploads.lock().unwrap() += 1;
        Ok(published)
    }

    async fn list(&self, version: &str) -> StorageResult<Vec<PublishedArtifact>> {
        let artifacts = self.artifacts.lock().unwrap();
        let mut listed: Vec<PublishedArtifact> = artifacts
            .get(version)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}

// ---------------------------------------------------------------------------
// MemoryTagStore
// ---------------------------------------------------------------------------

/// In-memory tag store.
///
/// Commit-ish values resolve through an optional alias table (e.g.
/// `main -> <sha>`); unknown commit-ish values resolve to themselves.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tags: Mutex<HashMap<String, TagRecord>>,
    aliases: Mutex<HashMap<String, String>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `commitish` at `sha` for subsequent tag creation.
    pub fn set_alias(&self, commitish: &str, sha: &str) {
        self.aliases
            .lock()
            .unwrap()
            .insert(commitish.to_string(), sha.to_string());
    }

    fn resolve(&self, commitish: &str) -> String {
        self.aliases
            .lock()
            .unwrap()
            .get(commitish)
            .cloned()
            .unwrap_or_else(|| commitish.to_string())
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn get(&self, name: &str) -> StorageResult<Option<TagRecord>> {
        let tags = self.tags.lock().unwrap();
        Ok(tags.get(name).cloned())
    }

    async fn create(&self, request: TagRequest) -> StorageResult<TagRecord> {
        let target = self.resolve(&request.commitish);
        let mut tags = self.tags.lock().unwrap();
        let previous = tags.get(&request.name).map(|t| t.target.clone());
        if let Some(existing) = &previous {
            if !request.force {
                return Err(StorageError::TagExists {
                    name: request.name,
                    target: existing.clone(),
                });
            }
        }
        let record = TagRecord {
            name: request.name.clone(),
            target,
            forced: previous.is_some(),
            previous_target: previous,
            reason: request.reason,
            created_at: Utc::now(),
        };
        tags.insert(request.name, record.clone());
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// MemoryReleaseRegistry
// ---------------------------------------------------------------------------

/// In-memory announcement registry backed by a `HashMap<tag, Vec<AnnouncementRecord>>`.
///
/// Each tag maps to its full revision history (newest last internally).
#[derive(Debug, Default)]
pub struct MemoryReleaseRegistry {
    releases: Mutex<HashMap<String, Vec<AnnouncementRecord>>>,
}

impl MemoryReleaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseRegistry for MemoryReleaseRegistry {
    async fn announce(
        &self,
        announcement: Announcement,
        overwrite: bool,
    ) -> StorageResult<AnnouncementRecord> {
        let mut releases = self.releases.lock().unwrap();
        let history = releases.entry(announcement.tag_name.clone()).or_default();
        if !history.is_empty() && !overwrite {
            return Err(StorageError::AnnouncementExists {
                tag: announcement.tag_name,
            });
        }
        let record = AnnouncementRecord {
            revision: history.len() as u32 + 1,
            announcement,
            created_at: Utc::now(),
        };
        history.push(record.clone());
        Ok(record)
    }

    async fn find(&self, tag_name: &str) -> StorageResult<Option<AnnouncementRecord>> {
        let releases = self.releases.lock().unwrap();
        Ok(releases.get(tag_name).and_then(|h| h.last().cloned()))
    }

    async fn history(&self, tag_name: &str) -> StorageResult<Vec<AnnouncementRecord>> {
        let releases = self.releases.lock().unwrap();
        let mut history = releases.get(tag_name).cloned().unwrap_or_default();
        history.reverse(); // newest first
        Ok(history)
    }
}
