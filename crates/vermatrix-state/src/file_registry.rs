//! Announcement registry kept as JSON files.
//!
//! One file per tag holding every revision, oldest first:
//!
//! ```text
//! <root>/<tag>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StorageError;
use crate::storage_traits::{Announcement, AnnouncementRecord, ReleaseRegistry, StorageResult};

#[derive(Debug)]
pub struct JsonFileReleaseRegistry {
    root: PathBuf,
    // serializes read-modify-write of a tag file within this process
    write_lock: Mutex<()>,
}

impl JsonFileReleaseRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tag_file(&self, tag_name: &str) -> PathBuf {
        let safe: String = tag_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(format!("{}.json", safe))
    }

    async fn load(&self, tag_name: &str) -> StorageResult<Vec<AnnouncementRecord>> {
        let path = self.tag_file(tag_name);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl ReleaseRegistry for JsonFileReleaseRegistry {
    async fn announce(
        &self,
        announcement: Announcement,
        overwrite: bool,
    ) -> StorageResult<AnnouncementRecord> {
        let _guard = self.write_lock.lock().await;
        let mut history = self.load(&announcement.tag_name).await?;
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

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.tag_file(&record.announcement.tag_name);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&history)?).await?;
        info!(tag = %record.announcement.tag_name, revision = record.revision, path = %path.display(), "release announced");
        Ok(record)
    }

    async fn find(&self, tag_name: &str) -> StorageResult<Option<AnnouncementRecord>> {
        Ok(self.load(tag_name).await?.pop())
    }

    async fn history(&self, tag_name: &str) -> StorageResult<Vec<AnnouncementRecord>> {
        let mut history = self.load(tag_name).await?;
        history.reverse();
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(notes: &str) -> Announcement {
        Announcement {
            tag_name: "v3.0.1".to_string(),
            version: "3.0.1".to_string(),
            notes: notes.to_string(),
            target_commitish: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn announcements_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        JsonFileReleaseRegistry::new(dir.path())
            .announce(announcement("first"), false)
            .await
            .unwrap();

        let reopened = JsonFileReleaseRegistry::new(dir.path());
        let found = reopened.find("v3.0.1").await.unwrap().unwrap();
        assert_eq!(found.announcement.notes, "first");
        assert_eq!(found.revision, 1);
    }

    #[tokio::test]
    async fn duplicate_rejected_and_overwrite_appends() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileReleaseRegistry::new(dir.path());
        registry.announce(announcement("first"), false).await.unwrap();

        let err = registry
            .announce(announcement("again"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AnnouncementExists { .. }));

        registry.announce(announcement("fixed"), true).await.unwrap();
        let history = registry.history("v3.0.1").await.unwrap();
        let notes: Vec<&str> = history.iter().map(|r| r.announcement.notes.as_str()).collect();
        assert_eq!(notes, vec!["fixed", "first"]);
    }

    #[tokio::test]
    async fn unknown_tag_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileReleaseRegistry::new(dir.path().join("missing"));
        assert!(registry.find("v0.0.1").await.unwrap().is_none());
        assert!(registry.history("v0.0.1").await.unwrap().is_empty());
    }
}
