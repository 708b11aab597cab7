//! Release tags kept in a local git checkout.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use vermatrix_state::{StorageError, StorageResult, TagRecord, TagRequest, TagStore};

/// [`TagStore`] backed by the `git` binary in a local checkout.
///
/// Tags are lightweight. With a remote configured, every created tag is
/// pushed (`--force` when the tag was moved).
#[derive(Debug, Clone)]
pub struct SystemGitTagStore {
    repo_dir: PathBuf,
    remote: Option<String>,
}

impl SystemGitTagStore {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    async fn git(&self, args: &[&str]) -> StorageResult<std::process::Output> {
        debug!(args = ?args, repo = %self.repo_dir.display(), "running git");
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to run git: {e}")))
    }

    async fn git_ok(&self, args: &[&str]) -> StorageResult<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(StorageError::Backend(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Commit the tag points at, if the tag exists.
    async fn resolve_tag(&self, name: &str) -> StorageResult<Option<String>> {
        let reference = format!("refs/tags/{}^{{commit}}", name);
        let output = self.git(&["rev-parse", "-q", "--verify", &reference]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl TagStore for SystemGitTagStore {
    async fn get(&self, name: &str) -> StorageResult<Option<TagRecord>> {
        let Some(target) = self.resolve_tag(name).await? else {
            return Ok(None);
        };
        let created_at = self
            .git_ok(&["log", "-1", "--format=%cI", &target])
            .await
            .ok()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Ok(Some(TagRecord {
            name: name.to_string(),
            target,
            forced: false,
            previous_target: None,
            reason: None,
            created_at,
        }))
    }

    async fn create(&self, request: TagRequest) -> StorageResult<TagRecord> {
        let previous = self.resolve_tag(&request.name).await?;
        if let Some(existing) = &previous {
            if !request.force {
                return Err(StorageError::TagExists {
                    name: request.name,
                    target: existing.clone(),
                });
            }
        }

        let commit_ref = format!("{}^{{commit}}", request.commitish);
        let target = self
            .git_ok(&["rev-parse", "--verify", &commit_ref])
            .await?;

        let mut args = vec!["tag"];
        if request.force {
            args.push("-f");
        }
        args.push(&request.name);
        args.push(&target);
        self.git_ok(&args).await?;

        if let Some(remote) = &self.remote {
            let mut push = vec!["push", remote.as_str()];
            if request.force {
                push.push("-f");
            }
            push.push("--tags");
            self.git_ok(&push).await?;
        }

        let forced = previous.is_some();
        if forced {
            warn!(
                tag = %request.name,
                previous = ?previous,
                target = %target,
                reason = ?request.reason,
                "git tag moved"
            );
        }

        Ok(TagRecord {
            name: request.name,
            target,
            forced,
            previous_target: previous,
            reason: request.reason,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    fn request(name: &str, commitish: &str, force: bool) -> TagRequest {
        TagRequest {
            name: name.to_string(),
            commitish: commitish.to_string(),
            force,
            reason: force.then(|| "re-release".to_string()),
        }
    }

    #[tokio::test]
    async fn git_tag_store_refuses_to_move_without_force() {
        let repo = make_git_repo();
        let first = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let store = SystemGitTagStore::new(repo.path());

        let record = store.create(request("v1.0.0", "HEAD", false)).await.unwrap();
        assert_eq!(record.target, first);
        assert_eq!(store.get("v1.0.0").await.unwrap().unwrap().target, first);

        run_git(repo.path(), &["commit", "--allow-empty", "-m", "second"]);
        let err = store
            .create(request("v1.0.0", "HEAD", false))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TagExists { ref target, .. } if *target == first));
    }

    #[tokio::test]
    async fn git_tag_store_force_moves_tag() {
        let repo = make_git_repo();
        let first = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let store = SystemGitTagStore::new(repo.path());
        store.create(request("v1.0.0", "HEAD", false)).await.unwrap();

        run_git(repo.path(), &["commit", "--allow-empty", "-m", "second"]);
        let second = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let moved = store.create(request("v1.0.0", "HEAD", true)).await.unwrap();

        assert!(moved.forced);
        assert_eq!(moved.previous_target.as_deref(), Some(first.as_str()));
        assert_eq!(moved.target, second);
        assert_eq!(run_git(repo.path(), &["rev-parse", "v1.0.0^{commit}"]), second);
    }

    #[tokio::test]
    async fn git_tag_store_missing_tag_is_none() {
        let repo = make_git_repo();
        let store = SystemGitTagStore::new(repo.path());
        assert!(store.get("v9.9.9").await.unwrap().is_none());
    }
}
