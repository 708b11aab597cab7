//! Running one verification task as an isolated process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use vermatrix_core::{OrchestratorConfig, VerificationTaskSpec};

use crate::error::TaskExecutionFailure;

pub const ENV_TEST_VERSION: &str = "VERMATRIX_TEST_VERSION";
pub const ENV_TASK_NAME: &str = "VERMATRIX_TASK_NAME";
pub const ENV_TOOLCHAIN: &str = "VERMATRIX_TOOLCHAIN";
pub const ENV_TOOLCHAIN_HOME: &str = "VERMATRIX_TOOLCHAIN_HOME";
pub const ENV_LOCAL_REPO: &str = "VERMATRIX_LOCAL_REPO";
pub const ENV_ARTIFACT_DIR: &str = "VERMATRIX_ARTIFACT_DIR";
pub const ENV_COMPONENT_VERSION: &str = "VERMATRIX_COMPONENT_VERSION";

const STDERR_TAIL_LINES: usize = 20;

/// Output of a single successful attempt.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub task: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs one attempt of a task. Retries belong to the caller.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        spec: &VerificationTaskSpec,
    ) -> Result<TaskExecution, TaskExecutionFailure>;
}

/// Spawns the configured command template once per task.
///
/// Each task gets `<work_root>/<task>` as its working directory and
/// `<work_root>/<task>/out` as its artifact directory, so no two tasks
/// share mutable state on disk.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
    work_root: PathBuf,
    local_repo: PathBuf,
    timeout_secs: u64,
    component_version: Option<String>,
}

impl CommandExecutor {
    pub fn new(
        command: Vec<String>,
        work_root: impl Into<PathBuf>,
        local_repo: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command,
            work_root: work_root.into(),
            local_repo: local_repo.into(),
            timeout_secs: 0,
            component_version: None,
        }
    }

    /// Version of the component under test, exported to every task.
    pub fn with_component_version(mut self, version: impl Into<String>) -> Self {
        self.component_version = Some(version.into());
        self
    }

    /// Zero disables the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.work_root.clone(),
            config.local_repo.clone(),
        )
        .with_timeout(config.timeout_secs)
    }

    pub fn work_dir(&self, spec: &VerificationTaskSpec) -> PathBuf {
        self.work_root.join(&spec.name)
    }

    pub fn artifact_dir(&self, spec: &VerificationTaskSpec) -> PathBuf {
        self.work_dir(spec).join("out")
    }

    /// Command with `{version}`, `{task}` and `{toolchain}` substituted.
    pub fn render_command(&self, spec: &VerificationTaskSpec) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{version}", spec.version())
                    .replace("{task}", &spec.name)
                    .replace("{toolchain}", spec.toolchain.toolchain_id.as_str())
            })
            .collect()
    }

    /// Variables the task process sees on top of the inherited environment.
    pub fn task_environment(&self, spec: &VerificationTaskSpec) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_TEST_VERSION.to_string(), spec.version().to_string());
        env.insert(ENV_TASK_NAME.to_string(), spec.name.clone());
        env.insert(
            ENV_TOOLCHAIN.to_string(),
            spec.toolchain.toolchain_id.to_string(),
        );
        if let Some(home) = &spec.toolchain.home {
            env.insert(ENV_TOOLCHAIN_HOME.to_string(), path_string(home));
        }
        // the task runs inside its work dir, so relative paths would not resolve
        env.insert(
            ENV_LOCAL_REPO.to_string(),
            path_string(&absolute(&self.local_repo)),
        );
        env.insert(
            ENV_ARTIFACT_DIR.to_string(),
            path_string(&absolute(&self.artifact_dir(spec))),
        );
        if let Some(version) = &self.component_version {
            env.insert(ENV_COMPONENT_VERSION.to_string(), version.clone());
        }
        for (key, value) in &spec.extra_environment {
            env.insert(extra_env_name(key), path_string(value));
        }
        env
    }

    async fn prepare(&self, spec: &VerificationTaskSpec) -> Result<PathBuf, TaskExecutionFailure> {
        let out = self.artifact_dir(spec);
        tokio::fs::create_dir_all(&out)
            .await
            .map_err(|e| TaskExecutionFailure::Workspace {
                task: spec.name.clone(),
                path: out.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(self.work_dir(spec))
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(
        &self,
        spec: &VerificationTaskSpec,
    ) -> Result<TaskExecution, TaskExecutionFailure> {
        let start = Instant::now();
        let argv = self.render_command(spec);
        let Some((program, args)) = argv.split_first() else {
            return Err(TaskExecutionFailure::EmptyCommand {
                task: spec.name.clone(),
            });
        };

        let work_dir = self.prepare(spec).await?;
        debug!(task = %spec.name, program = %program, work_dir = %work_dir.display(), "spawning task");

        let child = Command::new(program)
            .args(args)
            .current_dir(&work_dir)
            .envs(self.task_environment(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TaskExecutionFailure::Spawn {
                task: spec.name.clone(),
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let waited = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| TaskExecutionFailure::Timeout {
                task: spec.name.clone(),
                timeout_secs: self.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| TaskExecutionFailure::Aborted {
            task: spec.name.clone(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(TaskExecutionFailure::NonZeroExit {
                task: spec.name.clone(),
                code: output.status.code(),
                stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        Ok(TaskExecution {
            task: spec.name.clone(),
            exit_code: output.status.code().unwrap_or(0),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// `sdk-root` becomes `VERMATRIX_SDK_ROOT`.
pub fn extra_env_name(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("VERMATRIX_{}", normalized)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vermatrix_core::{ToolchainRequirement, Version, VersionEntry};

    fn spec() -> VerificationTaskSpec {
        let mut extra = BTreeMap::new();
        extra.insert("sdk-root".to_string(), PathBuf::from("/opt/android-sdk"));
        VerificationTaskSpec {
            name: "testAndroid8_1_4".to_string(),
            version_entry: VersionEntry::new("8.1.4").unwrap(),
            toolchain: ToolchainRequirement::new(Version::parse("7.1.0").unwrap(), "jdk17")
                .with_home("/usr/lib/jvm/17"),
            extra_environment: extra,
        }
    }

    fn executor() -> CommandExecutor {
        CommandExecutor::new(
            vec![
                "./gradlew".into(),
                "{task}".into(),
                "-PtestVersion={version}".into(),
                "-Pjdk={toolchain}".into(),
            ],
            "/work",
            "/repo",
        )
    }

    #[test]
    fn test_render_command() {
        assert_eq!(
            executor().render_command(&spec()),
            vec![
                "./gradlew",
                "testAndroid8_1_4",
                "-PtestVersion=8.1.4",
                "-Pjdk=jdk17"
            ]
        );
    }

    #[test]
    fn test_task_environment() {
        let env = executor().task_environment(&spec());
        assert_eq!(env[ENV_TEST_VERSION], "8.1.4");
        assert_eq!(env[ENV_TASK_NAME], "testAndroid8_1_4");
        assert_eq!(env[ENV_TOOLCHAIN], "jdk17");
        assert_eq!(env[ENV_TOOLCHAIN_HOME], "/usr/lib/jvm/17");
        assert_eq!(env[ENV_LOCAL_REPO], "/repo");
        assert_eq!(env[ENV_ARTIFACT_DIR], "/work/testAndroid8_1_4/out");
        assert_eq!(env["VERMATRIX_SDK_ROOT"], "/opt/android-sdk");
        assert!(!env.contains_key(ENV_COMPONENT_VERSION));
    }

    #[test]
    fn test_component_version_reaches_every_task() {
        let exec = executor().with_component_version("3.0.1");
        let env = exec.task_environment(&spec());
        assert_eq!(env[ENV_COMPONENT_VERSION], "3.0.1");
    }

    #[test]
    fn test_no_toolchain_home_without_home() {
        let mut spec = spec();
        spec.toolchain.home = None;
        assert!(!executor().task_environment(&spec).contains_key(ENV_TOOLCHAIN_HOME));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 2), "");
    }

    #[tokio::test]
    async fn test_empty_command() {
        let exec = CommandExecutor::new(vec![], "/tmp", "/tmp");
        let err = exec.execute(&spec()).await.unwrap_err();
        assert!(matches!(err, TaskExecutionFailure::EmptyCommand { .. }));
    }
}
