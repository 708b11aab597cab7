//! Bounded-concurrency execution of a verification plan.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;
use vermatrix_core::metrics::METRICS;
use vermatrix_core::reporting::VerificationSummaryArtifact;
use vermatrix_core::{obs, GateResult, OrchestratorConfig, TaskOutcome, VerificationPlan, VerificationTaskSpec};

use crate::executor::TaskExecutor;

/// Scheduling limits for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub max_parallel: usize,
    /// Concurrent tasks per toolchain id; unlisted toolchains only obey `max_parallel`.
    pub toolchain_capacity: BTreeMap<String, usize>,
    /// Extra attempts after a failed one.
    pub retries: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            toolchain_capacity: BTreeMap::new(),
            retries: 0,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            toolchain_capacity: config.toolchain_capacity.clone(),
            retries: config.effective_retries(),
        }
    }
}

/// Terminal result of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub task: String,
    pub version: String,
    pub toolchain: String,
    /// [`VerificationTaskSpec::fingerprint`] of the spec that ran.
    pub fingerprint: String,
    pub outcome: TaskOutcome,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Result of a complete verification run, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: String,
    pub results: Vec<TaskRunResult>,
    pub duration_ms: u64,
}

impl VerificationReport {
    /// Task name to outcome, the shape the gate consumes.
    pub fn outcomes(&self) -> BTreeMap<String, TaskOutcome> {
        self.results
            .iter()
            .map(|r| (r.task.clone(), r.outcome.clone()))
            .collect()
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_pass()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn summary(&self, gate: GateResult) -> VerificationSummaryArtifact {
        VerificationSummaryArtifact::new(
            self.run_id.clone(),
            self.duration_ms,
            gate,
            self.outcomes(),
        )
    }
}

/// Runs every task of a plan, isolated from one another.
///
/// A task's failure (spawn error, timeout, non-zero exit, even a panic in
/// the executor) is recorded against that task only.
pub struct MatrixRunner {
    executor: Arc<dyn TaskExecutor>,
    options: RunnerOptions,
}

impl MatrixRunner {
    pub fn new(executor: Arc<dyn TaskExecutor>, options: RunnerOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub async fn run(&self, plan: &VerificationPlan) -> VerificationReport {
        self.run_specs(plan.specs()).await
    }

    pub async fn run_specs(&self, specs: &[VerificationTaskSpec]) -> VerificationReport {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span("verify", &run_id);
        let start = Instant::now();

        let results = self.execute_all(specs).instrument(span.clone()).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = VerificationReport {
            run_id,
            results,
            duration_ms,
        };
        span.in_scope(|| {
            info!(
                total = report.results.len(),
                passed = report.passed_count(),
                failed = report.failed_count(),
                duration_ms,
                "verification run finished"
            );
            METRICS.flush();
        });
        report
    }

    async fn execute_all(&self, specs: &[VerificationTaskSpec]) -> Vec<TaskRunResult> {
        info!(
            tasks = specs.len(),
            max_parallel = self.options.max_parallel,
            retries = self.options.retries,
            "verification run started"
        );

        let global = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let per_toolchain: HashMap<String, Arc<Semaphore>> = self
            .options
            .toolchain_capacity
            .iter()
            .map(|(id, cap)| (id.clone(), Arc::new(Semaphore::new((*cap).max(1)))))
            .collect();

        let handles: Vec<_> = specs
            .iter()
            .cloned()
            .map(|spec| {
                let executor = self.executor.clone();
                let global = global.clone();
                let toolchain_slots = per_toolchain
                    .get(spec.toolchain.toolchain_id.as_str())
                    .cloned();
                let retries = self.options.retries;
                tokio::spawn(
                    async move {
                        // toolchain first, so a task waiting on its toolchain holds no global slot
                        let _toolchain = match toolchain_slots {
                            Some(slots) => slots.acquire_owned().await.ok(),
                            None => None,
                        };
                        let _slot = global.acquire_owned().await.ok();
                        run_with_retries(executor.as_ref(), &spec, retries).await
                    }
                    .in_current_span(),
                )
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(specs)
            .map(|(joined, spec)| {
                joined.unwrap_or_else(|e| {
                    warn!(task = %spec.name, error = %e, "task worker aborted");
                    METRICS.record_task(true);
                    TaskRunResult {
                        task: spec.name.clone(),
                        version: spec.version().to_string(),
                        toolchain: spec.toolchain.toolchain_id.to_string(),
                        fingerprint: fingerprint_of(spec),
                        outcome: TaskOutcome::fail(format!("task worker aborted: {}", e)),
                        attempts: 0,
                        duration_ms: 0,
                    }
                })
            })
            .collect()
    }
}

fn fingerprint_of(spec: &VerificationTaskSpec) -> String {
    spec.fingerprint().unwrap_or_else(|e| {
        warn!(task = %spec.name, error = %e, "could not fingerprint task");
        String::new()
    })
}

async fn run_with_retries(
    executor: &dyn TaskExecutor,
    spec: &VerificationTaskSpec,
    retries: u32,
) -> TaskRunResult {
    let start = Instant::now();
    let toolchain = spec.toolchain.toolchain_id.as_str();
    let max_attempts = retries.saturating_add(1);
    let fingerprint = fingerprint_of(spec);
    debug!(task = %spec.name, fingerprint = %fingerprint, "task fingerprint");
    if !spec.extra_environment.is_empty() {
        debug!(task = %spec.name, env = ?spec.redacted_environment(), "task environment");
    }

    let mut attempt = 0;
    let outcome = loop {
        attempt += 1;
        obs::emit_task_started(&spec.name, spec.version(), toolchain, attempt);
        match executor.execute(spec).await {
            Ok(_) => break TaskOutcome::Pass,
            Err(failure) if attempt < max_attempts && failure.is_retryable() => {
                warn!(task = %spec.name, attempt, error = %failure, "attempt failed; retrying");
            }
            Err(failure) => break TaskOutcome::fail(failure.to_string()),
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    METRICS.record_task(!outcome.is_pass());
    obs::emit_task_finished(&spec.name, outcome.is_pass(), attempt, duration_ms);

    TaskRunResult {
        task: spec.name.clone(),
        version: spec.version().to_string(),
        toolchain: toolchain.to_string(),
        fingerprint,
        outcome,
        attempts: attempt,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskExecutionFailure;
    use crate::executor::TaskExecution;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use vermatrix_core::{
        default_requirements, TaskMatrixGenerator, ToolchainSelector, VersionCatalog,
    };

    /// Tracks peak concurrency overall and per toolchain.
    #[derive(Default)]
    struct FakeExecutor {
        failing: HashSet<String>,
        // task -> failures left before it passes
        flaky: Mutex<HashMap<String, u32>>,
        panicking: HashSet<String>,
        unspawnable: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        per_toolchain: Mutex<HashMap<String, (usize, usize)>>,
    }

    impl FakeExecutor {
        fn peak_for(&self, toolchain: &str) -> usize {
            self.per_toolchain
                .lock()
                .unwrap()
                .get(toolchain)
                .map(|(_, peak)| *peak)
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl TaskExecutor for FakeExecutor {
        async fn execute(
            &self,
            spec: &VerificationTaskSpec,
        ) -> Result<TaskExecution, TaskExecutionFailure> {
            if self.panicking.contains(&spec.name) {
                panic!("executor bug");
            }
            if self.unspawnable.contains(&spec.name) {
                return Err(TaskExecutionFailure::Spawn {
                    task: spec.name.clone(),
                    program: "gradlew".to_string(),
                    reason: "No such file or directory".to_string(),
                });
            }
            let toolchain = spec.toolchain.toolchain_id.to_string();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            {
                let mut map = self.per_toolchain.lock().unwrap();
                let entry = map.entry(toolchain.clone()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = entry.1.max(entry.0);
            }

            tokio::time::sleep(Duration::from_millis(20)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.per_toolchain
                .lock()
                .unwrap()
                .get_mut(&toolchain)
                .unwrap()
                .0 -= 1;

            let flaky_left = {
                let mut flaky = self.flaky.lock().unwrap();
                match flaky.get_mut(&spec.name) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if flaky_left || self.failing.contains(&spec.name) {
                return Err(TaskExecutionFailure::NonZeroExit {
                    task: spec.name.clone(),
                    code: Some(1),
                    stderr_tail: String::new(),
                });
            }
            Ok(TaskExecution {
                task: spec.name.clone(),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 20,
            })
        }
    }

    fn plan(versions: &[&str]) -> VerificationPlan {
        let entries: Vec<String> = versions.iter().map(|v| format!("\"{}\": []", v)).collect();
        let doc = format!("{{ \"m\": {{ {} }} }}", entries.join(", "));
        let catalog = VersionCatalog::load(&doc, "m").unwrap();
        let generator = TaskMatrixGenerator::new(ToolchainSelector::new(default_requirements()));
        VerificationPlan::generate(&generator, &catalog).unwrap()
    }

    fn runner(executor: Arc<FakeExecutor>, options: RunnerOptions) -> MatrixRunner {
        MatrixRunner::new(executor, options)
    }

    #[tokio::test]
    async fn test_results_follow_plan_order() {
        let plan = plan(&["8.1.4", "7.0.0", "8.0.0", "7.1.0"]);
        let report = runner(Arc::new(FakeExecutor::default()), RunnerOptions::default())
            .run(&plan)
            .await;
        let names: Vec<&str> = report.results.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(names, plan.task_names());
        assert_eq!(report.passed_count(), 4);
        assert!(!report.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_global_limit_bounds_concurrency() {
        let plan = plan(&["7.1.0", "7.2.0", "8.0.0", "8.1.0", "8.2.0", "8.3.0"]);
        let executor = Arc::new(FakeExecutor::default());
        let options = RunnerOptions {
            max_parallel: 2,
            ..RunnerOptions::default()
        };
        runner(executor.clone(), options).run(&plan).await;
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
        assert!(executor.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_toolchain_capacity_bounds_that_toolchain_only() {
        let plan = plan(&["7.0.0", "7.0.1", "7.0.2", "7.1.0", "8.0.0", "8.1.0"]);
        let executor = Arc::new(FakeExecutor::default());
        let mut capacity = BTreeMap::new();
        capacity.insert("jdk11".to_string(), 1);
        let options = RunnerOptions {
            max_parallel: 6,
            toolchain_capacity: capacity,
            retries: 0,
        };
        let report = runner(executor.clone(), options).run(&plan).await;
        assert_eq!(report.passed_count(), 6);
        assert_eq!(executor.peak_for("jdk11"), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_siblings() {
        let plan = plan(&["7.1.0", "8.0.0", "8.1.4"]);
        let executor = Arc::new(FakeExecutor {
            failing: HashSet::from(["testAndroid8_0_0".to_string()]),
            ..FakeExecutor::default()
        });
        let report = runner(executor, RunnerOptions::default()).run(&plan).await;

        let gate = plan.gate(&report.outcomes()).unwrap();
        assert_eq!(gate.failing_tasks(), vec!["testAndroid8_0_0"]);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_turns_flaky_task_green() {
        let plan = plan(&["8.1.4"]);
        let mut flaky = HashMap::new();
        flaky.insert("testAndroid8_1_4".to_string(), 1);
        let executor = Arc::new(FakeExecutor {
            flaky: Mutex::new(flaky),
            ..FakeExecutor::default()
        });
        let options = RunnerOptions {
            retries: 1,
            ..RunnerOptions::default()
        };
        let report = runner(executor, options).run(&plan).await;
        assert_eq!(report.results[0].outcome, TaskOutcome::Pass);
        assert_eq!(report.results[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_keeps_last_failure() {
        let plan = plan(&["8.1.4"]);
        let executor = Arc::new(FakeExecutor {
            failing: HashSet::from(["testAndroid8_1_4".to_string()]),
            ..FakeExecutor::default()
        });
        let options = RunnerOptions {
            retries: 2,
            ..RunnerOptions::default()
        };
        let report = runner(executor, options).run(&plan).await;
        let result = &report.results[0];
        assert_eq!(result.attempts, 3);
        assert!(matches!(
            &result.outcome,
            TaskOutcome::Fail { reason } if reason.contains("exited with status 1")
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_retried() {
        let plan = plan(&["8.1.4"]);
        let executor = Arc::new(FakeExecutor {
            unspawnable: HashSet::from(["testAndroid8_1_4".to_string()]),
            ..FakeExecutor::default()
        });
        let options = RunnerOptions {
            retries: u32::MAX,
            ..RunnerOptions::default()
        };
        let report = runner(executor, options).run(&plan).await;
        let result = &report.results[0];
        assert_eq!(result.attempts, 1);
        assert!(matches!(
            &result.outcome,
            TaskOutcome::Fail { reason } if reason.contains("failed to spawn")
        ));
    }

    #[tokio::test]
    async fn test_results_carry_spec_fingerprint() {
        let plan = plan(&["7.1.0", "8.1.4"]);
        let report = runner(Arc::new(FakeExecutor::default()), RunnerOptions::default())
            .run(&plan)
            .await;
        for (result, spec) in report.results.iter().zip(plan.specs()) {
            assert_eq!(result.fingerprint, spec.fingerprint().unwrap());
            assert_eq!(result.fingerprint.len(), 64);
        }
        assert_ne!(report.results[0].fingerprint, report.results[1].fingerprint);
    }

    #[tokio::test]
    async fn test_panicking_executor_is_isolated() {
        let plan = plan(&["7.1.0", "8.0.0"]);
        let executor = Arc::new(FakeExecutor {
            panicking: HashSet::from(["testAndroid7_1_0".to_string()]),
            ..FakeExecutor::default()
        });
        let report = runner(executor, RunnerOptions::default()).run(&plan).await;
        assert!(!report.results[0].outcome.is_pass());
        assert!(report.results[1].outcome.is_pass());
    }

    #[test]
    fn test_options_from_config() {
        let config = OrchestratorConfig {
            max_parallel: 3,
            retries: Some(2),
            ..OrchestratorConfig::default()
        };
        let options = RunnerOptions::from_config(&config);
        assert_eq!(options.max_parallel, 3);
        assert_eq!(options.retries, 2);
    }
}
