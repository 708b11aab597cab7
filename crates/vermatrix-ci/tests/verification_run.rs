//! Integration tests running real processes through `CommandExecutor`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use vermatrix_ci::{CommandExecutor, MatrixRunner, RunnerOptions};
use vermatrix_core::{
    default_requirements, GateStatus, TaskMatrixGenerator, TaskOutcome, ToolchainSelector,
    VerificationPlan, VersionCatalog,
};

const CATALOG: &str = r#"{
    "testedVersions": {
        "7.1.0": [],
        "8.0.0": [],
        "8.1.4": []
    }
}"#;

fn plan_with(external: BTreeMap<String, PathBuf>) -> VerificationPlan {
    let catalog = VersionCatalog::load(CATALOG, "testedVersions").unwrap();
    let generator = TaskMatrixGenerator::new(ToolchainSelector::new(default_requirements()))
        .with_external_paths(external);
    VerificationPlan::generate(&generator, &catalog).unwrap()
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn run(executor: CommandExecutor) -> MatrixRunner {
    MatrixRunner::new(Arc::new(executor), RunnerOptions::default())
}

#[tokio::test]
async fn tasks_see_their_own_version_and_artifact_dir() {
    let work = tempfile::tempdir().unwrap();
    let mut external = BTreeMap::new();
    external.insert("sdk-root".to_string(), PathBuf::from("/opt/sdk"));
    let plan = plan_with(external);

    let executor = CommandExecutor::new(
        sh(r#"echo "$VERMATRIX_TEST_VERSION $VERMATRIX_TOOLCHAIN {task} $VERMATRIX_SDK_ROOT" > "$VERMATRIX_ARTIFACT_DIR/result.txt""#),
        work.path(),
        work.path().join("repo"),
    )
    .with_timeout(30);
    let report = run(executor).run(&plan).await;
    assert_eq!(report.passed_count(), 3);

    let read = |task: &str| {
        std::fs::read_to_string(work.path().join(task).join("out/result.txt"))
            .unwrap()
            .trim()
            .to_string()
    };
    assert_eq!(read("testAndroid7_1_0"), "7.1.0 jdk17 testAndroid7_1_0 /opt/sdk");
    assert_eq!(read("testAndroid8_0_0"), "8.0.0 jdk17 testAndroid8_0_0 /opt/sdk");
    assert_eq!(read("testAndroid8_1_4"), "8.1.4 jdk17 testAndroid8_1_4 /opt/sdk");
}

#[tokio::test]
async fn failing_version_fails_gate_alone() {
    let work = tempfile::tempdir().unwrap();
    let plan = plan_with(BTreeMap::new());
    let executor = CommandExecutor::new(
        sh(r#"echo "broken on $VERMATRIX_TEST_VERSION" >&2; test "$VERMATRIX_TEST_VERSION" != "8.0.0""#),
        work.path(),
        work.path().join("repo"),
    );
    let report = run(executor).run(&plan).await;

    let gate = plan.gate(&report.outcomes()).unwrap();
    assert_eq!(gate.status, GateStatus::Fail);
    assert_eq!(gate.failing_tasks(), vec!["testAndroid8_0_0"]);
    match &report.results[1].outcome {
        TaskOutcome::Fail { reason } => {
            assert!(reason.contains("exited with status 1"), "{reason}");
            assert!(reason.contains("broken on 8.0.0"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_is_a_task_failure() {
    let work = tempfile::tempdir().unwrap();
    let catalog = VersionCatalog::load(r#"{ "m": { "8.1.4": [] } }"#, "m").unwrap();
    let generator = TaskMatrixGenerator::new(ToolchainSelector::new(default_requirements()));
    let plan = VerificationPlan::generate(&generator, &catalog).unwrap();

    let executor =
        CommandExecutor::new(sh("sleep 10"), work.path(), work.path().join("repo")).with_timeout(1);
    let report = run(executor).run(&plan).await;
    assert!(matches!(
        &report.results[0].outcome,
        TaskOutcome::Fail { reason } if reason.contains("timed out after 1s")
    ));
}

#[tokio::test]
async fn missing_program_is_a_spawn_failure() {
    let work = tempfile::tempdir().unwrap();
    let plan = plan_with(BTreeMap::new());
    let executor = CommandExecutor::new(
        vec!["vermatrix-no-such-program".to_string()],
        work.path(),
        work.path().join("repo"),
    );
    let report = run(executor).run(&plan).await;
    assert_eq!(report.failed_count(), 3);
    for result in &report.results {
        assert!(matches!(
            &result.outcome,
            TaskOutcome::Fail { reason } if reason.contains("failed to spawn")
        ));
    }
}

#[tokio::test]
async fn summary_carries_gate_and_outcomes() {
    let work = tempfile::tempdir().unwrap();
    let plan = plan_with(BTreeMap::new());
    let executor = CommandExecutor::new(sh("true"), work.path(), work.path().join("repo"));
    let report = run(executor).run(&plan).await;

    let gate = plan.gate(&report.outcomes()).unwrap();
    assert!(gate.is_pass());
    let summary = report.summary(gate);
    assert_eq!(summary.run_id, report.run_id);
    assert_eq!(summary.outcomes.len(), 3);
}
