//! Structured observability hooks for verification and release runs.
//!
//! - `RunSpan`: RAII guard scoping every log line to one run id
//! - `emit_*`: lifecycle events with a stable `event` field for log queries
//!
//! Events go out at `info!`, except forced tag moves which are `warn!`.
//! Use `--json` on the CLI for newline-delimited JSON output.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = RunSpan::enter("verify", "5f0c...");
/// // every event below carries run_id = "5f0c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(kind: &str, run_id: &str) -> Self {
        Self {
            _span: run_span(kind, run_id).entered(),
        }
    }
}

/// The span behind [`RunSpan`], for futures that need `.instrument(..)`.
pub fn run_span(kind: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("vermatrix.run", kind = %kind, run_id = %run_id)
}

pub fn emit_task_started(task: &str, version: &str, toolchain: &str, attempt: u32) {
    info!(
        event = "task.started",
        task = %task,
        version = %version,
        toolchain = %toolchain,
        attempt = attempt,
    );
}

pub fn emit_task_finished(task: &str, passed: bool, attempts: u32, duration_ms: u64) {
    info!(
        event = "task.finished",
        task = %task,
        passed = passed,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: gate evaluated, with every failing task name.
pub fn emit_gate_evaluated(total: usize, passed: usize, failing: &[String]) {
    info!(
        event = "gate.evaluated",
        total = total,
        passed = passed,
        pass = failing.is_empty() && total > 0,
        failing = ?failing,
    );
}

pub fn emit_stage_finished(stage: &str, outcome: &str, cause: Option<&str>) {
    info!(
        event = "release.stage_finished",
        stage = %stage,
        outcome = %outcome,
        cause = cause.unwrap_or(""),
    );
}

/// Emit event: an existing release tag was force-moved.
pub fn emit_tag_overwritten(tag: &str, previous: &str, target: &str, reason: &str) {
    warn!(
        event = "release.tag_overwritten",
        tag = %tag,
        previous = %previous,
        target = %target,
        reason = %reason,
        "release tag moved; tag immutability overridden"
    );
}

pub fn emit_release_finished(tag: &str, succeeded: bool, first_failure: Option<&str>) {
    info!(
        event = "release.finished",
        tag = %tag,
        succeeded = succeeded,
        first_failure = first_failure.unwrap_or(""),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("verify", "test-run-id");
        emit_gate_evaluated(0, 0, &[]);
    }
}
