use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::release::{ReleaseReport, StageOutcome};
use crate::domain::task::TaskOutcome;
use crate::gate::GateResult;

pub const SCHEMA_VERSION: &str = "1.0";

/// Verification run artifact persisted for CI and PR reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationSummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub duration_ms: u64,
    pub gate: GateResult,
    pub outcomes: BTreeMap<String, TaskOutcome>,
    /// Set when only some of the plan's tasks ran; such a report cannot gate a release.
    #[serde(default)]
    pub partial: bool,
}

impl VerificationSummaryArtifact {
    pub fn new(
        run_id: impl Into<String>,
        duration_ms: u64,
        gate: GateResult,
        outcomes: BTreeMap<String, TaskOutcome>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: run_id.into(),
            duration_ms,
            gate,
            outcomes,
            partial: false,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

/// Write any report as pretty JSON.
pub fn write_report_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Gate verdict plus every failing task name.
pub fn render_gate_report_md(gate: &GateResult) -> String {
    let mut out = String::new();
    out.push_str("# Verification Gate\n\n");
    out.push_str(&format!(
        "- result: **{}**\n- tasks: {}\n- passed: {}\n",
        if gate.is_pass() { "PASS" } else { "FAIL" },
        gate.total,
        gate.passed
    ));

    if gate.total == 0 {
        out.push_str("\nNo verification tasks were run.\n");
    }
    if !gate.failures.is_empty() {
        out.push_str("\n## Failing Tasks\n");
        for f in &gate.failures {
            out.push_str(&format!("- `{}`: {}\n", f.task, f.reason));
        }
    }
    out
}

/// Per-stage outcome table and the first failing stage.
pub fn render_release_report_md(report: &ReleaseReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Release {}\n\n", report.tag_name));
    out.push_str(&format!(
        "- status: **{}**\n\n",
        if report.succeeded() { "SUCCEEDED" } else { "FAILED" }
    ));

    out.push_str("| Stage | Outcome | Cause |\n|-------|---------|-------|\n");
    for stage in &report.stages {
        let outcome = match stage.outcome {
            StageOutcome::Success => "success",
            StageOutcome::Failed => "failed",
            StageOutcome::Skipped => "skipped",
        };
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            stage.stage,
            outcome,
            stage.cause.as_deref().unwrap_or("")
        ));
    }

    if let Some(failure) = &report.first_failure {
        out.push_str(&format!(
            "\nFirst failure: `{}`: {}\n",
            failure.stage,
            failure.cause.as_deref().unwrap_or("unknown cause")
        ));
    }
    out
}

pub fn write_markdown(path: &Path, markdown: &str) -> Result<()> {
    std::fs::write(path, markdown).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
