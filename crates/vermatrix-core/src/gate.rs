//! Verification gate.
//!
//! Folds every task outcome into one [`GateResult`]. The gate passes only
//! when at least one outcome was recorded and every outcome is a pass; the
//! release pipeline refuses to start on anything else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskOutcome;

// ---------------------------------------------------------------------------
// Gate result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
}

/// A single failing task and why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateFailure {
    pub task: String,
    pub reason: String,
}

/// Aggregate verdict over all verification tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub status: GateStatus,
    /// Failing tasks, sorted by name.
    pub failures: Vec<GateFailure>,
    pub total: usize,
    pub passed: usize,
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        self.status == GateStatus::Pass
    }

    /// Names of failing tasks, sorted.
    pub fn failing_tasks(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.task.clone()).collect()
    }

    pub fn pass_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f32 / self.total as f32
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Stateless aggregator over `task name → outcome`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateAggregator;

impl GateAggregator {
    pub fn aggregate(results: &BTreeMap<String, TaskOutcome>) -> GateResult {
        let failures: Vec<GateFailure> = results
            .iter()
            .filter_map(|(task, outcome)| match outcome {
                TaskOutcome::Pass => None,
                TaskOutcome::Fail { reason } => Some(GateFailure {
                    task: task.clone(),
                    reason: reason.clone(),
                }),
            })
            .collect();

        let total = results.len();
        let status = if total > 0 && failures.is_empty() {
            GateStatus::Pass
        } else {
            GateStatus::Fail
        };

        GateResult {
            status,
            passed: total - failures.len(),
            failures,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(fail: &[&str], pass: &[&str]) -> BTreeMap<String, TaskOutcome> {
        let mut map = BTreeMap::new();
        for name in pass {
            map.insert(name.to_string(), TaskOutcome::Pass);
        }
        for name in fail {
            map.insert(name.to_string(), TaskOutcome::fail("exit status 1"));
        }
        map
    }

    #[test]
    fn test_all_pass() {
        let gate = GateAggregator::aggregate(&outcomes(&[], &["a", "b"]));
        assert!(gate.is_pass());
        assert_eq!(gate.passed, 2);
        assert!((gate.pass_rate() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_is_fail() {
        let gate = GateAggregator::aggregate(&BTreeMap::new());
        assert_eq!(gate.status, GateStatus::Fail);
        assert!(gate.failures.is_empty());
        assert_eq!(gate.pass_rate(), 0.0);
    }

    #[test]
    fn test_one_fail_among_ten() {
        let pass: Vec<String> = (0..9).map(|i| format!("testAndroid{}_0_0", i)).collect();
        let pass_refs: Vec<&str> = pass.iter().map(String::as_str).collect();
        let gate = GateAggregator::aggregate(&outcomes(&["testAndroid9_9_9"], &pass_refs));
        assert!(!gate.is_pass());
        assert_eq!(gate.total, 10);
        assert_eq!(gate.failing_tasks(), vec!["testAndroid9_9_9"]);
        assert_eq!(gate.failures[0].reason, "exit status 1");
    }

    #[test]
    fn test_failing_tasks_sorted() {
        let gate = GateAggregator::aggregate(&outcomes(&["z", "a"], &["m"]));
        assert_eq!(gate.failing_tasks(), vec!["a", "z"]);
    }
}
