//! Task matrix generation and the verification plan.
//!
//! [`TaskMatrixGenerator`] expands a [`VersionCatalog`] into one
//! [`VerificationTaskSpec`] per entry. [`VerificationPlan`] wires the specs
//! into a [`DependencyGraph`] where the gate node depends on every task, and
//! evaluates the gate over that node's dependencies.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::domain::catalog::VersionCatalog;
use crate::domain::error::{MatrixError, Result};
use crate::domain::task::{TaskOutcome, VerificationTaskSpec};
use crate::domain::toolchain::ToolchainSelector;
use crate::gate::{GateAggregator, GateResult};
use crate::graph::DependencyGraph;

/// Prefix of every generated task name.
pub const DEFAULT_TASK_PREFIX: &str = "testAndroid";

/// Node every verification task feeds into.
pub const GATE_NODE: &str = "check";

/// Base task listed ahead of the version tasks in CI matrices.
pub const BASE_TASK: &str = "test";

/// Replace every character outside `[A-Za-z0-9]` with `_`.
pub fn normalize_version(version: &str) -> String {
    version
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn task_name(prefix: &str, version: &str) -> String {
    format!("{}{}", prefix, normalize_version(version))
}

/// Expands a catalog into verification task specs.
#[derive(Debug, Clone)]
pub struct TaskMatrixGenerator {
    prefix: String,
    selector: ToolchainSelector,
    external_paths: BTreeMap<String, PathBuf>,
}

impl TaskMatrixGenerator {
    pub fn new(selector: ToolchainSelector) -> Self {
        Self {
            prefix: DEFAULT_TASK_PREFIX.to_string(),
            selector,
            external_paths: BTreeMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Optional external paths copied into every spec's environment.
    pub fn with_external_paths(mut self, paths: BTreeMap<String, PathBuf>) -> Self {
        self.external_paths = paths;
        self
    }

    /// One spec per catalog entry, in ascending version order.
    ///
    /// Fails on the first entry without a matching toolchain, or when two
    /// identifiers normalize to the same task name.
    pub fn generate(&self, catalog: &VersionCatalog) -> Result<Vec<VerificationTaskSpec>> {
        let mut names = HashSet::new();
        let mut specs = Vec::with_capacity(catalog.len());

        for entry in catalog.entries() {
            let name = task_name(&self.prefix, &entry.identifier);
            if name == GATE_NODE || !names.insert(name.clone()) {
                return Err(MatrixError::MalformedCatalog(format!(
                    "identifier {} yields task name {} which is already taken",
                    entry.identifier, name
                )));
            }

            let toolchain = self.selector.select(&entry.version)?.clone();
            let spec = VerificationTaskSpec {
                name,
                version_entry: entry.clone(),
                toolchain,
                extra_environment: self.external_paths.clone(),
            };
            debug!(
                task = %spec.name,
                version = %spec.version(),
                toolchain = %spec.toolchain.toolchain_id,
                env = ?spec.redacted_environment(),
                "verification task generated"
            );
            specs.push(spec);
        }
        Ok(specs)
    }
}

/// Generated specs plus the gate dependency graph.
#[derive(Debug, Clone)]
pub struct VerificationPlan {
    specs: Vec<VerificationTaskSpec>,
    graph: DependencyGraph,
}

impl VerificationPlan {
    pub fn build(specs: Vec<VerificationTaskSpec>) -> Result<Self> {
        let mut graph = DependencyGraph::new();
        graph.add_node(GATE_NODE);
        for spec in &specs {
            if graph.contains(&spec.name) {
                return Err(MatrixError::MalformedCatalog(format!(
                    "task name {} appears twice in the plan",
                    spec.name
                )));
            }
            graph.add_node(spec.name.clone());
            graph.add_dependency(&spec.name, GATE_NODE)?;
        }
        Ok(Self { specs, graph })
    }

    /// Generate and build in one step.
    pub fn generate(generator: &TaskMatrixGenerator, catalog: &VersionCatalog) -> Result<Self> {
        Self::build(generator.generate(catalog)?)
    }

    pub fn specs(&self) -> &[VerificationTaskSpec] {
        &self.specs
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Evaluate the gate over the gate node's dependencies.
    ///
    /// Tasks without a recorded outcome count as failed; outcomes for names
    /// outside the plan are ignored.
    pub fn gate(&self, outcomes: &BTreeMap<String, TaskOutcome>) -> Result<GateResult> {
        let required = self.graph.dependencies_of(GATE_NODE)?;
        let results: BTreeMap<String, TaskOutcome> = required
            .into_iter()
            .map(|name| {
                let outcome = outcomes
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| TaskOutcome::fail("no outcome recorded"));
                (name.to_string(), outcome)
            })
            .collect();
        Ok(GateAggregator::aggregate(&results))
    }

    /// Base task followed by every task name, for CI fan-out.
    pub fn ci_matrix(&self) -> CiMatrix {
        let mut tasks = Vec::with_capacity(self.specs.len() + 1);
        tasks.push(BASE_TASK.to_string());
        tasks.extend(self.specs.iter().map(|s| s.name.clone()));
        CiMatrix(tasks)
    }
}

/// Ordered task list serialized as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CiMatrix(pub Vec<String>);

impl CiMatrix {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}
