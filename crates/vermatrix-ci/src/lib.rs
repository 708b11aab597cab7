//! vermatrix-ci - verification task execution
//!
//! Runs the tasks of a `VerificationPlan`:
//! - one isolated process per task (`CommandExecutor`)
//! - bounded by a global limit and optional per-toolchain capacity
//! - per-task retries and timeout; failures never leak into sibling tasks

pub mod error;
pub mod executor;
pub mod runner;

pub use error::TaskExecutionFailure;
pub use executor::{extra_env_name, CommandExecutor, TaskExecution, TaskExecutor};
pub use runner::{MatrixRunner, RunnerOptions, TaskRunResult, VerificationReport};
