//! Test-plan execution engine.
//!
//! Tracks pending test cases, decides which cluster to poll next, drives the
//! workload executor around a maintenance operation and aggregates outcomes.
//!
//! ## Architecture
//!
//! - `poller`: bounded, cancellable retry primitive every wait is built on
//! - `readiness`: finds the first pending case whose cluster is ready
//! - `maintenance`: applies a case's final configuration
//! - `seeding`: loads a case's test data before the executor starts
//! - `workload`: starts and interrupts the workload executor
//! - `results`: per-case outcomes and the run report
//! - `provisioning`: project, user, network access and initial clusters
//! - `runner`: the sequential and parallel run loops

pub mod context;
pub mod error;
pub mod maintenance;
pub mod poller;
pub mod provisioning;
pub mod readiness;
pub mod results;
pub mod runner;
pub mod seeding;
pub mod workload;

pub use context::Context;
pub use error::{Error, Result};
pub use results::{FailureDetail, FailureKind, ResultAggregator, TestOutcome, TestReport};
pub use runner::{TestRunner, run_spec_tests};
pub use seeding::{DataSeeder, MongoSeeder};
pub use workload::{WorkloadOutput, WorkloadRunner};
