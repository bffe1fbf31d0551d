//! astrolabe library crate
//!
//! Drives planned-maintenance tests against provisioned database clusters:
//! each test case gets a cluster in a declared initial configuration, a
//! workload executor is run against it while the cluster is moved to a final
//! configuration, and the executor's verdict is recorded.
//!
//! ## Architecture
//!
//! - `plan`: test files, cluster naming and the registry of pending cases
//! - `client`: resource provider REST client
//! - `controller`: the execution engine
//! - `report`: JUnit and JSON report writers

pub mod client;
pub mod config;
pub mod controller;
pub mod document;
pub mod plan;
pub mod report;

pub use config::{ControllerConfig, ExecutionMode, PollerSettings, RunSettings};
pub use controller::{Error, Result, TestReport};
