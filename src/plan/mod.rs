//! Test plan: declared test cases and the clusters they run on.
//!
//! - `test_spec`: the YAML test definition (maintenance plan + workload)
//! - `naming`: deterministic cluster names derived from a run salt
//! - `registry`: pending test cases, in discovery order

mod naming;
mod registry;
mod test_spec;

pub use naming::{ClusterNamer, DEFAULT_CLUSTER_NAME_LENGTH, MAX_CLUSTER_NAME_LENGTH};
pub use registry::{TestCase, TestPlanRegistry, test_name_from_path};
pub use test_spec::{ClusterConfiguration, DriverWorkload, MaintenancePlan, TestSpec};

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or mutating a test plan.
#[derive(Error, Debug)]
pub enum PlanError {
    /// A test file or directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A test file is not a valid test definition.
    #[error("Invalid test definition {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A test case with this name is already registered.
    #[error("Duplicate test case: {0}")]
    Duplicate(String),

    /// No pending test case bears this name.
    #[error("Test case not found: {0}")]
    NotFound(String),
}
