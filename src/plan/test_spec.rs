//! YAML test definitions.
//!
//! Example:
//! ```yaml
//! maintenancePlan:
//!   initial:
//!     basicConfiguration:
//!       clusterType: REPLICASET
//!       providerSettings:
//!         providerName: AWS
//!         regionName: US_WEST_1
//!         instanceSizeName: M10
//!     processArgs: {}
//!   final:
//!     basicConfiguration: {}
//!     processArgs:
//!       javascriptEnabled: false
//!   uriOptions:
//!     retryWrites: true
//! driverWorkload:
//!   database: test_database
//!   collection: test_collection
//!   testData:
//!     - {_id: 1, x: 11}
//!   operations: []
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::{Document, empty_document, is_empty_document};
use crate::plan::PlanError;

/// A complete test definition.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    /// Cluster states the test transitions between.
    pub maintenance_plan: MaintenancePlan,
    /// Parameters for the workload executor.
    pub driver_workload: DriverWorkload,
}

impl TestSpec {
    /// Parse a test definition from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a test definition from a file.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| PlanError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Initial and final cluster configuration plus connection options.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePlan {
    /// Configuration the cluster must reach before the test starts.
    pub initial: ClusterConfiguration,
    /// Configuration applied as the maintenance step.
    #[serde(rename = "final")]
    pub final_configuration: ClusterConfiguration,
    /// Options appended to the workload's connection string.
    #[serde(default)]
    pub uri_options: BTreeMap<String, Document>,
}

/// Basic settings and process arguments of a cluster.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    #[serde(default = "empty_document")]
    pub basic_configuration: Document,
    #[serde(default = "empty_document")]
    pub process_args: Document,
}

impl ClusterConfiguration {
    /// Check whether neither part changes anything.
    pub fn is_empty(&self) -> bool {
        is_empty_document(&self.basic_configuration) && is_empty_document(&self.process_args)
    }
}

impl Default for ClusterConfiguration {
    fn default() -> Self {
        Self {
            basic_configuration: empty_document(),
            process_args: empty_document(),
        }
    }
}

/// Workload description handed to the executor.
///
/// Keys beyond the ones modelled here are kept and forwarded unchanged.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverWorkload {
    pub database: String,
    pub collection: String,
    /// Documents loaded into the collection before the executor starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<Vec<Document>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Document>,
}
