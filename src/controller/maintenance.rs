//! Maintenance trigger.

use tracing::info;

use crate::client::ResourceClient;
use crate::controller::error::{Error, Result};
use crate::document::is_empty_document;
use crate::plan::{ClusterConfiguration, TestCase};

/// Reject a final configuration that changes nothing.
pub fn validate(final_configuration: &ClusterConfiguration) -> Result<()> {
    if final_configuration.is_empty() {
        return Err(Error::InvalidPlan(
            "final basicConfiguration and processArgs cannot both be empty".to_string(),
        ));
    }
    Ok(())
}

/// Apply the case's final configuration to its cluster.
///
/// Does not wait for the change to complete.
pub async fn apply(client: &dyn ResourceClient, case: &TestCase) -> Result<()> {
    let final_configuration = &case.spec.maintenance_plan.final_configuration;
    validate(final_configuration)?;

    if !is_empty_document(&final_configuration.basic_configuration) {
        client
            .modify_cluster(&case.cluster_name, &final_configuration.basic_configuration)
            .await?;
    }
    if !is_empty_document(&final_configuration.process_args) {
        client
            .modify_process_arguments(&case.cluster_name, &final_configuration.process_args)
            .await?;
    }

    info!(test = %case.name, cluster = %case.cluster_name, "Maintenance started");
    Ok(())
}
