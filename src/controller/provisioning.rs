//! Run preparation.
//!
//! Before any test case runs, the project that hosts the clusters must exist,
//! the database user handed to the workload executor must be present, and the
//! clusters must accept connections from anywhere. Each test case then gets
//! its cluster created (or reshaped, if a previous run left one behind) in its
//! declared initial configuration.
//!
//! Every step is idempotent so an interrupted run can simply be restarted.
//!
//! The single-cluster helpers at the bottom back the `clusters` CLI commands.

use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use crate::client::{
    AccessListEntry, DatabaseUser, ProjectAdmin, Project, ProviderError, ResourceClient,
};
use crate::config::RunSettings;
use crate::controller::error::{Error, Result};
use crate::controller::maintenance;
use crate::document::{Document, is_empty_document};
use crate::plan::TestCase;

/// Check a test case's plan before any provider resource is touched.
pub fn check_plan(case: &TestCase) -> Result<()> {
    let initial = &case.spec.maintenance_plan.initial;
    if !initial.basic_configuration.is_object() && !initial.basic_configuration.is_null() {
        return Err(Error::InvalidPlan(
            "initial basicConfiguration must be a mapping".to_string(),
        ));
    }
    maintenance::validate(&case.spec.maintenance_plan.final_configuration)
}

/// Prepare the project, database user and network access for a run.
pub async fn prepare_project(admin: &dyn ProjectAdmin, settings: &RunSettings) -> Result<Project> {
    let project = ensure_project(admin, &settings.organization_name, &settings.project_name).await?;
    ensure_database_user(admin, &project.id, &settings.db_username, &settings.db_password).await?;
    ensure_network_access(admin, &project.id).await?;
    Ok(project)
}

/// Get the named project, creating it in the named organization if needed.
#[instrument(skip(admin))]
pub async fn ensure_project(
    admin: &dyn ProjectAdmin,
    organization_name: &str,
    project_name: &str,
) -> Result<Project> {
    let organization = admin
        .find_organization(organization_name)
        .await
        .map_err(|e| setup_error("looking up organization", e))?
        .ok_or_else(|| Error::Setup(format!("organization {organization_name:?} not found")))?;
    debug!(organization = %organization.name, id = %organization.id, "Organization found");

    match admin.get_project(project_name).await {
        Ok(project) => {
            info!(project = %project.name, id = %project.id, "Using existing project");
            return Ok(project);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(setup_error("looking up project", e)),
    }

    match admin.create_project(project_name, &organization.id).await {
        Ok(project) => {
            info!(project = %project.name, id = %project.id, "Project created");
            Ok(project)
        }
        // Lost a race with a concurrent run creating the same project.
        Err(ProviderError::AlreadyExists(_)) => admin
            .get_project(project_name)
            .await
            .map_err(|e| setup_error("looking up project", e)),
        Err(e) => Err(setup_error("creating project", e)),
    }
}

/// Make sure the admin database user exists with the configured password.
#[instrument(skip(admin, password))]
pub async fn ensure_database_user(
    admin: &dyn ProjectAdmin,
    project_id: &str,
    username: &str,
    password: &str,
) -> Result<()> {
    let user = DatabaseUser::admin(username, password);
    match admin.create_database_user(project_id, &user).await {
        Ok(()) => info!(user = %username, "Database user created"),
        Err(ProviderError::AlreadyExists(_)) => {
            admin
                .update_database_user(project_id, &user)
                .await
                .map_err(|e| setup_error("updating database user", e))?;
            info!(user = %username, "Database user updated");
        }
        Err(e) => return Err(setup_error("creating database user", e)),
    }
    Ok(())
}

/// Allow connections to the project's clusters from any address.
#[instrument(skip(admin))]
pub async fn ensure_network_access(admin: &dyn ProjectAdmin, project_id: &str) -> Result<()> {
    match admin
        .add_network_access(project_id, &[AccessListEntry::anywhere()])
        .await
    {
        Ok(()) | Err(ProviderError::AlreadyExists(_)) => {
            info!("Network access open to all addresses");
            Ok(())
        }
        Err(e) => Err(setup_error("configuring network access", e)),
    }
}

/// Create a case's cluster in its initial configuration.
///
/// A cluster left over from an earlier run is reconfigured instead. The
/// provider applies both asynchronously; readiness polling picks up the
/// result.
pub async fn initialize_cluster(client: &dyn ResourceClient, case: &TestCase) -> Result<()> {
    let initial = &case.spec.maintenance_plan.initial;
    let mut config = match &initial.basic_configuration {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(Error::InvalidPlan(
                "initial basicConfiguration must be a mapping".to_string(),
            ));
        }
    };
    config.insert("name".to_string(), Value::String(case.cluster_name.clone()));

    match client.create_cluster(&Value::Object(config.clone())).await {
        Ok(()) => info!(test = %case.name, cluster = %case.cluster_name, "Cluster creation requested"),
        Err(ProviderError::AlreadyExists(_)) => {
            config.remove("name");
            if !config.is_empty() {
                client
                    .modify_cluster(&case.cluster_name, &Value::Object(config))
                    .await?;
            }
            info!(test = %case.name, cluster = %case.cluster_name, "Cluster already exists, reconfigured");
        }
        Err(e) => return Err(e.into()),
    }

    if !is_empty_document(&initial.process_args) {
        client
            .modify_process_arguments(&case.cluster_name, &initial.process_args)
            .await?;
        debug!(cluster = %case.cluster_name, "Initial process arguments applied");
    }
    Ok(())
}

/// Basic configuration of a dedicated AWS replica set in `US_WEST_1`.
pub fn dedicated_replica_set(instance_size_name: &str) -> Document {
    json!({
        "clusterType": "REPLICASET",
        "providerSettings": {
            "providerName": "AWS",
            "regionName": "US_WEST_1",
            "instanceSizeName": instance_size_name,
        },
    })
}

/// Flip a cluster's `javascriptEnabled` process argument.
///
/// Returns the new value. An unset value counts as enabled, which is the
/// provider's default.
#[instrument(skip(client))]
pub async fn toggle_javascript(client: &dyn ResourceClient, cluster_name: &str) -> Result<bool> {
    let process_args = client.get_process_arguments(cluster_name).await?;
    let enabled = process_args
        .get("javascriptEnabled")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    client
        .modify_process_arguments(cluster_name, &json!({"javascriptEnabled": !enabled}))
        .await?;
    info!(cluster = %cluster_name, javascript_enabled = !enabled, "Server-side JavaScript toggled");
    Ok(!enabled)
}

fn setup_error(step: &str, error: ProviderError) -> Error {
    Error::Setup(format!("{step}: {error}"))
}
