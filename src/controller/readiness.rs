//! Readiness selection.
//!
//! A test case is ready when its cluster is IDLE and both its basic
//! configuration and process arguments contain the test's declared initial
//! configuration. Selection is first-match in registry order.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClusterSnapshot, ClusterStateName, ResourceClient};
use crate::config::PollerSettings;
use crate::controller::error::{Error, Result};
use crate::controller::poller::poll;
use crate::document::subset_mismatch;
use crate::plan::TestCase;

/// Check a fresh snapshot against the case's declared initial configuration.
///
/// Returns a description of the first mismatch, or `None` when ready.
pub fn readiness_mismatch(case: &TestCase, snapshot: &ClusterSnapshot) -> Option<String> {
    if snapshot.state_name != ClusterStateName::Idle {
        return Some(format!("state is {}", snapshot.state_name));
    }
    let initial = &case.spec.maintenance_plan.initial;
    if let Some(path) = subset_mismatch(&snapshot.basic_configuration, &initial.basic_configuration)
    {
        return Some(format!("basic configuration differs at {path}"));
    }
    let Some(process_arguments) = &snapshot.process_arguments else {
        return Some("process arguments not fetched".to_string());
    };
    subset_mismatch(process_arguments, &initial.process_args)
        .map(|path| format!("process arguments differ at {path}"))
}

/// Fetch a fresh snapshot of a case's cluster.
///
/// Process arguments are only fetched once the cluster is IDLE. Returns
/// `None` if the provider does not know the cluster yet.
pub async fn fetch_snapshot(
    client: &dyn ResourceClient,
    case: &TestCase,
) -> Result<Option<ClusterSnapshot>> {
    let cluster = match client.get_cluster(&case.cluster_name).await {
        Ok(cluster) => cluster,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let process_arguments = if cluster.is_idle() {
        Some(client.get_process_arguments(&case.cluster_name).await?)
    } else {
        None
    };
    Ok(Some(ClusterSnapshot {
        state_name: cluster.state_name,
        basic_configuration: cluster.document,
        process_arguments,
    }))
}

/// Single pass over `cases`: return the first one whose cluster is ready.
pub async fn find_ready(
    cases: &[TestCase],
    client: &dyn ResourceClient,
) -> Result<Option<(TestCase, ClusterSnapshot)>> {
    for case in cases {
        let Some(snapshot) = fetch_snapshot(client, case).await? else {
            debug!(test = %case.name, cluster = %case.cluster_name, "Cluster not visible yet");
            continue;
        };
        match readiness_mismatch(case, &snapshot) {
            None => {
                info!(test = %case.name, cluster = %case.cluster_name, "Cluster is ready");
                return Ok(Some((case.clone(), snapshot)));
            }
            Some(reason) if snapshot.state_name == ClusterStateName::Idle => {
                warn!(
                    test = %case.name,
                    cluster = %case.cluster_name,
                    reason = %reason,
                    "Cluster is idle but does not match its initial configuration"
                );
            }
            Some(reason) => {
                debug!(test = %case.name, cluster = %case.cluster_name, reason = %reason, "Cluster is not ready");
            }
        }
    }
    Ok(None)
}

/// Wait until one of `cases` is ready.
pub async fn wait_for_ready(
    cases: &[TestCase],
    client: &dyn ResourceClient,
    settings: PollerSettings,
    cancel: &CancellationToken,
) -> Result<(TestCase, ClusterSnapshot)> {
    poll("a test cluster to become ready", settings, cancel, || {
        find_ready(cases, client)
    })
    .await
}

/// Wait until a cluster reports IDLE again after maintenance.
pub async fn wait_for_idle(
    client: &dyn ResourceClient,
    cluster_name: &str,
    settings: PollerSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    let operation = format!("cluster {cluster_name} to return to IDLE");
    poll(&operation, settings, cancel, move || async move {
        let cluster = client.get_cluster(cluster_name).await?;
        debug!(cluster = %cluster_name, state = %cluster.state_name, "Polled cluster state");
        Ok::<_, Error>(cluster.is_idle().then_some(()))
    })
    .await
}
