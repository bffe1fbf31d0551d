//! The run loop.
//!
//! ## Sequential mode
//!
//! Clusters are created up front and take varying amounts of time to become
//! ready, so the loop repeatedly asks which pending case is ready first:
//!
//! ```text
//! while cases pending:
//!     wait for any pending cluster to be ready
//!     start workload -> apply maintenance -> grace delay -> wait for IDLE
//!     stop workload (always) -> record outcome -> remove case
//! ```
//!
//! ## Parallel mode
//!
//! One worker per case, each waiting on its own cluster. Workers share the
//! registry behind a mutex and remove their case when done.
//!
//! Errors that only concern one case become a failed outcome for that case.
//! Run-fatal errors (see [`Error::is_fatal_to_run`]) stop the run; every case
//! still pending is recorded as an error and the report is marked aborted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ClusterSnapshot, Project, ProjectAdmin, ProviderError, ResourceClient};
use crate::config::{ExecutionMode, RunSettings};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::poller::sleep_or_cancel;
use crate::controller::results::{ResultAggregator, TestOutcome, TestReport};
use crate::controller::workload::{WorkloadOutput, connection_string};
use crate::controller::{maintenance, provisioning, readiness};
use crate::plan::{TestCase, TestPlanRegistry};

/// A case that did not complete, with whatever the workload printed.
#[derive(Debug)]
pub struct CaseFailure {
    pub error: Error,
    pub output: Option<WorkloadOutput>,
}

impl From<Error> for CaseFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            output: None,
        }
    }
}

/// Provision the project and run every case in `registry`.
///
/// Plans are checked before anything is created; cases with an invalid plan
/// are recorded as errors and never get a cluster. `clusters_for` builds the
/// cluster client once the project is known.
pub async fn run_spec_tests<F>(
    admin: &dyn ProjectAdmin,
    clusters_for: F,
    settings: RunSettings,
    mut registry: TestPlanRegistry,
    cancel: CancellationToken,
) -> TestReport
where
    F: FnOnce(&Project) -> Arc<dyn ResourceClient>,
{
    let mut results = ResultAggregator::new();
    reject_invalid_plans(&mut registry, &mut results);

    if registry.is_empty() {
        info!("No runnable test cases");
        return results.finalize(settings.suite_name);
    }

    let project = match provisioning::prepare_project(admin, &settings).await {
        Ok(project) => project,
        Err(e) => {
            error!(error = %e, "Run preparation failed");
            for case in registry.take_all() {
                results.record_error(&case, Duration::ZERO, &e, None);
            }
            results.abort(e.to_string());
            return results.finalize(settings.suite_name);
        }
    };

    let ctx = Context::new(clusters_for(&project), settings, cancel);
    TestRunner::new(ctx).with_results(results).run(registry).await
}

/// Remove cases whose plan cannot be run, recording them as errors.
pub fn reject_invalid_plans(registry: &mut TestPlanRegistry, results: &mut ResultAggregator) {
    let invalid: Vec<(TestCase, Error)> = registry
        .all()
        .iter()
        .filter_map(|case| {
            provisioning::check_plan(case)
                .err()
                .map(|e| (case.clone(), e))
        })
        .collect();

    for (case, e) in invalid {
        warn!(test = %case.name, error = %e, "Rejecting test case");
        if let Err(remove_err) = registry.remove(&case.name) {
            debug!(test = %case.name, error = %remove_err, "Case already removed");
        }
        results.record_error(&case, Duration::ZERO, &e, None);
    }
}

/// Drives provisioned test cases to completion.
pub struct TestRunner {
    ctx: Context,
    results: ResultAggregator,
}

impl TestRunner {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            results: ResultAggregator::new(),
        }
    }

    /// Continue recording into an existing aggregator.
    pub fn with_results(mut self, results: ResultAggregator) -> Self {
        self.results = results;
        self
    }

    /// Create every pending cluster, run all cases and build the report.
    pub async fn run(mut self, mut registry: TestPlanRegistry) -> TestReport {
        info!(mode = ?self.ctx.settings.mode, "Test plan:\n{registry}");

        if let Err(e) = self.initialize_clusters(&mut registry).await {
            self.abort_run(&mut registry, &e).await;
        } else {
            match self.ctx.settings.mode {
                ExecutionMode::Sequential => self.run_sequential(&mut registry).await,
                ExecutionMode::Parallel => self.run_parallel(registry).await,
            }
        }

        let report = self.results.finalize(self.ctx.settings.suite_name.clone());
        info!(passed = report.passed(), "{report}");
        report
    }

    /// Request every pending case's cluster in its initial configuration.
    ///
    /// Cases whose cluster cannot be requested are recorded and dropped.
    /// Returns the first run-fatal error.
    async fn initialize_clusters(&mut self, registry: &mut TestPlanRegistry) -> Result<()> {
        let cases = registry.all().to_vec();
        for case in cases {
            if self.ctx.is_cancelled() {
                return Err(Error::Cancelled("creating clusters".to_string()));
            }
            match provisioning::initialize_cluster(self.ctx.clusters.as_ref(), &case).await {
                Ok(()) => {}
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    error!(test = %case.name, cluster = %case.cluster_name, error = %e, "Failed to create cluster");
                    self.remove_pending(registry, &case.name);
                    self.results.record_error(&case, Duration::ZERO, &e, None);
                }
            }
        }
        Ok(())
    }

    async fn run_sequential(&mut self, registry: &mut TestPlanRegistry) {
        while !registry.is_empty() {
            let selection = readiness::wait_for_ready(
                registry.all(),
                self.ctx.clusters.as_ref(),
                self.ctx.settings.polling,
                &self.ctx.cancel,
            )
            .await;

            let (case, snapshot) = match selection {
                Ok(selected) => selected,
                Err(e) if e.is_fatal_to_run() => {
                    self.abort_run(registry, &e).await;
                    return;
                }
                Err(e) => {
                    // Nothing will become ready for the cases left.
                    error!(pending = registry.len(), error = %e, "No pending cluster became ready");
                    for case in registry.take_all() {
                        self.results.record_error(&case, Duration::ZERO, &e, None);
                        teardown(&self.ctx, &case).await;
                    }
                    return;
                }
            };

            self.remove_pending(registry, &case.name);
            let started = Instant::now();
            info!(test = %case.name, cluster = %case.cluster_name, "Running test case");

            let fatal = match execute_case(&self.ctx, &case, &snapshot).await {
                Ok(output) => {
                    self.results.record(&case, started.elapsed(), output);
                    None
                }
                Err(failure) => {
                    self.results
                        .record_error(&case, started.elapsed(), &failure.error, failure.output);
                    failure.error.is_fatal_to_run().then_some(failure.error)
                }
            };
            teardown(&self.ctx, &case).await;

            if let Some(e) = fatal {
                self.abort_run(registry, &e).await;
                return;
            }
        }
    }

    async fn run_parallel(&mut self, registry: TestPlanRegistry) {
        let cases = registry.all().to_vec();
        let registry = Arc::new(Mutex::new(registry));
        // Workers cancel this on a fatal error without touching the
        // operator's token.
        let run_cancel = self.ctx.cancel.child_token();

        let workers = cases.iter().cloned().map(|case| {
            let ctx = self.ctx.with_cancel(run_cancel.clone());
            let registry = Arc::clone(&registry);
            tokio::spawn(run_worker(ctx, registry, case))
        });
        let joined = join_all(workers).await;

        for (case, result) in cases.iter().zip(joined) {
            match result {
                Ok(report) => {
                    if let Some(e) = report.fatal {
                        self.results.abort(e.to_string());
                    }
                    self.results.push(report.outcome);
                }
                Err(join_err) => {
                    let e = Error::Workload(format!("worker task failed: {join_err}"));
                    self.results.record_error(case, Duration::ZERO, &e, None);
                }
            }
        }

        if self.ctx.is_cancelled() {
            self.results.abort("cancelled by operator");
        }
    }

    /// Stop the run: every case still pending is recorded as an error.
    async fn abort_run(&mut self, registry: &mut TestPlanRegistry, cause: &Error) {
        let pending = registry.take_all();
        error!(error = %cause, pending = pending.len(), "Aborting run");
        self.results.abort(cause.to_string());
        for case in pending {
            self.results.record_error(&case, Duration::ZERO, cause, None);
            teardown(&self.ctx, &case).await;
        }
    }

    fn remove_pending(&self, registry: &mut TestPlanRegistry, name: &str) {
        if let Err(e) = registry.remove(name) {
            warn!(test = %name, error = %e, "Case was not pending");
        }
    }
}

struct WorkerReport {
    outcome: TestOutcome,
    fatal: Option<Error>,
}

async fn run_worker(
    ctx: Context,
    registry: Arc<Mutex<TestPlanRegistry>>,
    case: TestCase,
) -> WorkerReport {
    let mut started = Instant::now();
    let result = match readiness::wait_for_ready(
        std::slice::from_ref(&case),
        ctx.clusters.as_ref(),
        ctx.settings.polling,
        &ctx.cancel,
    )
    .await
    {
        Ok((_, snapshot)) => {
            started = Instant::now();
            info!(test = %case.name, cluster = %case.cluster_name, "Running test case");
            execute_case(&ctx, &case, &snapshot).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = registry.lock().await.remove(&case.name) {
        warn!(test = %case.name, error = %e, "Case was not pending");
    }

    let elapsed = started.elapsed();
    let (outcome, fatal) = match result {
        Ok(output) => (TestOutcome::from_output(&case, elapsed, output), None),
        Err(failure) => {
            let outcome = TestOutcome::from_error(&case, elapsed, &failure.error, failure.output);
            let fatal = failure.error.is_fatal_to_run().then_some(failure.error);
            if let Some(e) = &fatal {
                // Cancellation is the consequence, not the cause.
                if !matches!(e, Error::Cancelled(_)) {
                    error!(test = %case.name, error = %e, "Fatal error, stopping all workers");
                }
                ctx.cancel.cancel();
            }
            (outcome, fatal.filter(|e| !matches!(e, Error::Cancelled(_))))
        }
    };

    teardown(&ctx, &case).await;
    WorkerReport { outcome, fatal }
}

/// Run one ready case: workload, maintenance, completion wait.
///
/// The workload is always stopped, whether or not maintenance succeeded, and
/// its output is kept for the outcome.
pub async fn execute_case(
    ctx: &Context,
    case: &TestCase,
    snapshot: &ClusterSnapshot,
) -> std::result::Result<WorkloadOutput, CaseFailure> {
    let srv_address = snapshot
        .srv_address()
        .ok_or_else(|| Error::Workload("cluster has no srvAddress".to_string()))?;
    let uri = connection_string(
        srv_address,
        &ctx.settings.db_username,
        &ctx.settings.db_password,
        &case.spec.maintenance_plan.uri_options,
    )?;

    let workload = &case.spec.driver_workload;
    if let Some(test_data) = &workload.test_data {
        ctx.seeder
            .seed(&uri, &workload.database, &workload.collection, test_data)
            .await?;
    }

    let handle = ctx.workload.start(&uri, workload)?;
    let maintenance_result = run_maintenance(ctx, case).await;
    let stop_result = ctx.workload.stop(handle).await;

    match (maintenance_result, stop_result) {
        (Ok(()), Ok(output)) => Ok(output),
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(e), Ok(output)) => Err(CaseFailure {
            error: e,
            output: Some(output),
        }),
        (Err(e), Err(stop_err)) => {
            warn!(test = %case.name, error = %stop_err, "Failed to stop workload executor");
            Err(e.into())
        }
    }
}

async fn run_maintenance(ctx: &Context, case: &TestCase) -> Result<()> {
    maintenance::apply(ctx.clusters.as_ref(), case).await?;

    if !sleep_or_cancel(ctx.settings.maintenance_grace, &ctx.cancel).await {
        return Err(Error::Cancelled("waiting for maintenance to start".to_string()));
    }

    readiness::wait_for_idle(
        ctx.clusters.as_ref(),
        &case.cluster_name,
        ctx.settings.polling,
        &ctx.cancel,
    )
    .await?;
    info!(test = %case.name, cluster = %case.cluster_name, "Maintenance complete");
    Ok(())
}

/// Delete a case's cluster if the run is configured to clean up.
async fn teardown(ctx: &Context, case: &TestCase) {
    if !ctx.settings.delete_clusters {
        return;
    }
    match ctx.clusters.delete_cluster(&case.cluster_name).await {
        Ok(()) => info!(cluster = %case.cluster_name, "Cluster deletion requested"),
        Err(ProviderError::NotFound(_) | ProviderError::AlreadyRequested(_)) => {
            debug!(cluster = %case.cluster_name, "Cluster already gone");
        }
        Err(e) => warn!(cluster = %case.cluster_name, error = %e, "Failed to delete cluster"),
    }
}
