//! Shared context for a test run.
//!
//! The Context struct holds everything a test case needs while it runs: the
//! cluster client, the run settings, the workload runner, the test data
//! seeder and the run's cancellation token. It is cheap to clone, one clone per parallel worker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::ResourceClient;
use crate::config::RunSettings;
use crate::controller::seeding::{DataSeeder, MongoSeeder};
use crate::controller::workload::WorkloadRunner;

/// Shared context for the run loop
#[derive(Clone)]
pub struct Context {
    /// Cluster operations in the run's project
    pub clusters: Arc<dyn ResourceClient>,
    /// Run settings
    pub settings: Arc<RunSettings>,
    /// Workload executor launcher
    pub workload: WorkloadRunner,
    /// Loads test data before the workload starts
    pub seeder: Arc<dyn DataSeeder>,
    /// Cancelled on operator abort or when the run hits a fatal error
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a new context
    pub fn new(
        clusters: Arc<dyn ResourceClient>,
        settings: RunSettings,
        cancel: CancellationToken,
    ) -> Self {
        let workload = WorkloadRunner::new(settings.workload_executor.clone())
            .with_stop_timeout(settings.workload_stop_timeout);
        Self {
            clusters,
            settings: Arc::new(settings),
            workload,
            seeder: Arc::new(MongoSeeder),
            cancel,
        }
    }

    /// Replace the test data seeder
    pub fn with_seeder(mut self, seeder: Arc<dyn DataSeeder>) -> Self {
        self.seeder = seeder;
        self
    }

    /// Same context with a different cancellation token
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// Check if the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
