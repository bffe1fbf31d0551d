//! Error types for the execution engine.
//!
//! Errors are classified by blast radius: most only fail the test case they
//! occurred in, a few indicate a broken setup and abort the whole run.

use std::time::Duration;
use thiserror::Error;

use crate::client::ProviderError;
use crate::plan::PlanError;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Resource provider rejected or failed a request
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A readiness or completion wait exceeded its deadline
    #[error("Timeout after {timeout:?} waiting for {operation}")]
    PollTimeout { operation: String, timeout: Duration },

    /// The run was cancelled by the operator
    #[error("Cancelled while {0}")]
    Cancelled(String),

    /// Malformed maintenance plan
    #[error("Invalid maintenance plan: {0}")]
    InvalidPlan(String),

    /// The workload executor did not exit after being interrupted
    #[error("Workload executor (pid {}) did not exit within {grace:?} of being interrupted", .pid.map_or_else(|| "unknown".to_string(), |p| p.to_string()))]
    WorkloadTimeout { pid: Option<u32>, grace: Duration },

    /// The workload executor could not be started or observed
    #[error("Workload executor error: {0}")]
    Workload(String),

    /// Test data could not be loaded into the cluster
    #[error("Test data seeding error: {0}")]
    Seed(String),

    /// Run preparation failed (organization, project, user or network access)
    #[error("Setup error: {0}")]
    Setup(String),

    /// Test plan could not be built
    #[error("Test plan error: {0}")]
    Plan(#[from] PlanError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error should abort the whole run instead of failing a
    /// single test case.
    pub fn is_fatal_to_run(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_unauthorized() || e.is_transport(),
            Error::Cancelled(_) | Error::Setup(_) | Error::Plan(_) => true,
            Error::PollTimeout { .. }
            | Error::InvalidPlan(_)
            | Error::WorkloadTimeout { .. }
            | Error::Workload(_)
            | Error::Seed(_)
            | Error::Serialization(_)
            | Error::Io(_) => false,
        }
    }

    /// Check if this error is a polling timeout
    pub fn is_poll_timeout(&self) -> bool {
        matches!(self, Error::PollTimeout { .. })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
