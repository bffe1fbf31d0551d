//! Run configuration.
//!
//! Everything the engine needs is carried in explicitly constructed values
//! built by the entry point: `ControllerConfig` for talking to the provider
//! and `RunSettings` for a single test run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::plan::DEFAULT_CLUSTER_NAME_LENGTH;

/// Default base URL of the provider API.
pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com/api/atlas";

/// Default provider API version.
pub const DEFAULT_API_VERSION: &str = "1.0";

/// Delay between triggering maintenance and polling for its completion.
/// The provider needs a moment before it reports the pending transition.
pub const DEFAULT_MAINTENANCE_GRACE: Duration = Duration::from_secs(3);

/// How long a workload executor may take to wind down after an interrupt.
pub const DEFAULT_WORKLOAD_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// API credentials. The password is never printed.
#[derive(Clone)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
}

impl ApiCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Interval and deadline applied to every polling wait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollerSettings {
    /// Delay between two consecutive attempts.
    pub interval: Duration,
    /// Maximum time to wait before giving up.
    pub timeout: Duration,
}

impl PollerSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Build settings from a polling frequency in Hz.
    ///
    /// Non-positive or non-finite frequencies fall back to 1 Hz.
    pub fn from_frequency(frequency_hz: f64, timeout: Duration) -> Self {
        let frequency = if frequency_hz.is_finite() && frequency_hz > 0.0 {
            frequency_hz
        } else {
            1.0
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / frequency),
            timeout,
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Configuration for the provider client.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Base URL of the provider API, without the version segment.
    pub base_url: String,
    /// API version, e.g. "1.0".
    pub api_version: String,
    /// Credentials used for every request.
    pub credentials: ApiCredentials,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Polling behaviour for readiness and completion waits.
    pub polling: PollerSettings,
}

impl ControllerConfig {
    /// Create a configuration with default endpoint and timeouts.
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credentials,
            http_timeout: Duration::from_secs(10),
            polling: PollerSettings::default(),
        }
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the polling settings.
    pub fn with_polling(mut self, polling: PollerSettings) -> Self {
        self.polling = polling;
        self
    }

    /// Versioned API root, always ending in a slash.
    pub fn api_root(&self) -> String {
        format!(
            "{}/v{}/",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }
}

/// How pending test cases are driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One case at a time, first ready cluster wins.
    #[default]
    Sequential,
    /// One worker per case, each waiting on its own cluster.
    Parallel,
}

/// Settings for a single `spec-tests run`.
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// Directory (or single file) the test plan was loaded from.
    pub spec_tests_directory: PathBuf,
    /// Workload executor binary.
    pub workload_executor: PathBuf,
    /// Salt mixed into every derived cluster name.
    pub cluster_name_salt: String,
    /// Length of derived cluster names.
    pub cluster_name_length: usize,
    /// Organization that owns the project.
    pub organization_name: String,
    /// Project the clusters are created in.
    pub project_name: String,
    /// Database user handed to the workload executor.
    pub db_username: String,
    /// Database password handed to the workload executor.
    pub db_password: String,
    /// Polling behaviour for readiness and completion waits.
    pub polling: PollerSettings,
    /// Delay between maintenance trigger and completion polling.
    pub maintenance_grace: Duration,
    /// Grace period for the workload to exit after an interrupt.
    pub workload_stop_timeout: Duration,
    /// Sequential or parallel execution.
    pub mode: ExecutionMode,
    /// Delete each cluster once its test case has been recorded.
    pub delete_clusters: bool,
    /// Name of the test suite in the report.
    pub suite_name: String,
}

impl RunSettings {
    /// Create settings with defaults for everything but the required inputs.
    pub fn new(
        spec_tests_directory: impl Into<PathBuf>,
        workload_executor: impl Into<PathBuf>,
        cluster_name_salt: impl Into<String>,
    ) -> Self {
        Self {
            spec_tests_directory: spec_tests_directory.into(),
            workload_executor: workload_executor.into(),
            cluster_name_salt: cluster_name_salt.into(),
            cluster_name_length: DEFAULT_CLUSTER_NAME_LENGTH,
            organization_name: "MongoDB".to_string(),
            project_name: String::new(),
            db_username: "atlasuser".to_string(),
            db_password: "mypassword123".to_string(),
            polling: PollerSettings::default(),
            maintenance_grace: DEFAULT_MAINTENANCE_GRACE,
            workload_stop_timeout: DEFAULT_WORKLOAD_STOP_TIMEOUT,
            mode: ExecutionMode::Sequential,
            delete_clusters: false,
            suite_name: "Atlas Planned Maintenance Testing".to_string(),
        }
    }

    pub fn with_polling(mut self, polling: PollerSettings) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_maintenance_grace(mut self, grace: Duration) -> Self {
        self.maintenance_grace = grace;
        self
    }

    pub fn with_workload_stop_timeout(mut self, timeout: Duration) -> Self {
        self.workload_stop_timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_db_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.db_username = username.into();
        self.db_password = password.into();
        self
    }

    pub fn with_project(
        mut self,
        organization_name: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        self.organization_name = organization_name.into();
        self.project_name = project_name.into();
        self
    }

    pub fn with_cluster_name_length(mut self, length: usize) -> Self {
        self.cluster_name_length = length;
        self
    }

    pub fn with_delete_clusters(mut self, delete: bool) -> Self {
        self.delete_clusters = delete;
        self
    }
}
