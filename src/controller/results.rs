//! Test outcomes and the run report.
//!
//! Every declared test case ends up with exactly one [`TestOutcome`], whether
//! it ran to completion, failed inside the executor, or never got a cluster.
//! The aggregator folds them into a [`TestReport`] that the report writers
//! serialize.

use std::fmt;
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use crate::controller::error::Error;
use crate::controller::workload::WorkloadOutput;
use crate::plan::TestCase;

/// Whether a case failed its assertions or could not be run properly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The workload ran and reported errors or failures.
    Failure,
    /// The case could not be carried out.
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Failure => write!(f, "failure"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

/// Summary the workload executor writes to stderr when it fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSummary {
    pub num_errors: u64,
    pub num_failures: u64,
}

impl WorkloadSummary {
    /// Parse the summary from captured stderr.
    ///
    /// The whole stream is tried first, then its last non-blank line, so
    /// diagnostics printed ahead of the summary do not hide it.
    pub fn parse(stderr: &str) -> Option<Self> {
        let trimmed = stderr.trim();
        if let Ok(summary) = serde_json::from_str(trimmed) {
            return Some(summary);
        }
        trimmed
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str(line.trim()).ok())
    }
}

impl fmt::Display for WorkloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Number of errors: {}\nNumber of failures: {}",
            self.num_errors, self.num_failures
        )
    }
}

/// Result of one test case.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub case_name: String,
    pub cluster_name: String,
    #[serde(rename = "elapsedSeconds", serialize_with = "serialize_seconds")]
    pub elapsed: Duration,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl TestOutcome {
    /// Outcome of a case whose workload ran and was stopped.
    pub fn from_output(case: &TestCase, elapsed: Duration, output: WorkloadOutput) -> Self {
        let failure = match output.exit_code {
            Some(0) => None,
            exit_code => Some(match WorkloadSummary::parse(&output.stderr) {
                Some(summary) => FailureDetail {
                    kind: FailureKind::Failure,
                    message: summary.to_string(),
                },
                None if exit_code.is_none() && output.stderr.trim().is_empty() => FailureDetail {
                    kind: FailureKind::Error,
                    message: "workload executor was terminated by a signal".to_string(),
                },
                None => FailureDetail {
                    kind: FailureKind::Error,
                    message: output.stderr.clone(),
                },
            }),
        };

        Self {
            case_name: case.name.clone(),
            cluster_name: case.cluster_name.clone(),
            elapsed,
            success: failure.is_none(),
            stdout: output.stdout,
            stderr: output.stderr,
            failure,
        }
    }

    /// Outcome of a case that hit an orchestration error.
    pub fn from_error(
        case: &TestCase,
        elapsed: Duration,
        error: &Error,
        output: Option<WorkloadOutput>,
    ) -> Self {
        let output = output.unwrap_or_default();
        Self {
            case_name: case.name.clone(),
            cluster_name: case.cluster_name.clone(),
            elapsed,
            success: false,
            stdout: output.stdout,
            stderr: output.stderr,
            failure: Some(FailureDetail {
                kind: FailureKind::Error,
                message: error.to_string(),
            }),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

fn serialize_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Collects outcomes for one run.
#[derive(Debug)]
pub struct ResultAggregator {
    started_at: Timestamp,
    outcomes: Vec<TestOutcome>,
    aborted: Option<String>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Timestamp::now(),
            outcomes: Vec::new(),
            aborted: None,
        }
    }

    /// Record a case whose workload ran. Returns whether it passed.
    pub fn record(&mut self, case: &TestCase, elapsed: Duration, output: WorkloadOutput) -> bool {
        self.push(TestOutcome::from_output(case, elapsed, output))
    }

    /// Record a case that could not be carried out.
    pub fn record_error(
        &mut self,
        case: &TestCase,
        elapsed: Duration,
        error: &Error,
        output: Option<WorkloadOutput>,
    ) {
        self.push(TestOutcome::from_error(case, elapsed, error, output));
    }

    /// Add an outcome. A second outcome for the same case is dropped.
    pub fn push(&mut self, outcome: TestOutcome) -> bool {
        if self.contains(&outcome.case_name) {
            warn!(test = %outcome.case_name, "Outcome already recorded, ignoring duplicate");
            return false;
        }
        match &outcome.failure {
            None => info!(
                test = %outcome.case_name,
                cluster = %outcome.cluster_name,
                elapsed = ?outcome.elapsed,
                "Test passed"
            ),
            Some(failure) => warn!(
                test = %outcome.case_name,
                cluster = %outcome.cluster_name,
                elapsed = ?outcome.elapsed,
                kind = %failure.kind,
                message = %failure.message,
                "Test failed"
            ),
        }
        let success = outcome.success;
        self.outcomes.push(outcome);
        success
    }

    /// Mark the run as aborted. The first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.aborted.is_none() {
            self.aborted = Some(reason.into());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn contains(&self, case_name: &str) -> bool {
        self.outcomes.iter().any(|o| o.case_name == case_name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn finalize(self, suite_name: impl Into<String>) -> TestReport {
        TestReport {
            suite_name: suite_name.into(),
            started_at: self.started_at,
            outcomes: self.outcomes,
            aborted: self.aborted,
        }
    }
}

/// Final report of a run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub suite_name: String,
    pub started_at: Timestamp,
    pub outcomes: Vec<TestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl TestReport {
    /// True when every case passed and the run was not aborted.
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn failures(&self) -> usize {
        self.count(FailureKind::Failure)
    }

    pub fn errors(&self) -> usize {
        self.count(FailureKind::Error)
    }

    pub fn total_elapsed(&self) -> Duration {
        self.outcomes.iter().map(|o| o.elapsed).sum()
    }

    fn count(&self, kind: FailureKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.failure_kind() == Some(kind))
            .count()
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} tests, {} failures, {} errors",
            self.suite_name,
            self.outcomes.len(),
            self.failures(),
            self.errors()
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, " (aborted: {reason})")?;
        }
        Ok(())
    }
}
