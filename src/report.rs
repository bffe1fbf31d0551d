//! Report writers.
//!
//! A run produces a JUnit XML file for CI systems and, optionally, a JSON
//! document carrying the full [`TestReport`].

use std::path::Path;

use quick_junit::{NonSuccessKind, Property, Report, TestCase, TestCaseStatus, TestSuite};
use thiserror::Error;
use tracing::info;

use crate::controller::{FailureKind, TestOutcome, TestReport};

/// Default JUnit output file.
pub const DEFAULT_JUNIT_PATH: &str = "junit.xml";

/// Error type for report writing
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JUnit serialization error: {0}")]
    Junit(#[from] quick_junit::SerializeError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render a report as JUnit XML.
///
/// An aborted run carries an `aborted` property on the suite and the reason
/// in the suite's `system-err`.
pub fn to_junit(report: &TestReport) -> Result<String, ReportError> {
    let mut suite = TestSuite::new(report.suite_name.as_str());
    suite.add_test_cases(report.outcomes.iter().map(junit_case));
    if let Some(reason) = &report.aborted {
        suite.add_property(Property::new("aborted", reason.as_str()));
        suite.set_system_err(format!("Run aborted: {reason}"));
    }

    let mut junit = Report::new(report.suite_name.as_str());
    junit.set_time(report.total_elapsed());
    junit.add_test_suite(suite);
    junit.to_string().map_err(ReportError::from)
}

fn junit_case(outcome: &TestOutcome) -> TestCase {
    let status = match &outcome.failure {
        None => TestCaseStatus::success(),
        Some(failure) => {
            let kind = match failure.kind {
                FailureKind::Failure => NonSuccessKind::Failure,
                FailureKind::Error => NonSuccessKind::Error,
            };
            let mut status = TestCaseStatus::non_success(kind);
            status.set_message(failure.message.as_str());
            status
        }
    };

    let mut case = TestCase::new(outcome.case_name.as_str(), status);
    case.set_classname(outcome.cluster_name.as_str());
    case.set_time(outcome.elapsed);
    if !outcome.stdout.is_empty() {
        case.set_system_out(outcome.stdout.as_str());
    }
    if !outcome.stderr.is_empty() {
        case.set_system_err(outcome.stderr.as_str());
    }
    case
}

/// Write the JUnit XML report to `path`.
pub fn write_junit(report: &TestReport, path: &Path) -> Result<(), ReportError> {
    let xml = to_junit(report)?;
    write_file(path, xml.as_bytes())?;
    info!(path = %path.display(), "JUnit report written");
    Ok(())
}

/// Write the report as pretty-printed JSON to `path`.
pub fn write_json(report: &TestReport, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_vec_pretty(report)?;
    write_file(path, &json)?;
    info!(path = %path.display(), "JSON report written");
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}
