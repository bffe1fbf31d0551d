//! Workload executor process management.
//!
//! The executor is started as `<executor> <connection-string> <workload-json>`
//! and runs until interrupted. Its stdout and stderr are drained into memory
//! by background tasks so a chatty executor never blocks on a full pipe.
//! Stopping delivers an interrupt, waits a bounded grace period for the
//! executor to report and exit, and kills it if it does not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use reqwest::Url;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_WORKLOAD_STOP_TIMEOUT;
use crate::controller::error::{Error, Result};
use crate::document::Document;
use crate::plan::DriverWorkload;

/// Build the connection string handed to the executor.
///
/// Credentials are inserted into the cluster's SRV address and `uri_options`
/// are form-encoded into the query string.
pub fn connection_string(
    srv_address: &str,
    username: &str,
    password: &str,
    uri_options: &BTreeMap<String, Document>,
) -> Result<String> {
    let invalid = |reason: &str| Error::Workload(format!("invalid cluster address {srv_address:?}: {reason}"));

    let mut url = Url::parse(srv_address).map_err(|e| invalid(&e.to_string()))?;
    url.set_username(username)
        .map_err(|()| invalid("cannot carry credentials"))?;
    url.set_password(Some(password))
        .map_err(|()| invalid("cannot carry credentials"))?;
    url.set_path("/");
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in uri_options {
            query.append_pair(key, &option_value(value));
        }
    }
    Ok(url.to_string())
}

fn option_value(value: &Document) -> String {
    match value {
        Document::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Captured result of a stopped executor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A running executor.
///
/// Dropping the handle kills the process.
pub struct WorkloadHandle {
    child: Child,
    pid: Option<u32>,
    stdout: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl WorkloadHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Starts and stops the workload executor.
#[derive(Clone, Debug)]
pub struct WorkloadRunner {
    executable: PathBuf,
    stop_timeout: Duration,
}

impl WorkloadRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            stop_timeout: DEFAULT_WORKLOAD_STOP_TIMEOUT,
        }
    }

    /// Set how long the executor may take to exit after an interrupt.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Launch the executor against a cluster.
    pub fn start(&self, connection_string: &str, workload: &DriverWorkload) -> Result<WorkloadHandle> {
        let workload_json = serde_json::to_string(workload)?;

        let mut child = Command::new(&self.executable)
            .arg(connection_string)
            .arg(&workload_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Workload(format!(
                    "failed to start {}: {e}",
                    self.executable.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Workload("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Workload("stderr was not captured".to_string()))?;

        let pid = child.id();
        info!(pid = ?pid, executable = %self.executable.display(), "Workload executor running");

        Ok(WorkloadHandle {
            child,
            pid,
            stdout: tokio::spawn(read_to_end(stdout)),
            stderr: tokio::spawn(read_to_end(stderr)),
        })
    }

    /// Interrupt the executor and collect its output.
    ///
    /// Fails with `WorkloadTimeout` if the executor has not exited within the
    /// stop timeout; it is killed before returning.
    pub async fn stop(&self, mut handle: WorkloadHandle) -> Result<WorkloadOutput> {
        interrupt(&mut handle.child)?;
        debug!(pid = ?handle.pid, "Interrupt delivered to workload executor");

        let status = match timeout(self.stop_timeout, handle.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(pid = ?handle.pid, grace = ?self.stop_timeout, "Workload executor ignored the interrupt, killing it");
                if let Err(e) = handle.child.kill().await {
                    warn!(pid = ?handle.pid, error = %e, "Failed to kill workload executor");
                }
                handle.stdout.abort();
                handle.stderr.abort();
                return Err(Error::WorkloadTimeout {
                    pid: handle.pid,
                    grace: self.stop_timeout,
                });
            }
        };

        let stdout = drain(handle.stdout, self.stop_timeout, "stdout").await;
        let stderr = drain(handle.stderr, self.stop_timeout, "stderr").await;
        info!(pid = ?handle.pid, exit_code = ?status.code(), "Workload executor exited");

        Ok(WorkloadOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

async fn read_to_end<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn drain(
    task: JoinHandle<std::io::Result<Vec<u8>>>,
    limit: Duration,
    stream: &str,
) -> String {
    match timeout(limit, task).await {
        Ok(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Ok(Err(e))) => {
            warn!(stream, error = %e, "Failed to read workload output");
            String::new()
        }
        Ok(Err(e)) => {
            warn!(stream, error = %e, "Workload output reader failed");
            String::new()
        }
        Err(_) => {
            warn!(stream, "Timed out draining workload output");
            String::new()
        }
    }
}

/// Ask the executor to wind down and report.
#[cfg(unix)]
#[allow(unsafe_code)]
fn interrupt(child: &mut Child) -> Result<()> {
    // No pid means the process has already been reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| Error::Workload(format!("pid {pid} out of range")))?;

    // SAFETY: kill(2) takes plain integers; the pid belongs to a child that
    // has not been reaped, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err.into());
        }
    }
    Ok(())
}

/// Ask the executor to wind down and report.
#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> Result<()> {
    // Console control events cannot be targeted at a single child here, so
    // this platform gets a forced termination request instead.
    child.start_kill()?;
    Ok(())
}
