//! Shell-script workload executors for tests.
//!
//! Every script writes a marker file once its interrupt trap is installed, so
//! tests can wait for it before interrupting the process.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

/// Scratch directory removed on drop.
pub struct ScriptDir {
    path: PathBuf,
}

impl ScriptDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("astrolabe-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).expect("create scratch directory");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Marker file a script touches when it is ready to be interrupted.
    pub fn marker(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.ready"))
    }

    /// Write an executable `/bin/sh` script.
    pub fn script(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, format!("#!/bin/sh\n{contents}")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path
    }

    /// An executor that runs `on_interrupt` when it receives SIGINT.
    pub fn executor(&self, name: &str, on_interrupt: &str) -> PathBuf {
        let marker = self.marker(name);
        self.script(
            name,
            &format!(
                "trap '{on_interrupt}' INT\n\
                 touch '{marker}'\n\
                 while true; do sleep 0.1; done\n",
                marker = marker.display()
            ),
        )
    }

    /// Reports `ok` and exits cleanly.
    pub fn passing_executor(&self) -> PathBuf {
        self.executor("passing", "echo ok; exit 0")
    }

    /// Prints its summary on stderr and exits with status 1.
    pub fn failing_executor(&self, num_errors: u64, num_failures: u64) -> PathBuf {
        self.executor(
            "failing",
            &format!(
                "echo \"{{\\\"numErrors\\\": {num_errors}, \\\"numFailures\\\": {num_failures}}}\" >&2; exit 1"
            ),
        )
    }

    /// Echoes both positional arguments and exits cleanly.
    pub fn echoing_executor(&self) -> PathBuf {
        self.executor("echoing", "echo \"$1\"; echo \"$2\"; exit 0")
    }

    /// Ignores SIGINT entirely.
    pub fn stubborn_executor(&self) -> PathBuf {
        let marker = self.marker("stubborn");
        self.script(
            "stubborn",
            &format!(
                "trap '' INT\n\
                 touch '{marker}'\n\
                 while true; do sleep 0.1; done\n",
                marker = marker.display()
            ),
        )
    }
}

impl Drop for ScriptDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Wait until `marker` exists.
pub async fn wait_for_marker(marker: &Path) {
    for _ in 0..200 {
        if marker.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("executor never became ready: {}", marker.display());
}
