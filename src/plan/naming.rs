//! Cluster name derivation.
//!
//! Cluster names are the hex SHA-256 of `salt || test_name`, truncated. The
//! salt is scoped to a run (typically the CI build id) so reruns of the same
//! build reuse their clusters while different builds never collide.

use sha2::{Digest, Sha256};

/// Default length of derived cluster names.
pub const DEFAULT_CLUSTER_NAME_LENGTH: usize = 10;

/// Length of a full hex-encoded SHA-256 digest.
pub const MAX_CLUSTER_NAME_LENGTH: usize = 64;

/// Derives cluster names from test names.
#[derive(Clone, Debug)]
pub struct ClusterNamer {
    salt: String,
    length: usize,
}

impl ClusterNamer {
    /// Create a namer with the default name length.
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            length: DEFAULT_CLUSTER_NAME_LENGTH,
        }
    }

    /// Set the name length, clamped to `1..=64`.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.clamp(1, MAX_CLUSTER_NAME_LENGTH);
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Cluster name for a test.
    pub fn cluster_name(&self, test_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(test_name.as_bytes());

        let mut name = hex::encode(hasher.finalize());
        name.truncate(self.length);
        name
    }
}
