//! Typed views over provider responses.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Lifecycle state reported by the provider for a cluster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStateName {
    /// Cluster is being provisioned.
    Creating,
    /// Cluster is stable and accepts changes.
    Idle,
    /// A configuration change is being applied.
    Updating,
    /// The provider is repairing the cluster.
    Repairing,
    /// Cluster is being torn down.
    Deleting,
    /// Cluster is gone.
    Deleted,
    /// Any state this crate does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ClusterStateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStateName::Creating => write!(f, "CREATING"),
            ClusterStateName::Idle => write!(f, "IDLE"),
            ClusterStateName::Updating => write!(f, "UPDATING"),
            ClusterStateName::Repairing => write!(f, "REPAIRING"),
            ClusterStateName::Deleting => write!(f, "DELETING"),
            ClusterStateName::Deleted => write!(f, "DELETED"),
            ClusterStateName::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A cluster as returned by the provider.
///
/// `document` is the full response body; `state_name` is lifted out of it.
#[derive(Clone, Debug)]
pub struct ClusterDescription {
    pub name: String,
    pub state_name: ClusterStateName,
    pub document: Document,
}

impl ClusterDescription {
    /// Build a description from a raw provider response.
    pub fn from_document(name: &str, document: Document) -> Self {
        let state_name = document
            .get("stateName")
            .cloned()
            .and_then(|state| serde_json::from_value(state).ok())
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            state_name,
            document,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state_name == ClusterStateName::Idle
    }
}

/// Point-in-time view of a cluster used for readiness checks.
///
/// Always fetched fresh; process arguments are only fetched once the cluster
/// reports IDLE, since they cannot match before that.
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    pub state_name: ClusterStateName,
    pub basic_configuration: Document,
    pub process_arguments: Option<Document>,
}

impl ClusterSnapshot {
    /// SRV connection address of the cluster, once provisioned.
    pub fn srv_address(&self) -> Option<&str> {
        self.basic_configuration
            .get("srvAddress")
            .and_then(Document::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Provider organization.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

/// Provider project (a group of clusters).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Role granted to a database user.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRole {
    pub database_name: String,
    pub role_name: String,
}

/// Database user created for the workload executor.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUser {
    pub database_name: String,
    pub roles: Vec<DatabaseRole>,
    pub username: String,
    pub password: String,
}

impl DatabaseUser {
    /// Admin user on the `admin` database.
    pub fn admin(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            database_name: "admin".to_string(),
            roles: vec![DatabaseRole {
                database_name: "admin".to_string(),
                role_name: "atlasAdmin".to_string(),
            }],
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Network-access rule.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    pub cidr_block: String,
}

impl AccessListEntry {
    /// Access from anywhere.
    pub fn anywhere() -> Self {
        Self {
            cidr_block: "0.0.0.0/0".to_string(),
        }
    }
}
