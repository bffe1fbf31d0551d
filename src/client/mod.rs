//! Resource provider client.
//!
//! The engine only depends on two narrow traits, so it can be driven against
//! the real provider or an in-memory fake:
//!
//! - `ResourceClient`: cluster lifecycle operations inside one project
//! - `ProjectAdmin`: organizations, projects, database users and network access
//!
//! ## Architecture
//!
//! - `atlas_client`: reqwest-backed implementation of both traits
//! - `types`: typed views over provider responses
//! - `error`: provider error taxonomy
//!
//! ## Example
//!
//! ```rust,ignore
//! use astrolabe::client::{AtlasClient, ResourceClient};
//!
//! let client = AtlasClient::new(&config)?;
//! let clusters = client.clusters(&project.id);
//! let cluster = clusters.get_cluster("a1b2c3d4e5").await?;
//! if cluster.is_idle() {
//!     println!("Cluster is ready");
//! }
//! ```

pub mod atlas_client;
pub mod error;
pub mod types;

pub use atlas_client::{AtlasClient, ProjectClusters};
pub use error::ProviderError;
pub use types::{
    AccessListEntry, ClusterDescription, ClusterSnapshot, ClusterStateName, DatabaseRole,
    DatabaseUser, Organization, Project,
};

use async_trait::async_trait;

use crate::document::Document;

/// Cluster operations scoped to a single project.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List every cluster in the project.
    async fn list_clusters(&self) -> Result<Vec<ClusterDescription>, ProviderError>;

    /// Fetch the current description of a cluster.
    async fn get_cluster(&self, name: &str) -> Result<ClusterDescription, ProviderError>;

    /// Fetch the advanced process arguments of a cluster.
    async fn get_process_arguments(&self, name: &str) -> Result<Document, ProviderError>;

    /// Create a cluster. `config` must carry the cluster name.
    async fn create_cluster(&self, config: &Document) -> Result<(), ProviderError>;

    /// Apply a partial change to a cluster's basic configuration.
    async fn modify_cluster(&self, name: &str, partial: &Document) -> Result<(), ProviderError>;

    /// Apply a partial change to a cluster's process arguments.
    async fn modify_process_arguments(
        &self,
        name: &str,
        partial: &Document,
    ) -> Result<(), ProviderError>;

    /// Request deletion of a cluster.
    async fn delete_cluster(&self, name: &str) -> Result<(), ProviderError>;
}

/// Account-level operations needed to prepare a run.
#[async_trait]
pub trait ProjectAdmin: Send + Sync {
    /// Hit the API root to validate credentials.
    async fn ping(&self) -> Result<Document, ProviderError>;

    /// List the organizations visible to these credentials.
    async fn list_organizations(&self) -> Result<Vec<Organization>, ProviderError>;

    /// Look up an organization by name.
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, ProviderError> {
        let orgs = self.list_organizations().await?;
        Ok(orgs.into_iter().find(|org| org.name == name))
    }

    /// List the projects visible to these credentials.
    async fn list_projects(&self) -> Result<Vec<Project>, ProviderError>;

    /// Get a project by name. Fails with `NotFound` if it does not exist.
    async fn get_project(&self, name: &str) -> Result<Project, ProviderError>;

    /// Create a project in an organization.
    async fn create_project(&self, name: &str, org_id: &str) -> Result<Project, ProviderError>;

    /// List the database users of a project as raw provider documents.
    async fn list_database_users(&self, project_id: &str) -> Result<Vec<Document>, ProviderError>;

    /// Create a database user.
    async fn create_database_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<(), ProviderError>;

    /// Update an existing database user.
    async fn update_database_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<(), ProviderError>;

    /// Add network-access rules to a project.
    async fn add_network_access(
        &self,
        project_id: &str,
        entries: &[AccessListEntry],
    ) -> Result<(), ProviderError>;
}
