//! Provider client using reqwest.
//!
//! Every request goes to `{base_url}/v{api_version}/{segments...}` with basic
//! authentication and a JSON body. Path segments are percent-encoded, so
//! names taken from the command line or from test files cannot change the
//! shape of the request. 200, 201 and 202 are successes; anything else is
//! mapped onto `ProviderError` from the status and the `errorCode` field of
//! the response body.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::error::ProviderError;
use crate::client::types::{
    AccessListEntry, ClusterDescription, DatabaseUser, Organization, Project,
};
use crate::client::{ProjectAdmin, ResourceClient};
use crate::config::{ApiCredentials, ControllerConfig};
use crate::document::Document;

/// Client for the provider REST API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct AtlasClient {
    http: reqwest::Client,
    api_root: Url,
    credentials: ApiCredentials,
}

impl AtlasClient {
    /// Create a client from the controller configuration.
    pub fn new(config: &ControllerConfig) -> Result<Self, ProviderError> {
        let root = config.api_root();
        let api_root =
            Url::parse(&root).map_err(|e| ProviderError::InvalidUrl(format!("{root}: {e}")))?;
        if api_root.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl(root));
        }
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            api_root,
            credentials: config.credentials.clone(),
        })
    }

    /// Cluster operations scoped to one project.
    pub fn clusters(&self, project_id: &str) -> ProjectClusters {
        ProjectClusters {
            client: self.clone(),
            project_id: project_id.to_string(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.api_root.clone();
        if !segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| ProviderError::InvalidUrl(self.api_root.to_string()))?
                .pop_if_empty()
                .extend(segments);
        }
        Ok(url)
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Document, ProviderError> {
        let url = self.url(segments)?;
        debug!(method = %method, url = %url, "Provider request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
        ) {
            if text.trim().is_empty() {
                return Ok(Document::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                ProviderError::Decode(format!("{method} {url}: {e}"))
            });
        }

        let body: Document = serde_json::from_str(&text).unwrap_or(Document::Null);
        let error_code = body.get("errorCode").and_then(Document::as_str);
        let message = body
            .get("detail")
            .and_then(Document::as_str)
            .or_else(|| status.canonical_reason())
            .unwrap_or("unknown error");
        Err(ProviderError::classify(
            status.as_u16(),
            error_code,
            method.as_str(),
            url.as_str(),
            message,
        ))
    }

    async fn get(&self, segments: &[&str]) -> Result<Document, ProviderError> {
        self.request::<Document>(Method::GET, segments, None).await
    }

    /// GET a paginated listing and decode its `results` array.
    async fn list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        what: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let response = self.get(segments).await?;
        decode_results(response, what)
    }
}

fn decode_results<T: DeserializeOwned>(
    response: Document,
    what: &str,
) -> Result<Vec<T>, ProviderError> {
    let results = response
        .get("results")
        .cloned()
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(results).map_err(|e| ProviderError::Decode(format!("{what}: {e}")))
}

#[async_trait]
impl ProjectAdmin for AtlasClient {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<Document, ProviderError> {
        self.get(&[]).await
    }

    #[instrument(skip(self))]
    async fn list_organizations(&self) -> Result<Vec<Organization>, ProviderError> {
        self.list(&["orgs"], "organizations").await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<Project>, ProviderError> {
        self.list(&["groups"], "projects").await
    }

    #[instrument(skip(self))]
    async fn get_project(&self, name: &str) -> Result<Project, ProviderError> {
        let response = self.get(&["groups", "byName", name]).await?;
        serde_json::from_value(response)
            .map_err(|e| ProviderError::Decode(format!("project {name}: {e}")))
    }

    #[instrument(skip(self))]
    async fn create_project(&self, name: &str, org_id: &str) -> Result<Project, ProviderError> {
        let body = json!({"name": name, "orgId": org_id});
        let response = self.request(Method::POST, &["groups"], Some(&body)).await?;
        serde_json::from_value(response)
            .map_err(|e| ProviderError::Decode(format!("project {name}: {e}")))
    }

    #[instrument(skip(self))]
    async fn list_database_users(&self, project_id: &str) -> Result<Vec<Document>, ProviderError> {
        self.list(&["groups", project_id, "databaseUsers"], "database users")
            .await
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_database_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<(), ProviderError> {
        let mut body = serde_json::to_value(user)
            .map_err(|e| ProviderError::Decode(format!("database user: {e}")))?;
        if let Some(map) = body.as_object_mut() {
            map.insert("groupId".to_string(), json!(project_id));
        }
        self.request(
            Method::POST,
            &["groups", project_id, "databaseUsers"],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn update_database_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<(), ProviderError> {
        // The username is part of the path and may not be sent in the body.
        let mut body = serde_json::to_value(user)
            .map_err(|e| ProviderError::Decode(format!("database user: {e}")))?;
        if let Some(map) = body.as_object_mut() {
            map.remove("username");
            map.insert("groupId".to_string(), json!(project_id));
        }
        self.request(
            Method::PATCH,
            &[
                "groups",
                project_id,
                "databaseUsers",
                "admin",
                user.username.as_str(),
            ],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn add_network_access(
        &self,
        project_id: &str,
        entries: &[AccessListEntry],
    ) -> Result<(), ProviderError> {
        self.request(
            Method::POST,
            &["groups", project_id, "whitelist"],
            Some(entries),
        )
        .await?;
        Ok(())
    }
}

/// Cluster operations for one project.
#[derive(Clone)]
pub struct ProjectClusters {
    client: AtlasClient,
    project_id: String,
}

impl ProjectClusters {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn clusters_path(&self) -> [&str; 3] {
        ["groups", self.project_id.as_str(), "clusters"]
    }

    fn cluster_path<'a>(&'a self, name: &'a str) -> [&'a str; 4] {
        ["groups", self.project_id.as_str(), "clusters", name]
    }

    fn process_args_path<'a>(&'a self, name: &'a str) -> [&'a str; 5] {
        [
            "groups",
            self.project_id.as_str(),
            "clusters",
            name,
            "processArgs",
        ]
    }
}

#[async_trait]
impl ResourceClient for ProjectClusters {
    #[instrument(skip(self), fields(project = %self.project_id))]
    async fn list_clusters(&self) -> Result<Vec<ClusterDescription>, ProviderError> {
        let documents: Vec<Document> = self.client.list(&self.clusters_path(), "clusters").await?;
        Ok(documents
            .into_iter()
            .map(|document| {
                let name = document
                    .get("name")
                    .and_then(Document::as_str)
                    .unwrap_or_default()
                    .to_string();
                ClusterDescription::from_document(&name, document)
            })
            .collect())
    }

    #[instrument(skip(self), fields(project = %self.project_id))]
    async fn get_cluster(&self, name: &str) -> Result<ClusterDescription, ProviderError> {
        let document = self.client.get(&self.cluster_path(name)).await?;
        Ok(ClusterDescription::from_document(name, document))
    }

    #[instrument(skip(self), fields(project = %self.project_id))]
    async fn get_process_arguments(&self, name: &str) -> Result<Document, ProviderError> {
        self.client.get(&self.process_args_path(name)).await
    }

    #[instrument(skip(self, config), fields(project = %self.project_id))]
    async fn create_cluster(&self, config: &Document) -> Result<(), ProviderError> {
        self.client
            .request(Method::POST, &self.clusters_path(), Some(config))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, partial), fields(project = %self.project_id))]
    async fn modify_cluster(&self, name: &str, partial: &Document) -> Result<(), ProviderError> {
        self.client
            .request(Method::PATCH, &self.cluster_path(name), Some(partial))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, partial), fields(project = %self.project_id))]
    async fn modify_process_arguments(
        &self,
        name: &str,
        partial: &Document,
    ) -> Result<(), ProviderError> {
        self.client
            .request(Method::PATCH, &self.process_args_path(name), Some(partial))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(project = %self.project_id))]
    async fn delete_cluster(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .request::<Document>(Method::DELETE, &self.cluster_path(name), None)
            .await?;
        Ok(())
    }
}
