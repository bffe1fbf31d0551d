//! Errors returned by the resource provider.
//!
//! The provider answers failed requests with an HTTP status and a
//! provider-specific error code. A handful of those codes are expected during
//! a run (a cluster that already exists, a deletion already in flight) and are
//! surfaced as dedicated variants so callers can recover from them.

use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The resource being created already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The resource does not exist (or is not visible to these credentials).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A delete or modify of the resource is already in flight.
    #[error("Operation already requested: {0}")]
    AlreadyRequested(String),

    /// Any other rejected request.
    #[error("{method} {url} failed with status {status} (error code: {}): {message}", .error_code.as_deref().unwrap_or("none"))]
    Api {
        status: u16,
        error_code: Option<String>,
        method: String,
        url: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("Unable to decode provider response: {0}")]
    Decode(String),

    /// The configured API root is not a usable base URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ProviderError {
    /// Map a failed response onto the error taxonomy.
    ///
    /// The recoverable variants carry `"{method} {url}: {message}"`.
    pub fn classify(
        status: u16,
        error_code: Option<&str>,
        method: &str,
        url: &str,
        message: &str,
    ) -> Self {
        let detail = format!("{method} {url}: {message}");
        match error_code {
            Some("CLUSTER_ALREADY_REQUESTED_DELETION") => ProviderError::AlreadyRequested(detail),
            Some(code) if code.ends_with("_ALREADY_EXISTS") || code.starts_with("DUPLICATE_") => {
                ProviderError::AlreadyExists(detail)
            }
            Some(code) if code.ends_with("_NOT_FOUND") || code == "NOT_IN_GROUP" => {
                ProviderError::NotFound(detail)
            }
            _ if status == 404 => ProviderError::NotFound(detail),
            _ => ProviderError::Api {
                status,
                error_code: error_code.map(str::to_string),
                method: method.to_string(),
                url: url.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Provider error code, if the provider sent one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ProviderError::Api { error_code, .. } => error_code.as_deref(),
            _ => None,
        }
    }

    /// Check if the provider rejected the credentials themselves.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Api { status, .. } if *status == 401 || *status == 403)
    }

    /// Check if the provider could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }

    /// Check if this error indicates a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}
