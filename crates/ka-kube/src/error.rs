//! Error types for ka-kube

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Operation;

/// Result type for ka-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling stacks against a cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Optimistic-concurrency conflict reported outside the API client
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network failure while downloading
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Download answered with a non-success status
    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Downloaded body is not valid YAML/JSON
    #[error("failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    /// Document lacks `apiVersion`, `kind` or `metadata.name`
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Group/kind unknown to the API server, even after refreshing discovery
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResource { api_version: String, kind: String },

    /// Chart backend failure
    #[error("chart release '{release}' failed: {message}")]
    Chart { release: String, message: String },

    /// Post-processing hook failure
    #[error("post-processing failed: {0}")]
    Hook(String),

    /// A component failed; carries which one and what was being done
    #[error("{operation} of component '{component}' failed: {source}")]
    Component {
        component: String,
        operation: Operation,
        #[source]
        source: Box<KubeError>,
    },

    /// Ledger record is unreadable or could not be written
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The pass ran past its deadline
    #[error("reconcile cancelled after {0:?}")]
    Cancelled(Duration),

    /// Stack resolution error
    #[error(transparent)]
    Core(#[from] ka_core::CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Wrap an error with the component and operation it happened in
    pub fn component(component: &str, operation: Operation, source: KubeError) -> Self {
        KubeError::Component {
            component: component.to_string(),
            operation,
            source: Box::new(source),
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::Component { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            KubeError::Conflict(_) => true,
            KubeError::Component { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Check if the pass hit its deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KubeError::Cancelled(_))
    }

    /// Check if retrying the same pass later may succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            KubeError::Api(_) => true,
            KubeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            KubeError::Core(e) => !e.is_configuration(),
            KubeError::Component { source, .. } => source.is_retryable(),
            KubeError::Conflict(_)
            | KubeError::Fetch { .. }
            | KubeError::Chart { .. }
            | KubeError::Hook(_)
            | KubeError::Ledger(_)
            | KubeError::Cancelled(_) => true,
            KubeError::Decode { .. }
            | KubeError::InvalidManifest(_)
            | KubeError::UnknownResource { .. }
            | KubeError::Serialization(_) => false,
        }
    }
}
