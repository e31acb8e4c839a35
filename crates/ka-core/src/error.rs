//! Error types for ka-core

use thiserror::Error;

/// Result type for ka-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while resolving stacks and components
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The requested stack is not part of the catalog
    #[error("stack '{0}' not found in catalog")]
    UnknownStack(String),

    /// A stack lists a component in its install order without a descriptor
    #[error("component '{component}' not found in stack '{stack}'")]
    ComponentNotFound { stack: String, component: String },

    /// The override payload is not an object of per-component objects
    #[error("invalid overrides: {0}")]
    InvalidOverrides(String),

    /// The remote release lookup failed
    #[error("release lookup failed for {org}/{repo}: {message}")]
    ReleaseLookup {
        org: String,
        repo: String,
        message: String,
    },

    /// The remote release lookup returned nothing to pick from
    #[error("no releases published for {org}/{repo}")]
    NoReleases { org: String, repo: String },
}

impl CoreError {
    /// Configuration errors need a human to fix the request; retrying is pointless
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownStack(_)
                | CoreError::ComponentNotFound { .. }
                | CoreError::InvalidOverrides(_)
        )
    }
}
