//! Addon component catalog
//!
//! Each module turns a sparse override map into a fully resolved
//! [`ComponentDescriptor`](crate::component::ComponentDescriptor). Modules
//! whose defaults track upstream releases take a
//! [`ReleaseLookup`](crate::releases::ReleaseLookup).

pub mod argocd;
pub mod argorollouts;
pub mod certmanager;
pub mod istio;
pub mod kubeprometheus;
pub mod kwasm;
pub mod spinkube;

use crate::error::Result;
use crate::overrides::LATEST;
use crate::releases::{ReleaseLookup, latest_release};

/// Resolve a requested version, asking `lookup` only when the newest
/// upstream release is needed
pub(crate) async fn tracked_version(
    requested: Option<&str>,
    lookup: &dyn ReleaseLookup,
    org: &str,
    repo: &str,
) -> Result<String> {
    match requested {
        None | Some(LATEST) => latest_release(lookup, org, repo).await,
        Some(v) => Ok(v.to_string()),
    }
}
