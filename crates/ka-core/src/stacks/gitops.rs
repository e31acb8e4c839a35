//! `gitops-standard`: Argo CD followed by Argo Rollouts

use std::collections::HashMap;

use crate::apps::{argocd, argorollouts};
use crate::error::Result;
use crate::releases::ReleaseLookup;
use crate::stack::{StackManifest, StackOverrides};

use super::MAINTAINER;

pub const SKU: &str = "gitops-standard";

pub async fn manifest(
    overrides: &StackOverrides,
    lookup: &dyn ReleaseLookup,
) -> Result<StackManifest> {
    let rollouts = argorollouts::component(overrides.get(argorollouts::SKU), lookup).await?;

    Ok(StackManifest {
        id: SKU.to_string(),
        deps: vec![argocd::SKU.to_string(), argorollouts::SKU.to_string()],
        components: HashMap::from([
            (
                argocd::SKU.to_string(),
                argocd::component(overrides.get(argocd::SKU)),
            ),
            (argorollouts::SKU.to_string(), rollouts),
        ]),
        maintainer: MAINTAINER.to_string(),
    })
}
