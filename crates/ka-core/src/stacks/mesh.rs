//! `mesh-standard`: Istio

use std::collections::HashMap;

use crate::apps::istio;
use crate::error::Result;
use crate::releases::ReleaseLookup;
use crate::stack::{StackManifest, StackOverrides};

use super::MAINTAINER;

pub const SKU: &str = "mesh-standard";

pub async fn manifest(
    overrides: &StackOverrides,
    lookup: &dyn ReleaseLookup,
) -> Result<StackManifest> {
    let component = istio::component(overrides.get(istio::SKU), lookup).await?;

    Ok(StackManifest {
        id: SKU.to_string(),
        deps: vec![istio::SKU.to_string()],
        components: HashMap::from([(istio::SKU.to_string(), component)]),
        maintainer: MAINTAINER.to_string(),
    })
}
