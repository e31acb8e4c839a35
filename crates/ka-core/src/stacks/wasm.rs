//! WebAssembly runtime stacks
//!
//! Both stacks need every node annotated for the kwasm operator once their
//! components are in place (see [`super::requires_node_annotation`]).

use std::collections::HashMap;

use crate::apps::spinkube::{self, OperatorAsset};
use crate::apps::{certmanager, kwasm};
use crate::error::Result;
use crate::releases::ReleaseLookup;
use crate::stack::{StackManifest, StackOverrides};

use super::MAINTAINER;

pub const KWASM_PLUS_SKU: &str = "wasm/kwasm-plus";
pub const SPINKUBE_STANDARD_SKU: &str = "wasm/spinkube-standard";

/// `wasm/kwasm-plus`: kwasm operator and its runtime classes
pub fn kwasm_plus(overrides: &StackOverrides) -> StackManifest {
    StackManifest {
        id: KWASM_PLUS_SKU.to_string(),
        deps: vec![kwasm::OPERATOR_SKU.to_string(), kwasm::RUNTIME_SKU.to_string()],
        components: HashMap::from([
            (
                kwasm::OPERATOR_SKU.to_string(),
                kwasm::operator_component(overrides.get(kwasm::OPERATOR_SKU)),
            ),
            (
                kwasm::RUNTIME_SKU.to_string(),
                kwasm::runtime_class_component(),
            ),
        ]),
        maintainer: MAINTAINER.to_string(),
    }
}

/// `wasm/spinkube-standard`: cert-manager, kwasm operator wired to the spin
/// node installer, then the spin operator
pub async fn spinkube_standard(
    overrides: &StackOverrides,
    lookup: &dyn ReleaseLookup,
) -> Result<StackManifest> {
    let cert_manager = certmanager::component(overrides.get(certmanager::SKU), lookup).await?;

    let mut kwasm_overrides = overrides
        .get(kwasm::OPERATOR_SKU)
        .cloned()
        .unwrap_or_default();
    spinkube::inject_kwasm_installer_image(&mut kwasm_overrides, lookup).await?;
    let kwasm_operator = kwasm::operator_component(Some(&kwasm_overrides));

    let crds = spinkube::asset_component(
        OperatorAsset::Crds,
        overrides.get(spinkube::CRD_SKU),
        lookup,
    )
    .await?;
    let runtime_class = spinkube::asset_component(
        OperatorAsset::RuntimeClass,
        overrides.get(spinkube::RUNTIME_CLASS_SKU),
        lookup,
    )
    .await?;
    let shim_executor = spinkube::asset_component(
        OperatorAsset::ShimExecutor,
        overrides.get(spinkube::SHIM_EXECUTOR_SKU),
        lookup,
    )
    .await?;
    let operator = spinkube::operator_component(overrides.get(spinkube::OPERATOR_SKU), lookup).await?;

    let ordered = [
        (certmanager::SKU, cert_manager),
        (kwasm::OPERATOR_SKU, kwasm_operator),
        (spinkube::CRD_SKU, crds),
        (spinkube::RUNTIME_CLASS_SKU, runtime_class),
        (spinkube::SHIM_EXECUTOR_SKU, shim_executor),
        (spinkube::OPERATOR_SKU, operator),
    ];

    Ok(StackManifest {
        id: SPINKUBE_STANDARD_SKU.to_string(),
        deps: ordered.iter().map(|(id, _)| id.to_string()).collect(),
        components: ordered
            .into_iter()
            .map(|(id, component)| (id.to_string(), component))
            .collect(),
        maintainer: MAINTAINER.to_string(),
    })
}
