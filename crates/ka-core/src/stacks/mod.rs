//! Stack catalog: named, ordered groups of components

pub mod gitops;
pub mod mesh;
pub mod monitoring;
pub mod wasm;

use crate::error::{CoreError, Result};
use crate::releases::ReleaseLookup;
use crate::stack::{StackManifest, StackRequest};

pub(crate) const MAINTAINER: &str = "ka-maintainers";

/// Every stack id this build knows about
pub const CATALOG: &[&str] = &[
    gitops::SKU,
    monitoring::SKU,
    mesh::SKU,
    wasm::KWASM_PLUS_SKU,
    wasm::SPINKUBE_STANDARD_SKU,
];

/// Resolve a request into a stack manifest
///
/// Every component listed by the stack is resolved, disabled ones included;
/// skipping them is up to the orchestrator.
pub async fn build(request: &StackRequest, lookup: &dyn ReleaseLookup) -> Result<StackManifest> {
    let overrides = &request.overrides;
    let manifest = match request.stack_id.as_str() {
        gitops::SKU => gitops::manifest(overrides, lookup).await?,
        monitoring::SKU => monitoring::manifest(overrides),
        mesh::SKU => mesh::manifest(overrides, lookup).await?,
        wasm::KWASM_PLUS_SKU => wasm::kwasm_plus(overrides),
        wasm::SPINKUBE_STANDARD_SKU => wasm::spinkube_standard(overrides, lookup).await?,
        other => return Err(CoreError::UnknownStack(other.to_string())),
    };

    tracing::debug!(
        stack = %manifest.id,
        components = manifest.deps.len(),
        "resolved stack manifest"
    );
    Ok(manifest)
}

/// Stacks whose install and removal must be followed by node annotation
pub fn requires_node_annotation(stack_id: &str) -> bool {
    stack_id == wasm::KWASM_PLUS_SKU || stack_id == wasm::SPINKUBE_STANDARD_SKU
}
