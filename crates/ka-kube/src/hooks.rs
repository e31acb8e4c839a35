//! Post-processing hooks for stacks that need node preparation
//!
//! The wasm stacks rely on the kwasm operator, which only provisions nodes
//! carrying the `kwasm.sh/kwasm-node` annotation.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;

use crate::cluster::ClusterApi;
use crate::error::{KubeError, Result};
use crate::retry::{RetryPolicy, retry_on_conflict};

pub const KWASM_NODE_ANNOTATION: &str = "kwasm.sh/kwasm-node";
pub const KWASM_NODE_VALUE: &str = "true";

fn node_name(node: &Node) -> Option<&str> {
    node.metadata.name.as_deref()
}

fn is_annotated(node: &Node) -> bool {
    node.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.get(KWASM_NODE_ANNOTATION).map(String::as_str) == Some(KWASM_NODE_VALUE))
}

fn carries_annotation(node: &Node) -> bool {
    node.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(KWASM_NODE_ANNOTATION))
}

/// Annotate every node for the kwasm operator
///
/// Returns the number of nodes changed.
pub async fn annotate_nodes(cluster: &dyn ClusterApi, policy: RetryPolicy) -> Result<usize> {
    let nodes = cluster.list_nodes().await.map_err(hook_error)?;
    let mut changed = 0;

    for name in nodes.iter().filter_map(node_name) {
        let updated = retry_on_conflict(policy, move || async move {
            let mut node = cluster.get_node(name).await?;
            if is_annotated(&node) {
                return Ok(false);
            }
            node.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(
                    KWASM_NODE_ANNOTATION.to_string(),
                    KWASM_NODE_VALUE.to_string(),
                );
            cluster.replace_node(&node).await?;
            Ok::<_, KubeError>(true)
        })
        .await
        .map_err(|e| node_error(name, "annotate", e))?;

        if updated {
            tracing::debug!(node = name, "annotated node");
            changed += 1;
        }
    }

    tracing::info!(nodes = nodes.len(), changed, "kwasm node annotation applied");
    Ok(changed)
}

/// Remove the kwasm annotation from every node carrying it
///
/// Returns the number of nodes changed.
pub async fn remove_node_annotation(cluster: &dyn ClusterApi, policy: RetryPolicy) -> Result<usize> {
    let nodes = cluster.list_nodes().await.map_err(hook_error)?;
    let mut changed = 0;

    for name in nodes
        .iter()
        .filter(|n| carries_annotation(n))
        .filter_map(node_name)
    {
        let updated = retry_on_conflict(policy, move || async move {
            let mut node = cluster.get_node(name).await?;
            let removed = node
                .metadata
                .annotations
                .as_mut()
                .is_some_and(|a| a.remove(KWASM_NODE_ANNOTATION).is_some());
            if !removed {
                return Ok(false);
            }
            cluster.replace_node(&node).await?;
            Ok::<_, KubeError>(true)
        })
        .await
        .map_err(|e| node_error(name, "unannotate", e))?;

        if updated {
            tracing::debug!(node = name, "removed node annotation");
            changed += 1;
        }
    }

    tracing::info!(nodes = nodes.len(), changed, "kwasm node annotation removed");
    Ok(changed)
}

fn hook_error(e: KubeError) -> KubeError {
    KubeError::Hook(format!("failed to list nodes: {e}"))
}

fn node_error(node: &str, action: &str, e: KubeError) -> KubeError {
    match e {
        // keep conflicts classifiable after exhausting retries
        KubeError::Conflict(_) | KubeError::Hook(_) => e,
        other => KubeError::Hook(format!("failed to {action} node '{node}': {other}")),
    }
}
