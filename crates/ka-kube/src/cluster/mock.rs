//! In-memory cluster for testing
//!
//! Keeps applied objects, namespaces and nodes in memory and records every
//! mutating call in order, so tests can assert on sequencing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::discovery::ApiResource;
use serde_json::Value;

use super::{ClusterApi, ResolvedResource, gvk_from_parts};
use crate::error::{KubeError, Result};
use crate::manifests::ManifestDocument;

/// Kinds the mock treats as cluster-scoped
const CLUSTER_SCOPED: &[&str] = &[
    "Namespace",
    "Node",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "RuntimeClass",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "PriorityClass",
    "StorageClass",
];

/// A mutating call seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    CreateNamespace(String),
    DeleteNamespace(String),
    /// Applied object, as `Kind/name` or `Kind/namespace/name`
    Apply(String),
    Delete(String),
    ReplaceNode(String),
}

#[derive(Default)]
struct MockState {
    events: Vec<ClusterEvent>,
    objects: BTreeMap<String, Value>,
    namespaces: BTreeSet<String>,
    nodes: BTreeMap<String, Node>,
    unknown_kinds: BTreeSet<String>,
    /// display name -> error message
    apply_failures: HashMap<String, String>,
    delete_failures: HashMap<String, String>,
    node_conflicts: u32,
}

/// In-memory [`ClusterApi`]
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add nodes with empty annotations
    pub fn with_nodes<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.write();
            for name in names {
                let name = name.into();
                let node = Node {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        resource_version: Some("1".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                state.nodes.insert(name, node);
            }
        }
        self
    }

    /// Make `resolve` fail for a kind
    pub fn with_unknown_kind(self, kind: impl Into<String>) -> Self {
        self.write().unknown_kinds.insert(kind.into());
        self
    }

    /// Make applying the object with this display name fail
    pub fn fail_apply(&self, display_name: impl Into<String>, message: impl Into<String>) {
        self.write()
            .apply_failures
            .insert(display_name.into(), message.into());
    }

    /// Make deleting the object with this display name fail
    pub fn fail_delete(&self, display_name: impl Into<String>, message: impl Into<String>) {
        self.write()
            .delete_failures
            .insert(display_name.into(), message.into());
    }

    /// Stop failing every object
    pub fn clear_failures(&self) {
        let mut state = self.write();
        state.apply_failures.clear();
        state.delete_failures.clear();
    }

    /// Make the next `count` node replacements conflict
    pub fn conflict_node_writes(&self, count: u32) {
        self.write().node_conflicts = count;
    }

    /// Every mutating call so far, in order
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.read().events.clone()
    }

    /// Display names of applied objects, in order
    pub fn applied(&self) -> Vec<String> {
        self.read()
            .events
            .iter()
            .filter_map(|e| match e {
                ClusterEvent::Apply(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Display names of deleted objects, in order
    pub fn deleted(&self) -> Vec<String> {
        self.read()
            .events
            .iter()
            .filter_map(|e| match e {
                ClusterEvent::Delete(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Stored object by display name
    pub fn object(&self, display_name: &str) -> Option<Value> {
        self.read().objects.get(display_name).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.read().objects.len()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.read().namespaces.contains(name)
    }

    /// Annotations currently set on a node
    pub fn node_annotations(&self, name: &str) -> BTreeMap<String, String> {
        self.read()
            .nodes
            .get(name)
            .and_then(|n| n.metadata.annotations.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn create_namespace_if_not_exists(&self, name: &str) -> Result<()> {
        let mut state = self.write();
        state
            .events
            .push(ClusterEvent::CreateNamespace(name.to_string()));
        state.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace_if_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.write();
        state
            .events
            .push(ClusterEvent::DeleteNamespace(name.to_string()));
        Ok(state.namespaces.remove(name))
    }

    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedResource> {
        if self.read().unknown_kinds.contains(kind) {
            return Err(KubeError::UnknownResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            });
        }
        let gvk = gvk_from_parts(api_version, kind);
        Ok(ResolvedResource {
            api_resource: ApiResource::from_gvk(&gvk),
            namespaced: !CLUSTER_SCOPED.contains(&kind),
        })
    }

    async fn apply(&self, document: &ManifestDocument, _resource: &ResolvedResource) -> Result<()> {
        let key = document.display_name();
        let mut state = self.write();
        if let Some(message) = state.apply_failures.get(&key) {
            return Err(server_error(message));
        }
        state.events.push(ClusterEvent::Apply(key.clone()));
        state.objects.insert(key, document.object.clone());
        Ok(())
    }

    async fn delete(
        &self,
        document: &ManifestDocument,
        _resource: &ResolvedResource,
    ) -> Result<bool> {
        let key = document.display_name();
        let mut state = self.write();
        if let Some(message) = state.delete_failures.get(&key) {
            return Err(server_error(message));
        }
        state.events.push(ClusterEvent::Delete(key.clone()));
        Ok(state.objects.remove(&key).is_some())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.read().nodes.values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.read()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| KubeError::Hook(format!("node '{name}' not found")))
    }

    async fn replace_node(&self, node: &Node) -> Result<()> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let mut state = self.write();

        let current = state
            .nodes
            .get(&name)
            .ok_or_else(|| KubeError::Hook(format!("node '{name}' not found")))?;
        let current_version: u64 = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        if state.node_conflicts > 0 {
            // someone else wrote the node in between
            state.node_conflicts -= 1;
            if let Some(stored) = state.nodes.get_mut(&name) {
                stored.metadata.resource_version = Some((current_version + 1).to_string());
            }
            return Err(KubeError::Conflict(format!("node '{name}' was modified")));
        }
        if node.metadata.resource_version != Some(current_version.to_string()) {
            return Err(KubeError::Conflict(format!("node '{name}' is stale")));
        }

        let mut stored = node.clone();
        stored.metadata.resource_version = Some((current_version + 1).to_string());
        state.nodes.insert(name.clone(), stored);
        state.events.push(ClusterEvent::ReplaceNode(name));
        Ok(())
    }
}

/// Injected failures look like API server errors
fn server_error(message: &str) -> KubeError {
    KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(kind: &str, name: &str, namespace: Option<&str>) -> ManifestDocument {
        let mut object = json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name}});
        if let Some(ns) = namespace {
            object["metadata"]["namespace"] = json!(ns);
        }
        ManifestDocument::from_value(object).unwrap()
    }

    #[tokio::test]
    async fn test_apply_and_delete_are_recorded() {
        let cluster = MockCluster::new();
        let doc = document("ConfigMap", "c", Some("x"));
        let resolved = cluster.resolve("v1", "ConfigMap").await.unwrap();
        assert!(resolved.namespaced);

        cluster.apply(&doc, &resolved).await.unwrap();
        assert_eq!(cluster.object_count(), 1);
        assert!(cluster.delete(&doc, &resolved).await.unwrap());
        assert!(!cluster.delete(&doc, &resolved).await.unwrap());
        assert_eq!(cluster.applied(), ["ConfigMap/x/c"]);
        assert_eq!(cluster.deleted().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_node_write_conflicts() {
        let cluster = MockCluster::new().with_nodes(["n1"]);
        let node = cluster.get_node("n1").await.unwrap();
        cluster.replace_node(&node).await.unwrap();

        let err = cluster.replace_node(&node).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_cluster_scoped_kinds() {
        let cluster = MockCluster::new().with_unknown_kind("Widget");
        let crd = cluster
            .resolve("apiextensions.k8s.io/v1", "CustomResourceDefinition")
            .await
            .unwrap();
        assert!(!crd.namespaced);
        assert!(matches!(
            cluster.resolve("example.com/v1", "Widget").await,
            Err(KubeError::UnknownResource { .. })
        ));
    }
}
