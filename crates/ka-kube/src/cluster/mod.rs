//! Cluster API boundary
//!
//! Everything the pipeline and the hooks need from the API server goes
//! through [`ClusterApi`]. [`KubeCluster`] talks to a real cluster;
//! [`MockCluster`] keeps objects in memory for tests.

mod mock;

pub use mock::{ClusterEvent, MockCluster};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    discovery::{ApiResource, Discovery, Scope},
};
use tokio::sync::RwLock;

use crate::error::{KubeError, Result};
use crate::manifests::ManifestDocument;

/// An API resource resolved through discovery
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResource {
    pub api_resource: ApiResource,
    pub namespaced: bool,
}

/// Operations the controller performs against the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a namespace unless it exists
    async fn create_namespace_if_not_exists(&self, name: &str) -> Result<()>;

    /// Delete a namespace if it exists; returns whether it was there
    async fn delete_namespace_if_exists(&self, name: &str) -> Result<bool>;

    /// Resolve `apiVersion` + `kind` to an API resource
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedResource>;

    /// Server-side apply a document
    async fn apply(&self, document: &ManifestDocument, resource: &ResolvedResource) -> Result<()>;

    /// Delete a document; returns `false` when it was already gone
    async fn delete(&self, document: &ManifestDocument, resource: &ResolvedResource)
    -> Result<bool>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Replace a node; fails with a conflict when `resourceVersion` is stale
    async fn replace_node(&self, node: &Node) -> Result<()>;
}

/// Split `apiVersion` into group and version
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_parts(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    GroupVersionKind {
        group,
        version,
        kind: kind.to_string(),
    }
}

/// [`ClusterApi`] backed by a kube client
pub struct KubeCluster {
    client: Client,
    /// Cached discovery information
    discovery: RwLock<Discovery>,
    field_manager: String,
}

impl KubeCluster {
    /// Connect and run discovery once
    pub async fn new(client: Client, field_manager: impl Into<String>) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
            field_manager: field_manager.into(),
        })
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&self) -> Result<()> {
        let fresh = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        *self.discovery.write().await = fresh;
        Ok(())
    }

    async fn lookup(&self, gvk: &GroupVersionKind) -> Option<ResolvedResource> {
        let discovery = self.discovery.read().await;
        discovery
            .resolve_gvk(gvk)
            .map(|(api_resource, capabilities)| ResolvedResource {
                api_resource,
                namespaced: capabilities.scope == Scope::Namespaced,
            })
    }

    fn api_for(&self, document: &ManifestDocument, resource: &ResolvedResource) -> Api<DynamicObject> {
        if resource.namespaced {
            let ns = document.namespace.as_deref().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn create_namespace_if_not_exists(&self, name: &str) -> Result<()> {
        let api = self.namespaces();
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                tracing::info!(namespace = name, "created namespace");
                Ok(())
            }
            // created concurrently
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_namespace_if_exists(&self, name: &str) -> Result<bool> {
        match self.namespaces().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                tracing::info!(namespace = name, "deleted namespace");
                Ok(true)
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedResource> {
        let gvk = gvk_from_parts(api_version, kind);
        if let Some(resolved) = self.lookup(&gvk).await {
            return Ok(resolved);
        }

        // CRDs applied earlier in the pass are not in the cache yet
        tracing::debug!(api_version, kind, "resource unknown, refreshing discovery");
        self.refresh_discovery().await?;
        self.lookup(&gvk)
            .await
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    async fn apply(&self, document: &ManifestDocument, resource: &ResolvedResource) -> Result<()> {
        let object: DynamicObject = serde_json::from_value(document.object.clone())?;
        let params = PatchParams::apply(&self.field_manager).force();

        self.api_for(document, resource)
            .patch(&document.name, &params, &Patch::Apply(&object))
            .await?;
        tracing::debug!(resource = %document.display_name(), "applied");
        Ok(())
    }

    async fn delete(
        &self,
        document: &ManifestDocument,
        resource: &ResolvedResource,
    ) -> Result<bool> {
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };
        match self
            .api_for(document, resource)
            .delete(&document.name, &params)
            .await
        {
            Ok(_) => {
                tracing::debug!(resource = %document.display_name(), "deleted");
                Ok(true)
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes().list(&ListParams::default()).await?.items)
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        Ok(self.nodes().get(name).await?)
    }

    async fn replace_node(&self, node: &Node) -> Result<()> {
        let name = node.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidManifest("node without metadata.name".to_string())
        })?;
        self.nodes()
            .replace(name, &PostParams::default(), node)
            .await?;
        Ok(())
    }
}
