//! Component pipeline: dispatches a resolved component to its handler

use std::fmt;
use std::sync::Arc;

use ka_core::{ComponentDescriptor, ManifestBundle};

use crate::charts::ChartBackend;
use crate::cluster::ClusterApi;
use crate::error::{KubeError, Result};
use crate::manifests::ManifestSource;

/// Namespace for namespaced documents when neither they nor the bundle set one
pub const FALLBACK_NAMESPACE: &str = "default";

/// Direction of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Install,
    Uninstall,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Installs and removes single components
#[derive(Clone)]
pub struct Pipeline {
    cluster: Arc<dyn ClusterApi>,
    charts: Arc<dyn ChartBackend>,
    manifests: Arc<dyn ManifestSource>,
}

impl Pipeline {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        charts: Arc<dyn ChartBackend>,
        manifests: Arc<dyn ManifestSource>,
    ) -> Self {
        Self {
            cluster,
            charts,
            manifests,
        }
    }

    pub async fn install(&self, component: &ComponentDescriptor) -> Result<()> {
        match component {
            ComponentDescriptor::Chart(app) => self.charts.deploy(app).await,
            ComponentDescriptor::ManifestBundle(bundle) => self.apply_bundle(bundle).await,
        }
    }

    pub async fn uninstall(&self, component: &ComponentDescriptor) -> Result<()> {
        match component {
            ComponentDescriptor::Chart(app) => self.charts.uninstall(app).await,
            ComponentDescriptor::ManifestBundle(bundle) => self.delete_bundle(bundle).await,
        }
    }

    async fn apply_bundle(&self, bundle: &ManifestBundle) -> Result<()> {
        if bundle.create_namespace && !bundle.namespace.is_empty() {
            self.cluster
                .create_namespace_if_not_exists(&bundle.namespace)
                .await?;
        }

        let mut applied = 0usize;
        for url in &bundle.urls {
            for mut document in self.manifests.documents(url).await? {
                let resource = self
                    .cluster
                    .resolve(&document.api_version, &document.kind)
                    .await?;
                if resource.namespaced && document.namespace.is_none() {
                    document.set_namespace(default_namespace(bundle));
                }
                self.cluster.apply(&document, &resource).await?;
                applied += 1;
            }
        }

        tracing::info!(
            urls = bundle.urls.len(),
            objects = applied,
            version = %bundle.version,
            "manifest bundle applied"
        );
        if !bundle.post_install.is_empty() {
            tracing::info!("{}", bundle.post_install);
        }
        Ok(())
    }

    async fn delete_bundle(&self, bundle: &ManifestBundle) -> Result<()> {
        let mut deleted = 0usize;
        for url in bundle.urls.iter().rev() {
            for mut document in self.manifests.documents(url).await? {
                let resource = match self
                    .cluster
                    .resolve(&document.api_version, &document.kind)
                    .await
                {
                    Ok(resource) => resource,
                    // its CRD went away with an earlier document
                    Err(KubeError::UnknownResource { .. }) => {
                        tracing::debug!(resource = %document.display_name(), "type gone, skipping");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if resource.namespaced && document.namespace.is_none() {
                    document.set_namespace(default_namespace(bundle));
                }
                if self.cluster.delete(&document, &resource).await? {
                    deleted += 1;
                } else {
                    tracing::debug!(resource = %document.display_name(), "already absent");
                }
            }
        }

        if bundle.create_namespace && !bundle.namespace.is_empty() {
            self.cluster
                .delete_namespace_if_exists(&bundle.namespace)
                .await?;
        }
        tracing::info!(urls = bundle.urls.len(), objects = deleted, "manifest bundle removed");
        Ok(())
    }
}

fn default_namespace(bundle: &ManifestBundle) -> &str {
    if bundle.namespace.is_empty() {
        FALLBACK_NAMESPACE
    } else {
        &bundle.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{ChartEvent, MockCharts};
    use crate::cluster::{ClusterEvent, MockCluster};
    use crate::manifests::StaticManifests;
    use ka_core::{ChartApp, ChartSpec};

    const CRDS: &str = "mem://crds.yaml";
    const APP: &str = "mem://app.yaml";

    fn manifests() -> StaticManifests {
        StaticManifests::new()
            .with(
                CRDS,
                r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
"#,
            )
            .with(
                APP,
                r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: operator
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: pinned
  namespace: elsewhere
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: operator
"#,
            )
    }

    fn bundle(namespace: &str, create_namespace: bool) -> ComponentDescriptor {
        ComponentDescriptor::ManifestBundle(ManifestBundle {
            urls: vec![CRDS.to_string(), APP.to_string()],
            version: "v1.0.0".to_string(),
            namespace: namespace.to_string(),
            create_namespace,
            metadata: String::new(),
            post_install: String::new(),
        })
    }

    fn pipeline(cluster: &MockCluster, charts: &MockCharts) -> Pipeline {
        Pipeline::new(
            Arc::new(cluster.clone()),
            Arc::new(charts.clone()),
            Arc::new(manifests()),
        )
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Install.to_string(), "install");
        assert_eq!(Operation::Uninstall.to_string(), "uninstall");
    }

    #[tokio::test]
    async fn test_bundle_apply_sets_namespaces_in_order() {
        let cluster = MockCluster::new();
        let pipeline = pipeline(&cluster, &MockCharts::new());

        pipeline.install(&bundle("argocd", true)).await.unwrap();

        assert_eq!(
            cluster.events(),
            [
                ClusterEvent::CreateNamespace("argocd".into()),
                ClusterEvent::Apply("CustomResourceDefinition/widgets.example.com".into()),
                ClusterEvent::Apply("ServiceAccount/argocd/operator".into()),
                ClusterEvent::Apply("ConfigMap/elsewhere/pinned".into()),
                ClusterEvent::Apply("ClusterRole/operator".into()),
            ]
        );
        let sa = cluster.object("ServiceAccount/argocd/operator").unwrap();
        assert_eq!(sa["metadata"]["namespace"], "argocd");
    }

    #[tokio::test]
    async fn test_bundle_without_namespace_uses_default() {
        let cluster = MockCluster::new();
        let pipeline = pipeline(&cluster, &MockCharts::new());

        pipeline.install(&bundle("", true)).await.unwrap();

        assert!(!cluster.has_namespace(""));
        assert!(cluster.applied().contains(&"ServiceAccount/default/operator".to_string()));
    }

    #[tokio::test]
    async fn test_bundle_delete_reverses_urls() {
        let cluster = MockCluster::new();
        let pipeline = pipeline(&cluster, &MockCharts::new());

        pipeline.install(&bundle("argocd", true)).await.unwrap();
        pipeline.uninstall(&bundle("argocd", true)).await.unwrap();

        assert_eq!(
            cluster.deleted(),
            [
                "ServiceAccount/argocd/operator",
                "ConfigMap/elsewhere/pinned",
                "ClusterRole/operator",
                "CustomResourceDefinition/widgets.example.com",
            ]
        );
        assert_eq!(cluster.object_count(), 0);
        assert!(!cluster.has_namespace("argocd"));
        assert_eq!(
            cluster.events().last(),
            Some(&ClusterEvent::DeleteNamespace("argocd".into()))
        );
    }

    #[tokio::test]
    async fn test_bundle_delete_tolerates_missing_objects_and_types() {
        let cluster = MockCluster::new().with_unknown_kind("CustomResourceDefinition");
        let pipeline = pipeline(&cluster, &MockCharts::new());

        // nothing was ever applied
        pipeline.uninstall(&bundle("argocd", false)).await.unwrap();
        assert_eq!(cluster.deleted().len(), 3);
        assert!(
            !cluster
                .events()
                .iter()
                .any(|e| matches!(e, ClusterEvent::DeleteNamespace(_)))
        );
    }

    #[tokio::test]
    async fn test_apply_failure_stops_bundle() {
        let cluster = MockCluster::new();
        cluster.fail_apply("ServiceAccount/argocd/operator", "admission denied");
        let pipeline = pipeline(&cluster, &MockCharts::new());

        let err = pipeline.install(&bundle("argocd", false)).await.unwrap_err();
        assert!(err.to_string().contains("admission denied"));
        assert_eq!(cluster.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_url_fails_install() {
        let cluster = MockCluster::new();
        let pipeline = Pipeline::new(
            Arc::new(cluster.clone()),
            Arc::new(MockCharts::new()),
            Arc::new(StaticManifests::new()),
        );
        let err = pipeline.install(&bundle("argocd", false)).await.unwrap_err();
        assert!(matches!(err, KubeError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_chart_components_go_to_the_backend() {
        let charts = MockCharts::new();
        let pipeline = pipeline(&MockCluster::new(), &charts);
        let component = ComponentDescriptor::Chart(ChartApp {
            repo_url: "https://prometheus-community.github.io/helm-charts".to_string(),
            repo_name: "prometheus-community".to_string(),
            charts: vec![ChartSpec {
                name: "prometheus-community/kube-prometheus-stack".to_string(),
                version: "latest".to_string(),
                release_name: "kube-prometheus-stack".to_string(),
                namespace: "monitoring".to_string(),
                create_namespace: true,
                args: None,
                chart_ref: None,
            }],
        });

        pipeline.install(&component).await.unwrap();
        pipeline.uninstall(&component).await.unwrap();
        assert_eq!(
            charts.events(),
            [
                ChartEvent::Deploy("kube-prometheus-stack".into()),
                ChartEvent::Uninstall("kube-prometheus-stack".into()),
            ]
        );
    }
}
