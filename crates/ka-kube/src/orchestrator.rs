//! Stack orchestrator
//!
//! Walks a stack's components through the pipeline in dependency order and
//! keeps the ledger in step: every component that succeeds is recorded and
//! persisted before the next one starts, so a failed pass resumes where it
//! stopped.

use std::sync::Arc;

use ka_core::{ReleaseLookup, StackManifest, StackRequest, StateLedger, stacks};

use crate::cluster::ClusterApi;
use crate::error::{KubeError, Result};
use crate::hooks;
use crate::pipeline::{Operation, Pipeline};
use crate::retry::RetryPolicy;
use crate::storage::{LedgerStore, save_with_retry};

/// Installs and removes whole stacks
#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Pipeline,
    store: Arc<dyn LedgerStore>,
    releases: Arc<dyn ReleaseLookup>,
    cluster: Arc<dyn ClusterApi>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        pipeline: Pipeline,
        store: Arc<dyn LedgerStore>,
        releases: Arc<dyn ReleaseLookup>,
        cluster: Arc<dyn ClusterApi>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pipeline,
            store,
            releases,
            cluster,
            retry,
        }
    }

    /// Install every missing, enabled component of the stack
    pub async fn add(&self, request: &StackRequest) -> Result<()> {
        let manifest = self.manifest(request).await?;
        let stack = manifest.id.as_str();

        let mut ledger = self.store.load().await?;
        if ledger.was_stack_installed(stack) {
            tracing::info!(stack, "stack already recorded, checking components");
        }
        ledger.ensure_stack(stack);

        let outcome = self.install_components(request, &manifest, &mut ledger).await;
        // keep the stack entry even when the first component failed
        self.persist(&ledger).await?;
        outcome?;

        if stacks::requires_node_annotation(stack) {
            hooks::annotate_nodes(self.cluster.as_ref(), self.retry).await?;
        }

        tracing::info!(stack, "stack installed");
        Ok(())
    }

    /// Remove every recorded, enabled component of the stack
    pub async fn remove(&self, request: &StackRequest) -> Result<()> {
        let stack = request.stack_id.as_str();
        let mut ledger = self.store.load().await?;
        if !ledger.was_stack_installed(stack) {
            tracing::info!(stack, "stack not installed, nothing to remove");
            return Ok(());
        }

        let manifest = self.manifest(request).await?;

        for id in manifest.uninstall_order() {
            if !ledger.was_component_installed(stack, id) {
                tracing::info!(stack, component = id, "component not installed, skipping");
                continue;
            }
            if request.is_disabled(id) {
                tracing::info!(stack, component = id, "component disabled, skipping");
                continue;
            }

            let component = manifest.component(id)?;
            tracing::info!(stack, component = id, version = component.version(), "uninstalling component");
            self.pipeline
                .uninstall(component)
                .await
                .map_err(|e| KubeError::component(id, Operation::Uninstall, e))?;

            ledger.remove_component(stack, id);
            self.persist(&ledger).await?;
        }

        if stacks::requires_node_annotation(stack) {
            hooks::remove_node_annotation(self.cluster.as_ref(), self.retry).await?;
        }

        ledger.remove_stack(stack);
        self.persist(&ledger).await?;
        tracing::info!(stack, "stack removed");
        Ok(())
    }

    async fn manifest(&self, request: &StackRequest) -> Result<StackManifest> {
        Ok(stacks::build(request, self.releases.as_ref()).await?)
    }

    async fn install_components(
        &self,
        request: &StackRequest,
        manifest: &StackManifest,
        ledger: &mut StateLedger,
    ) -> Result<()> {
        let stack = manifest.id.as_str();

        for id in manifest.install_order() {
            if ledger.was_component_installed(stack, id) {
                tracing::info!(stack, component = id, "component already installed, skipping");
                continue;
            }
            if request.is_disabled(id) {
                tracing::info!(stack, component = id, "component disabled, skipping");
                continue;
            }

            let component = manifest.component(id)?;
            tracing::info!(
                stack,
                component = id,
                handler = %component.kind(),
                version = component.version(),
                "installing component"
            );
            self.pipeline
                .install(component)
                .await
                .map_err(|e| KubeError::component(id, Operation::Install, e))?;

            ledger.record_component(stack, id, component.version());
            self.persist(ledger).await?;
        }
        Ok(())
    }

    async fn persist(&self, ledger: &StateLedger) -> Result<()> {
        save_with_retry(self.store.as_ref(), ledger, self.retry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{ChartEvent, MockCharts};
    use crate::cluster::MockCluster;
    use crate::hooks::KWASM_NODE_ANNOTATION;
    use crate::manifests::StaticManifests;
    use crate::storage::MockLedgerStore;
    use ka_core::FixedReleases;
    use std::time::Duration;

    const ARGOCD_URL: &str =
        "https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml";
    const ROLLOUTS_URL: &str =
        "https://github.com/argoproj/argo-rollouts/releases/download/v1.7.2/install.yaml";
    const KWASM_RUNTIMECLASS_URL: &str =
        "https://raw.githubusercontent.com/ksctl/components/main/wasm/kwasm/runtimeclass.yml";

    const ARGOCD: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: argocd-server
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: argocd-server
"#;

    const ROLLOUTS: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: rollouts.argoproj.io
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: argo-rollouts
"#;

    const RUNTIMECLASS: &str = r#"
apiVersion: node.k8s.io/v1
kind: RuntimeClass
metadata:
  name: wasmedge
handler: wasmedge
"#;

    struct Harness {
        cluster: MockCluster,
        charts: MockCharts,
        store: MockLedgerStore,
        orchestrator: Orchestrator,
    }

    fn harness_with(store: MockLedgerStore) -> Harness {
        let cluster = MockCluster::new().with_nodes(["node-a", "node-b"]);
        let charts = MockCharts::new();
        let manifests = StaticManifests::new()
            .with(ARGOCD_URL, ARGOCD)
            .with(ROLLOUTS_URL, ROLLOUTS)
            .with(KWASM_RUNTIMECLASS_URL, RUNTIMECLASS);
        let pipeline = Pipeline::new(
            Arc::new(cluster.clone()),
            Arc::new(charts.clone()),
            Arc::new(manifests),
        );
        let orchestrator = Orchestrator::new(
            pipeline,
            Arc::new(store.clone()),
            Arc::new(FixedReleases::new(["v1.7.2"])),
            Arc::new(cluster.clone()),
            RetryPolicy {
                attempts: 5,
                delay: Duration::from_millis(1),
            },
        );
        Harness {
            cluster,
            charts,
            store,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(MockLedgerStore::new())
    }

    fn ledger(h: &Harness) -> StateLedger {
        h.store.stored().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_monitoring_lite_end_to_end() {
        let h = harness();
        let request = StackRequest::new("monitoring-lite");

        h.orchestrator.add(&request).await.unwrap();

        assert_eq!(
            h.charts.events(),
            [ChartEvent::Deploy("kube-prometheus-stack".into())]
        );
        assert_eq!(
            ledger(&h).component_version("monitoring-lite", "kube-prometheus"),
            Some("latest")
        );

        h.orchestrator.remove(&request).await.unwrap();
        assert_eq!(
            h.charts.events().last(),
            Some(&ChartEvent::Uninstall("kube-prometheus-stack".into()))
        );
        assert!(!ledger(&h).was_stack_installed("monitoring-lite"));
    }

    #[tokio::test]
    async fn test_install_is_ordered_and_idempotent() {
        let h = harness();
        let request = StackRequest::new("gitops-standard");

        h.orchestrator.add(&request).await.unwrap();
        let first = h.cluster.applied();
        assert_eq!(
            first,
            [
                "ServiceAccount/argocd/argocd-server",
                "Deployment/argocd/argocd-server",
                "CustomResourceDefinition/rollouts.argoproj.io",
                "Deployment/argo-rollouts/argo-rollouts",
            ]
        );
        assert_eq!(
            ledger(&h).component_version("gitops-standard", "argorollouts"),
            Some("v1.7.2")
        );

        // a second pass with nothing to do touches nothing
        h.orchestrator.add(&request).await.unwrap();
        assert_eq!(h.cluster.applied(), first);
    }

    #[tokio::test]
    async fn test_disabled_components_are_skipped() {
        let h = harness();
        let request = StackRequest::new("gitops-standard").with_disabled(["argocd"]);

        h.orchestrator.add(&request).await.unwrap();

        assert!(
            h.cluster
                .applied()
                .iter()
                .all(|name| !name.contains("argocd-server"))
        );
        let ledger = ledger(&h);
        assert!(!ledger.was_component_installed("gitops-standard", "argocd"));
        assert!(ledger.was_component_installed("gitops-standard", "argorollouts"));
    }

    #[tokio::test]
    async fn test_disabled_components_are_not_uninstalled() {
        let h = harness();
        h.orchestrator
            .add(&StackRequest::new("gitops-standard"))
            .await
            .unwrap();

        let request = StackRequest::new("gitops-standard").with_disabled(["argocd"]);
        h.orchestrator.remove(&request).await.unwrap();

        assert!(
            h.cluster
                .deleted()
                .iter()
                .all(|name| !name.contains("argocd-server"))
        );
        assert!(h.cluster.object("Deployment/argocd/argocd-server").is_some());
        assert!(h.cluster.has_namespace("argocd"));
        assert!(h.cluster.object("Deployment/argo-rollouts/argo-rollouts").is_none());
        assert!(!ledger(&h).was_stack_installed("gitops-standard"));
    }

    #[tokio::test]
    async fn test_node_hook_failure_keeps_components_recorded() {
        let h = harness();
        h.cluster.conflict_node_writes(u32::MAX);

        let err = h
            .orchestrator
            .add(&StackRequest::new("wasm/kwasm-plus"))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "unexpected error: {err}");

        let ledger = ledger(&h);
        assert!(ledger.was_component_installed("wasm/kwasm-plus", "kwasm-operator"));
        assert!(ledger.was_component_installed("wasm/kwasm-plus", "kwasm-runtimeclass"));
        assert!(h.cluster.applied().contains(&"RuntimeClass/wasmedge".to_string()));
        assert!(h.cluster.deleted().is_empty());
        assert!(h.charts.events().iter().all(|e| matches!(e, ChartEvent::Deploy(_))));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_earlier_components() {
        let h = harness();
        h.cluster
            .fail_apply("Deployment/argo-rollouts/argo-rollouts", "quota exceeded");
        let request = StackRequest::new("gitops-standard");

        let err = h.orchestrator.add(&request).await.unwrap_err();
        assert!(
            matches!(
                err,
                KubeError::Component { ref component, operation: Operation::Install, .. }
                    if component == "argorollouts"
            ),
            "unexpected error: {err}"
        );
        let recorded = ledger(&h);
        assert!(recorded.was_component_installed("gitops-standard", "argocd"));
        assert!(!recorded.was_component_installed("gitops-standard", "argorollouts"));

        // the next pass resumes at the failed component
        h.cluster.clear_failures();
        let applied_before = h.cluster.applied().len();
        h.orchestrator.add(&request).await.unwrap();
        let resumed = &h.cluster.applied()[applied_before..];
        assert_eq!(
            resumed,
            [
                "CustomResourceDefinition/rollouts.argoproj.io",
                "Deployment/argo-rollouts/argo-rollouts",
            ]
        );
        assert!(ledger(&h).was_component_installed("gitops-standard", "argorollouts"));
    }

    #[tokio::test]
    async fn test_failure_on_first_component_still_records_stack() {
        let h = harness();
        h.cluster
            .fail_apply("ServiceAccount/argocd/argocd-server", "forbidden");

        assert!(h.orchestrator.add(&StackRequest::new("gitops-standard")).await.is_err());
        let ledger = ledger(&h);
        assert!(ledger.was_stack_installed("gitops-standard"));
        assert!(!ledger.was_component_installed("gitops-standard", "argocd"));
    }

    #[tokio::test]
    async fn test_uninstall_reverses_order_and_deletes_namespaces() {
        let h = harness();
        let request = StackRequest::new("gitops-standard");
        h.orchestrator.add(&request).await.unwrap();

        h.orchestrator.remove(&request).await.unwrap();

        assert_eq!(
            h.cluster.deleted(),
            [
                "CustomResourceDefinition/rollouts.argoproj.io",
                "Deployment/argo-rollouts/argo-rollouts",
                "ServiceAccount/argocd/argocd-server",
                "Deployment/argocd/argocd-server",
            ]
        );
        assert_eq!(h.cluster.object_count(), 0);
        assert!(!h.cluster.has_namespace("argocd"));
        assert!(!h.cluster.has_namespace("argo-rollouts"));
        assert!(!ledger(&h).was_stack_installed("gitops-standard"));
    }

    #[tokio::test]
    async fn test_remove_unknown_stack_is_a_no_op() {
        let h = harness();
        h.orchestrator
            .remove(&StackRequest::new("gitops-standard"))
            .await
            .unwrap();
        assert!(h.cluster.events().is_empty());
        assert_eq!(h.store.operation_counts().saves, 0);
    }

    #[tokio::test]
    async fn test_remove_skips_unrecorded_components() {
        let mut recorded = StateLedger::new();
        recorded.record_component("gitops-standard", "argocd", "stable");
        let h = harness_with(MockLedgerStore::with_ledger(recorded));

        h.orchestrator
            .remove(&StackRequest::new("gitops-standard"))
            .await
            .unwrap();
        assert_eq!(
            h.cluster.deleted(),
            [
                "ServiceAccount/argocd/argocd-server",
                "Deployment/argocd/argocd-server",
            ]
        );
    }

    #[tokio::test]
    async fn test_uninstall_failure_keeps_component_recorded() {
        let h = harness();
        let request = StackRequest::new("gitops-standard");
        h.orchestrator.add(&request).await.unwrap();
        h.cluster
            .fail_delete("Deployment/argocd/argocd-server", "timeout");

        let err = h.orchestrator.remove(&request).await.unwrap_err();
        assert!(err.to_string().starts_with("uninstall of component 'argocd' failed"));

        let ledger = ledger(&h);
        assert!(ledger.was_component_installed("gitops-standard", "argocd"));
        assert!(!ledger.was_component_installed("gitops-standard", "argorollouts"));
    }

    #[tokio::test]
    async fn test_ledger_conflicts_are_retried() {
        let h = harness();
        h.store.inject_conflicts(2);

        h.orchestrator
            .add(&StackRequest::new("monitoring-lite"))
            .await
            .unwrap();
        assert_eq!(h.store.operation_counts().conflicts, 2);
        assert!(ledger(&h).was_component_installed("monitoring-lite", "kube-prometheus"));
    }

    #[tokio::test]
    async fn test_wasm_stack_annotates_nodes() {
        let h = harness();
        let request = StackRequest::new("wasm/kwasm-plus");

        h.orchestrator.add(&request).await.unwrap();
        assert_eq!(h.charts.events(), [ChartEvent::Deploy("kwasm-operator".into())]);
        assert!(h.cluster.applied().contains(&"RuntimeClass/wasmedge".to_string()));
        for node in ["node-a", "node-b"] {
            assert!(h.cluster.node_annotations(node).contains_key(KWASM_NODE_ANNOTATION));
        }

        h.orchestrator.remove(&request).await.unwrap();
        for node in ["node-a", "node-b"] {
            assert!(h.cluster.node_annotations(node).is_empty());
        }
        assert!(!ledger(&h).was_stack_installed("wasm/kwasm-plus"));
    }

    #[tokio::test]
    async fn test_unknown_stack_fails_before_any_work() {
        let h = harness();
        let err = h.orchestrator.add(&StackRequest::new("nope")).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(h.store.operation_counts().loads, 0);
    }
}
