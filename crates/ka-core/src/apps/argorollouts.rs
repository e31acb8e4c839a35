//! Argo Rollouts, installed from release manifests

use crate::component::{ComponentDescriptor, ManifestBundle};
use crate::error::Result;
use crate::overrides::ComponentOverrides;
use crate::releases::ReleaseLookup;

use super::tracked_version;

pub const SKU: &str = "argorollouts";

const DEFAULT_NAMESPACE: &str = "argo-rollouts";

const ACCESS_HINT: &str = "
Commands to execute to access Argo-Rollouts
$ kubectl argo rollouts version
$ kubectl argo rollouts dashboard
and open http://localhost:3100/rollouts
";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub version: Option<String>,
    pub namespace_install: Option<bool>,
    pub namespace: Option<String>,
}

impl Overrides {
    pub fn parse(raw: Option<&ComponentOverrides>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self {
            version: raw.string("version").map(str::to_string),
            namespace_install: raw.bool("namespaceInstall"),
            namespace: raw.string("namespace").map(str::to_string),
        }
    }
}

fn manifest_url(version: &str, path: &str) -> String {
    format!("https://raw.githubusercontent.com/argoproj/argo-rollouts/{version}/{path}")
}

pub async fn component(
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<ComponentDescriptor> {
    let overrides = Overrides::parse(raw);
    let version =
        tracked_version(overrides.version.as_deref(), lookup, "argoproj", "argo-rollouts").await?;
    let namespace = overrides
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let (urls, post_install) = if overrides.namespace_install == Some(true) {
        let urls = [
            "manifests/crds/rollout-crd.yaml",
            "manifests/crds/experiment-crd.yaml",
            "manifests/crds/analysis-run-crd.yaml",
            "manifests/crds/analysis-template-crd.yaml",
            "manifests/crds/cluster-analysis-template-crd.yaml",
            "manifests/namespace-install.yaml",
        ]
        .into_iter()
        .map(|path| manifest_url(&version, path))
        .collect();
        (
            urls,
            format!(
                "\nhttps://argo-rollouts.readthedocs.io/en/{version}/installation/#controller-installation\n"
            ),
        )
    } else {
        (
            vec![format!(
                "https://github.com/argoproj/argo-rollouts/releases/download/{version}/install.yaml"
            )],
            ACCESS_HINT.to_string(),
        )
    };

    Ok(ComponentDescriptor::ManifestBundle(ManifestBundle {
        urls,
        metadata: format!(
            "Argo Rollouts (Ver: {version}) is a Kubernetes controller and set of CRDs which provide \
             advanced deployment capabilities such as blue-green, canary, canary analysis, \
             experimentation, and progressive delivery features to Kubernetes."
        ),
        version,
        namespace,
        create_namespace: true,
        post_install,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::releases::FixedReleases;
    use serde_json::json;

    async fn resolve(raw: Option<serde_json::Value>) -> ManifestBundle {
        let raw = raw.and_then(ComponentOverrides::from_value);
        let lookup = FixedReleases::new(["v0.0.1"]);
        component(raw.as_ref(), &lookup)
            .await
            .unwrap()
            .as_manifests()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_use_latest_release() {
        let bundle = resolve(None).await;
        assert_eq!(bundle.version, "v0.0.1");
        assert_eq!(bundle.namespace, "argo-rollouts");
        assert_eq!(
            bundle.urls,
            ["https://github.com/argoproj/argo-rollouts/releases/download/v0.0.1/install.yaml"]
        );
        assert!(bundle.post_install.contains("kubectl argo rollouts dashboard"));
    }

    #[tokio::test]
    async fn test_version_and_namespace() {
        let bundle = resolve(Some(json!({"version": "v1.0.0", "namespace": "nice"}))).await;
        assert_eq!(bundle.version, "v1.0.0");
        assert_eq!(bundle.namespace, "nice");
        assert_eq!(
            bundle.urls,
            ["https://github.com/argoproj/argo-rollouts/releases/download/v1.0.0/install.yaml"]
        );
    }

    #[tokio::test]
    async fn test_namespace_install() {
        let bundle = resolve(Some(json!({"namespaceInstall": true}))).await;
        assert_eq!(bundle.urls.len(), 6);
        assert_eq!(
            bundle.urls[0],
            "https://raw.githubusercontent.com/argoproj/argo-rollouts/v0.0.1/manifests/crds/rollout-crd.yaml"
        );
        assert_eq!(
            bundle.urls[5],
            "https://raw.githubusercontent.com/argoproj/argo-rollouts/v0.0.1/manifests/namespace-install.yaml"
        );
        assert!(bundle.post_install.contains("/en/v0.0.1/installation/"));

        let off = resolve(Some(json!({"namespaceInstall": false}))).await;
        assert_eq!(off.urls.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let lookup = FixedReleases::unavailable();
        assert!(component(None, &lookup).await.is_err());
    }
}
