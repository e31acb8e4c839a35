//! Argo CD, installed from the upstream raw manifests

use crate::component::{ComponentDescriptor, ManifestBundle};
use crate::overrides::{ComponentOverrides, resolve_version};

pub const SKU: &str = "argocd";

const DEFAULT_VERSION: &str = "stable";
const DEFAULT_NAMESPACE: &str = "argocd";

const ACCESS_HINT: &str = "
Commands to execute to access Argocd
$ kubectl get secret -n argocd argocd-initial-admin-secret -o json | jq -r '.data.password' | base64 -d
$ kubectl port-forward svc/argocd-server -n argocd 8080:443
and login to http://localhost:8080 with user admin and password from above
";

/// Settings understood by the Argo CD component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub version: Option<String>,
    /// Install only the headless core (no UI, no API server)
    pub no_ui: Option<bool>,
    /// Install the namespace-scoped variant plus the CRDs
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
            no_ui: raw.bool("noUI"),
            namespace_install: raw.bool("namespaceInstall"),
            namespace: raw.string("namespace").map(str::to_string),
        }
    }
}

fn manifest_url(version: &str, path: &str) -> String {
    format!("https://raw.githubusercontent.com/argoproj/argo-cd/{version}/{path}")
}

/// Build the Argo CD component
///
/// `noUI` takes precedence over `namespaceInstall` when both are set.
pub fn component(raw: Option<&ComponentOverrides>) -> ComponentDescriptor {
    let overrides = Overrides::parse(raw);
    let version = resolve_version(overrides.version.as_deref(), DEFAULT_VERSION);
    let namespace = overrides
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let (urls, post_install) = match (overrides.no_ui, overrides.namespace_install) {
        (Some(true), _) => (
            vec![manifest_url(&version, "manifests/core-install.yaml")],
            format!("\nhttps://argo-cd.readthedocs.io/en/{version}/operator-manual/core/\n"),
        ),
        (None, Some(true)) => (
            vec![
                manifest_url(&version, "manifests/crds/application-crd.yaml"),
                manifest_url(&version, "manifests/crds/appproject-crd.yaml"),
                manifest_url(&version, "manifests/crds/applicationset-crd.yaml"),
                manifest_url(&version, "manifests/namespace-install.yaml"),
            ],
            format!(
                "\nhttps://argo-cd.readthedocs.io/en/{version}/operator-manual/installation/#non-high-availability\n"
            ),
        ),
        _ => (
            vec![manifest_url(&version, "manifests/install.yaml")],
            ACCESS_HINT.to_string(),
        ),
    };

    ComponentDescriptor::ManifestBundle(ManifestBundle {
        urls,
        metadata: format!(
            "Argo CD (Ver: {version}) is a declarative, GitOps continuous delivery tool for Kubernetes."
        ),
        version,
        namespace,
        create_namespace: true,
        post_install,
    })
}
