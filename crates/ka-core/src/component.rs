//! Component descriptors: fully resolved install instructions for one component

use serde::Serialize;
use serde_json::{Map, Value};

/// Installation strategy of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// One or more chart releases
    Chart,
    /// Raw manifests fetched from URLs
    ManifestBundle,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Chart => write!(f, "chart"),
            HandlerKind::ManifestBundle => write!(f, "manifest-bundle"),
        }
    }
}

/// A single chart release
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Chart name, usually `<repo>/<chart>`
    pub name: String,
    /// Chart version; `latest` or empty selects the newest chart
    pub version: String,
    pub release_name: String,
    pub namespace: String,
    pub create_namespace: bool,
    /// Resolved values tree passed to the release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    /// Full chart reference (e.g. `oci://...`), used instead of `name` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<String>,
}

impl ChartSpec {
    /// Location handed to the chart backend
    pub fn location(&self) -> &str {
        self.chart_ref.as_deref().unwrap_or(&self.name)
    }

    /// Version to pin, or `None` for the newest chart
    pub fn pinned_version(&self) -> Option<&str> {
        match self.version.as_str() {
            "" | crate::overrides::LATEST => None,
            v => Some(v),
        }
    }
}

/// Chart repository plus the releases installed from it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartApp {
    /// Repository URL (empty when every chart carries a `chart_ref`)
    pub repo_url: String,
    /// Local repository alias
    pub repo_name: String,
    pub charts: Vec<ChartSpec>,
}

/// Ordered list of manifest URLs applied as one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBundle {
    /// Applied in order on install, reversed on uninstall
    pub urls: Vec<String>,
    pub version: String,
    /// Target namespace for namespaced documents that do not set one
    pub namespace: String,
    /// Create the namespace before applying and delete it after uninstalling
    pub create_namespace: bool,
    /// One-line description
    pub metadata: String,
    /// Human-readable hints shown after installation
    pub post_install: String,
}

/// Fully resolved component, dispatched to exactly one handler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "handler", rename_all = "kebab-case")]
pub enum ComponentDescriptor {
    Chart(ChartApp),
    ManifestBundle(ManifestBundle),
}

impl ComponentDescriptor {
    pub fn kind(&self) -> HandlerKind {
        match self {
            ComponentDescriptor::Chart(_) => HandlerKind::Chart,
            ComponentDescriptor::ManifestBundle(_) => HandlerKind::ManifestBundle,
        }
    }

    /// Version recorded in the ledger for this component
    pub fn version(&self) -> &str {
        match self {
            ComponentDescriptor::Chart(app) => app
                .charts
                .first()
                .map(|c| c.version.as_str())
                .unwrap_or_default(),
            ComponentDescriptor::ManifestBundle(bundle) => &bundle.version,
        }
    }

    pub fn as_chart(&self) -> Option<&ChartApp> {
        match self {
            ComponentDescriptor::Chart(app) => Some(app),
            ComponentDescriptor::ManifestBundle(_) => None,
        }
    }

    pub fn as_manifests(&self) -> Option<&ManifestBundle> {
        match self {
            ComponentDescriptor::ManifestBundle(bundle) => Some(bundle),
            ComponentDescriptor::Chart(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(version: &str) -> ChartSpec {
        ChartSpec {
            name: "jetstack/cert-manager".to_string(),
            version: version.to_string(),
            release_name: "cert-manager".to_string(),
            namespace: "cert-manager".to_string(),
            create_namespace: true,
            args: None,
            chart_ref: None,
        }
    }

    #[test]
    fn test_version_reported_from_first_chart() {
        let component = ComponentDescriptor::Chart(ChartApp {
            repo_url: "https://charts.jetstack.io".to_string(),
            repo_name: "jetstack".to_string(),
            charts: vec![chart("1.15.3"), chart("0.0.0")],
        });
        assert_eq!(component.kind(), HandlerKind::Chart);
        assert_eq!(component.version(), "1.15.3");
    }

    #[test]
    fn test_version_reported_from_bundle() {
        let component = ComponentDescriptor::ManifestBundle(ManifestBundle {
            urls: vec![],
            version: "stable".to_string(),
            namespace: "argocd".to_string(),
            create_namespace: true,
            metadata: String::new(),
            post_install: String::new(),
        });
        assert_eq!(component.kind(), HandlerKind::ManifestBundle);
        assert_eq!(component.version(), "stable");
        assert!(component.as_chart().is_none());
    }

    #[test]
    fn test_pinned_version_and_location() {
        assert_eq!(chart("latest").pinned_version(), None);
        assert_eq!(chart("").pinned_version(), None);
        assert_eq!(chart("1.0.0").pinned_version(), Some("1.0.0"));

        let mut oci = chart("0.2.0");
        assert_eq!(oci.location(), "jetstack/cert-manager");
        oci.chart_ref = Some("oci://ghcr.io/spinkube/charts/spin-operator".to_string());
        assert_eq!(oci.location(), "oci://ghcr.io/spinkube/charts/spin-operator");
    }

    #[test]
    fn test_handler_kind_display() {
        assert_eq!(HandlerKind::Chart.to_string(), "chart");
        assert_eq!(HandlerKind::ManifestBundle.to_string(), "manifest-bundle");
    }
}
