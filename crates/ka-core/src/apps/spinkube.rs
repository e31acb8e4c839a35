//! SpinKube: operator release manifests, the operator chart, and the
//! node-installer image wiring for the kwasm operator

use serde_json::{Map, Value};

use crate::component::{ChartApp, ChartSpec, ComponentDescriptor, ManifestBundle};
use crate::error::Result;
use crate::overrides::{ComponentOverrides, MergePolicy, bare_version};
use crate::releases::{ReleaseLookup, latest_release};

use super::kwasm::OPERATOR_CHART_OVERRIDES_KEY;
use super::tracked_version;

pub const CRD_SKU: &str = "spinkube-crd";
pub const RUNTIME_CLASS_SKU: &str = "spinkube-runtimeclass";
pub const SHIM_EXECUTOR_SKU: &str = "spinkube-shim-executor";
pub const OPERATOR_SKU: &str = "spin-operator";

const OPERATOR_CHART_REF: &str = "oci://ghcr.io/spinkube/charts/spin-operator";
const NODE_INSTALLER_IMAGE: &str = "ghcr.io/spinkube/containerd-shim-spin/node-installer";
const DOCS_URL: &str = "https://www.spinkube.dev/docs/topics/";

/// Release asset of the spin operator applied as a manifest bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAsset {
    Crds,
    RuntimeClass,
    ShimExecutor,
}

impl OperatorAsset {
    pub fn file_name(self) -> &'static str {
        match self {
            OperatorAsset::Crds => "spin-operator.crds.yaml",
            OperatorAsset::RuntimeClass => "spin-operator.runtime-class.yaml",
            OperatorAsset::ShimExecutor => "spin-operator.shim-executor.yaml",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorOverrides {
    pub version: Option<String>,
    pub chart_values: Option<Map<String, Value>>,
}

impl OperatorOverrides {
    pub fn parse(raw: Option<&ComponentOverrides>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self {
            version: raw.string("version").map(str::to_string),
            chart_values: raw.object("helmOperatorChartOverridings").cloned(),
        }
    }
}

async fn operator_version(
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<String> {
    let requested = raw.and_then(|r| r.string("version"));
    tracked_version(requested, lookup, "spinkube", "spin-operator").await
}

/// One of the operator's release manifests
pub async fn asset_component(
    asset: OperatorAsset,
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<ComponentDescriptor> {
    let version = operator_version(raw, lookup).await?;

    Ok(ComponentDescriptor::ManifestBundle(ManifestBundle {
        urls: vec![format!(
            "https://github.com/spinkube/spin-operator/releases/download/{version}/{}",
            asset.file_name()
        )],
        metadata: format!(
            "KubeSpin (ver: {version}) is an open source project that streamlines developing, \
             deploying and operating WebAssembly workloads in Kubernetes"
        ),
        version,
        namespace: String::new(),
        create_namespace: false,
        post_install: DOCS_URL.to_string(),
    }))
}

/// The spin operator chart, pulled from its OCI registry
pub async fn operator_component(
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<ComponentDescriptor> {
    let overrides = OperatorOverrides::parse(raw);
    let version = bare_version(&operator_version(raw, lookup).await?);

    Ok(ComponentDescriptor::Chart(ChartApp {
        repo_url: String::new(),
        repo_name: String::new(),
        charts: vec![ChartSpec {
            name: "spin-operator".to_string(),
            version,
            release_name: "spin-operator".to_string(),
            namespace: "spin-operator".to_string(),
            create_namespace: true,
            args: MergePolicy::Replace.apply(Some(Map::new()), overrides.chart_values.as_ref()),
            chart_ref: Some(OPERATOR_CHART_REF.to_string()),
        }],
    }))
}

/// Point the kwasm operator at the newest SpinKube node installer
///
/// Writes `kwasmOperatorChartOverridings.kwasmOperator.installerImage`,
/// creating intermediate objects and overwriting any user-provided image.
pub async fn inject_kwasm_installer_image(
    kwasm_overrides: &mut ComponentOverrides,
    lookup: &dyn ReleaseLookup,
) -> Result<()> {
    let tag = latest_release(lookup, "spinkube", "containerd-shim-spin").await?;
    let image = format!("{NODE_INSTALLER_IMAGE}:{tag}");

    let operator = crate::overrides::object_entry(
        kwasm_overrides.object_entry(OPERATOR_CHART_OVERRIDES_KEY),
        "kwasmOperator",
    );
    operator.insert("installerImage".to_string(), Value::String(image));
    Ok(())
}
