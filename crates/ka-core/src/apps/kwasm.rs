//! kwasm: the operator chart and the runtime class manifest

use serde_json::{Map, Value};

use crate::component::{ChartApp, ChartSpec, ComponentDescriptor, ManifestBundle};
use crate::overrides::{ComponentOverrides, LATEST, MergePolicy, bare_version, resolve_version};

pub const OPERATOR_SKU: &str = "kwasm-operator";
pub const RUNTIME_SKU: &str = "kwasm-runtimeclass";

/// Override key holding the operator chart values
pub const OPERATOR_CHART_OVERRIDES_KEY: &str = "kwasmOperatorChartOverridings";

const RUNTIME_CLASS_URL: &str =
    "https://raw.githubusercontent.com/ksctl/components/main/wasm/kwasm/runtimeclass.yml";

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
            chart_values: raw.object(OPERATOR_CHART_OVERRIDES_KEY).cloned(),
        }
    }
}

pub fn operator_component(raw: Option<&ComponentOverrides>) -> ComponentDescriptor {
    let overrides = OperatorOverrides::parse(raw);
    let version = bare_version(&resolve_version(overrides.version.as_deref(), LATEST));

    ComponentDescriptor::Chart(ChartApp {
        repo_url: "http://kwasm.sh/kwasm-operator/".to_string(),
        repo_name: "kwasm".to_string(),
        charts: vec![ChartSpec {
            name: "kwasm/kwasm-operator".to_string(),
            version,
            release_name: "kwasm-operator".to_string(),
            namespace: "kwasm".to_string(),
            create_namespace: true,
            args: MergePolicy::Replace.apply(None, overrides.chart_values.as_ref()),
            chart_ref: None,
        }],
    })
}

/// Runtime classes for the wasmedge and wasmtime shims; takes no overrides
pub fn runtime_class_component() -> ComponentDescriptor {
    ComponentDescriptor::ManifestBundle(ManifestBundle {
        urls: vec![RUNTIME_CLASS_URL.to_string()],
        version: LATEST.to_string(),
        namespace: String::new(),
        create_namespace: false,
        metadata: "It applies the runtime class for kwasm currently wasmedge and wasmtime"
            .to_string(),
        post_install: String::new(),
    })
}
