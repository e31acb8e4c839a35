//! cert-manager, installed from the jetstack chart repository

use serde_json::{Map, Value, json};

use crate::component::{ChartApp, ChartSpec, ComponentDescriptor};
use crate::error::Result;
use crate::overrides::{ComponentOverrides, MergePolicy, append_flag_once, bare_version};
use crate::releases::ReleaseLookup;

use super::tracked_version;

pub const SKU: &str = "cert-manager";

const GATEWAY_API_FLAG: &str = "--enable-gateway-api";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub version: Option<String>,
    /// Chart values merged onto the defaults
    pub chart_values: Option<Map<String, Value>>,
    pub gateway_api: Option<bool>,
}

impl Overrides {
    pub fn parse(raw: Option<&ComponentOverrides>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self {
            version: raw.string("version").map(str::to_string),
            chart_values: raw.object("certmanagerChartOverridings").cloned(),
            gateway_api: raw.bool("gatewayapiEnable"),
        }
    }
}

fn default_values() -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("crds".to_string(), json!({"enabled": true}));
    values
}

pub async fn component(
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<ComponentDescriptor> {
    let overrides = Overrides::parse(raw);
    let version =
        tracked_version(overrides.version.as_deref(), lookup, "cert-manager", "cert-manager").await?;

    let mut values = MergePolicy::MergePreserving
        .apply(Some(default_values()), overrides.chart_values.as_ref())
        .unwrap_or_default();
    if overrides.gateway_api == Some(true) {
        append_flag_once(&mut values, "extraArgs", GATEWAY_API_FLAG);
    }

    Ok(ComponentDescriptor::Chart(ChartApp {
        repo_url: "https://charts.jetstack.io".to_string(),
        repo_name: "jetstack".to_string(),
        charts: vec![ChartSpec {
            name: "jetstack/cert-manager".to_string(),
            version: bare_version(&version),
            release_name: "cert-manager".to_string(),
            namespace: "cert-manager".to_string(),
            create_namespace: true,
            args: Some(values),
            chart_ref: None,
        }],
    }))
}
