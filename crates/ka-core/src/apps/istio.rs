//! Istio: the `base` and `istiod` charts, in that order

use serde_json::{Map, Value, json};

use crate::component::{ChartApp, ChartSpec, ComponentDescriptor};
use crate::error::Result;
use crate::overrides::{ComponentOverrides, MergePolicy, bare_version};
use crate::releases::ReleaseLookup;

use super::tracked_version;

pub const SKU: &str = "istio";

const NAMESPACE: &str = "istio-system";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub version: Option<String>,
    pub base_values: Option<Map<String, Value>>,
    pub istiod_values: Option<Map<String, Value>>,
}

impl Overrides {
    pub fn parse(raw: Option<&ComponentOverrides>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self {
            version: raw.string("version").map(str::to_string),
            base_values: raw.object("helmBaseChartOverridings").cloned(),
            istiod_values: raw.object("helmIstiodChartOverridings").cloned(),
        }
    }
}

fn base_defaults() -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("defaultRevision".to_string(), json!("default"));
    values
}

pub async fn component(
    raw: Option<&ComponentOverrides>,
    lookup: &dyn ReleaseLookup,
) -> Result<ComponentDescriptor> {
    let overrides = Overrides::parse(raw);
    let version =
        bare_version(&tracked_version(overrides.version.as_deref(), lookup, "istio", "istio").await?);

    let base_values =
        MergePolicy::Replace.apply(Some(base_defaults()), overrides.base_values.as_ref());
    let istiod_values = MergePolicy::Replace.apply(None, overrides.istiod_values.as_ref());

    Ok(ComponentDescriptor::Chart(ChartApp {
        repo_url: "https://istio-release.storage.googleapis.com/charts".to_string(),
        repo_name: "istio".to_string(),
        charts: vec![
            ChartSpec {
                name: "istio/base".to_string(),
                version: version.clone(),
                release_name: "istio-base".to_string(),
                namespace: NAMESPACE.to_string(),
                create_namespace: true,
                args: base_values,
                chart_ref: None,
            },
            ChartSpec {
                name: "istio/istiod".to_string(),
                version,
                release_name: "istiod".to_string(),
                namespace: NAMESPACE.to_string(),
                create_namespace: false,
                args: istiod_values,
                chart_ref: None,
            },
        ],
    }))
}
