//! kube-prometheus-stack from the prometheus-community charts

use serde_json::{Map, Value};

use crate::component::{ChartApp, ChartSpec, ComponentDescriptor};
use crate::overrides::{ComponentOverrides, LATEST, MergePolicy, bare_version, resolve_version};

pub const SKU: &str = "kube-prometheus";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub version: Option<String>,
    pub chart_values: Option<Map<String, Value>>,
}

impl Overrides {
    pub fn parse(raw: Option<&ComponentOverrides>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self {
            version: raw.string("version").map(str::to_string),
            chart_values: raw.object("helmKubePromChartOverridings").cloned(),
        }
    }
}

pub fn component(raw: Option<&ComponentOverrides>) -> ComponentDescriptor {
    let overrides = Overrides::parse(raw);
    let version = bare_version(&resolve_version(overrides.version.as_deref(), LATEST));

    ComponentDescriptor::Chart(ChartApp {
        repo_url: "https://prometheus-community.github.io/helm-charts".to_string(),
        repo_name: "prometheus-community".to_string(),
        charts: vec![ChartSpec {
            name: "prometheus-community/kube-prometheus-stack".to_string(),
            version,
            release_name: "kube-prometheus-stack".to_string(),
            namespace: "monitoring".to_string(),
            create_namespace: true,
            args: MergePolicy::Replace.apply(None, overrides.chart_values.as_ref()),
            chart_ref: None,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(raw: Option<Value>) -> ChartSpec {
        let raw = raw.and_then(ComponentOverrides::from_value);
        component(raw.as_ref()).as_chart().unwrap().charts[0].clone()
    }

    #[test]
    fn test_defaults() {
        let chart = resolve(None);
        assert_eq!(chart.version, "latest");
        assert_eq!(chart.release_name, "kube-prometheus-stack");
        assert_eq!(chart.namespace, "monitoring");
        assert!(chart.create_namespace);
        assert!(chart.args.is_none());
        assert_eq!(chart.pinned_version(), None);
    }

    #[test]
    fn test_overrides() {
        let chart = resolve(Some(json!({
            "version": "v65.1.0",
            "helmKubePromChartOverridings": {"grafana": {"enabled": false}},
        })));
        assert_eq!(chart.version, "65.1.0");
        assert_eq!(chart.args.unwrap()["grafana"]["enabled"], json!(false));
    }

    #[test]
    fn test_non_object_values_ignored() {
        let chart = resolve(Some(json!({"helmKubePromChartOverridings": "grafana=off"})));
        assert!(chart.args.is_none());
    }
}
