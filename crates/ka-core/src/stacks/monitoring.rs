//! `monitoring-lite`: kube-prometheus-stack only

use std::collections::HashMap;

use crate::apps::kubeprometheus;
use crate::stack::{StackManifest, StackOverrides};

use super::MAINTAINER;

pub const SKU: &str = "monitoring-lite";

pub fn manifest(overrides: &StackOverrides) -> StackManifest {
    StackManifest {
        id: SKU.to_string(),
        deps: vec![kubeprometheus::SKU.to_string()],
        components: HashMap::from([(
            kubeprometheus::SKU.to_string(),
            kubeprometheus::component(overrides.get(kubeprometheus::SKU)),
        )]),
        maintainer: MAINTAINER.to_string(),
    }
}
