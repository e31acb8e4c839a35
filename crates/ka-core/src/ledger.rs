//! State ledger: which stacks and components are currently applied
//!
//! A component entry means "successfully applied". Absence means "not applied
//! yet"; failures are never recorded, so the next pass simply retries them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every installed stack, keyed by stack id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateLedger {
    #[serde(default)]
    pub stacks: BTreeMap<String, AppState>,
}

/// Installed components of one stack, keyed by component id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentState>,
}

/// What was applied for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

impl StateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_stack_installed(&self, stack: &str) -> bool {
        self.stacks.contains_key(stack)
    }

    pub fn was_component_installed(&self, stack: &str, component: &str) -> bool {
        self.stacks
            .get(stack)
            .is_some_and(|app| app.components.contains_key(component))
    }

    /// Make sure a stack entry exists (possibly with no components)
    pub fn ensure_stack(&mut self, stack: &str) -> &mut AppState {
        self.stacks.entry(stack.to_string()).or_default()
    }

    /// Record a successfully applied component
    pub fn record_component(&mut self, stack: &str, component: &str, version: &str) {
        self.ensure_stack(stack).components.insert(
            component.to_string(),
            ComponentState {
                version: version.to_string(),
                installed_at: Some(Utc::now()),
            },
        );
    }

    /// Forget a removed component; returns whether it was recorded
    pub fn remove_component(&mut self, stack: &str, component: &str) -> bool {
        self.stacks
            .get_mut(stack)
            .is_some_and(|app| app.components.remove(component).is_some())
    }

    /// Forget a whole stack
    pub fn remove_stack(&mut self, stack: &str) -> Option<AppState> {
        self.stacks.remove(stack)
    }

    /// Recorded version of a component
    pub fn component_version(&self, stack: &str, component: &str) -> Option<&str> {
        self.stacks
            .get(stack)
            .and_then(|app| app.components.get(component))
            .map(|c| c.version.as_str())
    }
}
