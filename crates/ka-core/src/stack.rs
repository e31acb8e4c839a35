//! Stack requests and resolved stack manifests

use std::collections::HashMap;

use serde_json::Value;

use crate::component::ComponentDescriptor;
use crate::error::{CoreError, Result};
use crate::overrides::ComponentOverrides;

/// Overrides for every component of a stack, keyed by component id
pub type StackOverrides = HashMap<String, ComponentOverrides>;

/// What the caller asked for: a stack, disabled components and overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackRequest {
    pub stack_id: String,
    pub disabled: Vec<String>,
    pub overrides: StackOverrides,
}

impl StackRequest {
    /// Request a stack with defaults
    pub fn new(stack_id: impl Into<String>) -> Self {
        Self {
            stack_id: stack_id.into(),
            ..Default::default()
        }
    }

    /// Disable components by id
    pub fn with_disabled<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Attach the raw override payload
    pub fn with_overrides(mut self, payload: Option<&Value>) -> Result<Self> {
        self.overrides = parse_overrides(payload)?;
        Ok(self)
    }

    pub fn is_disabled(&self, component: &str) -> bool {
        self.disabled.iter().any(|d| d == component)
    }
}

/// Split a raw override payload into per-component override maps
///
/// The payload must be an object whose values are objects (or null, which
/// counts as "no overrides"). Anything inside a component's object is kept
/// as-is and interpreted permissively by that component.
pub fn parse_overrides(payload: Option<&Value>) -> Result<StackOverrides> {
    let entries = match payload {
        None | Some(Value::Null) => return Ok(StackOverrides::new()),
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            return Err(CoreError::InvalidOverrides(format!(
                "expected an object keyed by component id, got {}",
                json_type(other)
            )));
        }
    };

    let mut parsed = StackOverrides::with_capacity(entries.len());
    for (component, value) in entries {
        match value {
            Value::Null => {}
            Value::Object(map) => {
                parsed.insert(component.clone(), ComponentOverrides(map.clone()));
            }
            other => {
                return Err(CoreError::InvalidOverrides(format!(
                    "overrides for '{}' must be an object, got {}",
                    component,
                    json_type(other)
                )));
            }
        }
    }
    Ok(parsed)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A resolved stack: components plus the order they are installed in
#[derive(Debug, Clone, PartialEq)]
pub struct StackManifest {
    pub id: String,
    /// Install order; uninstall walks it backwards
    pub deps: Vec<String>,
    pub components: HashMap<String, ComponentDescriptor>,
    pub maintainer: String,
}

impl StackManifest {
    /// Look up the descriptor of a component listed in `deps`
    pub fn component(&self, id: &str) -> Result<&ComponentDescriptor> {
        self.components
            .get(id)
            .ok_or_else(|| CoreError::ComponentNotFound {
                stack: self.id.clone(),
                component: id.to_string(),
            })
    }

    /// Component ids in install order
    pub fn install_order(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().map(String::as_str)
    }

    /// Component ids in uninstall order
    pub fn uninstall_order(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().rev().map(String::as_str)
    }
}
