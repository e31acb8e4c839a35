//! Override resolution: sparse per-component settings merged onto defaults
//!
//! Override payloads are parsed permissively. Every accessor returns `None`
//! for a key that is absent *or* holds a value of the wrong type, so a
//! malformed override behaves exactly like a missing one. Components build
//! their typed `Overrides` structs on top of these accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel version meaning "use the provider default"
pub const LATEST: &str = "latest";

/// Sparse override map for a single component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentOverrides(pub Map<String, Value>);

impl ComponentOverrides {
    /// Create an empty override map
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, if it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for a key
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Boolean value for a key
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Nested object for a key
    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Nested object for a key, replacing any non-object value with `{}`
    pub fn object_entry(&mut self, key: &str) -> &mut Map<String, Value> {
        object_entry(&mut self.0, key)
    }

    /// Set a key
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Check if no overrides are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ComponentOverrides {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Get or create a nested object under `key`
///
/// A non-object value already stored under `key` is replaced.
pub fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made an object"),
    }
}

/// Resolve a requested version against a default
///
/// `None` and `"latest"` select the default; anything else is used verbatim.
pub fn resolve_version(requested: Option<&str>, default: &str) -> String {
    match requested {
        None | Some(LATEST) => default.to_string(),
        Some(v) => v.to_string(),
    }
}

/// Strip a leading `v` for handlers that need a bare semantic version
pub fn bare_version(version: &str) -> String {
    version.strip_prefix('v').unwrap_or(version).to_string()
}

/// How a structured override combines with a component's default tree
///
/// | policy            | default | override | result                     |
/// |-------------------|---------|----------|----------------------------|
/// | `Replace`         | any     | none     | default                    |
/// | `Replace`         | any     | some     | override                   |
/// | `MergePreserving` | any     | none     | default                    |
/// | `MergePreserving` | none    | some     | override                   |
/// | `MergePreserving` | some    | some     | default deep-merged with override |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The override tree replaces the default wholesale
    Replace,
    /// The override tree is merged onto the default, keeping default-only keys
    MergePreserving,
}

impl MergePolicy {
    /// Combine a default tree with an optional override tree
    pub fn apply(
        self,
        default: Option<Map<String, Value>>,
        overrides: Option<&Map<String, Value>>,
    ) -> Option<Map<String, Value>> {
        match (self, default, overrides) {
            (_, default, None) => default,
            (MergePolicy::Replace, _, Some(src)) => Some(src.clone()),
            (MergePolicy::MergePreserving, None, Some(src)) => Some(src.clone()),
            (MergePolicy::MergePreserving, Some(mut dest), Some(src)) => {
                merge_preserving(&mut dest, src);
                Some(dest)
            }
        }
    }
}

/// Deep-merge `src` into `dest`
///
/// Objects merge recursively, every other value in `src` overwrites the one in
/// `dest`, and keys only present in `dest` are kept.
pub fn merge_preserving(dest: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, src_value) in src {
        match (dest.get_mut(key), src_value) {
            (Some(Value::Object(dest_obj)), Value::Object(src_obj)) => {
                merge_preserving(dest_obj, src_obj);
            }
            _ => {
                dest.insert(key.clone(), src_value.clone());
            }
        }
    }
}

/// Append `flag` to the list stored under `key`, once
///
/// A missing key becomes `[flag]`. A value that is not a list is left alone.
pub fn append_flag_once(tree: &mut Map<String, Value>, key: &str, flag: &str) {
    match tree.get_mut(key) {
        None => {
            tree.insert(key.to_string(), Value::Array(vec![Value::from(flag)]));
        }
        Some(Value::Array(items)) => {
            if !items.iter().any(|item| item.as_str() == Some(flag)) {
                items.push(Value::from(flag));
            }
        }
        Some(_) => {}
    }
}
