//! The `Stack` custom resource (`app.ksctl.com/v1`)

use ka_core::{StackRequest, parse_overrides};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer guarding uninstallation
pub const STACK_FINALIZER: &str = "finalizer.stack.app.ksctl.com";

/// Desired addon stack
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.ksctl.com",
    version = "v1",
    kind = "Stack",
    status = "StackStatus",
    shortname = "stk",
    printcolumn = r#"{"name":"Stack","type":"string","jsonPath":".spec.stackName"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.statusCode"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    /// Catalog id, e.g. `gitops-standard`
    pub stack_name: String,

    /// Components of the stack to leave alone
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable_components: Vec<String>,

    /// Per-component overrides, keyed by component id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "free_form_object")]
    pub overrides: Option<serde_json::Value>,
}

/// Observed state of a stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<StatusCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_of_failure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Working,
    Success,
    Failure,
}

impl StackStatus {
    pub fn working() -> Self {
        Self {
            status_code: Some(StatusCode::Working),
            reason_of_failure: None,
        }
    }

    pub fn success() -> Self {
        Self {
            status_code: Some(StatusCode::Success),
            reason_of_failure: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status_code: Some(StatusCode::Failure),
            reason_of_failure: Some(reason.into()),
        }
    }
}

fn free_form_object(_: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schema.into()
}

impl Stack {
    /// Build the request this resource describes
    pub fn request(&self) -> ka_core::Result<StackRequest> {
        StackRequest::new(self.spec.stack_name.clone())
            .with_disabled(self.spec.disable_components.iter().cloned())
            .with_overrides(self.spec.overrides.as_ref())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == STACK_FINALIZER)
    }

    /// Current status code, if any has been reported
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status.as_ref().and_then(|s| s.status_code)
    }

    /// Finalizers with ours added
    pub fn finalizers_with_ours(&self) -> Vec<String> {
        let mut finalizers = self.finalizers().to_vec();
        if !self.has_finalizer() {
            finalizers.push(STACK_FINALIZER.to_string());
        }
        finalizers
    }

    /// Finalizers with ours removed
    pub fn finalizers_without_ours(&self) -> Vec<String> {
        self.finalizers()
            .iter()
            .filter(|f| *f != STACK_FINALIZER)
            .cloned()
            .collect()
    }
}
