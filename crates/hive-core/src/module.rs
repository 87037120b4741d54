//! The lifecycle contract every module implements.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::HiveError;

/// Observed state of a module's resource for one tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    NonExistent,
    /// Present, but not matching the tenant's desired configuration.
    Mismatched,
    Ready,
}

/// Successful outcome of a mutating operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub detail: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub addenda: BTreeMap<String, String>,
}

impl Report {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            addenda: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.addenda.insert(key.to_string(), value.into());
        self
    }
}

/// Result of `Module::status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state: ModuleState,
    pub detail: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub addenda: BTreeMap<String, String>,
}

impl StatusReport {
    pub fn new(state: ModuleState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
            addenda: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.addenda.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModuleState::Ready
    }
}

/// The single trait every module implements.
///
/// - `create` fails with `AlreadyExists` if the resource is present and never
///   mutates in that case.
/// - `status` never mutates.
/// - `repair` converges toward desired configuration; success when already
///   converged.
/// - `remove` fails with `NonExistent` if there is nothing to remove and
///   otherwise always finishes its teardown, logging sub-step failures.
/// - `list_orphaned` reports drift; it never corrects it.
pub trait Module: Send + Sync {
    /// Registry key and config-store namespace, e.g. `"linux"`, `"golang"`.
    fn name(&self) -> &'static str;

    fn create(&self, tenant: &str) -> Result<Report, HiveError>;

    fn status(&self, tenant: &str) -> Result<StatusReport, HiveError>;

    fn repair(&self, tenant: &str) -> Result<Report, HiveError>;

    fn remove(&self, tenant: &str) -> Result<Report, HiveError>;

    fn list_orphaned(&self) -> Result<Vec<String>, HiveError>;

    /// Reserved: rename the tenant's underlying resource.
    fn rename(&self, _old: &str, _new: &str) -> Result<Report, HiveError> {
        Err(HiveError::Unimplemented {
            module: self.name().to_string(),
            operation: "rename",
        })
    }

    /// Shell lines this module contributes to the tenant's runcom.
    fn runcom(&self, _tenant: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Render any operation result in the structured success/failure shape.
pub fn render<T: Serialize>(result: &Result<T, HiveError>) -> serde_json::Value {
    match result {
        Ok(v) => {
            let mut body = serde_json::json!({ "status": "success" });
            match serde_json::to_value(v) {
                Ok(serde_json::Value::Object(fields)) => {
                    if let Some(obj) = body.as_object_mut() {
                        obj.extend(fields);
                    }
                }
                Ok(other) => body["result"] = other,
                Err(e) => return render_error(&HiveError::io("serialize result", e)),
            }
            body
        }
        Err(e) => render_error(e),
    }
}

pub fn render_error(err: &HiveError) -> serde_json::Value {
    err.to_json()
}
