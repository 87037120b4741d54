//! Error taxonomy surfaced by every lifecycle operation.
//!
//! Each variant carries a stable `Err.<Area>.<Detail>` code, an actionable
//! hint, the diagnostic text callers should show, and optional structured
//! addenda. `to_json()` gives the failure shape rendered by front doors.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::exec::CommandOutput;

#[derive(Debug, Error)]
pub enum HiveError {
    #[error("{module}: resource for tenant '{tenant}' already exists")]
    AlreadyExists { module: String, tenant: String },

    #[error("{module}: no resource exists for tenant '{tenant}'")]
    NonExistent { module: String, tenant: String },

    #[error("{module}: setting '{key}' was never set for tenant '{tenant}'")]
    ConfigurationMissing {
        module: String,
        tenant: String,
        key: String,
    },

    #[error("command `{command}` failed")]
    ExternalCommandFailed {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("transfer of {url} failed: {reason}")]
    TransferFailed { url: String, reason: String },

    #[error("{context}: {message}")]
    Io { context: String, message: String },

    #[error("{module}: {operation} is not implemented")]
    Unimplemented {
        module: String,
        operation: &'static str,
    },

    #[error("module '{name}' is not registered")]
    UnknownModule { name: String },

    #[error("module '{name}' is already registered")]
    DuplicateModule { name: String },

    #[error("invalid {kind} name '{value}'")]
    InvalidName { kind: &'static str, value: String },
}

impl HiveError {
    /// Build an `ExternalCommandFailed` from the captured output of `command`.
    pub fn command_failed(command: impl Into<String>, output: &CommandOutput) -> Self {
        Self::ExternalCommandFailed {
            command: command.into(),
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        }
    }

    pub fn io(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Canonical machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "Err.Tenant.AlreadyExists",
            Self::NonExistent { .. } => "Err.Tenant.NonExistent",
            Self::ConfigurationMissing { .. } => "Err.Config.Missing",
            Self::ExternalCommandFailed { .. } => "Err.Exec.CommandFailed",
            Self::TransferFailed { .. } => "Err.IO.TransferFailed",
            Self::Io { .. } => "Err.IO.Local",
            Self::Unimplemented { .. } => "Err.Module.Unimplemented",
            Self::UnknownModule { .. } => "Err.Registry.UnknownModule",
            Self::DuplicateModule { .. } => "Err.Registry.DuplicateModule",
            Self::InvalidName { .. } => "Err.Input.InvalidName",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "The tenant is already provisioned for this module. Use status or repair instead of create.",
            Self::NonExistent { .. } => "Nothing is provisioned for this tenant. Run create first.",
            Self::ConfigurationMissing { .. } => "Set the desired value for this tenant (e.g. `hive set-version <tenant> <version>`) and retry.",
            Self::ExternalCommandFailed { .. } => "Inspect the captured output below; the host command exited with a failure status.",
            Self::TransferFailed { .. } => "Check that the version exists upstream and that the host can reach the download URL, then run repair again.",
            Self::Io { .. } => "Check permissions and free space on the affected path.",
            Self::Unimplemented { .. } => "This operation is reserved in the module contract but not provided by this module.",
            Self::UnknownModule { .. } => "Use one of the registered module names.",
            Self::DuplicateModule { .. } => "Each module name may be registered only once.",
            Self::InvalidName { .. } => "Tenant names use a-z, 0-9, '_' and '-'; versions use letters, digits, '.', '+', '_' and '-'.",
        }
    }

    /// Free-form diagnostic text. For failed commands this is the captured
    /// stdout followed by stderr, exactly as the command printed them.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::ExternalCommandFailed { stdout, stderr, .. } => {
                let mut text = stdout.clone();
                if !stdout.is_empty() && !stderr.is_empty() && !stdout.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(stderr);
                text
            }
            other => other.to_string(),
        }
    }

    pub fn addenda(&self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        match self {
            Self::AlreadyExists { module, tenant } | Self::NonExistent { module, tenant } => {
                m.insert("module".into(), module.clone());
                m.insert("tenant".into(), tenant.clone());
            }
            Self::ConfigurationMissing { module, tenant, key } => {
                m.insert("module".into(), module.clone());
                m.insert("tenant".into(), tenant.clone());
                m.insert("key".into(), key.clone());
            }
            Self::ExternalCommandFailed { command, .. } => {
                m.insert("command".into(), command.clone());
            }
            Self::TransferFailed { url, .. } => {
                m.insert("url".into(), url.clone());
            }
            Self::Io { context, .. } => {
                m.insert("context".into(), context.clone());
            }
            Self::Unimplemented { module, operation } => {
                m.insert("module".into(), module.clone());
                m.insert("operation".into(), (*operation).into());
            }
            Self::UnknownModule { name } | Self::DuplicateModule { name } => {
                m.insert("module".into(), name.clone());
            }
            Self::InvalidName { kind, value } => {
                m.insert("kind".into(), (*kind).into());
                m.insert("value".into(), value.clone());
            }
        }
        m
    }

    /// JSON body for front-door responses.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "failure",
            "reason": self.code(),
            "detail": self.diagnostic(),
            "hint": self.hint(),
            "addenda": self.addenda(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = HiveError::ConfigurationMissing {
            module: "golang".into(),
            tenant: "demo".into(),
            key: "version".into(),
        };
        assert_eq!(e.code(), "Err.Config.Missing");
        assert_eq!(
            HiveError::TransferFailed { url: "u".into(), reason: "HTTP 404".into() }.code(),
            "Err.IO.TransferFailed"
        );
    }

    #[test]
    fn command_failure_keeps_captured_output() {
        let out = CommandOutput::failure(Some(1), "partial\n", "tar: Error is not recoverable");
        let e = HiveError::command_failed("tar xf go.tmp", &out);
        assert_eq!(e.diagnostic(), "partial\ntar: Error is not recoverable");
        let j = e.to_json();
        assert_eq!(j["status"], "failure");
        assert_eq!(j["reason"], "Err.Exec.CommandFailed");
        assert_eq!(j["addenda"]["command"], "tar xf go.tmp");
    }

    #[test]
    fn every_variant_has_a_hint() {
        let errors = [
            HiveError::AlreadyExists { module: "m".into(), tenant: "t".into() },
            HiveError::NonExistent { module: "m".into(), tenant: "t".into() },
            HiveError::io("ctx", "boom"),
            HiveError::Unimplemented { module: "m".into(), operation: "rename" },
            HiveError::UnknownModule { name: "x".into() },
            HiveError::DuplicateModule { name: "x".into() },
            HiveError::InvalidName { kind: "tenant", value: "../x".into() },
        ];
        for e in &errors {
            assert!(e.hint().len() > 20, "{} hint too short", e.code());
        }
    }
}
