//! Config Store: per-(tenant, module, key) string settings.
//!
//! `FsConfigStore` keeps one JSON document per tenant:
//!   {root}/{tenant}.json  ->  {"golang": {"version": "1.20.4"}}
//! Writes are single-key read-modify-write under a process-wide lock; there is
//! no transactionality beyond that.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::HiveError;
use crate::layout::check_tenant;

type TenantDoc = BTreeMap<String, BTreeMap<String, String>>;

pub trait ConfigStore: Send + Sync {
    fn get(&self, tenant: &str, module: &str, key: &str, default: &str) -> String;
    fn set(&self, tenant: &str, module: &str, key: &str, value: &str) -> Result<(), HiveError>;
}

// ---------------------------------------------------------------------------
// MemoryConfigStore
// ---------------------------------------------------------------------------

/// In-memory store for tests and development.
#[derive(Default)]
pub struct MemoryConfigStore {
    items: Mutex<BTreeMap<(String, String, String), String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, tenant: &str, module: &str, key: &str, default: &str) -> String {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant.to_string(), module.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&self, tenant: &str, module: &str, key: &str, value: &str) -> Result<(), HiveError> {
        check_tenant(tenant)?;
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (tenant.to_string(), module.to_string(), key.to_string()),
                value.to_string(),
            );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FsConfigStore
// ---------------------------------------------------------------------------

pub struct FsConfigStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FsConfigStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn tenant_path(&self, tenant: &str) -> PathBuf {
        self.root.join(format!("{tenant}.json"))
    }

    fn load(&self, tenant: &str) -> Result<TenantDoc, HiveError> {
        check_tenant(tenant)?;
        let path = self.tenant_path(tenant);
        if !path.exists() {
            return Ok(TenantDoc::new());
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| HiveError::io(format!("read {}", path.display()), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HiveError::io(format!("parse {}", path.display()), e))
    }
}

impl ConfigStore for FsConfigStore {
    fn get(&self, tenant: &str, module: &str, key: &str, default: &str) -> String {
        match self.load(tenant) {
            Ok(doc) => doc
                .get(module)
                .and_then(|m| m.get(key))
                .cloned()
                .unwrap_or_else(|| default.to_string()),
            Err(e) => {
                tracing::warn!(tenant = %tenant, module = %module, key = %key, error = %e, "config.get fell back to default");
                default.to_string()
            }
        }
    }

    fn set(&self, tenant: &str, module: &str, key: &str, value: &str) -> Result<(), HiveError> {
        check_tenant(tenant)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.load(tenant)?;
        doc.entry(module.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());

        std::fs::create_dir_all(&self.root)
            .map_err(|e| HiveError::io(format!("create {}", self.root.display()), e))?;
        let path = self.tenant_path(tenant);
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| HiveError::io("serialize tenant config", e))?;
        std::fs::write(&path, bytes)
            .map_err(|e| HiveError::io(format!("write {}", path.display()), e))?;
        tracing::debug!(tenant = %tenant, module = %module, key = %key, "config.set");
        Ok(())
    }
}
