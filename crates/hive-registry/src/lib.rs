//! Module registry: register lifecycle modules by name and drive them per tenant.
//!
//! Fan-out visits every registered module in registration order and reports
//! each module's result separately. A failing module does not stop the others;
//! there is no rollback across modules.

use std::sync::Arc;

use hive_core::{render, HiveError, Module, Report, StatusReport};
use serde::Serialize;

/// One module's result within a fan-out.
#[derive(Debug)]
pub struct ModuleOutcome<T> {
    pub module: &'static str,
    pub result: Result<T, HiveError>,
}

impl<T: Serialize> ModuleOutcome<T> {
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = render(&self.result);
        body["module"] = serde_json::Value::String(self.module.to_string());
        body
    }
}

/// Reconcile result for one module: what status saw, the repair if one ran,
/// and what status saw after a successful repair.
#[derive(Debug)]
pub struct Reconciled {
    pub module: &'static str,
    pub before: Result<StatusReport, HiveError>,
    pub repair: Option<Result<Report, HiveError>>,
    pub after: Option<Result<StatusReport, HiveError>>,
}

impl Reconciled {
    /// Ready by the last status taken. A repair that succeeds but leaves the
    /// module unready does not count.
    pub fn converged(&self) -> bool {
        let last = self.after.as_ref().unwrap_or(&self.before);
        matches!(last, Ok(s) if s.is_ready())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "module": self.module,
            "before": render(&self.before),
            "repair": self.repair.as_ref().map(render),
            "after": self.after.as_ref().map(render),
            "converged": self.converged(),
        })
    }
}

pub fn all_ok<T>(outcomes: &[ModuleOutcome<T>]) -> bool {
    outcomes.iter().all(|o| o.result.is_ok())
}

#[derive(Default)]
pub struct ModuleRegistry {
    inner: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { inner: vec![] }
    }

    pub fn register<M: Module + 'static>(&mut self, m: M) -> Result<(), HiveError> {
        self.register_arc(Arc::new(m))
    }

    pub fn register_arc(&mut self, m: Arc<dyn Module>) -> Result<(), HiveError> {
        if self.get(m.name()).is_some() {
            return Err(HiveError::DuplicateModule {
                name: m.name().to_string(),
            });
        }
        tracing::info!(module = m.name(), position = self.inner.len(), "registry.register");
        self.inner.push(m);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.inner.iter().find(|m| m.name() == name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn Module>, HiveError> {
        self.get(name).ok_or_else(|| HiveError::UnknownModule {
            name: name.to_string(),
        })
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.inner.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn fan_out<T>(
        &self,
        op: &'static str,
        tenant: &str,
        f: impl Fn(&dyn Module) -> Result<T, HiveError>,
    ) -> Vec<ModuleOutcome<T>> {
        self.inner
            .iter()
            .map(|m| {
                let result = f(m.as_ref());
                match &result {
                    Ok(_) => tracing::info!(op = op, tenant = %tenant, module = m.name(), "registry.op ok"),
                    Err(e) => tracing::warn!(op = op, tenant = %tenant, module = m.name(), code = e.code(), error = %e, "registry.op failed"),
                }
                ModuleOutcome {
                    module: m.name(),
                    result,
                }
            })
            .collect()
    }

    pub fn create(&self, tenant: &str) -> Vec<ModuleOutcome<Report>> {
        self.fan_out("create", tenant, |m| m.create(tenant))
    }

    pub fn status(&self, tenant: &str) -> Vec<ModuleOutcome<StatusReport>> {
        self.fan_out("status", tenant, |m| m.status(tenant))
    }

    pub fn repair(&self, tenant: &str) -> Vec<ModuleOutcome<Report>> {
        self.fan_out("repair", tenant, |m| m.repair(tenant))
    }

    pub fn remove(&self, tenant: &str) -> Vec<ModuleOutcome<Report>> {
        self.fan_out("remove", tenant, |m| m.remove(tenant))
    }

    pub fn list_orphaned(&self) -> Vec<ModuleOutcome<Vec<String>>> {
        self.fan_out("list_orphaned", "*", |m| m.list_orphaned())
    }

    /// Status every module; repair the ones that are not `Ready` and take
    /// status again after each successful repair.
    pub fn reconcile(&self, tenant: &str) -> Vec<Reconciled> {
        self.inner
            .iter()
            .map(|m| {
                let before = m.status(tenant);
                let needs_repair = !matches!(&before, Ok(s) if s.is_ready());
                let repair = needs_repair.then(|| m.repair(tenant));
                let after = matches!(repair, Some(Ok(_))).then(|| m.status(tenant));
                let r = Reconciled {
                    module: m.name(),
                    before,
                    repair,
                    after,
                };
                tracing::info!(
                    tenant = %tenant,
                    module = r.module,
                    repaired = r.repair.is_some(),
                    converged = r.converged(),
                    "registry.reconcile"
                );
                r
            })
            .collect()
    }

    /// Runcom lines of every module, concatenated in registration order.
    pub fn runcom(&self, tenant: &str) -> Vec<String> {
        self.inner.iter().flat_map(|m| m.runcom(tenant)).collect()
    }
}
