//! Wiring of the production host primitives into the registry, and the JSON
//! shapes each command prints.

use std::sync::Arc;

use anyhow::{Context, Result};
use hive_core::{
    render, render_error, CommandExecutor, FsConfigStore, HttpFetcher, Settings, SystemExecutor,
};
use hive_registry::{all_ok, ModuleOutcome, ModuleRegistry, Reconciled};
use mod_build::BuildTrigger;
use mod_golang::{GolangModule, RuntimePool};
use mod_identity::IdentityModule;
use serde::Serialize;
use serde_json::{json, Value};

use crate::Target;

#[derive(Clone, Copy, Debug)]
pub enum Op {
    Create,
    Status,
    Repair,
    Remove,
}

pub struct Engine {
    registry: ModuleRegistry,
    golang: Arc<GolangModule>,
    build: BuildTrigger,
}

impl Engine {
    /// Prepare host prerequisites and register modules in their fixed order:
    /// identity first, then runtime. Any failure here aborts the process.
    pub fn start(settings: &Settings) -> Result<Self> {
        RuntimePool::prepare(
            &settings.golang_dir,
            settings.golang_dir_mode,
            settings.golang_dir_owner,
        )
        .context("preparing runtime pool")?;

        let exec: Arc<dyn CommandExecutor> = Arc::new(SystemExecutor);
        let identity = IdentityModule::new(settings, exec.clone());
        identity.ensure_group().context("ensuring shared group")?;

        let fetcher = Arc::new(HttpFetcher::new().context("building http client")?);
        let store = Arc::new(FsConfigStore::new(&settings.config_dir));
        let golang = Arc::new(GolangModule::new(settings, store, exec.clone(), fetcher));

        let mut registry = ModuleRegistry::new();
        registry.register(identity)?;
        registry.register_arc(golang.clone())?;
        tracing::info!(modules = ?registry.names(), "hive.start");

        Ok(Self {
            registry,
            golang,
            build: BuildTrigger::new(settings, exec),
        })
    }

    pub fn lifecycle(&self, op: Op, target: &Target) -> Value {
        let tenant = target.tenant.as_str();
        let Some(name) = &target.module else {
            return match op {
                Op::Create => outcomes(tenant, &self.registry.create(tenant)),
                Op::Status => outcomes(tenant, &self.registry.status(tenant)),
                Op::Repair => outcomes(tenant, &self.registry.repair(tenant)),
                Op::Remove => outcomes(tenant, &self.registry.remove(tenant)),
            };
        };

        let module = match self.registry.require(name) {
            Ok(m) => m,
            Err(e) => return render_error(&e),
        };
        let mut body = match op {
            Op::Create => render(&module.create(tenant)),
            Op::Status => render(&module.status(tenant)),
            Op::Repair => render(&module.repair(tenant)),
            Op::Remove => render(&module.remove(tenant)),
        };
        body["module"] = json!(module.name());
        body["tenant"] = json!(tenant);
        body
    }

    pub fn reconcile(&self, tenant: &str) -> Value {
        let results = self.registry.reconcile(tenant);
        let converged = results.iter().all(Reconciled::converged);
        json!({
            "status": if converged { "success" } else { "failure" },
            "tenant": tenant,
            "modules": results.iter().map(Reconciled::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn orphans(&self) -> Value {
        let results = self.registry.list_orphaned();
        json!({
            "status": status_of(&results),
            "modules": results.iter().map(ModuleOutcome::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn runcom(&self, tenant: &str) -> Value {
        json!({
            "status": "success",
            "tenant": tenant,
            "lines": self.registry.runcom(tenant),
        })
    }

    pub fn set_version(&self, tenant: &str, version: &str) -> Value {
        let result = self
            .golang
            .set_version(tenant, version)
            .map(|()| json!({ "tenant": tenant, "version": version }));
        render(&result)
    }

    pub fn installed(&self) -> Value {
        render(&self.golang.installed().map(|v| json!({ "installed": v })))
    }

    pub fn build(&self, tenant: &str) -> Value {
        render(&self.build.trigger(tenant))
    }

    pub fn last_build(&self, tenant: &str) -> Value {
        render(&self.build.last_build(tenant))
    }
}

fn status_of<T>(results: &[ModuleOutcome<T>]) -> &'static str {
    if all_ok(results) {
        "success"
    } else {
        "failure"
    }
}

fn outcomes<T: Serialize>(tenant: &str, results: &[ModuleOutcome<T>]) -> Value {
    json!({
        "status": status_of(results),
        "tenant": tenant,
        "modules": results.iter().map(ModuleOutcome::to_json).collect::<Vec<_>>(),
    })
}
