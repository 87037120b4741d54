//! Identity module (`linux`): one isolated OS principal per tenant.
//!
//! A tenant maps to the user `gohive_app_<tenant>` with a private home under
//! the app root, a private `<home>.data` directory, a transport-only login
//! shell and membership in the shared `gohive_app` group. The group is what
//! `list_orphaned` enumerates.
//!
//! Status is positive confirmation: `Ready` only when the principal, the home
//! and the data directory all exist, `NonExistent` only when none of them
//! does. Anything in between is `Mismatched`, so a stray home directory is
//! still something `remove` cleans up.

use std::fs::DirBuilder;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use hive_core::exec::command_line;
use hive_core::layout::APP_GROUP;
use hive_core::{
    check_tenant, CommandExecutor, HiveError, Layout, Module, ModuleState, Report, Settings,
    StatusReport,
};

pub const MODULE: &str = "linux";

pub struct IdentityModule {
    layout: Layout,
    shell: String,
    exec: Arc<dyn CommandExecutor>,
}

/// What `status` found on the host.
struct Presence {
    principal: bool,
    home: bool,
    data: bool,
}

impl Presence {
    fn state(&self) -> ModuleState {
        match (self.principal, self.home, self.data) {
            (false, false, false) => ModuleState::NonExistent,
            (true, true, true) => ModuleState::Ready,
            _ => ModuleState::Mismatched,
        }
    }
}

impl IdentityModule {
    pub fn new(settings: &Settings, exec: Arc<dyn CommandExecutor>) -> Self {
        Self {
            layout: settings.layout(),
            shell: settings.ssh_shell.clone(),
            exec,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Ensure the shared group exists. Run once at startup; failure is fatal
    /// to the caller.
    pub fn ensure_group(&self) -> Result<(), HiveError> {
        self.checked("groupadd", &["-f", APP_GROUP])?;
        Ok(())
    }

    fn checked(&self, program: &str, args: &[&str]) -> Result<String, HiveError> {
        let out = self.exec.run(program, args);
        if out.success {
            Ok(out.combined())
        } else {
            Err(HiveError::command_failed(command_line(program, args), &out))
        }
    }

    fn principal_exists(&self, unix_name: &str) -> bool {
        self.exec.run("id", &["-u", unix_name]).success
    }

    fn presence(&self, tenant: &str) -> Presence {
        Presence {
            principal: self.principal_exists(&self.layout.unix_name(tenant)),
            home: self.layout.home_dir(tenant).is_dir(),
            data: self.layout.data_dir(tenant).is_dir(),
        }
    }

    fn provision_principal(&self, tenant: &str) -> Result<(), HiveError> {
        let unix_name = self.layout.unix_name(tenant);
        let base = self.layout.app_dir().to_string_lossy().into_owned();
        self.checked(
            "useradd",
            &[
                "-b", base.as_str(),
                "-m",
                "-s", self.shell.as_str(),
                "-g", APP_GROUP,
                "-K", "UMASK=0077",
                unix_name.as_str(),
            ],
        )?;
        tracing::info!(tenant = %tenant, unix_name = %unix_name, "identity.principal created");
        Ok(())
    }

    /// Create `path` with owner-only permissions and hand it to the tenant.
    fn private_dir(&self, tenant: &str, path: &Path) -> Result<(), HiveError> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
            .map_err(|e| HiveError::io(format!("create {}", path.display()), e))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| HiveError::io(format!("chmod {}", path.display()), e))?;
        let owner = format!("{}:{}", self.layout.unix_name(tenant), APP_GROUP);
        let target = path.to_string_lossy();
        self.checked("chown", &[owner.as_str(), target.as_ref()])?;
        Ok(())
    }

    fn remove_dir_best_effort(tenant: &str, path: &Path) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => tracing::info!(tenant = %tenant, path = %path.display(), "identity.dir removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(tenant = %tenant, path = %path.display(), error = %e, "identity.dir removal failed")
            }
        }
    }
}

impl Module for IdentityModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn create(&self, tenant: &str) -> Result<Report, HiveError> {
        check_tenant(tenant)?;
        if self.presence(tenant).state() != ModuleState::NonExistent {
            return Err(HiveError::AlreadyExists {
                module: MODULE.into(),
                tenant: tenant.into(),
            });
        }
        self.provision_principal(tenant)?;
        let data = self.layout.data_dir(tenant);
        self.private_dir(tenant, &data)?;
        tracing::info!(tenant = %tenant, "identity.create");
        Ok(Report::new(format!("created {}", self.layout.unix_name(tenant)))
            .with("home", self.layout.home_dir(tenant).display().to_string())
            .with("data", data.display().to_string()))
    }

    fn status(&self, tenant: &str) -> Result<StatusReport, HiveError> {
        check_tenant(tenant)?;
        let p = self.presence(tenant);
        let state = p.state();
        Ok(StatusReport::new(state, self.layout.unix_name(tenant))
            .with("principal", p.principal.to_string())
            .with("home", p.home.to_string())
            .with("data", p.data.to_string()))
    }

    fn repair(&self, tenant: &str) -> Result<Report, HiveError> {
        check_tenant(tenant)?;
        let p = self.presence(tenant);
        match p.state() {
            ModuleState::NonExistent => {
                return Err(HiveError::NonExistent {
                    module: MODULE.into(),
                    tenant: tenant.into(),
                })
            }
            ModuleState::Ready => return Ok(Report::new("already converged")),
            ModuleState::Mismatched => {}
        }

        let mut report = Report::new(format!("repaired {}", self.layout.unix_name(tenant)));
        if !p.principal {
            self.provision_principal(tenant)?;
            report = report.with("principal", "recreated");
        }
        if !self.layout.home_dir(tenant).is_dir() {
            self.private_dir(tenant, &self.layout.home_dir(tenant))?;
            report = report.with("home", "recreated");
        }
        if !p.data {
            self.private_dir(tenant, &self.layout.data_dir(tenant))?;
            report = report.with("data", "recreated");
        }
        tracing::info!(tenant = %tenant, "identity.repair");
        Ok(report)
    }

    fn remove(&self, tenant: &str) -> Result<Report, HiveError> {
        check_tenant(tenant)?;
        if self.presence(tenant).state() == ModuleState::NonExistent {
            return Err(HiveError::NonExistent {
                module: MODULE.into(),
                tenant: tenant.into(),
            });
        }

        let unix_name = self.layout.unix_name(tenant);
        let out = self.exec.run("userdel", &[unix_name.as_str()]);
        let principal = if out.success {
            "deleted"
        } else {
            // The principal may already be gone; the directories still go.
            tracing::warn!(tenant = %tenant, output = %out.combined(), "identity.userdel failed");
            "delete failed"
        };

        Self::remove_dir_best_effort(tenant, &self.layout.home_dir(tenant));
        Self::remove_dir_best_effort(tenant, &self.layout.data_dir(tenant));
        tracing::info!(tenant = %tenant, "identity.remove");
        Ok(Report::new(format!("removed {unix_name}")).with("principal", principal))
    }

    fn list_orphaned(&self) -> Result<Vec<String>, HiveError> {
        let members = self.checked("members", &[APP_GROUP])?;
        let mut orphans = Vec::new();
        for member in members.split_whitespace() {
            let Some(tenant) = self.layout.tenant_of(member) else {
                tracing::debug!(member = %member, "identity.orphans skipping foreign member");
                continue;
            };
            // A prefixed member that is not a valid tenant name cannot be managed.
            if check_tenant(tenant).is_err() || self.presence(tenant).state() != ModuleState::Ready {
                orphans.push(member.to_string());
            }
        }
        Ok(orphans)
    }
}
