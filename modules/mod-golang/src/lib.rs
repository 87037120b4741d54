//! Runtime module (`golang`): validates a tenant's Go toolchain against the
//! version it asked for, and installs missing versions into the shared pool.
//!
//! The desired version lives in the config store under `golang/version`;
//! the empty string means unset. Status compares by substring: desired
//! `1.21.0` matches `go version go1.21.0 linux/amd64`. Callers must not read
//! `Ready` as strict version equality.
//!
//! Environment wiring is not done here. `runcom` yields the exports a tenant's
//! shell sources to select its toolchain.

pub mod pool;

use std::path::PathBuf;
use std::sync::Arc;

use hive_core::{
    check_tenant, check_version, CommandExecutor, ConfigStore, Fetcher, HiveError, Layout,
    Module, ModuleState, Report, Settings, StatusReport,
};

pub use pool::{RuntimePool, GO_PREFIX};

pub const MODULE: &str = "golang";
pub const VERSION_KEY: &str = "version";
const VERSION_COMMAND: &str = "go version";

pub struct GolangModule {
    pool: RuntimePool,
    gopath: PathBuf,
    layout: Layout,
    store: Arc<dyn ConfigStore>,
    exec: Arc<dyn CommandExecutor>,
}

impl GolangModule {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn ConfigStore>,
        exec: Arc<dyn CommandExecutor>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            pool: RuntimePool::new(
                settings.golang_dir.clone(),
                settings.golang_url.clone(),
                exec.clone(),
                fetcher,
            ),
            gopath: settings.gopath.clone(),
            layout: settings.layout(),
            store,
            exec,
        }
    }

    pub fn pool(&self) -> &RuntimePool {
        &self.pool
    }

    /// Desired version, or `""` when never set.
    pub fn desired_version(&self, tenant: &str) -> String {
        self.store.get(tenant, MODULE, VERSION_KEY, "")
    }

    pub fn set_version(&self, tenant: &str, version: &str) -> Result<(), HiveError> {
        check_tenant(tenant)?;
        check_version(version)?;
        self.store.set(tenant, MODULE, VERSION_KEY, version)?;
        tracing::info!(tenant = %tenant, version = %version, "golang.version set");
        Ok(())
    }

    pub fn installed(&self) -> Result<Vec<String>, HiveError> {
        self.pool.installed()
    }

    /// Desired version of a valid tenant. A stored value that is not a valid
    /// version is rejected as well, since it comes from an editable document.
    fn required_version(&self, tenant: &str) -> Result<String, HiveError> {
        check_tenant(tenant)?;
        let version = self.desired_version(tenant);
        if version.is_empty() {
            return Err(HiveError::ConfigurationMissing {
                module: MODULE.into(),
                tenant: tenant.into(),
                key: VERSION_KEY.into(),
            });
        }
        check_version(&version)?;
        Ok(version)
    }
}

impl Module for GolangModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    /// Toolchains are shared; there is nothing to provision per tenant.
    fn create(&self, tenant: &str) -> Result<Report, HiveError> {
        check_tenant(tenant)?;
        Ok(Report::new("nothing to provision"))
    }

    fn status(&self, tenant: &str) -> Result<StatusReport, HiveError> {
        let version = self.required_version(tenant)?;

        if !self.pool.is_installed(&version)? {
            return Ok(StatusReport::new(
                ModuleState::NonExistent,
                format!("{GO_PREFIX}{version} is not installed"),
            )
            .with("Desired", version));
        }

        let unix_name = self.layout.unix_name(tenant);
        let out = self.exec.run_as(&unix_name, VERSION_COMMAND);
        let presented = out.combined();
        if !out.success {
            return Err(HiveError::command_failed(
                format!("runuser {unix_name} -l -c '{VERSION_COMMAND}'"),
                &out,
            ));
        }

        if presented.contains(&version) {
            Ok(StatusReport::new(ModuleState::Ready, presented))
        } else {
            Ok(StatusReport::new(ModuleState::Mismatched, presented.clone())
                .with("Desired", version)
                .with("Presented", presented))
        }
    }

    /// Installs the desired version when the pool lacks it. Does not touch the
    /// tenant's environment.
    fn repair(&self, tenant: &str) -> Result<Report, HiveError> {
        let version = self.required_version(tenant)?;
        if self.pool.is_installed(&version)? {
            return Ok(Report::new(format!("{GO_PREFIX}{version} already installed")));
        }
        self.pool.install(&version)
    }

    fn remove(&self, tenant: &str) -> Result<Report, HiveError> {
        check_tenant(tenant)?;
        Ok(Report::new("nothing to remove"))
    }

    /// Installed versions are shared, not owned by a tenant, so nothing here
    /// can be orphaned.
    fn list_orphaned(&self) -> Result<Vec<String>, HiveError> {
        Ok(Vec::new())
    }

    fn runcom(&self, tenant: &str) -> Vec<String> {
        let version = match self.required_version(tenant) {
            Ok(v) => v,
            Err(HiveError::ConfigurationMissing { .. }) => return Vec::new(),
            Err(e) => {
                tracing::warn!(tenant = %tenant, error = %e, "golang.runcom skipped");
                return Vec::new();
            }
        };
        vec![
            format!("export GOPATH={}", self.gopath.display()),
            format!("export GOROOT={}", self.pool.version_dir(&version).display()),
            "export PATH=$GOROOT/bin:$PATH".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{CommandOutput, MemoryConfigStore, ScriptedExecutor, StaticFetcher};
    use std::path::Path;

    fn settings(root: &Path) -> Settings {
        Settings {
            app_dir: root.join("apps"),
            golang_dir: root.join("golang"),
            gopath: root.join("gopath"),
            ..Settings::default()
        }
    }

    fn module(root: &Path, exec: ScriptedExecutor, fetcher: StaticFetcher) -> (GolangModule, Arc<StaticFetcher>) {
        let s = settings(root);
        RuntimePool::prepare(&s.golang_dir, 0o755, None).unwrap();
        let fetcher = Arc::new(fetcher);
        let m = GolangModule::new(&s, Arc::new(MemoryConfigStore::new()), Arc::new(exec), fetcher.clone());
        (m, fetcher)
    }

    fn go_version_reports(text: &'static str) -> ScriptedExecutor {
        ScriptedExecutor::new().on("runuser", move |args| {
            assert_eq!(args[1..], ["-l", "-c", "go version"]);
            CommandOutput::ok(text)
        })
    }

    #[test]
    fn status_without_desired_version_is_configuration_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(dir.path(), go_version_reports(""), StaticFetcher::ok(Vec::new()));
        let err = m.status("demo").unwrap_err();
        assert!(matches!(err, HiveError::ConfigurationMissing { ref key, .. } if key == "version"));
        assert!(matches!(m.repair("demo").unwrap_err(), HiveError::ConfigurationMissing { .. }));
    }

    #[test]
    fn status_matches_by_substring() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(
            dir.path(),
            go_version_reports("go version go1.21.0 linux/amd64\n"),
            StaticFetcher::ok(Vec::new()),
        );
        std::fs::create_dir(dir.path().join("golang/go1.21.0")).unwrap();
        m.set_version("demo", "1.21.0").unwrap();

        let s = m.status("demo").unwrap();
        assert_eq!(s.state, ModuleState::Ready);
        assert!(s.detail.contains("1.21.0"));
    }

    #[test]
    fn status_reports_mismatch_with_desired_and_presented() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(
            dir.path(),
            go_version_reports("go version go1.19.2 linux/amd64\n"),
            StaticFetcher::ok(Vec::new()),
        );
        std::fs::create_dir(dir.path().join("golang/go1.20.4")).unwrap();
        m.set_version("demo", "1.20.4").unwrap();

        let s = m.status("demo").unwrap();
        assert_eq!(s.state, ModuleState::Mismatched);
        assert_eq!(s.addenda["Desired"], "1.20.4");
        assert_eq!(s.addenda["Presented"], "go version go1.19.2 linux/amd64\n");
    }

    #[test]
    fn status_of_uninstalled_version_is_non_existent() {
        let dir = tempfile::tempdir().unwrap();
        let exec = go_version_reports("unused");
        let (m, _) = module(dir.path(), exec, StaticFetcher::ok(Vec::new()));
        m.set_version("demo", "1.20.4").unwrap();

        let s = m.status("demo").unwrap();
        assert_eq!(s.state, ModuleState::NonExistent);
        assert_eq!(s.addenda["Desired"], "1.20.4");
    }

    #[test]
    fn failing_version_command_is_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ScriptedExecutor::new()
            .on("runuser", |_| CommandOutput::failure(Some(127), "", "-bash: go: command not found\n"));
        let (m, _) = module(dir.path(), exec, StaticFetcher::ok(Vec::new()));
        std::fs::create_dir(dir.path().join("golang/go1.20.4")).unwrap();
        m.set_version("demo", "1.20.4").unwrap();

        let err = m.status("demo").unwrap_err();
        assert_eq!(err.code(), "Err.Exec.CommandFailed");
        assert!(err.diagnostic().contains("command not found"));
    }

    #[test]
    fn repair_twice_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ScriptedExecutor::new().on("tar", |args| {
            std::fs::create_dir_all(Path::new(&args[3]).join("bin")).unwrap();
            CommandOutput::ok("")
        });
        let (m, fetcher) = module(dir.path(), exec, StaticFetcher::ok(b"archive".to_vec()));
        m.set_version("demo", "1.20.4").unwrap();

        m.repair("demo").unwrap();
        let after_first = m.installed().unwrap();
        let second = m.repair("demo").unwrap();

        assert_eq!(fetcher.requests(), 1);
        assert_eq!(second.detail, "go1.20.4 already installed");
        assert_eq!(m.installed().unwrap(), after_first);
        assert_eq!(after_first, vec!["go1.20.4"]);
    }

    #[test]
    fn repair_surfaces_transfer_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(dir.path(), ScriptedExecutor::new(), StaticFetcher::with_status(500, Vec::new()));
        m.set_version("demo", "1.20.4").unwrap();
        assert_eq!(m.repair("demo").unwrap_err().code(), "Err.IO.TransferFailed");
        assert!(m.installed().unwrap().is_empty());
    }

    #[test]
    fn runcom_selects_desired_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(dir.path(), ScriptedExecutor::new(), StaticFetcher::ok(Vec::new()));
        assert!(m.runcom("demo").is_empty());

        m.set_version("demo", "1.20.4").unwrap();
        let lines = m.runcom("demo");
        assert_eq!(lines, m.runcom("demo"));
        assert_eq!(
            lines,
            vec![
                format!("export GOPATH={}", dir.path().join("gopath").display()),
                format!("export GOROOT={}", dir.path().join("golang/go1.20.4").display()),
                "export PATH=$GOROOT/bin:$PATH".to_string(),
            ]
        );
    }

    #[test]
    fn versions_and_tenants_outside_the_pool_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryConfigStore::new());
        let s = settings(dir.path());
        RuntimePool::prepare(&s.golang_dir, 0o755, None).unwrap();
        let fetcher = Arc::new(StaticFetcher::ok(b"archive".to_vec()));
        let m = GolangModule::new(&s, store.clone(), Arc::new(ScriptedExecutor::new()), fetcher.clone());

        let err = m.set_version("demo", "../x").unwrap_err();
        assert_eq!(err.code(), "Err.Input.InvalidName");
        assert!(m.set_version("../demo", "1.20.4").is_err());

        // A version written behind the module's back is still refused.
        store.set("demo", MODULE, VERSION_KEY, "../../x").unwrap();
        assert_eq!(m.repair("demo").unwrap_err().code(), "Err.Input.InvalidName");
        assert_eq!(m.status("demo").unwrap_err().code(), "Err.Input.InvalidName");
        assert!(m.runcom("demo").is_empty());
        assert_eq!(fetcher.requests(), 0);
        assert!(!dir.path().join("x").exists());
        assert!(m.status("x/../y").is_err());
    }

    #[test]
    fn create_and_remove_are_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = module(dir.path(), ScriptedExecutor::new(), StaticFetcher::ok(Vec::new()));
        assert!(m.create("demo").is_ok());
        assert!(m.remove("demo").is_ok());
        assert!(m.list_orphaned().unwrap().is_empty());
    }
}
