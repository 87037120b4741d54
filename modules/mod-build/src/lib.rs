//! Build trigger and last-build retrieval.
//!
//! The hook at `~/repo.git/hooks/post-update` is deployed by the tenant and
//! writes `lastbuild.stdout` / `lastbuild.stderr` into the tenant home. This
//! crate only runs the hook and reads those two files back.

use std::path::Path;
use std::sync::Arc;

use hive_core::{check_tenant, CommandExecutor, HiveError, Layout, Settings};
use serde::Serialize;

pub const HOOK: &str = "~/repo.git/hooks/post-update";
pub const LAST_STDOUT: &str = "lastbuild.stdout";
pub const LAST_STDERR: &str = "lastbuild.stderr";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastBuild {
    pub stdout: String,
    pub stderr: String,
}

pub struct BuildTrigger {
    layout: Layout,
    exec: Arc<dyn CommandExecutor>,
}

impl BuildTrigger {
    pub fn new(settings: &Settings, exec: Arc<dyn CommandExecutor>) -> Self {
        Self {
            layout: settings.layout(),
            exec,
        }
    }

    /// Run the tenant's build hook as the tenant. Output is kept on both
    /// outcomes; only the exit status decides which.
    pub fn trigger(&self, tenant: &str) -> Result<BuildOutput, HiveError> {
        check_tenant(tenant)?;
        let unix_name = self.layout.unix_name(tenant);
        tracing::info!(tenant = %tenant, user = %unix_name, "build.trigger");
        let out = self.exec.run_as(&unix_name, HOOK);
        if !out.success {
            tracing::warn!(tenant = %tenant, code = ?out.code, "build.trigger failed");
            return Err(HiveError::command_failed(
                format!("runuser {unix_name} -l -c {HOOK}"),
                &out,
            ));
        }
        Ok(BuildOutput {
            output: out.combined(),
        })
    }

    /// Read back what the last hook run persisted. Both files are attempted;
    /// every read error is reported together. Content is taken as-is, with
    /// invalid UTF-8 replaced rather than rejected.
    pub fn last_build(&self, tenant: &str) -> Result<LastBuild, HiveError> {
        check_tenant(tenant)?;
        let home = self.layout.home_dir(tenant);
        let stdout = read_artifact(&home, LAST_STDOUT);
        let stderr = read_artifact(&home, LAST_STDERR);
        match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => Ok(LastBuild { stdout, stderr }),
            (stdout, stderr) => {
                let message = [stdout.err(), stderr.err()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("\n");
                Err(HiveError::Io {
                    context: format!("read last build of {tenant}"),
                    message,
                })
            }
        }
    }
}

fn read_artifact(home: &Path, name: &str) -> Result<String, String> {
    let path = home.join(name);
    std::fs::read(&path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|e| format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{CommandOutput, ScriptedExecutor};

    fn settings(root: &Path) -> Settings {
        Settings {
            app_dir: root.to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn trigger_runs_hook_as_tenant_and_keeps_output() {
        let exec = Arc::new(
            ScriptedExecutor::new().on("runuser", |_| CommandOutput {
                success: true,
                code: Some(0),
                stdout: "building...\n".into(),
                stderr: "warning: unused variable\n".into(),
            }),
        );
        let b = BuildTrigger::new(&Settings::default(), exec.clone());

        let out = b.trigger("demo").unwrap();

        assert_eq!(out.output, "building...\nwarning: unused variable\n");
        assert_eq!(
            exec.calls_to("runuser"),
            vec![vec!["gohive_app_demo", "-l", "-c", HOOK]]
        );
    }

    #[test]
    fn failed_hook_carries_its_output() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on("runuser", |_| CommandOutput::failure(Some(1), "step 1 ok\n", "go: build failed\n")),
        );
        let b = BuildTrigger::new(&Settings::default(), exec);

        let err = b.trigger("demo").unwrap_err();

        assert_eq!(err.code(), "Err.Exec.CommandFailed");
        assert_eq!(err.diagnostic(), "step 1 ok\ngo: build failed\n");
    }

    #[test]
    fn last_build_returns_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("gohive_app_demo");
        std::fs::create_dir(&home).unwrap();
        std::fs::write(home.join(LAST_STDOUT), "ok\n").unwrap();
        std::fs::write(home.join(LAST_STDERR), "").unwrap();
        let b = BuildTrigger::new(&settings(dir.path()), Arc::new(ScriptedExecutor::new()));

        let last = b.last_build("demo").unwrap();

        assert_eq!(last, LastBuild { stdout: "ok\n".into(), stderr: String::new() });
    }

    #[test]
    fn last_build_tolerates_non_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("gohive_app_demo");
        std::fs::create_dir(&home).unwrap();
        std::fs::write(home.join(LAST_STDOUT), b"built \xff\xfe ok\n").unwrap();
        std::fs::write(home.join(LAST_STDERR), b"").unwrap();
        let b = BuildTrigger::new(&settings(dir.path()), Arc::new(ScriptedExecutor::new()));

        let last = b.last_build("demo").unwrap();

        assert!(last.stdout.starts_with("built "));
        assert!(last.stdout.ends_with(" ok\n"));
        assert!(last.stdout.contains('\u{FFFD}'));
    }

    #[test]
    fn invalid_tenant_never_reaches_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let b = BuildTrigger::new(&settings(dir.path()), exec.clone());

        assert_eq!(b.trigger("x; rm -rf ~").unwrap_err().code(), "Err.Input.InvalidName");
        assert_eq!(b.last_build("../other").unwrap_err().code(), "Err.Input.InvalidName");
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn last_build_joins_every_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let b = BuildTrigger::new(&settings(dir.path()), Arc::new(ScriptedExecutor::new()));

        let err = b.last_build("demo").unwrap_err();

        let HiveError::Io { message, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(LAST_STDOUT));
        assert!(lines[1].contains(LAST_STDERR));
    }

    #[test]
    fn one_missing_artifact_fails_the_read() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("gohive_app_demo");
        std::fs::create_dir(&home).unwrap();
        std::fs::write(home.join(LAST_STDOUT), "ok\n").unwrap();
        let b = BuildTrigger::new(&settings(dir.path()), Arc::new(ScriptedExecutor::new()));

        let err = b.last_build("demo").unwrap_err();

        assert_eq!(err.code(), "Err.IO.Local");
        assert!(!err.to_string().contains(LAST_STDOUT));
    }
}
