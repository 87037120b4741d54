//! Shared runtime pool: one directory per installed toolchain version.
//!
//! Layout:
//!   {root}/go{version}/        extracted toolchain (top-level component stripped)
//!   {root}/go{version}.tmp     download in flight; never outlives `install`
//!
//! A version directory is only left behind by an extraction that succeeded.
//! Concurrent installs of the same version are not locked against each other:
//! whichever installer creates the version directory first extracts into it,
//! and any later installer that finds the directory already present reports
//! success without extracting again.

use std::fs::{File, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hive_core::exec::command_line;
use hive_core::{check_version, CommandExecutor, Fetcher, HiveError, Report};

/// Directory-name prefix of installed versions.
pub const GO_PREFIX: &str = "go";
const VERSION_PLACEHOLDER: &str = "{{VERSION}}";

pub struct RuntimePool {
    root: PathBuf,
    url_template: String,
    exec: Arc<dyn CommandExecutor>,
    fetcher: Arc<dyn Fetcher>,
}

impl RuntimePool {
    pub fn new(
        root: impl Into<PathBuf>,
        url_template: impl Into<String>,
        exec: Arc<dyn CommandExecutor>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            root: root.into(),
            url_template: url_template.into(),
            exec,
            fetcher,
        }
    }

    /// Create the pool root with the given mode and owner. The process cannot
    /// run safely without it, so callers abort startup on error.
    pub fn prepare(root: &Path, mode: u32, owner: Option<(u32, u32)>) -> Result<(), HiveError> {
        std::fs::create_dir_all(root)
            .map_err(|e| HiveError::io(format!("create {}", root.display()), e))?;
        std::fs::set_permissions(root, Permissions::from_mode(mode))
            .map_err(|e| HiveError::io(format!("chmod {}", root.display()), e))?;
        if let Some((uid, gid)) = owner {
            std::os::unix::fs::chown(root, Some(uid), Some(gid))
                .map_err(|e| HiveError::io(format!("chown {}", root.display()), e))?;
        }
        tracing::info!(root = %root.display(), mode = %format!("{mode:o}"), "golang.pool ready");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(format!("{GO_PREFIX}{version}"))
    }

    /// Deterministic per-version download path inside the pool.
    pub fn temp_path(&self, version: &str) -> PathBuf {
        self.root.join(format!("{GO_PREFIX}{version}.tmp"))
    }

    pub fn url_for(&self, version: &str) -> String {
        self.url_template.replace(VERSION_PLACEHOLDER, version)
    }

    /// Names of installed version directories (`go1.20.4`, …), sorted.
    pub fn installed(&self) -> Result<Vec<String>, HiveError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| HiveError::io(format!("list {}", self.root.display()), e))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(GO_PREFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn is_installed(&self, version: &str) -> Result<bool, HiveError> {
        check_version(version)?;
        let wanted = format!("{GO_PREFIX}{version}");
        Ok(self.installed()?.iter().any(|n| *n == wanted))
    }

    /// Download and extract `version` into the pool.
    pub fn install(&self, version: &str) -> Result<Report, HiveError> {
        check_version(version)?;
        let url = self.url_for(version);
        let mut tmp = TempDownload::create(self.temp_path(version))?;
        tracing::info!(version = %version, url = %url, tmp = %tmp.path.display(), "golang.install.start");

        let bytes = self.fetcher.fetch_to(&url, &mut tmp.file)?;

        let out_dir = self.version_dir(version);
        match std::fs::create_dir(&out_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::info!(version = %version, "golang.install.skip (installed concurrently)");
                return Ok(Report::new(format!("{GO_PREFIX}{version} already installed"))
                    .with("extracted", "skipped"));
            }
            Err(e) => {
                return Err(HiveError::ExternalCommandFailed {
                    command: format!("mkdir {}", out_dir.display()),
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }

        let tmp_arg = tmp.path.to_string_lossy().into_owned();
        let out_arg = out_dir.to_string_lossy().into_owned();
        let args = ["xf", tmp_arg.as_str(), "-C", out_arg.as_str(), "--strip-components", "1"];
        let out = self.exec.run("tar", &args);
        if !out.success {
            if let Err(e) = std::fs::remove_dir_all(&out_dir) {
                tracing::warn!(dir = %out_dir.display(), error = %e, "golang.install partial tree not removed");
            }
            return Err(HiveError::command_failed(command_line("tar", &args), &out));
        }

        tracing::info!(version = %version, bytes = bytes, dir = %out_dir.display(), "golang.install.done");
        Ok(Report::new(format!("installed {GO_PREFIX}{version}"))
            .with("path", out_arg)
            .with("bytes", bytes.to_string()))
    }
}

/// Download target that is removed when dropped, whatever the outcome.
struct TempDownload {
    path: PathBuf,
    file: File,
}

impl TempDownload {
    fn create(path: PathBuf) -> Result<Self, HiveError> {
        let file = File::create(&path)
            .map_err(|e| HiveError::io(format!("create {}", path.display()), e))?;
        Ok(Self { path, file })
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(tmp = %self.path.display(), error = %e, "golang.install temp file not removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{CommandOutput, ScriptedExecutor, StaticFetcher};

    /// tar double: checks the download is complete, then lays out a toolchain.
    fn extracting_tar() -> ScriptedExecutor {
        ScriptedExecutor::new().on("tar", |args| {
            let archive = std::fs::read(&args[1]).unwrap();
            assert_eq!(archive, b"go-archive");
            let dest = PathBuf::from(&args[3]);
            std::fs::create_dir_all(dest.join("bin")).unwrap();
            std::fs::write(dest.join("bin/go"), b"#!/bin/sh\n").unwrap();
            CommandOutput::ok("")
        })
    }

    fn pool(root: &Path, exec: ScriptedExecutor, fetcher: StaticFetcher) -> (RuntimePool, Arc<ScriptedExecutor>, Arc<StaticFetcher>) {
        let exec = Arc::new(exec);
        let fetcher = Arc::new(fetcher);
        let p = RuntimePool::new(
            root,
            "http://mirror.local/go{{VERSION}}.linux-amd64.tar.gz",
            exec.clone(),
            fetcher.clone(),
        );
        (p, exec, fetcher)
    }

    #[test]
    fn install_extracts_with_strip_and_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let (p, exec, fetcher) = pool(dir.path(), extracting_tar(), StaticFetcher::ok(b"go-archive".to_vec()));

        let report = p.install("1.20.4").unwrap();

        assert_eq!(report.addenda["bytes"], "10");
        assert_eq!(fetcher.requests(), 1);
        assert!(dir.path().join("go1.20.4/bin/go").is_file());
        assert!(!dir.path().join("go1.20.4.tmp").exists());
        let tar = exec.calls_to("tar");
        assert_eq!(tar[0][0], "xf");
        assert!(tar[0][1].ends_with("go1.20.4.tmp"));
        assert_eq!(tar[0][4..], ["--strip-components", "1"]);
        assert_eq!(p.installed().unwrap(), vec!["go1.20.4".to_string()]);
    }

    #[test]
    fn non_200_leaves_no_version_dir_and_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let (p, exec, _) = pool(dir.path(), extracting_tar(), StaticFetcher::with_status(404, Vec::new()));

        let err = p.install("9.9.9").unwrap_err();

        assert!(matches!(err, HiveError::TransferFailed { ref url, .. } if url.ends_with("go9.9.9.linux-amd64.tar.gz")));
        assert!(!dir.path().join("go9.9.9").exists());
        assert!(!dir.path().join("go9.9.9.tmp").exists());
        assert!(exec.calls_to("tar").is_empty());
    }

    #[test]
    fn failed_extraction_is_command_failure_without_final_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ScriptedExecutor::new().on("tar", |_| {
            CommandOutput::failure(Some(2), "", "gzip: stdin: not in gzip format\ntar: Error is not recoverable")
        });
        let (p, _, _) = pool(dir.path(), exec, StaticFetcher::ok(b"html error page".to_vec()));

        let err = p.install("1.21.0").unwrap_err();

        assert_eq!(err.code(), "Err.Exec.CommandFailed");
        assert!(err.diagnostic().contains("not in gzip format"));
        assert!(!dir.path().join("go1.21.0").exists());
        assert!(!dir.path().join("go1.21.0.tmp").exists());
    }

    #[test]
    fn existing_version_dir_is_success_without_reextracting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("go1.20.4")).unwrap();
        let (p, exec, _) = pool(dir.path(), extracting_tar(), StaticFetcher::ok(b"go-archive".to_vec()));

        let report = p.install("1.20.4").unwrap();

        assert_eq!(report.addenda["extracted"], "skipped");
        assert!(exec.calls_to("tar").is_empty());
        assert!(!dir.path().join("go1.20.4.tmp").exists());
    }

    #[test]
    fn install_refuses_versions_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("golang");
        std::fs::create_dir(&root).unwrap();
        let (p, exec, fetcher) = pool(&root, extracting_tar(), StaticFetcher::ok(b"go-archive".to_vec()));

        let err = p.install("/../../x").unwrap_err();

        assert_eq!(err.code(), "Err.Input.InvalidName");
        assert_eq!(fetcher.requests(), 0);
        assert!(exec.calls().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn installed_lists_only_prefixed_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("go1.19")).unwrap();
        std::fs::create_dir(dir.path().join("go1.21.0")).unwrap();
        std::fs::create_dir(dir.path().join("node18")).unwrap();
        std::fs::write(dir.path().join("go1.22.tmp"), b"").unwrap();
        let (p, _, _) = pool(dir.path(), ScriptedExecutor::new(), StaticFetcher::ok(Vec::new()));

        assert_eq!(p.installed().unwrap(), vec!["go1.19", "go1.21.0"]);
        assert!(p.is_installed("1.19").unwrap());
        assert!(!p.is_installed("1.22").unwrap());
    }

    #[test]
    fn prepare_creates_root_with_mode() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pool/golang");
        RuntimePool::prepare(&root, 0o750, None).unwrap();
        let mode = std::fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
