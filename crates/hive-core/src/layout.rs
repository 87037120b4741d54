//! Process settings and the on-disk layout shared with external tooling.
//!
//! Layout:
//!   {app_dir}/gohive_app_{tenant}          tenant home
//!   {app_dir}/gohive_app_{tenant}.data     tenant data directory
//!   {golang_dir}/go{version}               installed runtime
//!   {config_dir}/{tenant}.json             tenant module config

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::error::HiveError;

/// Prefix mapping a tenant name to its OS identity.
pub const APP_PREFIX: &str = "gohive_app_";
/// Shared group every tenant identity belongs to.
pub const APP_GROUP: &str = "gohive_app";
/// Suffix appended to the home path to form the data directory.
pub const DATA_SUFFIX: &str = ".data";

/// Longest tenant name whose unix name still fits the 32-byte user name limit.
pub const MAX_TENANT_LEN: usize = 32 - APP_PREFIX.len();

pub const DEFAULT_GOLANG_URL: &str = "https://dl.google.com/go/go{{VERSION}}.linux-amd64.tar.gz";

/// Host-level settings, read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub app_dir: PathBuf,
    pub golang_dir: PathBuf,
    pub gopath: PathBuf,
    pub config_dir: PathBuf,
    /// Login shell for tenant identities; transport-only.
    pub ssh_shell: String,
    /// Remote archive URL with a `{{VERSION}}` placeholder.
    pub golang_url: String,
    pub golang_dir_mode: u32,
    pub golang_dir_owner: Option<(u32, u32)>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_dir: "/srv/hive/apps".into(),
            golang_dir: "/srv/hive/golang".into(),
            gopath: "/srv/hive/gopath".into(),
            config_dir: "/srv/hive/config".into(),
            ssh_shell: "/usr/bin/git-shell".into(),
            golang_url: DEFAULT_GOLANG_URL.into(),
            golang_dir_mode: 0o755,
            golang_dir_owner: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary variable source; unset keys keep defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut s = Self::default();
        if let Some(v) = get("HIVE_APP_DIR") {
            s.app_dir = v.into();
        }
        if let Some(v) = get("HIVE_GOLANG_DIR") {
            s.golang_dir = v.into();
        }
        if let Some(v) = get("HIVE_GOPATH") {
            s.gopath = v.into();
        }
        if let Some(v) = get("HIVE_CONFIG_DIR") {
            s.config_dir = v.into();
        }
        if let Some(v) = get("HIVE_SSH_SHELL") {
            s.ssh_shell = v;
        }
        if let Some(v) = get("HIVE_GOLANG_URL") {
            if !v.contains("{{VERSION}}") {
                return Err(anyhow!("HIVE_GOLANG_URL must contain the {{{{VERSION}}}} placeholder: {v}"));
            }
            s.golang_url = v;
        }
        if let Some(v) = get("HIVE_GOLANG_DIR_MODE") {
            s.golang_dir_mode = u32::from_str_radix(v.trim_start_matches("0o"), 8)
                .with_context(|| format!("HIVE_GOLANG_DIR_MODE is not octal: {v}"))?;
        }
        if let Some(v) = get("HIVE_GOLANG_DIR_OWNER") {
            s.golang_dir_owner = Some(parse_owner(&v)?);
        }
        Ok(s)
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.app_dir)
    }
}

fn parse_owner(v: &str) -> Result<(u32, u32)> {
    let (uid, gid) = v
        .split_once(':')
        .ok_or_else(|| anyhow!("HIVE_GOLANG_DIR_OWNER must be uid:gid, got {v}"))?;
    let uid = uid.parse().with_context(|| format!("bad uid in {v}"))?;
    let gid = gid.parse().with_context(|| format!("bad gid in {v}"))?;
    Ok((uid, gid))
}

/// Tenant names become user names and path components: `[a-z0-9_-]`, not
/// starting with `-`, at most `MAX_TENANT_LEN` bytes.
pub fn check_tenant(name: &str) -> std::result::Result<(), HiveError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_TENANT_LEN
        && !name.starts_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(HiveError::InvalidName {
            kind: "tenant",
            value: name.to_string(),
        })
    }
}

/// Versions name a directory in the runtime pool and are substituted into the
/// download URL: `[A-Za-z0-9.+_-]`, no leading `.` or `-`, no `..`.
pub fn check_version(version: &str) -> std::result::Result<(), HiveError> {
    let valid = !version.is_empty()
        && !version.starts_with(['.', '-'])
        && !version.contains("..")
        && version
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(HiveError::InvalidName {
            kind: "version",
            value: version.to_string(),
        })
    }
}

/// Deterministic tenant naming and paths under the app root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    app_dir: PathBuf,
}

impl Layout {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
        }
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn unix_name(&self, tenant: &str) -> String {
        format!("{APP_PREFIX}{tenant}")
    }

    /// Inverse of `unix_name`; `None` for principals without the prefix.
    pub fn tenant_of<'a>(&self, unix_name: &'a str) -> Option<&'a str> {
        unix_name.strip_prefix(APP_PREFIX).filter(|t| !t.is_empty())
    }

    pub fn home_dir(&self, tenant: &str) -> PathBuf {
        self.app_dir.join(self.unix_name(tenant))
    }

    pub fn data_dir(&self, tenant: &str) -> PathBuf {
        self.app_dir
            .join(format!("{}{DATA_SUFFIX}", self.unix_name(tenant)))
    }
}
