//! `hive`: drive tenant module reconciliation from the shell.
//!
//! Usage:
//!   hive create      <tenant> [--module <name>]
//!   hive status      <tenant> [--module <name>]
//!   hive repair      <tenant> [--module <name>]
//!   hive remove      <tenant> [--module <name>]
//!   hive reconcile   <tenant>
//!   hive orphans
//!   hive runcom      <tenant>
//!   hive set-version <tenant> <version>
//!   hive installed
//!   hive build       <tenant>
//!   hive last-build  <tenant>
//!
//! Results go to stdout as JSON; logs go to stderr. The exit status is
//! non-zero when any reported result is a failure.

mod engine;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hive_core::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::engine::{Engine, Op};

/// One directive per workspace crate; targets without a directive are off.
const DEFAULT_FILTER: &str = "hive_cli=info,hive_core=info,hive_registry=info,\
     mod_identity=info,mod_golang=info,mod_build=info";

#[derive(Parser)]
#[command(name = "hive", version, about = "Tenant module reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct Target {
    /// Tenant name
    pub tenant: String,
    /// Limit the operation to one registered module (e.g. linux, golang)
    #[arg(long)]
    pub module: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a tenant
    Create(Target),
    /// Report whether a tenant's modules are converged
    Status(Target),
    /// Converge a tenant's modules toward their desired state
    Repair(Target),
    /// Tear down a tenant
    Remove(Target),
    /// Status every module and repair the ones that are not ready
    Reconcile {
        tenant: String,
    },
    /// List principals left behind by partial creation or removal
    Orphans,
    /// Shell exports for the tenant's login profile
    Runcom {
        tenant: String,
    },
    /// Set the desired Go version for a tenant
    SetVersion {
        tenant: String,
        version: String,
    },
    /// List toolchain versions in the shared pool
    Installed,
    /// Run the tenant's build hook as the tenant
    Build {
        tenant: String,
    },
    /// Show the output persisted by the tenant's last build
    LastBuild {
        tenant: String,
    },
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let engine = Engine::start(&settings)?;

    let body = match cli.command {
        Commands::Create(t) => engine.lifecycle(Op::Create, &t),
        Commands::Status(t) => engine.lifecycle(Op::Status, &t),
        Commands::Repair(t) => engine.lifecycle(Op::Repair, &t),
        Commands::Remove(t) => engine.lifecycle(Op::Remove, &t),
        Commands::Reconcile { tenant } => engine.reconcile(&tenant),
        Commands::Orphans => engine.orphans(),
        Commands::Runcom { tenant } => engine.runcom(&tenant),
        Commands::SetVersion { tenant, version } => engine.set_version(&tenant, &version),
        Commands::Installed => engine.installed(),
        Commands::Build { tenant } => engine.build(&tenant),
        Commands::LastBuild { tenant } => engine.last_build(&tenant),
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    if body["status"] == "failure" {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_every_crate() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        let directives: Vec<&str> = DEFAULT_FILTER.split(',').collect();
        for target in ["hive_cli", "hive_core", "hive_registry", "mod_identity", "mod_golang", "mod_build"] {
            assert!(directives.contains(&format!("{target}=info").as_str()), "{target} missing");
        }
    }
}
