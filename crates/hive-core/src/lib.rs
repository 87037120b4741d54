//! Module contract layer for the hive tenant provisioner.
//!
//! Defines the uniform lifecycle contract (`Module`), the result shapes
//! (`Report`, `StatusReport`), the error taxonomy (`HiveError`) and the narrow
//! host primitives every module is built on: command execution, HTTP fetch,
//! the per-tenant config store and the filesystem layout.
//!
//! Modules never touch `std::process` or the network directly. They go through
//! `CommandExecutor` and `Fetcher`, so tests can swap in `ScriptedExecutor`
//! and `StaticFetcher`.

pub mod error;
pub mod exec;
pub mod fetch;
pub mod layout;
pub mod module;
pub mod store;

pub use error::HiveError;
pub use exec::{CommandExecutor, CommandOutput, Invocation, ScriptedExecutor, SystemExecutor};
pub use fetch::{Fetcher, HttpFetcher, StaticFetcher};
pub use layout::{check_tenant, check_version, Layout, Settings};
pub use module::{render, render_error, ModuleState, Module, Report, StatusReport};
pub use store::{ConfigStore, FsConfigStore, MemoryConfigStore};
