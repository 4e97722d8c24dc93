//! Labbox - ephemeral, per-user challenge environments.
//!
//! Each user gets a private, time-boxed workload per challenge. The crate
//! covers the whole lifecycle of such an instance:
//!
//! - [`management::InstanceManager`]: run, destroy, flag submission and
//!   restart recovery, with per-instance locking and a global quota
//! - [`runtime::WorkloadRuntime`]: adapter over the container engine
//!   (Docker via [`runtime::DockerRuntime`])
//! - [`expiry::ExpiryScheduler`]: delay queue that tears instances down when
//!   their lease elapses
//! - [`gateway`]: subdomain registry and the reverse proxy in front of it
//! - [`api`]: the HTTP handlers consumed by the web front-end
//! - [`db::Database`]: SQLite-backed record store

pub mod api;
pub mod catalog;
pub mod db;
pub mod expiry;
pub mod gateway;
pub mod instance;
pub mod logging;
pub mod management;
pub mod models;
pub mod options;
pub mod runtime;
pub mod util;

pub use labbox_shared::{ErrorKind, LabboxError, LabboxResult};

pub use db::Database;
pub use instance::{Instance, InstanceId, InstanceStatus, InstanceView};
pub use logging::init_logging;
pub use management::{InstanceManager, ManagerOptions};
pub use options::LabboxOptions;
pub use util::clock::{Clock, SystemClock};
