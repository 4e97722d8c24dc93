//! Workload runtime adapter.
//!
//! The instance manager only speaks [`WorkloadRuntime`]; the container engine
//! behind it is swappable. [`DockerRuntime`] talks to a Docker Engine.

mod docker;
pub mod spec;

use async_trait::async_trait;
use labbox_shared::errors::LabboxResult;

pub use docker::DockerRuntime;
pub use spec::{PublishedPort, WorkloadInspect, WorkloadSpec, parse_exposed};

/// Operations the instance lifecycle needs from a container engine.
///
/// Every method is safe to call concurrently for different workloads.
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Human-readable backend name, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Create (but do not start) a workload. Returns the runtime's id for it.
    async fn create(&self, spec: &WorkloadSpec) -> LabboxResult<String>;

    /// Start a created workload. Starting a running workload succeeds.
    async fn start(&self, id: &str) -> LabboxResult<()>;

    /// Current running state and published ports.
    ///
    /// # Errors
    ///
    /// `WorkloadNotFound` if the runtime has no such workload.
    async fn inspect(&self, id: &str) -> LabboxResult<WorkloadInspect>;

    /// Remove a workload, stopping it first when `force` is set.
    ///
    /// # Errors
    ///
    /// `WorkloadNotFound` if the runtime has no such workload. Callers that
    /// tear down treat this as success.
    async fn remove(&self, id: &str, force: bool) -> LabboxResult<()>;

    /// Pull an image reference so later creates do not block on it.
    async fn pull(&self, image: &str) -> LabboxResult<()>;
}
