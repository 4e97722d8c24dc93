//! In-memory [`WorkloadRuntime`] with failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use labbox::runtime::{PublishedPort, WorkloadInspect, WorkloadRuntime, WorkloadSpec};
use labbox_shared::errors::{LabboxError, LabboxResult};
use parking_lot::Mutex;

/// State of one fake workload.
#[derive(Debug, Clone)]
pub struct FakeWorkload {
    pub spec: WorkloadSpec,
    pub running: bool,
    /// Inspections left before the port shows up.
    pub polls_until_port: u32,
    pub host_port: u16,
}

#[derive(Debug, Default)]
struct Failures {
    create: Option<String>,
    start: Option<String>,
    remove: Option<String>,
    /// Workloads stop right after start.
    crash_on_start: bool,
    /// Workloads never publish a port.
    never_publish: bool,
    /// Inspections before a port shows up.
    port_delay_polls: u32,
    /// Latency added before `create` acts.
    create_delay: Option<Duration>,
    /// Latency added before each successive `remove` acts.
    remove_delays: VecDeque<Duration>,
}

/// Fake container engine.
///
/// Workloads are keyed by name; `create` returns the name as the id. Ports are
/// assigned sequentially from 32768.
#[derive(Debug)]
pub struct FakeRuntime {
    workloads: Mutex<HashMap<String, FakeWorkload>>,
    failures: Mutex<Failures>,
    removed: Mutex<Vec<String>>,
    pulled: Mutex<Vec<String>>,
    next_port: AtomicU16,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            workloads: Mutex::new(HashMap::new()),
            failures: Mutex::new(Failures::default()),
            removed: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
            next_port: AtomicU16::new(32768),
        }
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, message: &str) {
        self.failures.lock().create = Some(message.to_string());
    }

    pub fn fail_start(&self, message: &str) {
        self.failures.lock().start = Some(message.to_string());
    }

    pub fn fail_remove(&self, message: Option<&str>) {
        self.failures.lock().remove = message.map(str::to_string);
    }

    pub fn crash_on_start(&self) {
        self.failures.lock().crash_on_start = true;
    }

    pub fn never_publish(&self) {
        self.failures.lock().never_publish = true;
    }

    pub fn delay_port(&self, polls: u32) {
        self.failures.lock().port_delay_polls = polls;
    }

    pub fn slow_create(&self, delay: Option<Duration>) {
        self.failures.lock().create_delay = delay;
    }

    /// Delay the next removals, one entry per call, in order.
    pub fn delay_removes(&self, delays: &[Duration]) {
        self.failures.lock().remove_delays = delays.iter().copied().collect();
    }

    /// Undo every injected failure.
    pub fn clear_failures(&self) {
        *self.failures.lock() = Failures::default();
    }

    pub fn workload(&self, name: &str) -> Option<FakeWorkload> {
        self.workloads.lock().get(name).cloned()
    }

    pub fn workload_count(&self) -> usize {
        self.workloads.lock().len()
    }

    /// Drop a workload behind the manager's back, as auto-remove would.
    pub fn vanish(&self, name: &str) {
        self.workloads.lock().remove(name);
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().clone()
    }
}

#[async_trait]
impl WorkloadRuntime for FakeRuntime {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn create(&self, spec: &WorkloadSpec) -> LabboxResult<String> {
        let delay = self.failures.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failures = self.failures.lock();
        if let Some(message) = &failures.create {
            return Err(LabboxError::Runtime(message.clone()));
        }
        let mut workloads = self.workloads.lock();
        if workloads.contains_key(&spec.name) {
            return Err(LabboxError::Runtime(format!(
                "workload name {} already in use",
                spec.name
            )));
        }
        workloads.insert(
            spec.name.clone(),
            FakeWorkload {
                spec: spec.clone(),
                running: false,
                polls_until_port: failures.port_delay_polls,
                host_port: 0,
            },
        );
        Ok(spec.name.clone())
    }

    async fn start(&self, id: &str) -> LabboxResult<()> {
        let failures = self.failures.lock();
        if let Some(message) = &failures.start {
            return Err(LabboxError::Runtime(message.clone()));
        }
        let mut workloads = self.workloads.lock();
        let workload = workloads
            .get_mut(id)
            .ok_or_else(|| LabboxError::WorkloadNotFound(id.to_string()))?;
        workload.running = !failures.crash_on_start;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> LabboxResult<WorkloadInspect> {
        let never_publish = self.failures.lock().never_publish;
        let mut workloads = self.workloads.lock();
        let workload = workloads
            .get_mut(id)
            .ok_or_else(|| LabboxError::WorkloadNotFound(id.to_string()))?;

        if workload.running && !never_publish && workload.host_port == 0 {
            if workload.polls_until_port == 0 {
                workload.host_port = self.next_port.fetch_add(1, Ordering::SeqCst);
            } else {
                workload.polls_until_port -= 1;
            }
        }

        let ports = workload
            .spec
            .ports
            .iter()
            .enumerate()
            .map(|(i, port)| PublishedPort {
                container_port: port.clone(),
                host_port: if i == 0 { workload.host_port } else { 0 },
            })
            .collect();
        Ok(WorkloadInspect {
            running: workload.running,
            ports,
        })
    }

    async fn remove(&self, id: &str, _force: bool) -> LabboxResult<()> {
        let delay = self.failures.lock().remove_delays.pop_front();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failures.lock().remove {
            return Err(LabboxError::Runtime(message.clone()));
        }
        if self.workloads.lock().remove(id).is_none() {
            return Err(LabboxError::WorkloadNotFound(id.to_string()));
        }
        self.removed.lock().push(id.to_string());
        Ok(())
    }

    async fn pull(&self, image: &str) -> LabboxResult<()> {
        self.pulled.lock().push(image.to_string());
        Ok(())
    }
}
