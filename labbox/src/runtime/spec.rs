//! Workload creation parameters and inspection results.

use serde::{Deserialize, Serialize};

/// Everything the runtime needs to create one instance's workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Workload name; the instance id.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables as `(key, value)` pairs.
    pub env: Vec<(String, String)>,
    pub memory_bytes: i64,
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: i64,
    /// Container ports to publish, each bound to an ephemeral host port.
    /// Entries carry the protocol, e.g. `80/tcp`.
    pub ports: Vec<String>,
    /// Let the runtime delete the workload once it stops.
    pub auto_remove: bool,
}

impl WorkloadSpec {
    /// Convert fractional cores into nano-CPUs.
    pub fn nano_cpus_from_cores(cores: f64) -> i64 {
        (cores * 1e9).round() as i64
    }

    /// Convert MiB into bytes.
    pub fn bytes_from_mib(mib: u64) -> i64 {
        (mib as i64).saturating_mul(1024 * 1024)
    }

    /// `KEY=VALUE` strings, the form container engines take.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// A container port published on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPort {
    /// Container side, e.g. `80/tcp`.
    pub container_port: String,
    /// Host side; `0` while the runtime has not assigned one yet.
    pub host_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInspect {
    pub running: bool,
    pub ports: Vec<PublishedPort>,
}

impl WorkloadInspect {
    /// First assigned (non-zero) host port, in publication order.
    pub fn first_host_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .map(|p| p.host_port)
            .find(|port| *port != 0)
    }
}

/// Parse a comma separated port list (`"80, 8080/udp"`) into port specs.
///
/// Entries without a protocol default to `tcp`. Blank entries are skipped.
pub fn parse_exposed(exposed: &str) -> Vec<String> {
    exposed
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.contains('/') {
                p.to_string()
            } else {
                format!("{p}/tcp")
            }
        })
        .collect()
}
