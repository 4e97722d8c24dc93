//! Service configuration.
//!
//! Loaded from a YAML file; every field has a default so an empty file is a
//! valid (gateway-less, quota-less) configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use labbox_shared::constants::lifecycle::{
    DEFAULT_FLAG_PREFIX, PORT_POLL_INTERVAL_MS, START_TIMEOUT_SECS,
    SUBDOMAIN_ALLOCATION_TIMEOUT_MS, SUBDOMAIN_LENGTH,
};
use labbox_shared::errors::{LabboxError, LabboxResult};
use serde::{Deserialize, Serialize};

use crate::management::{GatewayMode, ManagerOptions};

// ============================================================================
// Gateway Options
// ============================================================================

/// Subdomain gateway settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayOptions {
    /// Expose instances at `<label>.<domain>` instead of raw host ports.
    pub enabled: bool,

    /// Listen address of the gateway proxy.
    pub addr: String,

    /// Parent domain of generated subdomains, e.g. `ctf.example.com`.
    pub domain: String,

    /// Advertise `https://` access URLs (TLS terminated in front of the gateway).
    pub https: bool,

    /// Characters in a generated subdomain label.
    pub subdomain_length: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:8081".to_string(),
            domain: String::new(),
            https: false,
            subdomain_length: SUBDOMAIN_LENGTH,
        }
    }
}

// ============================================================================
// Runtime Options
// ============================================================================

/// Workload runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Docker Engine endpoint. Empty uses `DOCKER_HOST` or the local socket.
    pub docker_host: String,

    /// Address the gateway dials to reach published ports.
    pub bind_host: String,

    /// Interval between port polls while an instance boots.
    pub poll_interval_ms: u64,

    /// Give up on a booting instance after this long.
    pub start_timeout_secs: u64,

    /// Deadline for finding a free subdomain.
    pub allocation_timeout_ms: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            docker_host: String::new(),
            bind_host: "127.0.0.1".to_string(),
            poll_interval_ms: PORT_POLL_INTERVAL_MS,
            start_timeout_secs: START_TIMEOUT_SECS,
            allocation_timeout_ms: SUBDOMAIN_ALLOCATION_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Log Options
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Directory for daily-rotated log files. Stderr only when unset.
    pub dir: Option<PathBuf>,

    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// Labbox Options
// ============================================================================

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabboxOptions {
    /// Listen address of the HTTP API.
    pub listen: String,

    /// SQLite database file.
    pub database: PathBuf,

    /// Maximum number of live instances; `0` means unlimited.
    pub max_instances: usize,

    /// Prefix of dynamically generated flags.
    pub flag_prefix: String,

    pub gateway: GatewayOptions,
    pub runtime: RuntimeOptions,
    pub log: LogOptions,
}

impl Default for LabboxOptions {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            database: PathBuf::from("labbox.db"),
            max_instances: 0,
            flag_prefix: DEFAULT_FLAG_PREFIX.to_string(),
            gateway: GatewayOptions::default(),
            runtime: RuntimeOptions::default(),
            log: LogOptions::default(),
        }
    }
}

impl LabboxOptions {
    /// Read and validate a YAML config file.
    pub fn load(path: &Path) -> LabboxResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LabboxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
            .map_err(|e| LabboxError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> LabboxResult<Self> {
        // An empty document deserializes to unit, not an empty map.
        let options: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| LabboxError::Config(e.to_string()))?
        };
        options.validate()?;
        Ok(options)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// `Config` if the gateway is enabled without a domain, or the label
    /// length or a timing parameter is zero.
    pub fn validate(&self) -> LabboxResult<()> {
        if self.gateway.enabled && self.gateway.domain.trim().is_empty() {
            return Err(LabboxError::Config(
                "gateway.domain is required when the gateway is enabled".to_string(),
            ));
        }
        if self.gateway.enabled && self.gateway.domain.starts_with('.') {
            return Err(LabboxError::Config(
                "gateway.domain must not start with '.'".to_string(),
            ));
        }
        if self.gateway.subdomain_length == 0 {
            return Err(LabboxError::Config(
                "gateway.subdomain_length must be positive".to_string(),
            ));
        }
        if self.runtime.poll_interval_ms == 0 {
            return Err(LabboxError::Config(
                "runtime.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.runtime.start_timeout_secs == 0 {
            return Err(LabboxError::Config(
                "runtime.start_timeout_secs must be positive".to_string(),
            ));
        }
        if self.runtime.allocation_timeout_ms == 0 {
            return Err(LabboxError::Config(
                "runtime.allocation_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Lifecycle settings for the instance manager.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            max_instances: self.max_instances,
            flag_prefix: self.flag_prefix.clone(),
            gateway: self.gateway.enabled.then(|| GatewayMode {
                domain: self.gateway.domain.clone(),
                https: self.gateway.https,
            }),
            bind_host: self.runtime.bind_host.clone(),
            poll_interval: Duration::from_millis(self.runtime.poll_interval_ms),
            start_timeout: Duration::from_secs(self.runtime.start_timeout_secs),
            allocation_timeout: Duration::from_millis(self.runtime.allocation_timeout_ms),
            subdomain_length: self.gateway.subdomain_length,
        }
    }
}
