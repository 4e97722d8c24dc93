//! Constants shared by the core library and the CLI.

/// Instance lifecycle timing defaults.
pub mod lifecycle {
    /// Interval between workload inspections while waiting for a published port.
    pub const PORT_POLL_INTERVAL_MS: u64 = 1_000;

    /// Upper bound on how long a workload may take to publish a port.
    pub const START_TIMEOUT_SECS: u64 = 120;

    /// Deadline for finding an unused subdomain.
    pub const SUBDOMAIN_ALLOCATION_TIMEOUT_MS: u64 = 5_000;

    /// Length of generated subdomain labels.
    pub const SUBDOMAIN_LENGTH: usize = 8;

    /// Prefix of dynamically generated flags (`flag{<uuid>}`).
    pub const DEFAULT_FLAG_PREFIX: &str = "flag";

    /// Environment variable carrying the flag into the workload.
    pub const FLAG_ENV_VAR: &str = "flag";
}

/// Gateway (subdomain reverse proxy) defaults.
pub mod gateway {
    /// Upstream dial timeout.
    pub const DIAL_TIMEOUT_SECS: u64 = 30;

    /// TCP keep-alive interval for upstream connections.
    pub const KEEP_ALIVE_SECS: u64 = 30;

    /// TLS handshake budget for upstream connections.
    pub const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

    /// Largest request body buffered before forwarding.
    pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;

    /// Protocol used for routes pointing at local workloads.
    pub const DEFAULT_PROTOCOL: &str = "http";
}

/// HTTP API conventions.
pub mod api {
    /// Header carrying the authenticated user id, set by the upstream auth layer.
    pub const USER_ID_HEADER: &str = "x-user-id";
}
