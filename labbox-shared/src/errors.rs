//! Error taxonomy for instance lifecycle operations.
//!
//! Every variant belongs to one [`ErrorKind`] category. Callers that only need
//! to decide how to react (HTTP status, retry, log level) match on the kind;
//! callers that need the detail match on the variant.

use serde::Serialize;
use thiserror::Error;

/// Result alias used across all labbox crates.
pub type LabboxResult<T> = Result<T, LabboxError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The target already exists (duplicate instance).
    Conflict,
    /// A system-wide quota has been reached.
    ResourceExhausted,
    /// A challenge, image, user, instance or workload is absent.
    NotFound,
    /// The workload runtime rejected or failed an operation.
    RuntimeFailure,
    /// An operation exceeded its deadline.
    Timeout,
    /// The request was malformed.
    InvalidInput,
    /// Storage, configuration or internal failure.
    Internal,
}

#[derive(Debug, Error)]
pub enum LabboxError {
    /// An instance for this (user, challenge) pair is already live.
    #[error("instance already exists: {0}")]
    AlreadyExists(String),

    /// Global instance quota reached.
    #[error("system busy: {live} of {max} instances in use")]
    SystemBusy { live: usize, max: usize },

    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The workload runtime has no workload with this id.
    #[error("workload not found: {0}")]
    WorkloadNotFound(String),

    /// Workload create/start/inspect/remove/pull failure.
    #[error("runtime: {0}")]
    Runtime(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl LabboxError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabboxError::AlreadyExists(_) => ErrorKind::Conflict,
            LabboxError::SystemBusy { .. } => ErrorKind::ResourceExhausted,
            LabboxError::ChallengeNotFound(_)
            | LabboxError::ImageNotFound(_)
            | LabboxError::InstanceNotFound(_)
            | LabboxError::UserNotFound(_)
            | LabboxError::WorkloadNotFound(_) => ErrorKind::NotFound,
            LabboxError::Runtime(_) => ErrorKind::RuntimeFailure,
            LabboxError::Timeout(_) => ErrorKind::Timeout,
            LabboxError::InvalidArgument(_) => ErrorKind::InvalidInput,
            LabboxError::Config(_) | LabboxError::Storage(_) | LabboxError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable numeric code reported to API clients.
    ///
    /// Codes in the 20000 range identify instance lifecycle outcomes and stay
    /// fixed across releases; the web front-end switches on them.
    pub fn code(&self) -> u32 {
        match self {
            LabboxError::AlreadyExists(_) => 20001,
            LabboxError::SystemBusy { .. } => 20002,
            LabboxError::ChallengeNotFound(_) => 20003,
            LabboxError::ImageNotFound(_) => 20004,
            LabboxError::InstanceNotFound(_) => 20005,
            LabboxError::UserNotFound(_) => 20006,
            LabboxError::WorkloadNotFound(_) => 20007,
            LabboxError::Timeout(_) => 20008,
            LabboxError::InvalidArgument(_) => 10400,
            LabboxError::Runtime(_) => 50001,
            LabboxError::Config(_) | LabboxError::Storage(_) | LabboxError::Internal(_) => 50000,
        }
    }

    /// Whether this is the runtime's "no such workload" answer.
    pub fn is_workload_not_found(&self) -> bool {
        matches!(self, LabboxError::WorkloadNotFound(_))
    }
}

impl From<std::io::Error> for LabboxError {
    fn from(err: std::io::Error) -> Self {
        LabboxError::Internal(format!("io: {err}"))
    }
}
