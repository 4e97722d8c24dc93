//! Labbox Shared - types used by the core library, the CLI and test helpers.
//!
//! Holds the error taxonomy and the handful of constants that must agree
//! between the instance manager, the HTTP layer and the gateway.

pub mod constants;
pub mod errors;

pub use errors::{ErrorKind, LabboxError, LabboxResult};
