//! Lease expiry.
//!
//! Each live instance holds a lease; when it elapses the registered callback
//! tears the instance down.

mod scheduler;

pub use scheduler::{ExpiryCallback, ExpiryScheduler};
