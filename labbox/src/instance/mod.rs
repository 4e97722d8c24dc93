//! Instance records and their lifecycle state machine.

mod state;
mod types;

pub use state::InstanceStatus;
pub use types::{Instance, InstanceId, InstanceView};
