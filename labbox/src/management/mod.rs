//! Instance lifecycle management.

mod admission;
mod lifecycle;
mod locks;
mod manager;

pub use manager::{GatewayMode, InstanceManager, ManagerOptions};
