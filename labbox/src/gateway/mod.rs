//! Subdomain gateway.
//!
//! Each running instance in gateway mode gets a random subdomain label. The
//! [`SubdomainRouter`] maps labels to the workload's published address and the
//! proxy forwards `<label>.<domain>` requests there.

mod proxy;
mod router;

pub use proxy::{GatewayProxy, gateway_router, host_label};
pub use router::{App, RouteResolver, SubdomainRouter};
