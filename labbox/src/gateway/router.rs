//! Process-local route registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use labbox_shared::constants::gateway::DEFAULT_PROTOCOL;

/// Upstream a subdomain forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// `host:port` of the published workload.
    pub host: String,
    /// URL scheme used to reach it (`http` or `https`).
    pub protocol: String,
}

impl App {
    /// Plain-HTTP upstream at `host`.
    pub fn http(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }

    /// Base URL of the upstream, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }
}

/// Lookup side of the route registry.
///
/// The proxy depends only on this, so it can be tested without the manager.
pub trait RouteResolver: Send + Sync + 'static {
    fn resolve(&self, label: &str) -> Option<App>;
}

/// Concurrent `subdomain → App` map.
///
/// Cheap to clone; clones share the same table. Routes are not persisted and
/// are rebuilt by restart recovery.
#[derive(Clone, Debug, Default)]
pub struct SubdomainRouter {
    apps: Arc<RwLock<HashMap<String, App>>>,
}

impl SubdomainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the route for `key`.
    pub fn add_app(&self, key: &str, app: App) {
        tracing::debug!(subdomain = %key, upstream = %app.host, "Registering route");
        self.apps.write().insert(key.to_string(), app);
    }

    /// Remove the route for `key`. Returns whether one existed.
    pub fn del_app(&self, key: &str) -> bool {
        let removed = self.apps.write().remove(key).is_some();
        if removed {
            tracing::debug!(subdomain = %key, "Removed route");
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.apps.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

impl RouteResolver for SubdomainRouter {
    fn resolve(&self, label: &str) -> Option<App> {
        self.apps.read().get(label).cloned()
    }
}
