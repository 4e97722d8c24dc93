//! HTTP API consumed by the web front-end.
//!
//! User routes act on the caller's own instance; the caller is identified by
//! the `x-user-id` header set by the authenticating front proxy.

mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use error::ApiError;
pub use extract::UserId;

use crate::management::InstanceManager;

/// Build the API router over `manager`.
pub fn router(manager: Arc<InstanceManager>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/challenges/{challenge_id}/run",
            post(handlers::run_instance),
        )
        .route(
            "/api/challenges/{challenge_id}/destroy",
            post(handlers::destroy_instance),
        )
        .route(
            "/api/challenges/{challenge_id}/flag",
            post(handlers::submit_flag),
        )
        .route(
            "/api/challenges/{challenge_id}/instance",
            get(handlers::get_instance),
        )
        .route("/api/admin/instances", get(handlers::list_instances))
        .route(
            "/api/admin/instances/{id}",
            get(handlers::admin_get_instance),
        )
        .route(
            "/api/admin/instances/{id}/destroy",
            post(handlers::admin_destroy_instance),
        )
        .with_state(manager)
}
