//! Catalog and bookkeeping records read or written by the instance manager.
//!
//! Challenges, images and users are owned by administrative tooling outside
//! this crate; the manager only reads them. Solves and challenge records are
//! written as a side effect of flag submission and instance creation.

use serde::{Deserialize, Serialize};

/// A challenge users can start an instance for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub points: i64,
    /// Static flag; ignored when `dynamic_flag` is set.
    #[serde(default)]
    pub flag: String,
    /// Generate a fresh flag for every instance.
    #[serde(default)]
    pub dynamic_flag: bool,
    pub image_id: String,
    /// Lifetime of an instance in minutes.
    pub duration_minutes: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Container image backing one or more challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    /// Image reference passed to the runtime (e.g. `registry/web:1.0`).
    pub registry: String,
    /// CPU limit in (fractional) cores.
    pub cpu_limit: f64,
    pub memory_limit_mib: u64,
    /// Comma separated container ports to publish.
    pub exposed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Completion record, one per (user, challenge).
///
/// `solved_at` records the first completion and never changes afterwards.
/// Only the elapsed-time fields are refreshed by faster retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solve {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub points: i64,
    pub start_at: i64,
    pub solved_at: i64,
    /// Elapsed milliseconds between instance creation and solve.
    pub used_time: i64,
    /// `used_time` rendered to whole seconds, e.g. `1m30s`.
    pub used_time_str: String,
}

/// One row per successful run request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub challenge_id: String,
    pub challenge_name: String,
    pub instance_id: String,
    pub created_at: i64,
}
