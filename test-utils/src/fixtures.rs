//! Seed data and a ready-made manager over the fake runtime.

use std::sync::Arc;

use labbox::db::Database;
use labbox::gateway::SubdomainRouter;
use labbox::management::{InstanceManager, ManagerOptions};
use labbox::models::{Challenge, Image, User};
use labbox::{Clock, InstanceId};
use tempfile::TempDir;

use crate::clock::TokioClock;
use crate::runtime::FakeRuntime;

pub const USER_ID: &str = "user-1";
pub const CHALLENGE_ID: &str = "web-100";
pub const IMAGE_ID: &str = "nginx";
pub const STATIC_FLAG: &str = "flag{Static_Flag}";

/// File-backed database in a fresh temp dir. Keep the dir alive.
pub fn temp_database() -> (TempDir, Database) {
    let dir = TempDir::new().expect("create temp dir");
    let db = Database::open(&dir.path().join("labbox.db")).expect("open database");
    (dir, db)
}

pub fn seed_user(db: &Database, id: &str) {
    db.upsert_user(&User {
        id: id.to_string(),
        name: format!("{id}-name"),
    })
    .expect("seed user");
}

/// Add a challenge on the seeded image.
pub fn seed_challenge(db: &Database, id: &str, duration_minutes: u32, dynamic_flag: bool) {
    db.upsert_challenge(&Challenge {
        id: id.to_string(),
        name: format!("{id} challenge"),
        points: 100,
        flag: STATIC_FLAG.to_string(),
        dynamic_flag,
        image_id: IMAGE_ID.to_string(),
        duration_minutes,
        enabled: true,
    })
    .expect("seed challenge");
}

/// Seed [`USER_ID`], the image and a static-flag [`CHALLENGE_ID`].
pub fn seed_catalog(db: &Database, duration_minutes: u32) {
    db.upsert_image(&Image {
        id: IMAGE_ID.to_string(),
        name: "nginx".to_string(),
        registry: "nginx:alpine".to_string(),
        cpu_limit: 0.5,
        memory_limit_mib: 128,
        exposed: "80".to_string(),
    })
    .expect("seed image");
    seed_user(db, USER_ID);
    seed_challenge(db, CHALLENGE_ID, duration_minutes, false);
}

/// Manager wired to a [`FakeRuntime`], an in-memory store and a clock that
/// follows tokio time.
pub struct TestHarness {
    pub manager: Arc<InstanceManager>,
    pub runtime: Arc<FakeRuntime>,
    pub db: Database,
    pub router: SubdomainRouter,
}

impl TestHarness {
    /// Must run inside a tokio runtime.
    pub fn new(options: ManagerOptions) -> Self {
        Self::with_clock(options, Arc::new(TokioClock::default()))
    }

    pub fn with_clock(options: ManagerOptions, clock: Arc<dyn Clock>) -> Self {
        let db = Database::open_in_memory().expect("open database");
        seed_catalog(&db, 60);
        Self::with_database(db, options, clock)
    }

    pub fn with_database(db: Database, options: ManagerOptions, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(db, Arc::new(FakeRuntime::new()), options, clock)
    }

    /// Manager over an existing store and runtime, as after a restart.
    pub fn with_parts(
        db: Database,
        runtime: Arc<FakeRuntime>,
        options: ManagerOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let router = SubdomainRouter::new();
        let manager = InstanceManager::new(
            db.clone(),
            runtime.clone(),
            router.clone(),
            clock,
            options,
        );
        Self {
            manager,
            runtime,
            db,
            router,
        }
    }

    pub fn instance_id(&self, user_id: &str, challenge_id: &str) -> InstanceId {
        InstanceId::derive(user_id, challenge_id)
    }

    /// Let background boot/teardown tasks run to completion.
    ///
    /// Under paused time this also auto-advances through poll intervals.
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }
}
