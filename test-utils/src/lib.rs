//! Shared fixtures for labbox integration tests.

mod clock;
mod fixtures;
mod runtime;

pub use clock::{ManualClock, TokioClock};
pub use fixtures::{
    CHALLENGE_ID, IMAGE_ID, STATIC_FLAG, TestHarness, USER_ID, seed_catalog, seed_challenge,
    seed_user, temp_database,
};
pub use runtime::{FakeRuntime, FakeWorkload};
