//! Wall-clock source for instance timestamps.
//!
//! Lease timers run on tokio's clock; `created_at`/`expires_at` are wall
//! clock. Keeping the wall clock behind a trait lets tests move both together.

use chrono::Utc;

/// Source of unix-millisecond timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
