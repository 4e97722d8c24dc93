use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use labbox::Clock;

/// Wall clock that follows tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]`, advancing tokio time moves
/// this clock by the same amount, so lease timers and `expires_at` agree.
#[derive(Debug)]
pub struct TokioClock {
    base_millis: i64,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base_millis: i64) -> Self {
        Self {
            base_millis,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.base_millis + self.start.elapsed().as_millis() as i64
    }
}

/// Clock moved only by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
