use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::clock::clock::{RuntimeClock, SharedClock};

/// Manually driven clock. Clones share the same time, so a test can keep a handle and advance it
/// while the runtime reads it.
#[derive(Debug, Clone)]
pub struct MockClock {
    pub time: Arc<AtomicI64>,
}

impl MockClock {
    pub fn new(time: i64) -> MockClock {
        MockClock { time: Arc::new(AtomicI64::new(time)) }
    }

    pub fn set(&self, time: i64) {
        self.time.store(time, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) -> i64 {
        self.time.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn shared(&self) -> SharedClock {
        self.clone_box()
    }
}

impl RuntimeClock for MockClock {
    fn get_current_time_in_ms(&self) -> i64 {
        self.time.load(Ordering::SeqCst)
    }

    fn clone_box(&self) -> SharedClock {
        SharedClock(Arc::new(self.clone()))
    }
}
