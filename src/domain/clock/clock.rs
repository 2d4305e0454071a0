use std::sync::Arc;
use std::time::Instant;

/// Time source of the runtime. All timestamps handed to the scheduler are milliseconds relative to runtime start.
pub trait RuntimeClock: std::fmt::Debug + Send + Sync {
    fn get_current_time_in_ms(&self) -> i64;
    fn clone_box(&self) -> SharedClock;
}

#[derive(Debug)]
pub struct SharedClock(pub Arc<dyn RuntimeClock>);

impl Clone for SharedClock {
    fn clone(&self) -> Self {
        self.0.clone_box()
    }
}

impl std::ops::Deref for SharedClock {
    type Target = dyn RuntimeClock;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Wall clock anchored at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    base: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock { base: Instant::now() }
    }

    pub fn shared() -> SharedClock {
        SharedClock(Arc::new(SystemClock::new()))
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl RuntimeClock for SystemClock {
    fn get_current_time_in_ms(&self) -> i64 {
        self.base.elapsed().as_millis() as i64
    }

    fn clone_box(&self) -> SharedClock {
        SharedClock(Arc::new(self.clone()))
    }
}
