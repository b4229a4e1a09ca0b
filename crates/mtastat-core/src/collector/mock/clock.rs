use std::sync::{Arc, Mutex};

use crate::collector::cache::Clock;

/// Clock whose time is set by the test.
///
/// Clones share the same time, so a test can keep one handle and advance the
/// clock after handing another to a [`RefreshCache`](crate::collector::RefreshCache).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Option<i64>>>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn at(now: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(Some(now))),
        }
    }

    /// Creates a clock that is unavailable until [`set`](Self::set) is called.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, now: i64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = Some(now.unwrap_or(0) + seconds);
    }

    /// Makes subsequent reads fail.
    pub fn fail(&self) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Option<i64> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
