//! Time as a port. Sale windows, coupon expiry and session idling read it.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now" for sale windows and coupon expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self { Self { at: Mutex::new(at) } }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.at.lock() { *guard = at; }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.at.lock() { *guard += by; }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
