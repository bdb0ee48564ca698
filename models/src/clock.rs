//! An injectable time source.
//!
//! The window gate and the drain engine both reason about elapsed wall-clock time. Reading
//! `Utc::now()` directly inside those components would make them untestable without sleeping a
//! real clock, so every caller that needs "now" goes through a `Clock` instead.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A `Clock` whose value is set explicitly, for deterministic tests of time-sensitive components.
#[derive(Clone, Debug)]
pub struct FrozenClock(Arc<Mutex<DateTime<Utc>>>);

impl FrozenClock {
    pub fn at(time: DateTime<Utc>) -> Self {
        FrozenClock(Arc::new(Mutex::new(time)))
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.0.lock().unwrap() = time;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.0.lock().unwrap();
        *guard = *guard + duration;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock_advances() {
        let start = Utc::now();
        let clock = FrozenClock::at(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }
}
