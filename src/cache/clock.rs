//! Time source for cache stamping and expiry.

use chrono::{DateTime, Utc};

/// Source of "now" for the cache.
///
/// Injected so expiry and reconciliation can be driven deterministically in tests.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: std::sync::Mutex::new(start),
    }
  }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.now.lock().unwrap() = now;
  }

  pub fn advance(&self, by: chrono::Duration) {
    let mut now = self.now.lock().unwrap();
    *now += by;
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap()
  }
}
