//! Time source for lifecycle decisions.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
  at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(at: DateTime<Utc>) -> Self { Self { at: Mutex::new(at) } }

  pub fn set(&self, at: DateTime<Utc>) {
    *self.at.lock().unwrap_or_else(PoisonError::into_inner) = at;
  }

  pub fn advance(&self, by: Duration) {
    let mut guard = self.at.lock().unwrap_or_else(PoisonError::into_inner);
    *guard += by;
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { *self.at.lock().unwrap_or_else(PoisonError::into_inner) }
}
